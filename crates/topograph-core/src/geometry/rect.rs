//! Axis-aligned rectangles.

use kurbo::Vec2;
use serde::{Deserialize, Serialize};

use super::{Point, point_in_polygon};
use crate::serde_util::lenient;

/// A rectangle in diagram space.
///
/// The far corner (`ex`, `ey`) and the center are derived on demand, so
/// they can never go stale after a field edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    #[serde(default, deserialize_with = "lenient")]
    pub x: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub y: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub width: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two corners in any order.
    pub fn from_corners(a: kurbo::Point, b: kurbo::Point) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn ex(&self) -> f64 {
        self.x + self.width
    }

    pub fn ey(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> kurbo::Point {
        kurbo::Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Same rectangle with non-negative width and height.
    pub fn normalized(&self) -> Self {
        Self::from_corners(
            kurbo::Point::new(self.x, self.y),
            kurbo::Point::new(self.ex(), self.ey()),
        )
    }

    /// Inclusive containment test, the rectangle grown by `padding` on all
    /// sides.
    pub fn hit(&self, pt: kurbo::Point, padding: f64) -> bool {
        pt.x >= self.x - padding
            && pt.x <= self.ex() + padding
            && pt.y >= self.y - padding
            && pt.y <= self.ey() + padding
    }

    /// Whether `pt` lies in this rectangle rotated by `rotate` degrees
    /// about `center`.
    pub fn hit_rotate(&self, pt: kurbo::Point, rotate: f64, center: kurbo::Point) -> bool {
        let mut corners = self.to_points();
        for corner in corners.iter_mut() {
            corner.rotate(rotate, center);
        }
        point_in_polygon(pt, &corners)
    }

    /// Whether any corner of `other` lies strictly inside this rectangle.
    pub fn hit_by_rect(&self, other: &Rect) -> bool {
        let inside = |x: f64, y: f64| x > self.x && x < self.ex() && y > self.y && y < self.ey();
        inside(other.x, other.y)
            || inside(other.ex(), other.y)
            || inside(other.ex(), other.ey())
            || inside(other.x, other.ey())
    }

    /// Whether `other` lies fully inside this rectangle (edges included).
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x && other.y >= self.y && other.ex() <= self.ex() && other.ey() <= self.ey()
    }

    /// The four corners, clockwise from the top-left.
    pub fn to_points(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.ex(), self.y),
            Point::new(self.ex(), self.ey()),
            Point::new(self.x, self.ey()),
        ]
    }

    pub fn translate(&mut self, offset: Vec2) {
        self.x += offset.x;
        self.y += offset.y;
    }

    /// Scale about `center`, or about this rectangle's own center.
    pub fn scale(&mut self, scale: f64, center: Option<kurbo::Point>) {
        let center = center.unwrap_or_else(|| self.center());
        self.x = center.x - (center.x - self.x) * scale;
        self.y = center.y - (center.y - self.y) * scale;
        self.width *= scale;
        self.height *= scale;
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.ex().max(other.ex()) - x, self.ey().max(other.ey()) - y)
    }

    pub fn to_kurbo(&self) -> kurbo::Rect {
        kurbo::Rect::new(self.x, self.y, self.ex(), self.ey())
    }
}

impl From<kurbo::Rect> for Rect {
    fn from(rect: kurbo::Rect) -> Self {
        Rect::new(rect.x0, rect.y0, rect.width(), rect.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_hit_themselves() {
        let rects = [
            Rect::new(0.0, 0.0, 100.0, 50.0),
            Rect::new(-20.5, 13.0, 7.25, 300.0),
            Rect::new(5.0, 5.0, 0.0, 0.0),
        ];
        for rect in rects {
            for corner in rect.to_points() {
                assert!(corner.hit(corner.pos(), 0.0));
                assert!(rect.hit(corner.pos(), 0.0));
            }
        }
    }

    #[test]
    fn test_outside_padding_misses() {
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert!(rect.hit(kurbo::Point::new(104.0, 25.0), 5.0));
        assert!(!rect.hit(kurbo::Point::new(105.5, 25.0), 5.0));
        assert!(!rect.hit(kurbo::Point::new(50.0, -5.01), 5.0));
    }

    #[test]
    fn test_derived_fields_follow_edits() {
        let mut rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        rect.width = 50.0;
        assert_eq!(rect.ex(), 60.0);
        assert_eq!(rect.center(), kurbo::Point::new(35.0, 40.0));
    }

    #[test]
    fn test_scale_about_center() {
        let mut rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        rect.scale(0.5, None);
        assert_eq!(rect, Rect::new(25.0, 25.0, 50.0, 50.0));

        let mut rect = Rect::new(10.0, 10.0, 10.0, 10.0);
        rect.scale(2.0, Some(kurbo::Point::ZERO));
        assert_eq!(rect, Rect::new(20.0, 20.0, 20.0, 20.0));
    }

    #[test]
    fn test_hit_rotate() {
        let rect = Rect::new(0.0, 0.0, 100.0, 20.0);
        let center = rect.center();
        // A point near the end of the long side leaves the rect when rotated 90 degrees.
        assert!(rect.hit_rotate(kurbo::Point::new(95.0, 10.0), 0.0, center));
        assert!(!rect.hit_rotate(kurbo::Point::new(95.0, 10.0), 90.0, center));
        assert!(rect.hit_rotate(kurbo::Point::new(50.0, 50.0), 90.0, center));
    }

    #[test]
    fn test_hit_by_rect_and_contains() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(outer.hit_by_rect(&Rect::new(90.0, 90.0, 50.0, 50.0)));
        assert!(!outer.hit_by_rect(&Rect::new(200.0, 0.0, 10.0, 10.0)));
        assert!(outer.contains_rect(&Rect::new(10.0, 10.0, 20.0, 20.0)));
        assert!(!outer.contains_rect(&Rect::new(90.0, 90.0, 50.0, 50.0)));
    }

    #[test]
    fn test_normalized() {
        let rect = Rect::new(50.0, 50.0, -20.0, -30.0).normalized();
        assert_eq!(rect, Rect::new(30.0, 20.0, 20.0, 30.0));
    }
}
