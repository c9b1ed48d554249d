//! Geometry primitives: points, rectangles and the hit-testing helpers
//! built on them.

mod point;
mod rect;

pub use point::{AnchorMode, Direction, Point};
pub use rect::Rect;

use kurbo::{CubicBez, ParamCurve};
use serde::{Deserialize, Serialize};

/// Tolerance, in pixels, for hitting a line segment.
pub const LINE_HIT_TOLERANCE: f64 = 8.0;

/// A length given either in pixels or as a percentage string (`"25%"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Length {
    Px(f64),
    Text(String),
}

impl Default for Length {
    fn default() -> Self {
        Length::Px(0.0)
    }
}

impl Length {
    pub fn percent(value: f64) -> Self {
        Length::Text(format!("{value}%"))
    }

    /// Absolute value against `total`; unparseable text resolves to 0.
    pub fn resolve(&self, total: f64) -> f64 {
        match self {
            Length::Px(value) => *value,
            Length::Text(text) => {
                let text = text.trim();
                match text.strip_suffix('%') {
                    Some(pct) => pct.trim().parse::<f64>().map(|p| total * p / 100.0).unwrap_or(0.0),
                    None => text.parse().unwrap_or(0.0),
                }
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.resolve(100.0) == 0.0
    }
}

/// Axis-aligned envelope of `points`. An empty slice gives an empty rect.
pub fn bbox_of_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Rect {
    let mut iter = points.into_iter();
    let Some(first) = iter.next() else {
        return Rect::default();
    };
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in iter {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Rect::new(x0, y0, x1 - x0, y1 - y0)
}

/// Ray-casting point-in-polygon test.
pub fn point_in_polygon(pt: kurbo::Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (&polygon[i], &polygon[j]);
        if (a.y > pt.y) != (b.y > pt.y) && pt.x < (b.x - a.x) * (pt.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether `pt` lies within [`LINE_HIT_TOLERANCE`] of the segment `from`-`to`.
pub fn point_in_line(pt: kurbo::Point, from: kurbo::Point, to: kurbo::Point) -> bool {
    distance_to_segment(pt, from, to) <= LINE_HIT_TOLERANCE
}

pub fn distance_to_segment(pt: kurbo::Point, from: kurbo::Point, to: kurbo::Point) -> f64 {
    let seg = to - from;
    let len2 = seg.hypot2();
    if len2 == 0.0 {
        return pt.distance(from);
    }
    let t = ((pt - from).dot(seg) / len2).clamp(0.0, 1.0);
    pt.distance(from + seg * t)
}

pub fn line_len(from: &Point, to: &Point) -> f64 {
    from.distance(to)
}

/// Point at `t` on the cubic Bezier `from`, `cp1`, `cp2`, `to`.
pub fn bezier_point(t: f64, from: &Point, cp1: &Point, cp2: &Point, to: &Point) -> Point {
    CubicBez::new(from.pos(), cp1.pos(), cp2.pos(), to.pos()).eval(t).into()
}

/// Index of the point closest to `pt`.
pub fn nearest(points: &[Point], pt: kurbo::Point) -> Option<usize> {
    points
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.pos().distance_squared(pt).total_cmp(&b.1.pos().distance_squared(pt)))
        .map(|(i, _)| i)
}

/// Angle in degrees of `pt` seen from `center`: 0 points up, growing
/// clockwise, in `[0, 360)`.
pub fn angle_from(center: kurbo::Point, pt: kurbo::Point) -> f64 {
    let v = pt - center;
    let deg = v.x.atan2(-v.y).to_degrees();
    if deg < 0.0 { deg + 360.0 } else { deg }
}
