//! Points, anchor directions and anchor modes.

use kurbo::Vec2;
use serde::{Deserialize, Serialize};

use crate::serde_util::{is_false, lenient, lenient_opt};

/// Side of a node an anchor faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Direction {
    #[default]
    None,
    Up,
    Right,
    Bottom,
    Left,
}

impl Direction {
    pub fn is_none(&self) -> bool {
        *self == Direction::None
    }

    /// The facing direction, rotating clockwise by `quarter_turns`.
    /// `None` stays `None`.
    pub fn turned(self, quarter_turns: u8) -> Self {
        if self.is_none() {
            return self;
        }
        let index = (u8::from(self) - 1 + quarter_turns) % 4;
        Direction::from(index + 1)
    }

    /// The direction facing the other way.
    pub fn opposite(self) -> Self {
        self.turned(2)
    }
}

impl From<u8> for Direction {
    fn from(value: u8) -> Self {
        match value {
            1 => Direction::Up,
            2 => Direction::Right,
            3 => Direction::Bottom,
            4 => Direction::Left,
            _ => Direction::None,
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::None => 0,
            Direction::Up => 1,
            Direction::Right => 2,
            Direction::Bottom => 3,
            Direction::Left => 4,
        }
    }
}

/// Which line end may dock to an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum AnchorMode {
    /// Both line ends.
    #[default]
    Default,
    /// Only incoming line ends (`to`).
    In,
    /// Only outgoing line ends (`from`).
    Out,
}

impl AnchorMode {
    pub fn is_default(&self) -> bool {
        *self == AnchorMode::Default
    }

    /// Whether an anchor in this mode accepts a line end docking as `wanted`.
    pub fn accepts(self, wanted: AnchorMode) -> bool {
        self == AnchorMode::Default || wanted == AnchorMode::Default || self == wanted
    }
}

impl From<u8> for AnchorMode {
    fn from(value: u8) -> Self {
        match value {
            1 => AnchorMode::In,
            2 => AnchorMode::Out,
            _ => AnchorMode::Default,
        }
    }
}

impl From<AnchorMode> for u8 {
    fn from(mode: AnchorMode) -> Self {
        match mode {
            AnchorMode::Default => 0,
            AnchorMode::In => 1,
            AnchorMode::Out => 2,
        }
    }
}

/// A diagram point: line end, control point or node anchor.
///
/// Line ends may be bound to a node anchor through `id` and
/// `anchor_index`; `auto_anchor` lets the binding move to whichever anchor
/// is closest to the other end of the line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    #[serde(default, deserialize_with = "lenient")]
    pub x: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub y: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Direction::is_none")]
    pub direction: Direction,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub anchor_index: Option<usize>,
    /// Id of the node this point is bound to.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub auto_anchor: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "AnchorMode::is_default")]
    pub mode: AnchorMode,
    /// Anchors that accept docking but are not drawn.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub hidden: bool,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_mode(mut self, mode: AnchorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn pos(&self) -> kurbo::Point {
        kurbo::Point::new(self.x, self.y)
    }

    pub fn set_pos(&mut self, pos: kurbo::Point) {
        self.x = pos.x;
        self.y = pos.y;
    }

    /// Rotate in place about `center` by `angle` degrees (clockwise in
    /// screen space).
    pub fn rotate(&mut self, angle: f64, center: kurbo::Point) {
        if angle == 0.0 || !angle.is_finite() {
            return;
        }
        let rad = angle.to_radians();
        let (sin, cos) = rad.sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        self.x = dx * cos - dy * sin + center.x;
        self.y = dx * sin + dy * cos + center.y;
    }

    /// Inclusive proximity test: `pt` lies in the square of half-size
    /// `padding` around this point.
    pub fn hit(&self, pt: kurbo::Point, padding: f64) -> bool {
        pt.x >= self.x - padding
            && pt.x <= self.x + padding
            && pt.y >= self.y - padding
            && pt.y <= self.y + padding
    }

    pub fn translate(&mut self, offset: Vec2) {
        self.x += offset.x;
        self.y += offset.y;
    }

    /// Scale the position about `center`.
    pub fn scale(&mut self, scale: f64, center: kurbo::Point) {
        self.x = center.x - (center.x - self.x) * scale;
        self.y = center.y - (center.y - self.y) * scale;
    }

    pub fn is_same_as(&self, other: &Point) -> bool {
        self.x == other.x && self.y == other.y
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.pos().distance(other.pos())
    }

    /// Bind this point to the anchor of node `id`.
    pub fn bind(&mut self, id: &str, anchor_index: usize, direction: Direction) {
        self.id = Some(id.to_string());
        self.anchor_index = Some(anchor_index);
        self.direction = direction;
        self.auto_anchor = false;
    }

    pub fn unbind(&mut self) {
        self.id = None;
        self.anchor_index = None;
        self.auto_anchor = false;
    }

    pub fn is_bound(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

impl From<&Point> for kurbo::Point {
    fn from(point: &Point) -> Self {
        point.pos()
    }
}

impl From<kurbo::Point> for Point {
    fn from(pos: kurbo::Point) -> Self {
        Point::new(pos.x, pos.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let mut p = Point::new(12.5, -3.0);
        p.rotate(0.0, kurbo::Point::new(100.0, 100.0));
        assert_eq!(p.x, 12.5);
        assert_eq!(p.y, -3.0);
    }

    #[test]
    fn test_rotate_and_back() {
        let center = kurbo::Point::new(40.0, 60.0);
        for angle in [15.0, 90.0, 137.5, -220.0, 359.0] {
            let mut p = Point::new(10.0, 20.0);
            p.rotate(angle, center);
            p.rotate(-angle, center);
            assert!(close(p.x, 10.0), "x drifted for {angle}");
            assert!(close(p.y, 20.0), "y drifted for {angle}");
        }
    }

    #[test]
    fn test_rotate_quarter_turn_is_clockwise() {
        let mut p = Point::new(10.0, 0.0);
        p.rotate(90.0, kurbo::Point::ZERO);
        assert!(close(p.x, 0.0));
        assert!(close(p.y, 10.0));
    }

    #[test]
    fn test_hit_is_inclusive() {
        let p = Point::new(10.0, 10.0);
        assert!(p.hit(kurbo::Point::new(10.0, 10.0), 0.0));
        assert!(p.hit(kurbo::Point::new(15.0, 5.0), 5.0));
        assert!(!p.hit(kurbo::Point::new(15.1, 10.0), 5.0));
    }

    #[test]
    fn test_direction_turns() {
        assert_eq!(Direction::Left.opposite(), Direction::Right);
        assert_eq!(Direction::Up.turned(1), Direction::Right);
        assert_eq!(Direction::Left.turned(1), Direction::Up);
        assert_eq!(Direction::None.opposite(), Direction::None);
    }

    #[test]
    fn test_serde_numbers() {
        let mut p = Point::new(1.0, 2.0).with_direction(Direction::Bottom);
        p.bind("n1", 3, Direction::Bottom);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["direction"], 3);
        assert_eq!(json["anchorIndex"], 3);
        assert_eq!(json["id"], "n1");
        let back: Point = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_anchor_mode_accepts() {
        assert!(AnchorMode::Default.accepts(AnchorMode::In));
        assert!(AnchorMode::In.accepts(AnchorMode::In));
        assert!(!AnchorMode::In.accepts(AnchorMode::Out));
        assert!(AnchorMode::Out.accepts(AnchorMode::Default));
    }
}
