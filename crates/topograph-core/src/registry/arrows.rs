//! Arrow heads drawn at line ends.

use kurbo::{BezPath, Circle, Point, Shape as _, Vec2};

/// How an arrow head path is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowFill {
    /// Filled and stroked with the line colour.
    Solid,
    /// Filled white, stroked with the line colour.
    Hollow,
    /// Stroked only.
    Open,
}

/// Build an arrow head of `size` with its tip at `tip`, aimed from `tail`.
pub type ArrowFn = fn(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill);

pub(super) fn builtin() -> [(&'static str, ArrowFn); 9] {
    [
        ("triangleSolid", triangle_solid),
        ("triangle", triangle),
        ("diamondSolid", diamond_solid),
        ("diamond", diamond),
        ("circleSolid", circle_solid),
        ("circle", circle),
        ("line", line),
        ("lineUp", line_up),
        ("lineDown", line_down),
    ]
}

/// Unit direction tail to tip and its left-hand normal.
fn frame(tail: Point, tip: Point) -> (Vec2, Vec2) {
    let d = tip - tail;
    let len = d.hypot();
    let d = if len > 0.0 { d / len } else { Vec2::new(1.0, 0.0) };
    (d, Vec2::new(-d.y, d.x))
}

fn polygon(points: &[Point], close: bool) -> BezPath {
    let mut path = BezPath::new();
    if let Some((first, rest)) = points.split_first() {
        path.move_to(*first);
        for p in rest {
            path.line_to(*p);
        }
        if close {
            path.close_path();
        }
    }
    path
}

fn triangle_path(tail: Point, tip: Point, size: f64) -> BezPath {
    let (d, n) = frame(tail, tip);
    let base = tip - d * size * 2.0;
    polygon(&[tip, base + n * size, base - n * size], true)
}

fn triangle_solid(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    (triangle_path(tail, tip, size), ArrowFill::Solid)
}

fn triangle(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    (triangle_path(tail, tip, size), ArrowFill::Hollow)
}

fn diamond_path(tail: Point, tip: Point, size: f64) -> BezPath {
    let (d, n) = frame(tail, tip);
    let mid = tip - d * size;
    polygon(&[tip, mid + n * size / 2.0, tip - d * size * 2.0, mid - n * size / 2.0], true)
}

fn diamond_solid(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    (diamond_path(tail, tip, size), ArrowFill::Solid)
}

fn diamond(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    (diamond_path(tail, tip, size), ArrowFill::Hollow)
}

fn circle_path(tail: Point, tip: Point, size: f64) -> BezPath {
    let (d, _) = frame(tail, tip);
    Circle::new(tip - d * size, size).to_path(0.1)
}

fn circle_solid(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    (circle_path(tail, tip, size), ArrowFill::Solid)
}

fn circle(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    (circle_path(tail, tip, size), ArrowFill::Hollow)
}

fn line(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    let (d, n) = frame(tail, tip);
    let back = tip - d * size * 2.0;
    (polygon(&[back + n * size, tip, back - n * size], false), ArrowFill::Open)
}

fn line_up(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    let (d, n) = frame(tail, tip);
    (polygon(&[tip - d * size * 2.0 - n * size, tip], false), ArrowFill::Open)
}

fn line_down(tail: Point, tip: Point, size: f64) -> (BezPath, ArrowFill) {
    let (d, n) = frame(tail, tip);
    (polygon(&[tip - d * size * 2.0 + n * size, tip], false), ArrowFill::Open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_points_at_tip() {
        let (path, fill) = triangle_solid(Point::new(0.0, 0.0), Point::new(100.0, 0.0), 5.0);
        assert_eq!(fill, ArrowFill::Solid);
        let bbox = path.bounding_box();
        assert_eq!(bbox.x1, 100.0);
        assert_eq!(bbox.x0, 90.0);
        assert_eq!(bbox.height(), 10.0);
    }

    #[test]
    fn test_line_up_is_above_horizontal_line() {
        let (path, fill) = line_up(Point::new(0.0, 0.0), Point::new(100.0, 0.0), 5.0);
        assert_eq!(fill, ArrowFill::Open);
        assert!(path.bounding_box().y0 < 0.0);
        assert_eq!(path.bounding_box().y1, 0.0);
    }

    #[test]
    fn test_degenerate_direction() {
        let (path, _) = diamond(Point::new(3.0, 3.0), Point::new(3.0, 3.0), 4.0);
        assert!(path.bounding_box().width() > 0.0);
    }
}
