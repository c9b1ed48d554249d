//! Built-in line routes.

use kurbo::BezPath;

use super::LineRoute;
use crate::geometry::{Direction, Point, bezier_point};
use crate::pen::{Line, LineEnd};

/// How far a polyline leaves an anchor before its first bend.
const POLYLINE_OUT: f64 = 20.0;

/// Default handle length of a curve.
const CURVE_HANDLE: f64 = 40.0;

/// Offset of a mind-map branch from its parent anchor.
const MIND_OUT: f64 = 8.0;

fn offset(pt: &Point, direction: Direction, distance: f64) -> Point {
    let mut out = Point::new(pt.x, pt.y).with_direction(direction);
    match direction {
        Direction::Up => out.y -= distance,
        Direction::Right => out.x += distance,
        Direction::Bottom => out.y += distance,
        Direction::Left => out.x -= distance,
        Direction::None => {}
    }
    out
}

fn polyline_path(line: &Line) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(line.from.pos());
    for cp in &line.control_points {
        path.line_to(cp.pos());
    }
    path.line_to(line.to.pos());
    path
}

/// A straight segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Straight;

impl LineRoute for Straight {
    fn calc_control_points(&self, line: &mut Line) {
        line.control_points.clear();
    }

    fn path(&self, line: &Line) -> BezPath {
        let mut path = BezPath::new();
        path.move_to(line.from.pos());
        path.line_to(line.to.pos());
        path
    }

    fn center(&self, line: &Line) -> Point {
        Point::new((line.from.x + line.to.x) / 2.0, (line.from.y + line.to.y) / 2.0)
    }

    fn arrow_tail(&self, line: &Line, end: LineEnd) -> kurbo::Point {
        match end {
            LineEnd::From => line.to.pos(),
            LineEnd::To => line.from.pos(),
        }
    }
}

/// Orthogonal segments that leave and enter anchors along their
/// directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Polyline;

impl LineRoute for Polyline {
    fn calc_control_points(&self, line: &mut Line) {
        let start = offset(&line.from, line.from.direction, POLYLINE_OUT);
        let end = offset(&line.to, line.to.direction, POLYLINE_OUT);
        let horizontal_first = match line.from.direction {
            Direction::Left | Direction::Right => true,
            Direction::Up | Direction::Bottom => false,
            Direction::None => (end.x - start.x).abs() >= (end.y - start.y).abs(),
        };

        let mut points = Vec::new();
        if !line.from.direction.is_none() {
            points.push(start.clone());
        }
        if start.x != end.x && start.y != end.y {
            if horizontal_first {
                let mid = (start.x + end.x) / 2.0;
                points.push(Point::new(mid, start.y));
                points.push(Point::new(mid, end.y));
            } else {
                let mid = (start.y + end.y) / 2.0;
                points.push(Point::new(start.x, mid));
                points.push(Point::new(end.x, mid));
            }
        }
        if !line.to.direction.is_none() {
            points.push(end);
        }
        points.dedup_by(|a, b| a.x == b.x && a.y == b.y);
        line.control_points = points;
    }

    fn path(&self, line: &Line) -> BezPath {
        polyline_path(line)
    }

    /// Middle of the middle segment.
    fn center(&self, line: &Line) -> Point {
        let cps = &line.control_points;
        let i = (cps.len() as f64 / 2.0).round() as usize;
        let a = if i > 0 { &cps[i - 1] } else { &line.from };
        let b = cps.get(i).unwrap_or(&line.to);
        Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }
}

/// A cubic Bezier whose handles follow the end directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Curve;

impl Curve {
    fn handle(pt: &Point, other: &Point) -> Point {
        let (dx, dy) = ((other.x - pt.x).abs(), (other.y - pt.y).abs());
        let mut out = Point::new(pt.x, pt.y);
        match pt.direction {
            Direction::Up if dx < 3.0 => out.y -= (dy / 3.0).round(),
            Direction::Bottom if dx < 3.0 => out.y += (dy / 3.0).round(),
            Direction::Left if dy < 3.0 => out.x -= (dx / 3.0).round(),
            Direction::Right if dy < 3.0 => out.x += (dx / 3.0).round(),
            direction => return offset(pt, direction, CURVE_HANDLE),
        }
        out
    }

    fn cubic(line: &Line) -> Option<(&Point, &Point)> {
        match line.control_points.as_slice() {
            [a, b, ..] => Some((a, b)),
            _ => None,
        }
    }
}

impl LineRoute for Curve {
    fn calc_control_points(&self, line: &mut Line) {
        line.control_points = vec![Self::handle(&line.from, &line.to), Self::handle(&line.to, &line.from)];
    }

    fn path(&self, line: &Line) -> BezPath {
        let mut path = BezPath::new();
        path.move_to(line.from.pos());
        match Self::cubic(line) {
            Some((a, b)) => path.curve_to(a.pos(), b.pos(), line.to.pos()),
            None => path.line_to(line.to.pos()),
        }
        path
    }

    fn center(&self, line: &Line) -> Point {
        match Self::cubic(line) {
            Some((a, b)) => bezier_point(0.5, &line.from, a, b, &line.to),
            None => Point::new((line.from.x + line.to.x) / 2.0, (line.from.y + line.to.y) / 2.0),
        }
    }

    /// A point on the curve just short of the end, so the head follows
    /// the curve's tangent.
    fn arrow_tail(&self, line: &Line, end: LineEnd) -> kurbo::Point {
        let Some((a, b)) = Self::cubic(line) else {
            return Straight.arrow_tail(line, end);
        };
        let t = 0.95 - line.props.line_width / 100.0;
        match end {
            LineEnd::From => bezier_point(t, &line.to, b, a, &line.from).pos(),
            LineEnd::To => bezier_point(t, &line.from, a, b, &line.to).pos(),
        }
    }

    fn dock_control_point(&self, _line: &Line, pt: kurbo::Point) -> kurbo::Point {
        pt
    }
}

/// Mind-map branch: a short stub out of the parent, then a Bezier into
/// the child.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mind;

impl Mind {
    fn handles(line: &Line) -> Option<(&Point, &Point, &Point)> {
        match line.control_points.as_slice() {
            [a, b, c, ..] => Some((a, b, c)),
            _ => None,
        }
    }
}

impl LineRoute for Mind {
    fn calc_control_points(&self, line: &mut Line) {
        if line.from.direction.is_none() {
            line.from.direction = Direction::Bottom;
        }
        if line.to.direction.is_none() {
            line.to.direction = match line.from.direction.opposite() {
                Direction::None => Direction::Left,
                direction => direction,
            };
        }
        let from = offset(&line.from, line.from.direction, MIND_OUT);
        let (w, h) = (line.to.x - from.x, line.to.y - from.y);
        line.control_points = match line.from.direction {
            Direction::Left | Direction::Right => vec![
                Point::new(from.x, from.y + h / 3.0),
                Point::new(from.x, line.to.y),
            ],
            _ => vec![Point::new(from.x + w / 3.0, from.y), Point::new(line.to.x, from.y)],
        };
        line.control_points.insert(0, from);
    }

    fn path(&self, line: &Line) -> BezPath {
        let mut path = BezPath::new();
        path.move_to(line.from.pos());
        match Self::handles(line) {
            Some((a, b, c)) => {
                path.line_to(a.pos());
                path.curve_to(b.pos(), c.pos(), line.to.pos());
            }
            None => path.line_to(line.to.pos()),
        }
        path
    }

    fn arrow_tail(&self, line: &Line, end: LineEnd) -> kurbo::Point {
        match (end, Self::handles(line)) {
            (LineEnd::To, Some((a, b, c))) => bezier_point(0.96 - line.props.line_width / 100.0, a, b, c, &line.to).pos(),
            (LineEnd::From, Some((a, _, _))) => a.pos(),
            _ => Straight.arrow_tail(line, end),
        }
    }

    fn dock_control_point(&self, _line: &Line, pt: kurbo::Point) -> kurbo::Point {
        pt
    }
}
