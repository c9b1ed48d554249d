//! Name-keyed lookup of node shapes, line routes and arrow heads.
//!
//! Shape libraries plug in by registering [`Shape`] and [`LineRoute`]
//! implementations. A node whose shape is unknown lays out with
//! [`DefaultShape`] but draws nothing; a line whose route is unknown is
//! drawn straight.

mod arrows;
mod lines;
mod nodes;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kurbo::{BezPath, Shape as _};

use crate::draw::{Painter, PenStyle};
use crate::geometry::{Direction, Point, Rect};
use crate::pen::{Line, LineEnd, Node};

pub use arrows::{ArrowFill, ArrowFn};
pub use lines::{Curve, Mind, Polyline, Straight};
pub use nodes::{Circle, Combine, DefaultShape, ImageShape, LineNode, Rectangle, TextShape};

/// Distance within which a dragged control point snaps to an end's axis.
pub const CONTROL_POINT_DOCK: f64 = 10.0;

/// Drawing and layout for one node shape name.
///
/// Only `draw` is shape-specific in most libraries; the layout functions
/// default to full-rect icon/text areas and four edge-centre anchors.
pub trait Shape: Send + Sync {
    fn draw(&self, ctx: &mut dyn Painter, node: &Node, style: &PenStyle) {
        let rect = node.props.rect.to_kurbo();
        let path = if node.border_radius > 0.0 {
            kurbo::RoundedRect::from_rect(rect, corner_radius(node)).to_path(0.1)
        } else {
            rect.to_path(0.1)
        };
        style.paint(ctx, &path);
    }

    /// Anchors in unrotated diagram space.
    fn anchors(&self, node: &Node) -> Vec<Point> {
        default_anchors(node)
    }

    /// `(icon_rect, full_icon_rect)`.
    fn icon_rect(&self, node: &Node) -> (Rect, Rect) {
        let rect = padded_rect(node);
        (rect, rect)
    }

    /// `(text_rect, full_text_rect)`.
    fn text_rect(&self, node: &Node) -> (Rect, Rect) {
        let rect = padded_rect(node);
        (rect, rect)
    }
}

/// Routing for one line style.
pub trait LineRoute: Send + Sync {
    /// Refresh `line.control_points` (and end directions) from its ends.
    fn calc_control_points(&self, line: &mut Line);

    fn path(&self, line: &Line) -> BezPath;

    /// Midpoint used for line text.
    fn center(&self, line: &Line) -> Point {
        let path = self.path(line);
        let half = path.perimeter(0.1) / 2.0;
        point_along(&path, half).map(Point::from).unwrap_or_else(|| {
            Point::new((line.from.x + line.to.x) / 2.0, (line.from.y + line.to.y) / 2.0)
        })
    }

    /// Point an arrow head at `end` is aimed from.
    fn arrow_tail(&self, line: &Line, end: LineEnd) -> kurbo::Point {
        match end {
            LineEnd::From => line.control_points.first().unwrap_or(&line.to).pos(),
            LineEnd::To => line.control_points.last().unwrap_or(&line.from).pos(),
        }
    }

    /// Snap a control point being dragged onto the x or y of either end.
    fn dock_control_point(&self, line: &Line, pt: kurbo::Point) -> kurbo::Point {
        let mut out = pt;
        for end in [&line.from, &line.to] {
            if (end.x - pt.x).abs() < CONTROL_POINT_DOCK {
                out.x = end.x;
            }
            if (end.y - pt.y).abs() < CONTROL_POINT_DOCK {
                out.y = end.y;
            }
        }
        out
    }
}

/// Walk `pos` along a flattened path.
pub(crate) fn point_along(path: &BezPath, pos: f64) -> Option<kurbo::Point> {
    let mut points = Vec::new();
    kurbo::flatten(path.iter(), 0.5, |el| match el {
        kurbo::PathEl::MoveTo(p) | kurbo::PathEl::LineTo(p) => points.push(p),
        _ => {}
    });
    let mut walked = 0.0;
    for w in points.windows(2) {
        let seg = w[0].distance(w[1]);
        if seg > 0.0 && walked + seg >= pos {
            return Some(w[0].lerp(w[1], (pos - walked) / seg));
        }
        walked += seg;
    }
    points.last().copied()
}

fn corner_radius(node: &Node) -> f64 {
    let rect = &node.props.rect;
    // Values below 1 are a fraction of the shorter side.
    let r = if node.border_radius < 1.0 {
        rect.width.min(rect.height) * node.border_radius
    } else {
        node.border_radius
    };
    r.min(rect.width / 2.0).min(rect.height / 2.0)
}

/// Left, top, right and bottom edge centres.
pub fn default_anchors(node: &Node) -> Vec<Point> {
    let r = &node.props.rect;
    let c = r.center();
    vec![
        Point::new(r.x, c.y).with_direction(Direction::Left),
        Point::new(c.x, r.y).with_direction(Direction::Up),
        Point::new(r.ex(), c.y).with_direction(Direction::Right),
        Point::new(c.x, r.ey()).with_direction(Direction::Bottom),
    ]
}

/// Node rect shrunk by its resolved padding.
pub fn padded_rect(node: &Node) -> Rect {
    let r = &node.props.rect;
    let p = &node.padding;
    Rect::new(
        r.x + p.left,
        r.y + p.top,
        (r.width - p.left - p.right).max(0.0),
        (r.height - p.top - p.bottom).max(0.0),
    )
}

/// Shapes, routes and arrows by name.
#[derive(Clone, Default)]
pub struct ShapeRegistry {
    shapes: HashMap<String, Arc<dyn Shape>>,
    routes: HashMap<String, Arc<dyn LineRoute>>,
    arrows: HashMap<String, ArrowFn>,
    fallback_shape: DefaultShape,
    fallback_route: Straight,
}

impl fmt::Debug for ShapeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shapes: Vec<&String> = self.shapes.keys().collect();
        let mut routes: Vec<&String> = self.routes.keys().collect();
        shapes.sort();
        routes.sort();
        f.debug_struct("ShapeRegistry")
            .field("shapes", &shapes)
            .field("routes", &routes)
            .field("arrows", &self.arrows.len())
            .finish()
    }
}

impl ShapeRegistry {
    /// An empty registry. Every node lays out with the default shape and
    /// draws nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_shape("rectangle", Rectangle);
        registry.register_shape("circle", Circle);
        registry.register_shape("text", TextShape);
        registry.register_shape("image", ImageShape);
        registry.register_shape("combine", Combine);
        registry.register_shape("line", LineNode);

        registry.register_route("line", Straight);
        registry.register_route("polyline", Polyline);
        registry.register_route("curve", Curve);
        registry.register_route("mind", Mind);

        for (name, arrow) in arrows::builtin() {
            registry.register_arrow(name, arrow);
        }
        registry
    }

    /// Register (or replace) a node shape.
    pub fn register_shape(&mut self, name: impl Into<String>, shape: impl Shape + 'static) {
        self.shapes.insert(name.into(), Arc::new(shape));
    }

    pub fn register_route(&mut self, name: impl Into<String>, route: impl LineRoute + 'static) {
        self.routes.insert(name.into(), Arc::new(route));
    }

    pub fn register_arrow(&mut self, name: impl Into<String>, arrow: ArrowFn) {
        self.arrows.insert(name.into(), arrow);
    }

    pub fn shape(&self, name: &str) -> Option<&dyn Shape> {
        self.shapes.get(name).map(|s| s.as_ref())
    }

    /// Shape for layout; unknown names fall back to [`DefaultShape`].
    pub fn shape_or_default(&self, name: &str) -> &dyn Shape {
        self.shape(name).unwrap_or(&self.fallback_shape)
    }

    pub fn has_shape(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    /// Route for a line name; unknown names route straight.
    pub fn route(&self, name: &str) -> &dyn LineRoute {
        match self.routes.get(name) {
            Some(route) => route.as_ref(),
            None => &self.fallback_route,
        }
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn arrow(&self, name: &str) -> Option<ArrowFn> {
        self.arrows.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{NullPainter, Paint, TextRun};
    use crate::pen::Pen;

    #[derive(Default)]
    struct Counting {
        fills: usize,
    }

    impl Painter for Counting {
        fn save(&mut self) {}
        fn restore(&mut self) {}
        fn transform(&mut self, _affine: kurbo::Affine) {}
        fn set_alpha(&mut self, _alpha: f64) {}
        fn fill(&mut self, _path: &BezPath, _paint: &Paint) {
            self.fills += 1;
        }
        fn stroke(&mut self, _path: &BezPath, _style: &kurbo::Stroke, _paint: &Paint) {}
        fn text(&mut self, _run: &TextRun) {}
        fn image(&mut self, _source: &str, _rect: Rect) {}
    }

    struct Diamond;

    impl Shape for Diamond {
        fn anchors(&self, node: &Node) -> Vec<Point> {
            vec![Point::new(node.props.rect.x, node.props.rect.y)]
        }
    }

    #[test]
    fn test_unknown_shape_lays_out_but_draws_nothing() {
        let registry = ShapeRegistry::with_builtins();
        let mut node = Node::new("uml.actor", Rect::new(0.0, 0.0, 100.0, 50.0));
        node.props.fill_style = "#ff0000".into();
        node.init(&registry);
        assert_eq!(node.anchors.len(), 4);
        let mut painter = Counting::default();
        Pen::Node(node).render(&mut painter, &registry, "#222222");
        assert_eq!(painter.fills, 0);
    }

    #[test]
    fn test_registered_shape_overrides_defaults() {
        let mut registry = ShapeRegistry::with_builtins();
        registry.register_shape("diamond", Diamond);
        let mut node = Node::new("diamond", Rect::new(5.0, 6.0, 10.0, 10.0));
        node.init(&registry);
        assert_eq!(node.anchors, vec![Point::new(5.0, 6.0)]);
        let (text, full) = registry.shape_or_default("diamond").text_rect(&node);
        assert_eq!(text, node.props.rect);
        assert_eq!(full, node.props.rect);
        let mut painter = NullPainter;
        Pen::Node(node).render(&mut painter, &registry, "#222222");
    }

    #[test]
    fn test_unknown_route_is_straight() {
        let registry = ShapeRegistry::with_builtins();
        let mut line = Line::new("zigzag", Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        line.calc_control_points(&registry, false);
        assert!(line.control_points.is_empty());
        assert_eq!(line.len(&registry), 10.0);
    }

    #[test]
    fn test_default_anchor_positions() {
        let node = Node::new("rectangle", Rect::new(0.0, 0.0, 100.0, 50.0));
        let anchors = default_anchors(&node);
        assert_eq!(anchors[0].pos(), kurbo::Point::new(0.0, 25.0));
        assert_eq!(anchors[1].direction, Direction::Up);
        assert_eq!(anchors[2].pos(), kurbo::Point::new(100.0, 25.0));
        assert_eq!(anchors[3].pos(), kurbo::Point::new(50.0, 50.0));
    }

    #[test]
    fn test_control_point_docks_to_end_axis() {
        let registry = ShapeRegistry::with_builtins();
        let line = Line::new("polyline", Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        let docked = registry.route("polyline").dock_control_point(&line, kurbo::Point::new(95.0, 50.0));
        assert_eq!(docked, kurbo::Point::new(100.0, 50.0));
    }

    #[test]
    fn test_builtin_arrows_present() {
        let registry = ShapeRegistry::with_builtins();
        for name in ["triangleSolid", "triangle", "diamondSolid", "diamond", "circleSolid", "circle", "line", "lineUp", "lineDown"] {
            assert!(registry.arrow(name).is_some(), "{name}");
        }
        assert!(registry.arrow("nope").is_none());
    }
}
