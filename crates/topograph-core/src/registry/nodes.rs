//! Built-in node shapes.

use kurbo::{BezPath, Ellipse, Shape as _};

use super::{Shape, padded_rect};
use crate::draw::{Painter, PenStyle};
use crate::geometry::{Direction, Point, Rect};
use crate::pen::Node;

/// Spacing of the hidden anchors along a `line` node.
const LINE_ANCHOR_STEP: f64 = 5.0;

/// Layout used for shape names nobody registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultShape;

impl Shape for DefaultShape {}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rectangle;

impl Shape for Rectangle {}

#[derive(Debug, Clone, Copy, Default)]
pub struct Circle;

impl Shape for Circle {
    fn draw(&self, ctx: &mut dyn Painter, node: &Node, style: &PenStyle) {
        let ellipse = Ellipse::from_rect(node.props.rect.to_kurbo());
        style.paint(ctx, &ellipse.to_path(0.1));
    }

    fn text_rect(&self, node: &Node) -> (Rect, Rect) {
        // Largest axis-aligned box inside the ellipse.
        let full = padded_rect(node);
        let (w, h) = (full.width / 2f64.sqrt(), full.height / 2f64.sqrt());
        let c = full.center();
        let rect = Rect::new(c.x - w / 2.0, c.y - h / 2.0, w, h);
        (rect, full)
    }
}

/// A text label: background fill only, no outline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextShape;

impl Shape for TextShape {
    fn draw(&self, ctx: &mut dyn Painter, node: &Node, style: &PenStyle) {
        if let Some(fill) = &style.fill {
            ctx.fill(&node.props.rect.to_kurbo().to_path(0.1), fill);
        }
    }
}

/// Image above, text in a band along the bottom edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageShape;

impl ImageShape {
    fn band(node: &Node) -> f64 {
        if node.padding.bottom > 0.0 {
            return node.padding.bottom;
        }
        node.props.font.line_px() * node.props.text_max_line.max(1) as f64
    }
}

impl Shape for ImageShape {
    fn draw(&self, _ctx: &mut dyn Painter, _node: &Node, _style: &PenStyle) {}

    fn icon_rect(&self, node: &Node) -> (Rect, Rect) {
        let r = node.props.rect;
        let has_text = node.props.text.as_deref().is_some_and(|t| !t.is_empty());
        let text_height = if has_text { Self::band(node) } else { 0.0 };
        (Rect::new(r.x, r.y, r.width, (r.height - text_height).max(0.0)), r)
    }

    fn text_rect(&self, node: &Node) -> (Rect, Rect) {
        let r = node.props.rect;
        let band = Self::band(node);
        let rect = Rect::new(r.x, r.ey() - band, r.width - node.props.text_offset_x * 2.0, band);
        (rect, r)
    }
}

/// Container for grouped children. Draws a frame only when styled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Combine;

impl Shape for Combine {
    fn draw(&self, ctx: &mut dyn Painter, node: &Node, style: &PenStyle) {
        if node.props.stroke_style.is_empty() && node.props.fill_style.is_empty() && node.bk_type.is_solid() {
            return;
        }
        Rectangle.draw(ctx, node, style);
    }
}

/// A horizontal stroke across the node's vertical centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineNode;

impl Shape for LineNode {
    fn draw(&self, ctx: &mut dyn Painter, node: &Node, style: &PenStyle) {
        let r = &node.props.rect;
        let y = r.center().y;
        let mut path = BezPath::new();
        path.move_to((r.x, y));
        path.line_to((r.ex(), y));
        style.outline(ctx, &path);
    }

    /// Both ends, then hidden anchors every few pixels in between so a
    /// connector can attach anywhere along the stroke.
    fn anchors(&self, node: &Node) -> Vec<Point> {
        let r = &node.props.rect;
        let y = r.center().y;
        let mut anchors = vec![
            Point::new(r.x, y).with_direction(Direction::Left),
            Point::new(r.ex(), y).with_direction(Direction::Right),
        ];
        let mut x = r.x + LINE_ANCHOR_STEP;
        while x < r.ex() {
            anchors.push(Point::new(x, y).with_direction(Direction::Bottom).hidden());
            x += LINE_ANCHOR_STEP;
        }
        anchors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ShapeRegistry;

    #[test]
    fn test_circle_text_rect_inside_ellipse() {
        let node = Node::new("circle", Rect::new(0.0, 0.0, 100.0, 100.0));
        let (rect, full) = Circle.text_rect(&node);
        assert_eq!(full, node.props.rect);
        assert!(rect.width < 100.0 && rect.width > 70.0);
        assert!((rect.center() - kurbo::Point::new(50.0, 50.0)).hypot() < 1e-9);
    }

    #[test]
    fn test_line_node_anchors() {
        let node = Node::new("line", Rect::new(0.0, 0.0, 20.0, 10.0));
        let anchors = LineNode.anchors(&node);
        assert_eq!(anchors.len(), 5);
        assert!(!anchors[0].hidden && !anchors[1].hidden);
        assert!(anchors[2..].iter().all(|a| a.hidden && a.y == 5.0));
        assert_eq!(anchors[4].x, 15.0);
    }

    #[test]
    fn test_image_text_band() {
        let mut node = Node::new("image", Rect::new(0.0, 0.0, 100.0, 100.0));
        node.init(&ShapeRegistry::with_builtins());
        assert_eq!(node.text_rect, Rect::new(0.0, 82.0, 100.0, 18.0));
        assert_eq!(node.icon_rect, node.props.rect);

        node.props.text = Some("caption".into());
        node.init(&ShapeRegistry::with_builtins());
        assert_eq!(node.icon_rect, Rect::new(0.0, 0.0, 100.0, 82.0));
        assert_eq!(node.full_icon_rect, node.props.rect);
    }
}
