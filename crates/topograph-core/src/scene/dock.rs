//! Snapping: dragged selections align with other nodes, dragged line ends
//! dock onto anchors and line ends.

use kurbo::Vec2;

use super::Scene;
use crate::geometry::{AnchorMode, Point, Rect};
use crate::pen::{Lock, Pen, tree};

/// Distance within which a dragged box snaps to another node.
const DOCK_OFFSET: f64 = 10.0;
/// Distance within which a dragged line end docks.
const LINE_DOCK: f64 = 10.0;

impl Scene {
    /// Per-axis snap for moving the selection by `delta`: the delta that
    /// aligns a watched point with a nearby node's centre or corner. Sets
    /// the guide lines as a side effect.
    pub(crate) fn get_dock_pos(&mut self, delta: Vec2) -> (Option<f64>, Option<f64>) {
        self.hover.dock_line_x = None;
        self.hover.dock_line_y = None;
        if self.options.disable_dock_line {
            return (None, None);
        }

        let mut snap_x = None;
        let mut snap_y = None;
        for pen in &self.data.pens {
            let Pen::Node(node) = pen else {
                continue;
            };
            if node.props.name == "text" || !node.props.visible || self.selection.contains(&node.props.id) {
                continue;
            }
            let rect = node.props.rect;
            let corners = rect.to_points();
            let targets = std::iter::once(rect.center()).chain(corners.iter().map(Point::pos));
            for target in targets {
                for watcher in &self.selection.dock_watchers {
                    let moved = *watcher + delta;
                    if snap_x.is_none() && (target.x - moved.x).abs() < DOCK_OFFSET {
                        snap_x = Some(target.x - watcher.x);
                        self.hover.dock_line_x = Some(target.x);
                    }
                    if snap_y.is_none() && (target.y - moved.y).abs() < DOCK_OFFSET {
                        snap_y = Some(target.y - watcher.y);
                        self.hover.dock_line_y = Some(target.y);
                    }
                }
                if snap_x.is_some() && snap_y.is_some() {
                    return (snap_x, snap_y);
                }
            }
        }
        (snap_x, snap_y)
    }

    /// Where a dragged end of line `line_id` lands when released at `pt`.
    ///
    /// Over a node, the end binds to an anchor accepting `mode` (or, at the
    /// node centre with auto-anchoring on, to whichever anchor faces
    /// `other`). Near another line's end or control point it snaps there
    /// without binding. Elsewhere it stays at `pt`.
    pub(crate) fn get_line_dock(&mut self, pt: kurbo::Point, mode: AnchorMode, line_id: &str, other: kurbo::Point) -> Point {
        self.hover.dock_anchor = None;
        let mut out = Point::from(pt);

        for pen in self.data.pens.iter().rev() {
            if pen.is_line() {
                continue;
            }
            let Some(hit) = pen.hit(pt, LINE_DOCK) else {
                continue;
            };
            match hit {
                Pen::Line(child) => {
                    if let Some(end) = [&child.from, &child.to].into_iter().find(|p| p.hit(pt, LINE_DOCK)) {
                        out.set_pos(end.pos());
                        self.hover.dock_anchor = Some(end.clone());
                    }
                }
                Pen::Node(node) => {
                    self.hover.node = Some(node.props.id.clone());
                    let center = Point::from(node.props.rect.center());
                    if self.options.auto_anchor && center.hit(pt, LINE_DOCK) {
                        if let Some((i, direction)) = node.nearest_anchor(other) {
                            out.set_pos(node.rotated_anchors[i].pos());
                            out.bind(&node.props.id, i, direction);
                            out.auto_anchor = true;
                            self.hover.dock_anchor = Some(center);
                        }
                        return out;
                    }
                    for (i, anchor) in node.rotated_anchors.iter().enumerate() {
                        if anchor.mode.accepts(mode) && anchor.hit(pt, LINE_DOCK) {
                            out.set_pos(anchor.pos());
                            out.bind(&node.props.id, i, anchor.direction);
                            self.hover.dock_anchor = Some(anchor.clone());
                            break;
                        }
                    }
                }
            }
            return out;
        }

        for line in tree::flatten(&self.data.pens).into_iter().filter_map(Pen::as_line) {
            if line.props.id == line_id || !line.props.visible || line.props.locked == Lock::NoEvent {
                continue;
            }
            let points = [&line.from, &line.to].into_iter().chain(line.control_points.iter());
            for p in points {
                if p.hit(pt, LINE_DOCK) {
                    out.set_pos(p.pos());
                    self.hover.dock_anchor = Some(p.clone());
                    return out;
                }
            }
        }
        out
    }

    /// Top-level pens fully inside `rect`: nodes by their bounds, lines by
    /// both ends.
    pub(crate) fn get_pens_in_rect(&self, rect: Rect) -> Vec<String> {
        let rect = rect.normalized();
        self.data
            .pens
            .iter()
            .filter(|pen| pen.visible() && pen.locked() != Lock::NoEvent)
            .filter(|pen| match pen {
                Pen::Node(node) => rect.contains_rect(&node.props.rect),
                Pen::Line(line) => rect.hit(line.from.pos(), 0.0) && rect.hit(line.to.pos(), 0.0),
            })
            .map(|pen| pen.id().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pen::Line;
    use crate::scene::tests::add_rect;

    #[test]
    fn test_dock_snaps_each_axis_once() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "b", Rect::new(300.0, 200.0, 100.0, 100.0));
        scene.select(&["a".to_string()]);
        scene.save_node_rects();
        // The centre of `a` lands 4px left of the centre of `b`.
        let (x, y) = scene.get_dock_pos(Vec2::new(296.0, 50.0));
        assert_eq!(x, Some(300.0));
        assert_eq!(y, None);
        assert_eq!(scene.hover().dock_line_x, Some(350.0));
    }

    #[test]
    fn test_dock_disabled() {
        let mut scene = Scene::default();
        scene.options.disable_dock_line = true;
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "b", Rect::new(100.0, 0.0, 100.0, 100.0));
        scene.select(&["a".to_string()]);
        scene.save_node_rects();
        assert_eq!(scene.get_dock_pos(Vec2::new(1.0, 1.0)), (None, None));
    }

    #[test]
    fn test_line_end_docks_to_anchor() {
        let mut scene = Scene::default();
        scene.options.auto_anchor = false;
        add_rect(&mut scene, "b", Rect::new(300.0, 0.0, 100.0, 100.0));
        let dock = scene.get_line_dock(kurbo::Point::new(304.0, 52.0), AnchorMode::In, "l", kurbo::Point::ZERO);
        assert_eq!(dock.id.as_deref(), Some("b"));
        assert_eq!(dock.anchor_index, Some(0));
        assert_eq!(dock.pos(), kurbo::Point::new(300.0, 50.0));
        assert_eq!(scene.hover().node.as_deref(), Some("b"));
    }

    #[test]
    fn test_line_end_at_centre_auto_anchors() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "b", Rect::new(300.0, 0.0, 100.0, 100.0));
        let dock = scene.get_line_dock(kurbo::Point::new(350.0, 50.0), AnchorMode::In, "l", kurbo::Point::new(0.0, 50.0));
        assert!(dock.auto_anchor);
        assert_eq!(dock.id.as_deref(), Some("b"));
        assert_eq!(dock.pos(), kurbo::Point::new(300.0, 50.0));
    }

    #[test]
    fn test_line_end_snaps_to_other_line_without_binding() {
        let mut scene = Scene::default();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        line.props.id = "other".into();
        scene.add_line(line, false);
        let dock = scene.get_line_dock(kurbo::Point::new(96.0, 3.0), AnchorMode::In, "l", kurbo::Point::ZERO);
        assert_eq!(dock.pos(), kurbo::Point::new(100.0, 0.0));
        assert!(!dock.is_bound());
    }

    #[test]
    fn test_pens_in_rect_need_full_containment() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "in", Rect::new(10.0, 10.0, 20.0, 20.0));
        add_rect(&mut scene, "half", Rect::new(90.0, 10.0, 20.0, 20.0));
        let mut line = Line::new("line", Point::new(5.0, 50.0), Point::new(50.0, 50.0));
        line.props.id = "l".into();
        scene.add_line(line, false);
        // Dragged from bottom-right to top-left.
        let ids = scene.get_pens_in_rect(Rect::new(100.0, 100.0, -100.0, -100.0));
        assert_eq!(ids, vec!["in".to_string(), "l".to_string()]);
    }
}
