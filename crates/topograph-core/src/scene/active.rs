//! The active selection: its handles, the geometry saved when a drag
//! starts, and the move, resize and rotate edits applied from it.

use std::collections::{HashMap, HashSet};

use kurbo::Vec2;

use super::Scene;
use crate::events::SceneEvent;
use crate::geometry::{self, Point, Rect, angle_from, bbox_of_points};
use crate::options::Options;
use crate::pen::{LineEnd, ParentFrame, Pen, tree};
use crate::registry::ShapeRegistry;

/// Distance of the rotate handle above the selection.
const ROTATE_HANDLE_OFFSET: f64 = 35.0;
/// Smallest side a resize can produce.
const MIN_SIZE: f64 = 10.0;

/// Geometry of one selected pen when the current drag began.
#[derive(Debug, Clone, PartialEq)]
struct Saved {
    id: String,
    rect: Rect,
    rotate: f64,
    /// Node rect origin, or a line's `from`.
    origin: kurbo::Point,
}

/// Selected pens and the handles drawn around them.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected pen ids, in selection order.
    pub ids: Vec<String>,
    /// Bounding box of the selection.
    pub rect: Rect,
    /// Resize handles, clockwise from the top-left corner.
    pub size_cps: Vec<Point>,
    /// Rotate handle, then the point it hangs from.
    pub rotate_cps: Vec<Point>,
    /// Rotation of an in-progress rotate drag, in degrees.
    pub rotate: f64,
    saved: Vec<Saved>,
    saved_rect: Rect,
    /// Snap sources: centre and corners of the dragged box.
    pub(crate) dock_watchers: Vec<kurbo::Point>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    pub(crate) fn set(&mut self, ids: Vec<String>) {
        self.ids = ids;
        self.rotate = 0.0;
        self.saved.clear();
    }

    pub(crate) fn add(&mut self, id: &str) {
        if !self.contains(id) {
            self.ids.push(id.to_string());
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Selected pens that still exist, in selection order.
    pub fn pens<'a>(&self, pens: &'a [Pen]) -> Vec<&'a Pen> {
        self.ids.iter().filter_map(|id| tree::find_by_id(pens, id)).collect()
    }

    /// Whether every selected pen is locked. True for an empty selection.
    pub fn locked(&self, pens: &[Pen]) -> bool {
        self.pens(pens).iter().all(|pen| !pen.locked().is_none())
    }

    /// Whether `id` is selected or lies inside a selected group.
    pub fn contains_deep(&self, pens: &[Pen], id: &str) -> bool {
        self.pens(pens).iter().any(|pen| tree::contains_id(pen, id))
    }

    /// Recompute the bounding box and handles.
    pub fn calc_control_points(&mut self, pens: &[Pen], options: &Options, registry: &ShapeRegistry) {
        self.size_cps.clear();
        self.rotate_cps.clear();
        let selected = self.pens(pens);
        if selected.is_empty() {
            self.rect = Rect::default();
            return;
        }

        let (rect, angle, hide_rotate) = match selected.as_slice() {
            [Pen::Node(node)] => (node.props.rect, node.props.angle(), node.props.hide_rotate_cp),
            _ => {
                let points: Vec<Point> = selected.iter().flat_map(|pen| outline(pen, registry)).collect();
                (bbox_of_points(&points), self.rotate, false)
            }
        };
        self.rect = rect;
        let center = rect.center();
        let turn = |mut p: Point| {
            p.rotate(angle, center);
            p
        };
        self.size_cps = rect.to_points().into_iter().map(turn).collect();
        if !(options.hide_rotate_cp || hide_rotate) {
            self.rotate_cps = vec![
                turn(Point::new(center.x, rect.y - ROTATE_HANDLE_OFFSET)),
                turn(Point::new(center.x, rect.y)),
            ];
        }
    }

    /// Remember the current geometry as the base of a drag.
    pub(crate) fn save(&mut self, pens: &[Pen], registry: &ShapeRegistry) {
        self.saved = self
            .pens(pens)
            .into_iter()
            .map(|pen| {
                let rect = pen.bounds(registry);
                let origin = match pen {
                    Pen::Node(node) => kurbo::Point::new(node.props.rect.x, node.props.rect.y),
                    Pen::Line(line) => line.from.pos(),
                };
                Saved {
                    id: pen.id().to_string(),
                    rect,
                    rotate: pen.props().rotate,
                    origin,
                }
            })
            .collect();
        self.saved_rect = self.rect;
        let watched = match self.saved.as_slice() {
            [only] => only.rect,
            _ => self.rect,
        };
        self.dock_watchers = std::iter::once(watched.center())
            .chain(watched.to_points().iter().map(Point::pos))
            .collect();
    }

    /// Centre of the selection as it was when the drag began.
    pub(crate) fn pivot(&self) -> kurbo::Point {
        if self.saved.is_empty() { self.rect.center() } else { self.saved_rect.center() }
    }
}

/// Points a pen covers: rotated corners for nodes, the route for lines.
pub(crate) fn outline(pen: &Pen, registry: &ShapeRegistry) -> Vec<Point> {
    match pen {
        Pen::Node(node) => {
            let center = node.props.rect.center();
            let angle = node.props.angle();
            node.props
                .rect
                .to_points()
                .into_iter()
                .map(|mut p| {
                    p.rotate(angle, center);
                    p
                })
                .collect()
        }
        Pen::Line(line) => {
            let mut points = vec![line.from.clone(), line.to.clone()];
            points.extend(line.samples(registry).iter().map(|p| Point::from(*p)));
            points
        }
    }
}

/// Frame of the parent of `id`, if it is nested.
fn parent_frame(pens: &[Pen], id: &str) -> Option<ParentFrame> {
    tree::parent_of(pens, id).and_then(Pen::as_node).map(|node| node.frame())
}

/// Lines outside `skip` whose both ends are bound inside `pen`.
fn inner_lines(pens: &[Pen], pen: &Pen, skip: &HashSet<&str>) -> Vec<String> {
    let inside = |p: &Point| p.id.as_deref().is_some_and(|id| tree::contains_id(pen, id));
    pens.iter()
        .filter_map(Pen::as_line)
        .filter(|line| !skip.contains(line.props.id.as_str()) && inside(&line.from) && inside(&line.to))
        .map(|line| line.props.id.clone())
        .collect()
}

impl Scene {
    pub(crate) fn save_node_rects(&mut self) {
        self.selection.save(&self.data.pens, &self.registry);
    }

    pub(crate) fn refresh_selection(&mut self) {
        self.selection.calc_control_points(&self.data.pens, &self.options, &self.registry);
    }

    /// Move the selection to `delta` from where the drag began.
    pub(crate) fn move_selection(&mut self, delta: Vec2) {
        if self.selection.saved.len() != self.selection.ids.len() {
            return;
        }
        let saved = self.selection.saved.clone();
        let ids = self.selection.ids.clone();
        let skip: HashSet<&str> = ids.iter().map(String::as_str).collect();

        for item in &saved {
            let Some(pen) = tree::find_by_id(&self.data.pens, &item.id) else {
                continue;
            };
            if !pen.locked().is_none() {
                continue;
            }
            let current = match pen {
                Pen::Node(node) => kurbo::Point::new(node.props.rect.x, node.props.rect.y),
                Pen::Line(line) => line.from.pos(),
            };
            let offset = item.origin + delta - current;
            let carried = if pen.is_line() { Vec::new() } else { inner_lines(&self.data.pens, pen, &skip) };
            let frame = parent_frame(&self.data.pens, &item.id);

            if let Some(pen) = tree::find_by_id_mut(&mut self.data.pens, &item.id) {
                pen.translate(offset);
                if let Pen::Node(node) = pen {
                    node.calc_children_rect(&self.registry);
                }
                if let Some(frame) = frame {
                    pen.calc_rect_in_parent(&frame);
                }
            }
            for id in carried {
                if let Some(line) = tree::find_by_id_mut(&mut self.data.pens, &id) {
                    line.translate(offset);
                }
            }
        }

        self.update_lines(&ids);
        self.refresh_selection();
        let moved = self.clone_pens(&ids);
        self.emit(SceneEvent::Move(moved));
    }

    /// Drag resize handle `handle` from `from` to `to`.
    pub(crate) fn resize_selection(&mut self, handle: usize, from: kurbo::Point, to: kurbo::Point) {
        let saved = self.selection.saved.clone();
        if saved.is_empty() {
            return;
        }
        let (mut p1, mut p2) = (Point::from(from), Point::from(to));
        if let [only] = saved.as_slice() {
            if only.rotate != 0.0 {
                let center = only.rect.center();
                p1.rotate(-only.rotate, center);
                p2.rotate(-only.rotate, center);
            }
        }
        let mut dx = p2.x - p1.x;
        let mut dy = p2.y - p1.y;
        if self.options.only_size_x {
            dy = 0.0;
        }
        if self.options.only_size_y {
            dx = 0.0;
        }
        match handle {
            0 => {
                dx = -dx;
                dy = -dy;
            }
            1 => dy = -dy,
            3 => dx = -dx,
            _ => {}
        }

        for item in &saved {
            let frame = parent_frame(&self.data.pens, &item.id);
            let Some(Pen::Node(node)) = tree::find_by_id_mut(&mut self.data.pens, &item.id) else {
                continue;
            };
            if !node.props.locked.is_none() {
                continue;
            }
            let r = item.rect;
            let width = if node.only_size_y { r.width } else { (r.width + dx).max(MIN_SIZE) };
            let height = if node.only_size_x { r.height } else { (r.height + dy).max(MIN_SIZE) };
            let (x, y) = match handle {
                0 => (r.ex() - width, r.ey() - height),
                1 => (r.x, r.ey() - height),
                3 => (r.ex() - width, r.y),
                _ => (r.x, r.y),
            };
            node.props.rect = Rect::new(x, y, width, height);
            node.init(&self.registry);
            node.calc_children_rect(&self.registry);
            if let Some(frame) = frame {
                node.calc_rect_in_parent(&frame);
            }
        }

        let ids = self.selection.ids.clone();
        self.update_lines(&ids);
        self.refresh_selection();
    }

    /// Angle of `pt` around the selection, relative to a single pen's own
    /// rotation.
    pub(crate) fn selection_angle(&self, pt: kurbo::Point) -> f64 {
        let angle = angle_from(self.selection.pivot(), pt);
        match self.selection.saved.as_slice() {
            [only] => angle - only.rotate,
            _ => angle,
        }
    }

    /// Rotate the selection by `angle` degrees without committing.
    pub(crate) fn rotate_selection(&mut self, angle: f64) {
        let saved = self.selection.saved.clone();
        let pivot = self.selection.pivot();
        let multi = saved.len() > 1;
        for item in &saved {
            let Some(Pen::Node(node)) = tree::find_by_id_mut(&mut self.data.pens, &item.id) else {
                continue;
            };
            if !node.props.locked.is_none() {
                continue;
            }
            let mut center = Point::from(item.rect.center());
            if multi {
                center.rotate(angle, pivot);
            }
            let (w, h) = (item.rect.width, item.rect.height);
            node.props.rect = Rect::new(center.x - w / 2.0, center.y - h / 2.0, w, h);
            node.props.offset_rotate = angle;
            node.init(&self.registry);
            node.calc_children_rect(&self.registry);
        }
        self.selection.rotate = angle;

        let ids = self.selection.ids.clone();
        self.update_lines(&ids);
        self.refresh_selection();
        let rotated = self.clone_pens(&ids);
        self.emit(SceneEvent::Rotated(rotated));
    }

    /// Fold the pending rotation into each node's `rotate`.
    pub(crate) fn commit_rotate(&mut self) {
        let ids = self.selection.ids.clone();
        for id in &ids {
            let frame = parent_frame(&self.data.pens, id);
            let Some(Pen::Node(node)) = tree::find_by_id_mut(&mut self.data.pens, id) else {
                continue;
            };
            let offset = node.props.offset_rotate;
            node.props.rotate = (node.props.rotate + offset) % 360.0;
            node.props.offset_rotate = 0.0;
            if frame.is_some() {
                if let Some(rip) = node.props.rect_in_parent.as_mut() {
                    rip.rotate += offset;
                }
            }
            node.init(&self.registry);
            node.calc_children_rect(&self.registry);
        }
        self.selection.rotate = 0.0;
        self.refresh_selection();
        self.save_node_rects();
    }

    /// Re-attach bound line ends to the anchors of the nodes in `ids` (and
    /// their descendants), or of every node when auto-anchoring is on.
    pub(crate) fn update_lines(&mut self, ids: &[String]) {
        let mut anchors: HashMap<String, Vec<Point>> = HashMap::new();
        let mut collect = |pen: &Pen| {
            for p in tree::flatten(std::slice::from_ref(pen)) {
                if let Pen::Node(node) = p {
                    anchors.insert(node.props.id.clone(), node.rotated_anchors.clone());
                }
            }
        };
        if self.options.auto_anchor {
            self.data.pens.iter().for_each(&mut collect);
        } else {
            ids.iter().filter_map(|id| tree::find_by_id(&self.data.pens, id)).for_each(&mut collect);
        }
        if anchors.is_empty() {
            return;
        }

        let registry = &self.registry;
        tree::walk_mut(&mut self.data.pens, &mut |pen| {
            let Pen::Line(line) = pen else {
                return;
            };
            let mut bound = 0;
            for (end, other) in [(LineEnd::From, LineEnd::To), (LineEnd::To, LineEnd::From)] {
                let Some(node_anchors) = line.end(end).id.as_ref().and_then(|id| anchors.get(id)) else {
                    continue;
                };
                let target = line.end(other).pos();
                let point = line.end_mut(end);
                if point.auto_anchor {
                    if let Some(i) = geometry::nearest(node_anchors, target) {
                        point.anchor_index = Some(i);
                        point.direction = node_anchors[i].direction;
                    }
                }
                if let Some(anchor) = point.anchor_index.and_then(|i| node_anchors.get(i)) {
                    point.x = anchor.x;
                    point.y = anchor.y;
                    bound += 1;
                }
            }
            if bound > 0 {
                line.calc_control_points(registry, false);
            }
        });
    }

    /// Whether any selected pen is locked against moving.
    pub(crate) fn selection_locked(&self) -> bool {
        self.selection.locked(&self.data.pens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pen::{Line, Node};

    fn registry() -> ShapeRegistry {
        ShapeRegistry::with_builtins()
    }

    fn node(id: &str, rect: Rect, registry: &ShapeRegistry) -> Pen {
        let mut node = Node::new("rectangle", rect);
        node.props.id = id.to_string();
        node.init(registry);
        Pen::Node(node)
    }

    #[test]
    fn test_single_node_handles() {
        let registry = registry();
        let pens = vec![node("a", Rect::new(0.0, 0.0, 100.0, 50.0), &registry)];
        let mut selection = Selection::default();
        selection.set(vec!["a".into()]);
        selection.calc_control_points(&pens, &Options::default(), &registry);
        assert_eq!(selection.rect, Rect::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(selection.size_cps[2], Point::new(100.0, 50.0));
        assert_eq!(selection.rotate_cps[0], Point::new(50.0, -35.0));
    }

    #[test]
    fn test_hidden_rotate_handle() {
        let registry = registry();
        let pens = vec![node("a", Rect::new(0.0, 0.0, 100.0, 50.0), &registry)];
        let mut selection = Selection::default();
        selection.set(vec!["a".into()]);
        let options = Options {
            hide_rotate_cp: true,
            ..Default::default()
        };
        selection.calc_control_points(&pens, &options, &registry);
        assert!(selection.rotate_cps.is_empty());
    }

    #[test]
    fn test_multi_selection_bbox_includes_lines() {
        let registry = registry();
        let mut line = Line::new("line", Point::new(0.0, 200.0), Point::new(300.0, 250.0));
        line.props.id = "l".into();
        let pens = vec![node("a", Rect::new(0.0, 0.0, 100.0, 100.0), &registry), Pen::Line(line)];
        let mut selection = Selection::default();
        selection.set(vec!["a".into(), "l".into()]);
        selection.calc_control_points(&pens, &Options::default(), &registry);
        assert_eq!(selection.rect, Rect::new(0.0, 0.0, 300.0, 250.0));
    }

    #[test]
    fn test_empty_selection_counts_as_locked() {
        let selection = Selection::default();
        assert!(selection.locked(&[]));
    }

    #[test]
    fn test_dock_watchers_follow_saved_rect() {
        let registry = registry();
        let pens = vec![node("a", Rect::new(10.0, 20.0, 100.0, 50.0), &registry)];
        let mut selection = Selection::default();
        selection.set(vec!["a".into()]);
        selection.calc_control_points(&pens, &Options::default(), &registry);
        selection.save(&pens, &registry);
        assert_eq!(selection.dock_watchers.len(), 5);
        assert_eq!(selection.dock_watchers[0], kurbo::Point::new(60.0, 45.0));
        assert_eq!(selection.pivot(), kurbo::Point::new(60.0, 45.0));
    }
}
