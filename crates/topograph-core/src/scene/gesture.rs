//! What lies under the pointer.
//!
//! Before a button goes down the scene classifies the pointer position
//! into a [`MoveInType`]; the press and the drag that follows act on that
//! classification.

use kurbo::Point as KPoint;

use super::active::Selection;
use crate::geometry::{AnchorMode, point_in_polygon};
use crate::options::Options;
use crate::pen::{Line, Lock, Node, Pen};
use crate::registry::ShapeRegistry;

/// Hit distance of the rotate handle.
const ROTATE_HIT: f64 = 15.0;
/// Hit distance of resize handles and line control points.
const HANDLE_HIT: f64 = 10.0;
/// Nodes smaller than this on either side hide their anchors on hover.
const MIN_ANCHOR_NODE: f64 = 20.0;

/// Classification of the pointer position, ordered by priority: hovering
/// an anchor outranks a body hit found later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MoveInType {
    #[default]
    None,
    /// Body of a line bound at one end or both.
    Line,
    /// Body of a free line.
    LineMove,
    LineFrom,
    LineTo,
    LineControlPoint,
    Nodes,
    ResizeCP,
    HoverAnchors,
    AutoAnchor,
    Rotate,
}

/// Cursor hint for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Move,
    Pointer,
    Crosshair,
    Rotate,
    /// Resize handle, clockwise from the top-left corner.
    Resize(usize),
}

impl Cursor {
    /// CSS cursor name.
    pub fn css(&self) -> &'static str {
        match self {
            Cursor::Default => "default",
            Cursor::Move => "move",
            Cursor::Pointer => "pointer",
            Cursor::Crosshair => "crosshair",
            Cursor::Rotate => "alias",
            Cursor::Resize(0) | Cursor::Resize(2) => "nwse-resize",
            Cursor::Resize(_) => "nesw-resize",
        }
    }
}

/// Result of classifying a pointer position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveIn {
    pub kind: MoveInType,
    /// Resize handle under the pointer.
    pub active_anchor_index: usize,
    /// Anchor of `hover_node` under the pointer.
    pub hover_anchor_index: usize,
    pub hover_node: Option<String>,
    pub hover_line: Option<String>,
    /// Node a press would select: the hovered node, or the group holding it.
    pub active_node: Option<String>,
    /// Control point of `hover_line` under the pointer.
    pub line_control_point: Option<usize>,
    pub cursor: Cursor,
}

/// Read-only inputs to classification.
pub(crate) struct Probe<'a> {
    pub registry: &'a ShapeRegistry,
    pub options: &'a Options,
    pub locked: Lock,
    pub mouse_down: bool,
}

impl MoveIn {
    /// Classify `pt` against the selection handles, then the pens top-down.
    pub(crate) fn classify(&mut self, pt: KPoint, pens: &[Pen], selection: &Selection, probe: &Probe) {
        self.kind = MoveInType::None;
        self.hover_node = None;
        self.hover_line = None;
        self.line_control_point = None;
        self.cursor = Cursor::Default;

        let selected = selection.pens(pens);
        let single_line = matches!(selected.as_slice(), [Pen::Line(_)]);
        let selection_locked = selection.locked(pens);

        if probe.locked.is_none()
            && !single_line
            && !selection_locked
            && selection.rotate_cps.first().is_some_and(|cp| cp.hit(pt, ROTATE_HIT))
        {
            self.kind = MoveInType::Rotate;
            self.cursor = Cursor::Rotate;
            return;
        }

        if selected.len() > 1 && point_in_polygon(pt, &selection.size_cps) {
            self.kind = MoveInType::Nodes;
        }

        if probe.locked.is_none() && !selection_locked && !probe.options.hide_size_cp {
            let resizable = selected.len() > 1
                || matches!(selected.as_slice(), [Pen::Node(node)] if !node.props.hide_size_cp);
            if resizable {
                if let Some(i) = selection.size_cps.iter().position(|cp| cp.hit(pt, HANDLE_HIT)) {
                    self.kind = MoveInType::ResizeCP;
                    self.active_anchor_index = i;
                    self.cursor = Cursor::Resize(i);
                    return;
                }
            }
        }

        if probe.locked.is_none() {
            for pen in &selected {
                let Pen::Line(line) = pen else {
                    continue;
                };
                if !line.props.locked.is_none() {
                    continue;
                }
                if let Some(i) = line.control_points.iter().position(|cp| cp.hit(pt, HANDLE_HIT)) {
                    self.kind = MoveInType::LineControlPoint;
                    self.line_control_point = Some(i);
                    self.hover_line = Some(line.props.id.clone());
                    self.cursor = Cursor::Pointer;
                    return;
                }
                if self.in_line(pt, line, probe) {
                    return;
                }
            }
        }

        let mut under_line: Option<&Line> = None;
        for pen in pens.iter().rev() {
            match pen {
                Pen::Node(node) => {
                    if self.in_node(pt, node, false, probe) {
                        if let Some(line) = under_line {
                            if self.kind != MoveInType::HoverAnchors {
                                self.in_line(pt, line, probe);
                            }
                        }
                        return;
                    }
                }
                Pen::Line(line) => {
                    if self.in_line(pt, line, probe) {
                        under_line = Some(line);
                    }
                }
            }
        }
    }

    fn in_child_node<'a>(&mut self, pt: KPoint, children: &'a [Pen], probe: &Probe) -> Option<&'a Pen> {
        for child in children.iter().rev() {
            match child {
                Pen::Line(line) => {
                    if self.in_line(pt, line, probe) {
                        return Some(child);
                    }
                }
                Pen::Node(node) => {
                    if let Some(hit) = self.in_child_node(pt, &node.children, probe) {
                        return Some(hit);
                    }
                    if self.in_node(pt, node, true, probe) {
                        return Some(child);
                    }
                }
            }
        }
        None
    }

    fn in_node(&mut self, pt: KPoint, node: &Node, in_child: bool, probe: &Probe) -> bool {
        let props = &node.props;
        if probe.locked == Lock::NoEvent || !props.visible || props.locked == Lock::NoEvent {
            return false;
        }

        if let Some(child) = self.in_child_node(pt, &node.children, probe) {
            if self.kind < MoveInType::HoverAnchors {
                let active = if !child.is_line() && child.props().stand { child.id() } else { props.id.as_str() };
                self.active_node = Some(active.to_string());
                self.kind = MoveInType::Nodes;
            }
            return true;
        }

        let editable = probe.locked.is_none() && props.locked.is_none();
        let options = probe.options;
        if node.hit_in_self(pt, 0.0) {
            self.hover_node = Some(props.id.clone());
            self.kind = MoveInType::Nodes;
            self.cursor = if editable { Cursor::Move } else { Cursor::Pointer };

            let too_small = props.rect.width < MIN_ANCHOR_NODE || props.rect.height < MIN_ANCHOR_NODE;
            if editable && !(options.hide_anchor || props.hide_anchor || too_small) {
                if let Some(i) = self.anchor_under(pt, node, probe) {
                    self.kind = MoveInType::HoverAnchors;
                    self.hover_anchor_index = i;
                    self.cursor = Cursor::Crosshair;
                }
                if options.auto_anchor && crate::geometry::Point::from(props.rect.center()).hit(pt, options.anchor_size) {
                    self.kind = MoveInType::AutoAnchor;
                    self.cursor = Cursor::Crosshair;
                }
            }
            if !in_child {
                self.active_node = self.hover_node.clone();
            }
            return true;
        }

        if options.hide_anchor || props.hide_anchor || !editable {
            return false;
        }
        if node.hit_in_self(pt, options.anchor_size) {
            if let Some(i) = self.anchor_under(pt, node, probe) {
                self.hover_node = Some(props.id.clone());
                self.kind = MoveInType::HoverAnchors;
                self.hover_anchor_index = i;
                self.cursor = Cursor::Crosshair;
                if !in_child {
                    self.active_node = Some(props.id.clone());
                }
                return true;
            }
        }
        false
    }

    /// First anchor within reach. Inbound-only anchors are skipped until a
    /// button is down, so they never start a line.
    fn anchor_under(&self, pt: KPoint, node: &Node, probe: &Probe) -> Option<usize> {
        node.rotated_anchors.iter().position(|anchor| {
            anchor.hit(pt, probe.options.anchor_size) && (probe.mouse_down || anchor.mode != AnchorMode::In)
        })
    }

    fn in_line(&mut self, pt: KPoint, line: &Line, probe: &Probe) -> bool {
        let props = &line.props;
        if probe.locked == Lock::NoEvent || !props.visible || props.locked == Lock::NoEvent {
            return false;
        }
        let editable = probe.locked.is_none() && props.locked.is_none();
        let size = probe.options.anchor_size;
        let kind = if line.from.hit(pt, size) {
            MoveInType::LineFrom
        } else if line.to.hit(pt, size) {
            MoveInType::LineTo
        } else if line.point_in(pt, probe.registry) {
            if line.from.is_bound() || line.to.is_bound() {
                MoveInType::Line
            } else {
                MoveInType::LineMove
            }
        } else {
            return false;
        };
        self.kind = kind;
        self.hover_line = Some(props.id.clone());
        self.cursor = match kind {
            MoveInType::LineFrom | MoveInType::LineTo if editable => Cursor::Move,
            _ => Cursor::Pointer,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect};

    fn probe<'a>(registry: &'a ShapeRegistry, options: &'a Options) -> Probe<'a> {
        Probe {
            registry,
            options,
            locked: Lock::None,
            mouse_down: false,
        }
    }

    fn node(id: &str, rect: Rect, registry: &ShapeRegistry) -> Pen {
        let mut node = Node::new("rectangle", rect);
        node.props.id = id.to_string();
        node.init(registry);
        Pen::Node(node)
    }

    fn line(id: &str, from: (f64, f64), to: (f64, f64), registry: &ShapeRegistry) -> Pen {
        let mut line = Line::new("line", Point::new(from.0, from.1), Point::new(to.0, to.1));
        line.props.id = id.to_string();
        line.calc_control_points(registry, true);
        Pen::Line(line)
    }

    #[test]
    fn test_node_body_and_anchor() {
        let registry = ShapeRegistry::with_builtins();
        let options = Options::default();
        let pens = vec![node("a", Rect::new(0.0, 0.0, 100.0, 100.0), &registry)];
        let selection = Selection::default();
        let mut move_in = MoveIn::default();

        move_in.classify(KPoint::new(30.0, 30.0), &pens, &selection, &probe(&registry, &options));
        assert_eq!(move_in.kind, MoveInType::Nodes);
        assert_eq!(move_in.active_node.as_deref(), Some("a"));

        // Right edge anchor, just outside the body.
        move_in.classify(KPoint::new(103.0, 50.0), &pens, &selection, &probe(&registry, &options));
        assert_eq!(move_in.kind, MoveInType::HoverAnchors);
        assert_eq!(move_in.hover_anchor_index, 2);

        move_in.classify(KPoint::new(50.0, 50.0), &pens, &selection, &probe(&registry, &options));
        assert_eq!(move_in.kind, MoveInType::AutoAnchor);
    }

    #[test]
    fn test_small_node_hides_anchors() {
        let registry = ShapeRegistry::with_builtins();
        let options = Options::default();
        let pens = vec![node("a", Rect::new(0.0, 0.0, 15.0, 15.0), &registry)];
        let mut move_in = MoveIn::default();
        move_in.classify(KPoint::new(15.0, 7.5), &pens, &Selection::default(), &probe(&registry, &options));
        assert_eq!(move_in.kind, MoveInType::Nodes);
    }

    #[test]
    fn test_line_ends_and_body() {
        let registry = ShapeRegistry::with_builtins();
        let options = Options::default();
        let pens = vec![line("l", (0.0, 0.0), (100.0, 0.0), &registry)];
        let selection = Selection::default();
        let mut move_in = MoveIn::default();
        let p = probe(&registry, &options);

        move_in.classify(KPoint::new(1.0, 1.0), &pens, &selection, &p);
        assert_eq!(move_in.kind, MoveInType::LineFrom);
        move_in.classify(KPoint::new(99.0, 0.0), &pens, &selection, &p);
        assert_eq!(move_in.kind, MoveInType::LineTo);
        move_in.classify(KPoint::new(50.0, 3.0), &pens, &selection, &p);
        assert_eq!(move_in.kind, MoveInType::LineMove);
        assert_eq!(move_in.hover_line.as_deref(), Some("l"));
        move_in.classify(KPoint::new(50.0, 40.0), &pens, &selection, &p);
        assert_eq!(move_in.kind, MoveInType::None);
    }

    #[test]
    fn test_no_event_is_invisible() {
        let registry = ShapeRegistry::with_builtins();
        let options = Options::default();
        let mut pens = vec![node("a", Rect::new(0.0, 0.0, 100.0, 100.0), &registry)];
        pens[0].props_mut().locked = Lock::NoEvent;
        let mut move_in = MoveIn::default();
        move_in.classify(KPoint::new(30.0, 30.0), &pens, &Selection::default(), &probe(&registry, &options));
        assert_eq!(move_in.kind, MoveInType::None);
    }

    #[test]
    fn test_group_child_activates_parent_unless_stand() {
        let registry = ShapeRegistry::with_builtins();
        let options = Options::default();
        let mut parent = Node::new("combine", Rect::new(0.0, 0.0, 200.0, 200.0));
        parent.props.id = "g".into();
        let mut child = Node::new("rectangle", Rect::new(10.0, 10.0, 50.0, 50.0));
        child.props.id = "c".into();
        child.init(&registry);
        parent.children.push(Pen::Node(child));
        parent.init(&registry);
        let mut pens = vec![Pen::Node(parent)];
        let mut move_in = MoveIn::default();

        move_in.classify(KPoint::new(20.0, 20.0), &pens, &Selection::default(), &probe(&registry, &options));
        assert_eq!(move_in.kind, MoveInType::Nodes);
        assert_eq!(move_in.active_node.as_deref(), Some("g"));
        assert_eq!(move_in.hover_node.as_deref(), Some("c"));

        pens[0].as_node_mut().unwrap().children[0].props_mut().stand = true;
        move_in.classify(KPoint::new(20.0, 20.0), &pens, &Selection::default(), &probe(&registry, &options));
        assert_eq!(move_in.active_node.as_deref(), Some("c"));
    }

    #[test]
    fn test_cursor_names() {
        assert_eq!(Cursor::Resize(0).css(), "nwse-resize");
        assert_eq!(Cursor::Resize(1).css(), "nesw-resize");
        assert_eq!(Cursor::Crosshair.css(), "crosshair");
    }
}
