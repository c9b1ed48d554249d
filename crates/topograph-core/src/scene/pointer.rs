//! Pointer and touch gestures.
//!
//! A press classifies what lies under the pointer and fixes the gesture;
//! moves while the button is held drive it; release commits it. Moves are
//! queued by [`Scene::pointer_move`] and handled once per frame.

use kurbo::Vec2;

use super::Scene;
use super::TouchStart;
use super::gesture::{MoveInType, Probe};
use crate::events::SceneEvent;
use crate::geometry::{AnchorMode, Point, Rect};
use crate::input::{Modifiers, MouseButton, PointerInput, TouchInput};
use crate::pen::{EventType, Line, LineEnd, Lock, Pen, tree};

/// Distance from the view edge at which a drag starts scrolling.
const MOVE_OUT_MARGIN: f64 = 50.0;
/// Scroll step while dragging past the view edge.
const MOVE_OUT_STEP: f64 = 5.0;
const WHEEL_ZOOM_IN: f64 = 1.1;
const WHEEL_ZOOM_OUT: f64 = 0.9;

fn any_modifier(modifiers: &Modifiers) -> bool {
    modifiers.shift || modifiers.ctrl_or_meta() || modifiers.alt
}

impl Scene {
    /// Re-run hit classification at `pt`.
    fn classify_at(&mut self, pt: kurbo::Point, mouse_down: bool) {
        let probe = Probe {
            registry: &self.registry,
            options: &self.options,
            locked: self.data.locked,
            mouse_down,
        };
        self.move_in.classify(pt, &self.data.pens, &self.selection, &probe);
    }

    pub fn pointer_down(&mut self, input: PointerInput) {
        if let Some(pending) = self.pending_move.take().filter(|p| p.buttons_down) {
            self.process_move(pending);
        }
        if self.data.locked == Lock::NoEvent || input.button != MouseButton::Left {
            return;
        }

        let pt = input.position;
        self.classify_at(pt, false);
        self.mouse_down = Some(input);
        self.last_translated = pt;
        self.hover.node = self.move_in.hover_node.clone();
        self.hover.clear_dock();
        let additive = input.modifiers.shift || input.modifiers.ctrl_or_meta();

        match self.move_in.kind {
            MoveInType::None => {
                self.clear_selection();
                self.hover.drag_rect = Some(Rect::new(pt.x, pt.y, 0.0, 0.0));
                self.emit(SceneEvent::Space(Some(pt)));
            }
            MoveInType::Line | MoveInType::LineControlPoint => {
                if let Some(id) = self.move_in.hover_line.clone() {
                    self.press_pen(&id, additive);
                }
            }
            MoveInType::LineMove | MoveInType::LineFrom | MoveInType::LineTo => {
                if let Some(id) = self.move_in.hover_line.clone() {
                    if self.move_in.kind == MoveInType::LineMove {
                        self.hover.init_line = self.find_pen(&id).and_then(Pen::as_line).cloned();
                    }
                    self.press_pen(&id, false);
                    self.hover.line = Some(id);
                }
            }
            MoveInType::HoverAnchors => self.start_line_at_anchor(pt),
            MoveInType::AutoAnchor => self.start_line_at_center(pt),
            MoveInType::Nodes => {
                if let Some(id) = self.move_in.active_node.clone() {
                    self.press_pen(&id, additive);
                }
            }
            MoveInType::ResizeCP | MoveInType::Rotate => {}
        }

        if !self.selection.is_empty() {
            self.save_node_rects();
        }
        if self.clicks.click(pt, input.time_ms) {
            self.dblclick(pt);
        }
        self.request_render();
    }

    /// Select `id` (or toggle it with `additive`) and run its click
    /// bindings when it is locked.
    fn press_pen(&mut self, id: &str, additive: bool) {
        if additive {
            if self.selection.contains(id) {
                let ids = self.selection.ids.iter().filter(|i| *i != id).cloned().collect();
                self.selection.set(ids);
            } else {
                self.selection.add(id);
            }
        } else if !self.selection.contains(id) {
            self.selection.set(vec![id.to_string()]);
        }
        self.refresh_selection();
        self.emit_selection();

        let pen_locked = self.find_pen(id).is_some_and(|pen| !pen.locked().is_none());
        if !self.data.locked.is_none() || pen_locked {
            self.run_pen_events(id, EventType::Click);
        }
    }

    /// New, unselected line that follows the pointer until release.
    fn push_drawn_line(&mut self, from: Point, to: kurbo::Point) -> String {
        let mut line = Line::new(self.data.line_name.clone(), from, Point::from(to));
        line.from_arrow = self.data.from_arrow.clone();
        line.to_arrow = self.data.to_arrow.clone();
        if let Some(width) = self.data.line_width {
            line.props.line_width = width;
        }
        line.props.stroke_style = self.options.color.clone();
        line.props.font.color = self.options.font.color.clone();
        line.calc_control_points(&self.registry, true);
        let id = line.props.id.clone();
        self.data.pens.push(Pen::Line(line));

        self.selection.clear();
        self.refresh_selection();
        self.hover.line = Some(id.clone());
        id
    }

    fn start_line_at_anchor(&mut self, pt: kurbo::Point) {
        if !self.data.locked.is_none() {
            return;
        }
        let Some(node_id) = self.move_in.hover_node.clone() else {
            return;
        };
        let index = self.move_in.hover_anchor_index;
        let Some(anchor) = self
            .find_pen(&node_id)
            .and_then(Pen::as_node)
            .and_then(|node| node.rotated_anchors.get(index))
            .cloned()
        else {
            return;
        };
        let mut from = Point::new(anchor.x, anchor.y);
        from.bind(&node_id, index, anchor.direction);
        self.push_drawn_line(from, pt);
        self.emit(SceneEvent::Anchor {
            node: node_id,
            anchor_index: index,
            anchor,
        });
    }

    fn start_line_at_center(&mut self, pt: kurbo::Point) {
        if !self.data.locked.is_none() {
            return;
        }
        let Some(node_id) = self.move_in.hover_node.clone() else {
            return;
        };
        let Some(center) = self.find_pen(&node_id).and_then(Pen::as_node).map(|n| n.props.rect.center()) else {
            return;
        };
        let mut from = Point::from(center);
        from.id = Some(node_id.clone());
        from.auto_anchor = true;
        self.push_drawn_line(from, pt);
        if let Some(pen) = self.clone_pen(&node_id) {
            self.emit(SceneEvent::NodeCenter(pen));
        }
    }

    /// Queue a move; the latest one is handled by the next
    /// [`Scene::animation_frame`].
    pub fn pointer_move(&mut self, input: PointerInput) {
        self.pending_move = Some(input);
    }

    pub(crate) fn process_move(&mut self, input: PointerInput) {
        if self.data.locked == Lock::NoEvent {
            return;
        }
        let pt = input.position;
        let Some(down) = self.mouse_down else {
            self.hover_at(pt);
            return;
        };
        if !input.buttons_down {
            log::debug!("Pointer released outside the view, ending drag");
            self.pointer_up(input);
            return;
        }

        let locked = !self.data.locked.is_none();
        let pan_target = locked || self.space_down || self.move_in.kind == MoveInType::None;
        let pan_allowed = self.space_down
            || (!self.options.disable_translate
                && (locked || input.modifiers.satisfies(self.options.translate_key))
                && self.data.locked < Lock::NoMove);
        if pan_target && pan_allowed {
            let offset = pt - self.last_translated;
            self.last_translated = pt;
            self.hover.drag_rect = None;
            self.shift_view(offset);
            self.needs_cache |= !locked;
            return;
        }
        if locked {
            return;
        }

        if !self.options.disable_move_out_parent && self.width > 0.0 && self.height > 0.0 {
            let out_x = pt.x + MOVE_OUT_MARGIN > self.width;
            let out_y = pt.y + MOVE_OUT_MARGIN > self.height;
            if out_x || out_y {
                self.emit(SceneEvent::MoveOutParent(pt));
                let step = |out: bool| if out { -MOVE_OUT_STEP } else { 0.0 };
                self.shift_view(Vec2::new(step(out_x), step(out_y)));
            }
        }

        let delta = pt - down.position;
        match self.move_in.kind {
            MoveInType::None => {
                if let Some(rect) = self.hover.drag_rect.as_mut() {
                    rect.width = pt.x - rect.x;
                    rect.height = pt.y - rect.y;
                }
            }
            MoveInType::Nodes => {
                if self.selection_locked() {
                    return;
                }
                let (x, y) = if any_modifier(&input.modifiers) {
                    self.hover.clear_dock();
                    (None, None)
                } else {
                    self.get_dock_pos(delta)
                };
                self.move_selection(Vec2::new(x.unwrap_or(delta.x), y.unwrap_or(delta.y)));
                self.needs_cache = true;
            }
            MoveInType::ResizeCP => {
                self.resize_selection(self.move_in.active_anchor_index, down.position, pt);
                let pens = self.clone_pens(&self.selection.ids);
                self.emit(SceneEvent::ResizePens(pens));
                self.needs_cache = true;
            }
            MoveInType::LineTo | MoveInType::HoverAnchors | MoveInType::AutoAnchor => {
                self.drag_line_end(LineEnd::To, pt, &input.modifiers);
            }
            MoveInType::LineFrom => self.drag_line_end(LineEnd::From, pt, &input.modifiers),
            MoveInType::LineMove => self.drag_whole_line(delta),
            MoveInType::LineControlPoint => self.drag_control_point(pt),
            MoveInType::Rotate => {
                let angle = self.selection_angle(pt);
                self.rotate_selection(angle);
                self.needs_cache = true;
            }
            MoveInType::Line => {}
        }
        self.request_render();
    }

    fn line_editable(&self, id: &str) -> bool {
        self.find_pen(id).is_some_and(|pen| pen.is_line() && pen.locked().is_none())
    }

    fn drag_line_end(&mut self, end: LineEnd, pt: kurbo::Point, modifiers: &Modifiers) {
        let Some(id) = self.hover.line.clone().filter(|id| self.line_editable(id)) else {
            return;
        };
        let (other, mode) = match end {
            LineEnd::From => (LineEnd::To, AnchorMode::Out),
            LineEnd::To => (LineEnd::From, AnchorMode::In),
        };
        let Some(other_pos) = self.find_pen(&id).and_then(Pen::as_line).map(|l| l.end(other).pos()) else {
            return;
        };

        self.hover.node = None;
        let docked = if any_modifier(modifiers) {
            self.hover.dock_anchor = None;
            Point::from(pt)
        } else {
            self.get_line_dock(pt, mode, &id, other_pos)
        };
        if let Some(line) = tree::find_by_id_mut(&mut self.data.pens, &id).and_then(Pen::as_line_mut) {
            *line.end_mut(end) = docked;
            line.calc_control_points(&self.registry, false);
        }
        self.needs_cache = true;
    }

    fn drag_whole_line(&mut self, delta: Vec2) {
        let Some(init) = self.hover.init_line.clone() else {
            return;
        };
        if !self.line_editable(&init.props.id) {
            return;
        }
        if let Some(line) = tree::find_by_id_mut(&mut self.data.pens, &init.props.id).and_then(Pen::as_line_mut) {
            line.from = init.from;
            line.to = init.to;
            line.control_points = init.control_points;
            line.translate(delta);
        }
        self.needs_cache = true;
    }

    fn drag_control_point(&mut self, pt: kurbo::Point) {
        let (Some(id), Some(index)) = (self.move_in.hover_line.clone(), self.move_in.line_control_point) else {
            return;
        };
        if !self.line_editable(&id) {
            return;
        }
        let registry = &self.registry;
        if let Some(line) = tree::find_by_id_mut(&mut self.data.pens, &id).and_then(Pen::as_line_mut) {
            let docked = registry.route(&line.props.name).dock_control_point(line, pt);
            if let Some(cp) = line.control_points.get_mut(index) {
                cp.set_pos(docked);
                line.manual_cps = true;
                line.invalidate();
            }
        }
        self.hover.line_control_point = Some(index);
        self.needs_cache = true;
    }

    /// Hover tracking while no button is held.
    fn hover_at(&mut self, pt: kurbo::Point) {
        let last_node = self.move_in.hover_node.clone();
        let last_line = self.move_in.hover_line.clone();
        let last_kind = self.move_in.kind;
        self.classify_at(pt, false);
        self.hover.node = self.move_in.hover_node.clone();
        self.hover.line_control_point = self.move_in.line_control_point;

        let node = self.move_in.hover_node.clone();
        let line = self.move_in.hover_line.clone();
        let changed = last_kind != self.move_in.kind || last_node != node || last_line != line;
        if last_node != node {
            if let Some(pen) = last_node.and_then(|id| self.clone_pen(&id)) {
                self.emit(SceneEvent::MoveOutNode(pen));
            }
            if let Some(pen) = node.as_deref().and_then(|id| self.clone_pen(id)) {
                self.emit(SceneEvent::MoveInNode(pen));
            }
        }
        if last_line != line {
            if let Some(pen) = last_line.and_then(|id| self.clone_pen(&id)) {
                self.emit(SceneEvent::MoveOutLine(pen));
            }
            if let Some(pen) = line.as_deref().and_then(|id| self.clone_pen(id)) {
                self.emit(SceneEvent::MoveInLine(pen));
            }
        }
        self.update_tip();
        if changed {
            self.request_render();
        }
    }

    /// Show the tooltip of the hovered pen, or hide a stale one.
    fn update_tip(&mut self) {
        let hovered = self.move_in.hover_node.clone().or_else(|| self.move_in.hover_line.clone());
        let tip = hovered.and_then(|id| {
            let pen = self.find_pen(&id)?;
            let props = pen.props();
            let has_tip = props.title.as_deref().is_some_and(|t| !t.is_empty())
                || props.markdown.as_deref().is_some_and(|t| !t.is_empty());
            has_tip.then(|| (id, pen.bounds(&self.registry)))
        });
        match tip {
            Some((id, rect)) => {
                if self.hover.tip.as_deref() != Some(id.as_str()) {
                    self.hover.tip = Some(id.clone());
                    self.emit(SceneEvent::Tip { id, rect });
                }
            }
            None => {
                if self.hover.tip.take().is_some() {
                    self.emit(SceneEvent::TipHidden);
                }
            }
        }
    }

    /// Commit the running gesture.
    pub fn pointer_up(&mut self, _input: PointerInput) {
        if let Some(pending) = self.pending_move.take().filter(|p| p.buttons_down) {
            self.process_move(pending);
        }
        if self.mouse_down.take().is_none() {
            return;
        }

        if let Some(rect) = self.hover.drag_rect.take() {
            let ids = self.get_pens_in_rect(rect);
            self.selection.set(ids);
            self.refresh_selection();
            self.emit_selection();
        }

        match self.move_in.kind {
            kind @ (MoveInType::HoverAnchors | MoveInType::AutoAnchor) => self.finish_new_line(kind),
            MoveInType::LineFrom | MoveInType::LineTo => self.finish_line_edit(),
            MoveInType::Rotate => {
                self.commit_rotate();
                self.needs_cache = true;
            }
            _ => {}
        }

        self.hover.clear_dock();
        self.hover.init_line = None;
        self.hover.line = None;
        if std::mem::take(&mut self.needs_cache) {
            self.cache();
        }
        self.request_render();
    }

    /// Keep or discard a line drawn from an anchor or node centre.
    ///
    /// A line whose far end never bound survives only while empty lines
    /// are allowed; a zero-length line never does.
    fn finish_new_line(&mut self, kind: MoveInType) {
        let Some(id) = self.hover.line.clone() else {
            return;
        };
        let Some(line) = self.find_pen(&id).and_then(Pen::as_line) else {
            return;
        };
        let connected = line.to.is_bound();
        let repeated = connected
            && self.options.disable_repeat_line
            && self.data.lines().any(|other| {
                other.props.id != id
                    && other.from.id == line.from.id
                    && other.to.id == line.to.id
                    && other.from.is_same_as(&line.from)
                    && other.to.is_same_as(&line.to)
            });
        let empty_allowed = !(self.options.disable_empty_line || line.disable_empty_line);
        let keep = !repeated && (connected || empty_allowed) && !line.from.is_same_as(&line.to);

        if !keep {
            log::debug!("Discarding drawn line {}", id);
            tree::remove(&mut self.data.pens, &id);
            self.needs_cache = false;
            return;
        }

        if kind == MoveInType::AutoAnchor {
            if let Some(node) = line.from.id.clone() {
                self.update_lines(&[node]);
            }
        }
        self.selection.set(vec![id.clone()]);
        self.refresh_selection();
        if let Some(pen) = self.clone_pen(&id) {
            self.emit(SceneEvent::AddLine(pen));
        }
        self.needs_cache = true;
    }

    /// Remove a line whose dragged end came loose when empty lines are
    /// disabled.
    fn finish_line_edit(&mut self) {
        let Some(id) = self.hover.line.clone() else {
            return;
        };
        let Some(line) = self.find_pen(&id).and_then(Pen::as_line) else {
            return;
        };
        let dangling = !(line.from.is_bound() && line.to.is_bound());
        if dangling && (self.options.disable_empty_line || line.disable_empty_line) {
            if let Some(pen) = tree::remove(&mut self.data.pens, &id) {
                self.selection.clear();
                self.refresh_selection();
                self.emit(SceneEvent::Delete(vec![pen]));
                self.needs_cache = true;
            }
        }
    }

    /// Double click at `pt`: ask the host for a text editor over the
    /// hovered pen and run its double-click bindings.
    fn dblclick(&mut self, pt: kurbo::Point) {
        let Some(id) = self.move_in.hover_node.clone().or_else(|| self.move_in.hover_line.clone()) else {
            return;
        };
        let Some(pen) = self.find_pen(&id) else {
            return;
        };
        let rect = match pen {
            Pen::Node(node) => node.text_rect,
            Pen::Line(line) => line.text_rect(&self.registry),
        };
        let text = pen.props().text.clone().unwrap_or_default();
        let pen_locked = !pen.locked().is_none();
        let editable = self.data.locked.is_none() && !pen_locked && !self.options.hide_input && !pen.props().hide_input;
        log::debug!("Double click on {} at ({}, {})", id, pt.x, pt.y);

        if editable {
            self.editing = Some(id.clone());
        }
        self.emit(SceneEvent::Dblclick {
            id: id.clone(),
            rect,
            text,
        });
        if !self.data.locked.is_none() || pen_locked {
            self.run_pen_events(&id, EventType::DblClick);
        }
    }

    /// Wheel zoom about the pointer. Returns whether the wheel was used.
    pub fn wheel(&mut self, input: &PointerInput, delta: Vec2) -> bool {
        if self.options.disable_scale || !input.modifiers.satisfies(self.options.scale_key) || delta.y == 0.0 {
            return false;
        }
        let factor = if delta.y < 0.0 { WHEEL_ZOOM_IN } else { WHEEL_ZOOM_OUT };
        self.scale(factor, Some(input.position));
        true
    }

    pub fn touch_start(&mut self, input: &TouchInput) {
        if self.options.disable_touch {
            return;
        }
        match input.touches.as_slice() {
            [] => {}
            [pt] => {
                self.touch = None;
                self.pointer_down(PointerInput::at(pt.x, pt.y).pressed().at_time(input.time_ms));
            }
            [a, b, ..] => {
                self.touch = Some(TouchStart {
                    distance: a.distance(*b),
                    center: a.midpoint(*b),
                    scale: self.data.scale,
                });
                self.last_translated = *a;
            }
        }
    }

    /// One finger drags, two pinch-zoom, three pan.
    pub fn touch_move(&mut self, input: &TouchInput) {
        if self.options.disable_touch {
            return;
        }
        match input.touches.as_slice() {
            [] => {}
            [pt] => self.pointer_move(PointerInput::at(pt.x, pt.y).pressed().at_time(input.time_ms)),
            [a, b] => {
                let Some(start) = self.touch else {
                    return;
                };
                if start.distance > 0.0 {
                    let scale = a.distance(*b) / start.distance * start.scale;
                    self.scale_to(scale, Some(start.center));
                }
            }
            [a, ..] => {
                let offset = *a - self.last_translated;
                self.last_translated = *a;
                self.shift_view(offset);
            }
        }
    }

    pub fn touch_end(&mut self, input: &TouchInput) {
        if self.options.disable_touch {
            return;
        }
        if self.touch.take().is_some() {
            return;
        }
        let pt = input.touches.first().copied().unwrap_or(self.last_translated);
        self.pointer_up(PointerInput::at(pt.x, pt.y).at_time(input.time_ms));
    }
}
