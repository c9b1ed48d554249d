//! The render layers of a diagram view.
//!
//! Each frame the offscreen, active, animate and hover layers are rebuilt
//! from the scene's in-place geometry into display lists, then composited
//! in that order with the rulers on top. Nodes that need real host
//! elements (video, audio, iframe, GIF) are tracked by the overlay layer,
//! which reports what the host has to add, move or remove.

use kurbo::{Affine, BezPath, Circle, Shape as _, Stroke};
use peniko::Color;
use topograph_core::draw::{self, Paint, Painter, fade, parse_color};
use topograph_core::geometry::Rect;
use topograph_core::pen::{Line, Lock, Node, Pen, tree};
use topograph_core::{Options, Scene};

use crate::display_list::DisplayList;
use crate::grid;
use crate::renderer::{RenderContext, Renderer};

/// Radius of the rotate handle and of line end markers.
const HANDLE_RADIUS: f64 = 5.0;
const LINE_CP_RADIUS: f64 = 3.0;
const SIZE_HANDLE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Offscreen,
    Active,
    Animate,
    Hover,
}

/// The kind of host element a node needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Video,
    Audio,
    Iframe,
    Gif,
    Element,
}

/// A host element positioned over a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub id: String,
    pub kind: OverlayKind,
    /// Media URL, or the element id for [`OverlayKind::Element`].
    pub source: String,
    pub rect: Rect,
    /// Rotation in degrees.
    pub rotate: f64,
    pub play: bool,
    pub play_loop: bool,
}

impl Overlay {
    fn of(node: &Node) -> Option<Self> {
        let pick = |field: &Option<String>| field.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        let (kind, source) = [
            (OverlayKind::Video, &node.video),
            (OverlayKind::Audio, &node.audio),
            (OverlayKind::Iframe, &node.iframe),
            (OverlayKind::Gif, &node.gif),
            (OverlayKind::Element, &node.element_id),
        ]
        .into_iter()
        .find_map(|(kind, field)| pick(field).map(|source| (kind, source)))?;
        Some(Self {
            id: node.props.id.clone(),
            kind,
            source,
            rect: node.props.rect,
            rotate: node.props.angle(),
            play: node.play,
            play_loop: node.play_loop,
        })
    }
}

/// What the host must do to its overlay elements.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayChange {
    Added(Overlay),
    Updated(Overlay),
    Removed(String),
}

/// Overlay elements for the current diagram.
#[derive(Debug, Clone, Default)]
pub struct OverlayLayer {
    items: Vec<Overlay>,
}

impl OverlayLayer {
    pub fn items(&self) -> &[Overlay] {
        &self.items
    }

    /// Re-scan the scene and return the changes since the last scan.
    pub fn update(&mut self, scene: &Scene) -> Vec<OverlayChange> {
        let next: Vec<Overlay> = tree::flatten(scene.pens())
            .into_iter()
            .filter_map(Pen::as_node)
            .filter(|node| node.props.visible && node.needs_overlay())
            .filter_map(Overlay::of)
            .collect();

        let mut changes = Vec::new();
        for old in &self.items {
            if !next.iter().any(|o| o.id == old.id) {
                changes.push(OverlayChange::Removed(old.id.clone()));
            }
        }
        for item in &next {
            match self.items.iter().find(|o| o.id == item.id) {
                None => changes.push(OverlayChange::Added(item.clone())),
                Some(old) if old != item => changes.push(OverlayChange::Updated(item.clone())),
                Some(_) => {}
            }
        }
        self.items = next;
        changes
    }
}

/// Display lists for every layer of one view.
#[derive(Debug, Default)]
pub struct Layers {
    offscreen: DisplayList,
    active: DisplayList,
    animate: DisplayList,
    hover: DisplayList,
    rule: DisplayList,
    overlays: OverlayLayer,
    overlay_changes: Vec<OverlayChange>,
}

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, kind: LayerKind) -> &DisplayList {
        match kind {
            LayerKind::Offscreen => &self.offscreen,
            LayerKind::Active => &self.active,
            LayerKind::Animate => &self.animate,
            LayerKind::Hover => &self.hover,
        }
    }

    pub fn overlays(&self) -> &[Overlay] {
        self.overlays.items()
    }

    /// Overlay changes accumulated since the last call.
    pub fn take_overlay_changes(&mut self) -> Vec<OverlayChange> {
        std::mem::take(&mut self.overlay_changes)
    }

    /// Rebuild every layer from `ctx`.
    pub fn update(&mut self, ctx: &RenderContext) {
        let scene = ctx.scene;
        self.offscreen.clear();
        self.active.clear();
        self.animate.clear();
        self.hover.clear();
        self.rule.clear();

        let viewport = kurbo::Rect::from_origin_size(kurbo::Point::ZERO, ctx.viewport_size);
        draw_background(&mut self.offscreen, ctx, viewport);
        draw_pens(&mut self.offscreen, scene);
        draw_active(&mut self.active, scene);
        draw_animate(&mut self.animate, scene);
        draw_hover(&mut self.hover, scene, viewport);

        let data = scene.data();
        if data.rule {
            let color = data
                .rule_color
                .as_deref()
                .and_then(parse_color)
                .or_else(|| parse_color(&scene.options().rule_color))
                .unwrap_or(Color::BLACK);
            grid::draw_rule(&mut self.rule, viewport, data.scale, color);
        }

        let changes = self.overlays.update(scene);
        if !changes.is_empty() {
            log::debug!("{} overlay change(s)", changes.len());
            self.overlay_changes.extend(changes);
        }
    }

    /// Rebuild only if the scene asked for a render since the last frame.
    /// Several requests between frames produce one rebuild.
    pub fn render_if_requested(&mut self, scene: &mut Scene, viewport: kurbo::Size) -> bool {
        if !scene.take_render_request() {
            return false;
        }
        let ctx = RenderContext::new(scene).with_viewport(viewport);
        self.update(&ctx);
        true
    }

    /// Play the layers into `painter`, bottom to top.
    pub fn composite(&self, painter: &mut dyn Painter) {
        for list in [&self.offscreen, &self.active, &self.animate, &self.hover, &self.rule] {
            list.replay(painter);
        }
    }
}

impl Renderer for Layers {
    fn build_scene(&mut self, ctx: &RenderContext) {
        self.update(ctx);
    }
}

fn color_or(value: &str, fallback: Color) -> Color {
    parse_color(value).unwrap_or(fallback)
}

/// Background color, background image and grid across `viewport`.
pub fn draw_background(painter: &mut dyn Painter, ctx: &RenderContext, viewport: kurbo::Rect) {
    if viewport.is_zero_area() {
        return;
    }
    let data = ctx.scene.data();
    let options = ctx.scene.options();
    if let Some(color) = ctx.background() {
        painter.fill(&viewport.to_path(0.1), &Paint::Solid(color));
    }
    if let Some(src) = data.bk_image.as_deref().filter(|s| !s.is_empty()) {
        painter.image(src, Rect::new(viewport.x0, viewport.y0, viewport.width(), viewport.height()));
    }
    if data.grid {
        let size = data.grid_size.filter(|s| *s > 0.0).unwrap_or(options.grid_size);
        let color = data
            .grid_color
            .as_deref()
            .and_then(parse_color)
            .unwrap_or_else(|| color_or(&options.grid_color, Color::from_rgba8(243, 243, 243, 255)));
        grid::draw_grid(painter, viewport, size, color);
    }
}

/// Every persisted pen, in z-order. Pens under a text edit skip their text.
pub fn draw_pens(painter: &mut dyn Painter, scene: &Scene) {
    let registry = scene.registry();
    let color = &scene.options().color;
    for pen in scene.pens() {
        match scene.editing() {
            Some(id) if pen.id() == id => {
                let mut pen = pen.clone();
                pen.props_mut().text = None;
                pen.render(painter, registry, color);
            }
            _ => pen.render(painter, registry, color),
        }
    }
}

/// Selection outlines and handles.
pub fn draw_active(painter: &mut dyn Painter, scene: &Scene) {
    let data = scene.data();
    let options = scene.options();
    let selection = scene.selection();
    let Some(active) = parse_color(&options.active_color) else {
        return;
    };
    if data.locked > Lock::Readonly || draw::is_transparent(active) || selection.is_empty() {
        return;
    }
    let pens = selection.pens(scene.pens());
    if pens.is_empty() {
        return;
    }
    let registry = scene.registry();
    let white = Paint::Solid(Color::WHITE);
    let paint = Paint::Solid(active);

    painter.save();
    for pen in &pens {
        match pen {
            Pen::Node(node) => {
                let mut tmp = node.clone();
                tmp.children.clear();
                tmp.props.fill_style.clear();
                tmp.bk_type = Default::default();
                tmp.icon = None;
                tmp.image = None;
                tmp.props.text = None;
                if parse_color(&tmp.props.stroke_style).is_some_and(|c| !draw::is_transparent(c)) {
                    tmp.props.stroke_style = "#ffffff".to_string();
                    tmp.props.line_width += 2.0;
                    Pen::Node(tmp.clone()).render(painter, registry, &options.color);
                    tmp.props.line_width -= 2.0;
                }
                tmp.props.stroke_style = options.active_color.clone();
                Pen::Node(tmp).render(painter, registry, &options.color);
            }
            Pen::Line(line) => {
                if line.props.line_width < 3.0 {
                    let mut back = line.clone();
                    back.props.stroke_style = "#ffffff".to_string();
                    back.props.text = None;
                    Pen::Line(back).render(painter, registry, &options.color);
                }
                let mut tmp = line.clone();
                tmp.props.stroke_style = options.active_color.clone();
                tmp.from_arrow_color = Some(options.active_color.clone());
                tmp.to_arrow_color = Some(options.active_color.clone());
                tmp.props.text = None;
                Pen::Line(tmp).render(painter, registry, &options.color);
                if data.locked.is_none() && line.props.locked.is_none() {
                    draw_line_control_points(painter, line, &paint);
                }
            }
        }
    }

    if matches!(pens.as_slice(), [Pen::Line(_)]) || !data.locked.is_none() || selection.locked(scene.pens()) {
        painter.restore();
        return;
    }

    if selection.size_cps.len() == 4 {
        let mut frame = BezPath::new();
        frame.move_to(selection.size_cps[0].pos());
        for cp in &selection.size_cps[1..] {
            frame.line_to(cp.pos());
        }
        frame.close_path();
        painter.save();
        painter.set_alpha(0.3);
        painter.stroke(&frame, &Stroke::new(1.0), &paint);
        painter.restore();
    }

    if let [handle, anchor] = selection.rotate_cps.as_slice() {
        let mut stem = BezPath::new();
        stem.move_to(handle.pos());
        stem.line_to(anchor.pos());
        painter.stroke(&stem, &Stroke::new(1.0), &paint);
        let knob = Circle::new(handle.pos(), HANDLE_RADIUS).to_path(0.1);
        painter.fill(&knob, &white);
        painter.stroke(&knob, &Stroke::new(1.0), &paint);
    }

    let hide_size = options.hide_size_cp || matches!(pens.as_slice(), [pen] if pen.props().hide_size_cp);
    if !hide_size {
        let angle = match pens.as_slice() {
            [pen] => pen.props().angle() + selection.rotate,
            _ => 0.0,
        };
        for cp in &selection.size_cps {
            let center = cp.pos();
            let turn = Affine::rotate_about(angle.to_radians(), center);
            let inner = kurbo::Rect::from_center_size(center, (SIZE_HANDLE, SIZE_HANDLE));
            let outer = kurbo::Rect::from_center_size(center, (SIZE_HANDLE + 2.0, SIZE_HANDLE + 2.0));
            painter.fill(&(turn * inner.to_path(0.1)), &white);
            painter.stroke(&(turn * outer.to_path(0.1)), &Stroke::new(1.0), &paint);
        }
    }
    painter.restore();
}

/// Control points of an editable line, tied to their ends for curves.
fn draw_line_control_points(painter: &mut dyn Painter, line: &Line, paint: &Paint) {
    let cps = &line.control_points;
    if cps.is_empty() {
        return;
    }
    if matches!(line.props.name.as_str(), "curve" | "mind") {
        if let (Some(first), Some(last)) = (cps.first(), cps.last()) {
            let mut ties = BezPath::new();
            ties.move_to(line.from.pos());
            ties.line_to(first.pos());
            ties.move_to(line.to.pos());
            ties.line_to(last.pos());
            painter.stroke(&ties, &Stroke::new(1.0), paint);
        }
    }
    for cp in cps {
        let dot = Circle::new(cp.pos(), LINE_CP_RADIUS).to_path(0.1);
        painter.fill(&dot, &Paint::Solid(Color::WHITE));
        painter.stroke(&dot, &Stroke::new(1.0), paint);
    }
}

/// The moving parts of playing line animations.
pub fn draw_animate(painter: &mut dyn Painter, scene: &Scene) {
    let registry = scene.registry();
    for line in scene.animating_lines().iter().filter(|l| l.props.visible) {
        line.draw_animated(painter, registry, &scene.options().color);
    }
}

/// Anchors of the hovered node, snap feedback, dragged line ends and the
/// rubber-band rectangle.
pub fn draw_hover(painter: &mut dyn Painter, scene: &Scene, viewport: kurbo::Rect) {
    let data = scene.data();
    if data.locked == Lock::NoEvent {
        return;
    }
    let options = scene.options();
    let hover = scene.hover();

    if data.locked.is_none() {
        if let Some(node) = hover.node.as_deref().and_then(|id| scene.find_pen(id)).and_then(Pen::as_node) {
            draw_anchors(painter, node, options);
        }
    }

    let dock = Paint::Solid(color_or(&options.dock_stroke_style, Color::from_rgba8(250, 84, 28, 255)));
    let guide = Stroke::new(1.0).with_dashes(0.0, [5.0, 5.0]);
    if !viewport.is_zero_area() {
        let mut guides = BezPath::new();
        if let Some(x) = hover.dock_line_x {
            guides.move_to((x, viewport.y0));
            guides.line_to((x, viewport.y1));
        }
        if let Some(y) = hover.dock_line_y {
            guides.move_to((viewport.x0, y));
            guides.line_to((viewport.x1, y));
        }
        if !guides.elements().is_empty() {
            painter.stroke(&guides, &guide, &dock);
        }
    }

    if let Some(line) = hover.line.as_deref().and_then(|id| scene.find_pen(id)).and_then(Pen::as_line) {
        if line.props.locked.is_none() {
            let paint = Paint::Solid(color_or(&options.hover_color, Color::from_rgba8(250, 84, 28, 255)));
            for end in [&line.from, &line.to] {
                let dot = Circle::new(end.pos(), options.anchor_radius).to_path(0.1);
                painter.fill(&dot, &Paint::Solid(Color::WHITE));
                painter.stroke(&dot, &Stroke::new(1.0), &paint);
            }
        }
    }

    if let Some(anchor) = &hover.dock_anchor {
        let dot = Circle::new(anchor.pos(), options.anchor_radius).to_path(0.1);
        let fill = color_or(&options.dock_fill_style, Color::from_rgba8(250, 84, 28, 255));
        painter.fill(&dot, &Paint::Solid(fill));
        painter.stroke(&dot, &Stroke::new(1.0), &dock);
    }

    if let Some(rect) = hover.drag_rect {
        let rect = rect.normalized().to_kurbo().to_path(0.1);
        let color = color_or(&options.drag_color, Color::from_rgba8(24, 144, 255, 255));
        painter.fill(&rect, &Paint::Solid(fade(color, 0.2)));
        painter.stroke(&rect, &Stroke::new(1.0), &Paint::Solid(color));
    }
}

fn draw_anchors(painter: &mut dyn Painter, node: &Node, options: &Options) {
    if options.hide_anchor || node.props.hide_anchor || node.props.locked > Lock::Readonly {
        return;
    }
    let stroke = Paint::Solid(color_or(&options.anchor_color, Color::from_rgba8(24, 144, 255, 255)));
    let fill = Paint::Solid(color_or(&options.anchor_fill_style, Color::WHITE));
    for anchor in node.rotated_anchors.iter().filter(|a| !a.hidden) {
        let dot = Circle::new(anchor.pos(), options.anchor_radius).to_path(0.1);
        painter.fill(&dot, &fill);
        painter.stroke(&dot, &Stroke::new(1.0), &stroke);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_list::DrawCommand;
    use topograph_core::input::PointerInput;

    fn scene_with_nodes() -> Scene {
        let mut scene = Scene::default();
        for (id, x) in [("a", 0.0), ("b", 300.0)] {
            let mut node = Node::new("rectangle", Rect::new(x, 0.0, 100.0, 100.0));
            node.props.id = id.to_string();
            scene.add_node(node, false);
        }
        scene.resize(800.0, 600.0);
        scene
    }

    fn count_fills(list: &DisplayList) -> usize {
        list.commands().iter().filter(|c| matches!(c, DrawCommand::Fill { .. })).count()
    }

    #[test]
    fn test_offscreen_draws_every_pen() {
        let scene = scene_with_nodes();
        let mut layers = Layers::new();
        layers.update(&RenderContext::new(&scene));
        let strokes = layers
            .layer(LayerKind::Offscreen)
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Stroke { .. }))
            .count();
        assert_eq!(strokes, 2);
        assert!(layers.layer(LayerKind::Active).is_empty());
        assert!(layers.layer(LayerKind::Hover).is_empty());
    }

    #[test]
    fn test_active_layer_handles() {
        let mut scene = scene_with_nodes();
        scene.select(["a"]);
        let mut list = DisplayList::new();
        draw_active(&mut list, &scene);
        // Rotate knob plus four size handles.
        assert_eq!(count_fills(&list), 5);

        scene.lock(Lock::Readonly);
        let mut locked = DisplayList::new();
        draw_active(&mut locked, &scene);
        assert_eq!(count_fills(&locked), 0);
        assert!(!locked.is_empty());

        scene.lock(Lock::NoMove);
        let mut hidden = DisplayList::new();
        draw_active(&mut hidden, &scene);
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_hide_size_handles() {
        let mut scene = scene_with_nodes();
        let mut options = scene.options().clone();
        options.hide_size_cp = true;
        options.hide_rotate_cp = true;
        scene.set_options(options);
        scene.select(["a"]);
        let mut list = DisplayList::new();
        draw_active(&mut list, &scene);
        assert_eq!(count_fills(&list), 0);
    }

    #[test]
    fn test_hover_shows_anchors() {
        let mut scene = scene_with_nodes();
        scene.pointer_move(PointerInput::at(50.0, 50.0));
        scene.animation_frame(0.0);
        let mut list = DisplayList::new();
        draw_hover(&mut list, &scene, kurbo::Rect::new(0.0, 0.0, 800.0, 600.0));
        assert_eq!(count_fills(&list), 4);
    }

    #[test]
    fn test_rubber_band_in_hover_layer() {
        let mut scene = scene_with_nodes();
        scene.pointer_down(PointerInput::at(500.0, 300.0).pressed());
        scene.pointer_move(PointerInput::at(450.0, 250.0).pressed());
        scene.animation_frame(0.0);
        let mut list = DisplayList::new();
        draw_hover(&mut list, &scene, kurbo::Rect::new(0.0, 0.0, 800.0, 600.0));
        let bounds = list.bounds().unwrap();
        assert_eq!((bounds.x0, bounds.y0, bounds.x1, bounds.y1), (450.0, 250.0, 500.0, 300.0));
    }

    #[test]
    fn test_grid_and_rule_follow_data() {
        let mut scene = scene_with_nodes();
        scene.data_mut().grid = true;
        scene.data_mut().rule = true;
        let mut layers = Layers::new();
        layers.update(&RenderContext::new(&scene));
        let mut all = DisplayList::new();
        layers.composite(&mut all);
        assert!(all.commands().iter().any(|c| matches!(c, DrawCommand::Text(_))));
        assert!(all.len() > layers.layer(LayerKind::Offscreen).len());
    }

    #[test]
    fn test_render_if_requested_coalesces() {
        let mut scene = scene_with_nodes();
        let mut layers = Layers::new();
        scene.take_render_request();
        assert!(!layers.render_if_requested(&mut scene, kurbo::Size::new(800.0, 600.0)));
        scene.request_render();
        scene.request_render();
        assert!(layers.render_if_requested(&mut scene, kurbo::Size::new(800.0, 600.0)));
        assert!(!layers.render_if_requested(&mut scene, kurbo::Size::new(800.0, 600.0)));
    }

    #[test]
    fn test_render_after_animation_frame() {
        let mut scene = scene_with_nodes();
        let mut layers = Layers::new();
        scene.take_render_request();
        scene.translate(10.0, 0.0);
        assert!(scene.animation_frame(0.0));
        assert!(layers.render_if_requested(&mut scene, kurbo::Size::new(800.0, 600.0)));
        assert!(!layers.layer(LayerKind::Offscreen).is_empty());
        assert!(!scene.animation_frame(16.0));
    }

    #[test]
    fn test_overlay_changes() {
        let mut scene = scene_with_nodes();
        let mut video = Node::new("rectangle", Rect::new(0.0, 200.0, 160.0, 90.0));
        video.props.id = "v".to_string();
        video.video = Some("movie.mp4".to_string());
        scene.add_node(video, false);

        let mut overlays = OverlayLayer::default();
        let changes = overlays.update(&scene);
        assert!(matches!(changes.as_slice(), [OverlayChange::Added(o)] if o.kind == OverlayKind::Video));
        assert!(overlays.update(&scene).is_empty());

        scene.translate(10.0, 0.0);
        assert!(matches!(overlays.update(&scene).as_slice(), [OverlayChange::Updated(o)] if o.rect.x == 10.0));

        scene.delete_by("v");
        assert_eq!(overlays.update(&scene), vec![OverlayChange::Removed("v".to_string())]);
        assert!(overlays.items().is_empty());
    }
}
