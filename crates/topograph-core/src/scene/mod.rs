//! The scene controller.
//!
//! A [`Scene`] owns one diagram and everything needed to edit it: the
//! shape registry, options, undo history, the current selection and hover
//! state, running animations and realtime connections. Hosts feed it
//! pointer, keyboard and touch input, call [`Scene::animation_frame`] once
//! per display frame, and subscribe to [`SceneEvent`]s.

mod active;
mod animate;
mod bridge;
mod dock;
mod edit;
mod gesture;
mod hover;
mod keyboard;
mod pointer;
mod view;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub use active::Selection;
pub use animate::Animator;
pub use bridge::WindowFn;
pub use gesture::{Cursor, MoveIn, MoveInType};
pub use hover::HoverState;

use crate::data::TopologyData;
use crate::error::Result;
use crate::events::{EventBus, SceneEvent, SubscriptionId};
use crate::history::History;
use crate::input::{ClickTracker, PointerInput};
use crate::options::Options;
use crate::pen::{Line, Pen, tree};
use crate::realtime::Connections;
use crate::registry::ShapeRegistry;

/// Pinch or pan in progress.
#[derive(Debug, Clone, Copy, Default)]
struct TouchStart {
    distance: f64,
    center: kurbo::Point,
    scale: f64,
}

/// An editable diagram with its interaction state.
pub struct Scene {
    data: TopologyData,
    options: Options,
    registry: ShapeRegistry,
    history: History,
    events: EventBus,
    clipboard: Vec<Pen>,
    selection: Selection,
    hover: HoverState,
    move_in: MoveIn,
    /// Press that started the current gesture.
    mouse_down: Option<PointerInput>,
    /// Latest move not yet processed; moves are handled once per frame.
    pending_move: Option<PointerInput>,
    last_translated: kurbo::Point,
    space_down: bool,
    /// The running gesture changed the diagram and needs a history entry.
    needs_cache: bool,
    render_requested: bool,
    animator: Animator,
    width: f64,
    height: f64,
    clicks: ClickTracker,
    touch: Option<TouchStart>,
    editing: Option<String>,
    connections: Connections,
    functions: HashMap<String, WindowFn>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("pens", &self.data.pens.len())
            .field("selection", &self.selection.ids)
            .field("move_in", &self.move_in.kind)
            .finish_non_exhaustive()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Scene {
    /// An empty diagram with the built-in shapes.
    pub fn new(options: Options) -> Self {
        Self::with_registry(options, ShapeRegistry::with_builtins())
    }

    pub fn with_registry(options: Options, registry: ShapeRegistry) -> Self {
        let mut history = History::new(options.cache_len);
        history.reset(&[]);
        Self {
            data: TopologyData::default(),
            options,
            registry,
            history,
            events: EventBus::new(),
            clipboard: Vec::new(),
            selection: Selection::default(),
            hover: HoverState::default(),
            move_in: MoveIn::default(),
            mouse_down: None,
            pending_move: None,
            last_translated: kurbo::Point::ZERO,
            space_down: false,
            needs_cache: false,
            render_requested: false,
            animator: Animator::default(),
            width: 0.0,
            height: 0.0,
            clicks: ClickTracker::default(),
            touch: None,
            editing: None,
            connections: Connections::default(),
            functions: HashMap::new(),
        }
    }

    pub fn data(&self) -> &TopologyData {
        &self.data
    }

    /// Direct access to the document. Call [`Scene::update_props`] after
    /// editing pens through it.
    pub fn data_mut(&mut self) -> &mut TopologyData {
        &mut self.data
    }

    pub fn pens(&self) -> &[Pen] {
        &self.data.pens
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn set_options(&mut self, options: Options) {
        self.history.set_capacity(options.cache_len);
        self.options = options;
        self.refresh_selection();
        self.request_render();
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    /// Register shapes or routes; re-lay out the diagram afterwards with
    /// [`Scene::update_props`].
    pub fn registry_mut(&mut self) -> &mut ShapeRegistry {
        &mut self.registry
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn hover(&self) -> &HoverState {
        &self.hover
    }

    pub fn move_in(&self) -> &MoveIn {
        &self.move_in
    }

    pub fn cursor(&self) -> Cursor {
        self.move_in.cursor
    }

    /// Pen whose text the host is editing after a double click.
    pub fn editing(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Clones of the lines whose flow animation is playing.
    pub fn animating_lines(&self) -> &[Line] {
        self.animator.lines()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Subscribe to events named `name` (see [`SceneEvent::name`]), or to
    /// everything with `"*"`.
    pub fn on(&mut self, name: impl Into<String>, handler: impl FnMut(&SceneEvent) + 'static) -> SubscriptionId {
        self.events.on(name, handler)
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        self.events.off(id)
    }

    /// Register a named callback for `WindowFn` event actions.
    pub fn register_fn(
        &mut self,
        name: impl Into<String>,
        f: impl FnMut(Option<&Pen>, &serde_json::Value) + 'static,
    ) {
        self.functions.insert(name.into(), Box::new(f));
    }

    /// Replace the diagram, reset history and selection, connect its
    /// realtime sources and start its auto-play animations.
    pub fn open(&mut self, mut data: TopologyData) {
        self.animator.clear();
        self.connections.close();
        data.init(&self.registry);
        self.data = data;
        self.selection.clear();
        self.hover.clear();
        self.move_in = MoveIn::default();
        self.mouse_down = None;
        self.pending_move = None;
        self.editing = None;
        self.history.reset(&self.data.pens);
        self.connections.open(&self.data);
        self.start_animate(None);
        log::info!("Opened diagram with {} pens", self.data.pens.len());
        self.emit(SceneEvent::Opened);
        self.request_render();
    }

    /// Parse and open a diagram. On a parse error the current diagram is
    /// left untouched.
    pub fn open_json(&mut self, json: &str) -> Result<()> {
        let data = TopologyData::from_json(json)?;
        self.open(data);
        Ok(())
    }

    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let data = TopologyData::load(path)?;
        self.open(data);
        Ok(())
    }

    /// The document as JSON without runtime state.
    pub fn pure_data(&self) -> serde_json::Value {
        self.data.pure_data()
    }

    /// Ask for a repaint. Requests made before the next
    /// [`Scene::take_render_request`] collapse into one.
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    /// Whether a repaint was requested since the last call.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_requested)
    }

    /// Per-frame work: the latest pointer move, realtime messages and
    /// animations. Returns whether a repaint is due; the request stays
    /// pending until [`Scene::take_render_request`].
    pub fn animation_frame(&mut self, now_ms: f64) -> bool {
        if let Some(input) = self.pending_move.take() {
            self.process_move(input);
        }
        for message in self.connections.poll() {
            self.receive(message);
        }
        if self.tick_animations(now_ms) {
            self.request_render();
        }
        self.render_requested
    }

    /// Tear down connections, animations and subscribers.
    pub fn destroy(&mut self) {
        self.connections.close();
        self.animator.clear();
        self.events.clear();
        self.functions.clear();
        self.pending_move = None;
        self.mouse_down = None;
        log::debug!("Scene destroyed");
    }

    /// Record the current pens as a new undo state.
    pub fn cache(&mut self) {
        self.history.push(&self.data.pens);
    }

    /// Patch pens in the initial history state, so late-loaded state such
    /// as image sizes survives undoing back to the start.
    pub fn cache_replace(&mut self, pens: &[Pen]) {
        self.history.replace_in_base(pens);
    }

    pub fn find_pen(&self, id: &str) -> Option<&Pen> {
        tree::find_by_id(&self.data.pens, id)
    }

    pub(crate) fn emit(&mut self, event: SceneEvent) {
        log::debug!("Emitting {}", event.name());
        self.events.emit(&event);
    }

    pub(crate) fn clone_pen(&self, id: &str) -> Option<Pen> {
        self.find_pen(id).cloned()
    }

    pub(crate) fn clone_pens(&self, ids: &[String]) -> Vec<Pen> {
        ids.iter().filter_map(|id| self.clone_pen(id)).collect()
    }

    /// Emit the selection event matching the current selection.
    pub(crate) fn emit_selection(&mut self) {
        let pens = self.clone_pens(&self.selection.ids);
        match pens.len() {
            0 => {}
            1 => {
                let pen = pens.into_iter().next();
                match pen {
                    Some(pen @ Pen::Line(_)) => self.emit(SceneEvent::Line(pen)),
                    Some(pen) => self.emit(SceneEvent::Node(pen)),
                    None => {}
                }
            }
            _ => self.emit(SceneEvent::Multi(pens)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::geometry::Rect;
    use crate::pen::Node;

    /// Scene plus a log of emitted event names.
    pub(crate) fn scene_with_log() -> (Scene, Rc<RefCell<Vec<String>>>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut scene = Scene::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        scene.on("*", move |event| sink.borrow_mut().push(event.name().to_string()));
        (scene, log)
    }

    pub(crate) fn add_rect(scene: &mut Scene, id: &str, rect: Rect) {
        let mut node = Node::new("rectangle", rect);
        node.props.id = id.to_string();
        scene.add_node(node, false);
    }

    #[test]
    fn test_open_resets_history_and_emits() {
        let (mut scene, log) = scene_with_log();
        scene
            .open_json(r#"{"pens": [{"id": "a", "name": "rectangle", "rect": {"x": 0, "y": 0, "width": 10, "height": 10}}]}"#)
            .unwrap();
        assert_eq!(scene.pens().len(), 1);
        assert!(!scene.can_undo());
        assert!(log.borrow().contains(&"opened".to_string()));
        assert!(scene.take_render_request());
        assert!(!scene.take_render_request());
    }

    #[test]
    fn test_animation_frame_leaves_request_pending() {
        let mut scene = Scene::default();
        scene.take_render_request();
        assert!(!scene.animation_frame(0.0));
        scene.request_render();
        assert!(scene.animation_frame(16.0));
        assert!(scene.take_render_request());
        assert!(!scene.animation_frame(32.0));
    }

    #[test]
    fn test_bad_json_keeps_previous_diagram() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(scene.open_json("{not json").is_err());
        assert!(scene.find_pen("a").is_some());
    }

    #[test]
    fn test_destroy_drops_subscribers() {
        let (mut scene, log) = scene_with_log();
        scene.destroy();
        scene.emit(SceneEvent::Opened);
        assert!(log.borrow().is_empty());
    }
}
