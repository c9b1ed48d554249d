//! Events the scene emits to its host.

use std::fmt;

use crate::geometry::{Point, Rect};
use crate::pen::{Lock, Pen};

/// Something that happened in the scene.
#[derive(Debug, Clone)]
pub enum SceneEvent {
    Opened,
    Resize { width: f64, height: f64 },
    /// A single node was selected.
    Node(Pen),
    /// A single line was selected.
    Line(Pen),
    /// Several pens were selected.
    Multi(Vec<Pen>),
    /// Selection cleared, by a click on empty space at the given point or
    /// by an edit.
    Space(Option<kurbo::Point>),
    AddNode(Pen),
    AddLine(Pen),
    Delete(Vec<Pen>),
    Move(Vec<Pen>),
    ResizePens(Vec<Pen>),
    Rotated(Vec<Pen>),
    Scale(f64),
    Translate { x: f64, y: f64 },
    Locked(Lock),
    LockPens { ids: Vec<String>, lock: Lock },
    Undo,
    Redo,
    Copy(Vec<Pen>),
    Paste(Vec<Pen>),
    AnimateEnd(Pen),
    MediaEnd(Pen),
    Tip { id: String, rect: Rect },
    TipHidden,
    MoveInNode(Pen),
    MoveOutNode(Pen),
    MoveInLine(Pen),
    MoveOutLine(Pen),
    /// The dragged selection reached the edge of the view.
    MoveOutParent(kurbo::Point),
    /// A new line started from a node anchor.
    Anchor { node: String, anchor_index: usize, anchor: Point },
    /// A new line started from a node centre.
    NodeCenter(Pen),
    /// A pen was double-clicked; `rect` is where a text editor belongs.
    Dblclick { id: String, rect: Rect, text: String },
    SetText { id: String, text: String },
    Link { url: String, target: String },
    WindowFn { name: String, pen: Option<String>, params: serde_json::Value },
    ScriptEmit { name: String, payload: serde_json::Value },
}

impl SceneEvent {
    /// Event name used for subscriptions.
    pub fn name(&self) -> &'static str {
        match self {
            SceneEvent::Opened => "opened",
            SceneEvent::Resize { .. } => "resize",
            SceneEvent::Node(_) => "node",
            SceneEvent::Line(_) => "line",
            SceneEvent::Multi(_) => "multi",
            SceneEvent::Space(_) => "space",
            SceneEvent::AddNode(_) => "addNode",
            SceneEvent::AddLine(_) => "addLine",
            SceneEvent::Delete(_) => "delete",
            SceneEvent::Move(_) => "move",
            SceneEvent::ResizePens(_) => "resizePens",
            SceneEvent::Rotated(_) => "rotated",
            SceneEvent::Scale(_) => "scale",
            SceneEvent::Translate { .. } => "translate",
            SceneEvent::Locked(_) => "locked",
            SceneEvent::LockPens { .. } => "lockPens",
            SceneEvent::Undo => "undo",
            SceneEvent::Redo => "redo",
            SceneEvent::Copy(_) => "copy",
            SceneEvent::Paste(_) => "paste",
            SceneEvent::AnimateEnd(_) => "animateEnd",
            SceneEvent::MediaEnd(_) => "mediaEnd",
            SceneEvent::Tip { .. } => "tip",
            SceneEvent::TipHidden => "tipHidden",
            SceneEvent::MoveInNode(_) => "moveInNode",
            SceneEvent::MoveOutNode(_) => "moveOutNode",
            SceneEvent::MoveInLine(_) => "moveInLine",
            SceneEvent::MoveOutLine(_) => "moveOutLine",
            SceneEvent::MoveOutParent(_) => "moveOutParent",
            SceneEvent::Anchor { .. } => "anchor",
            SceneEvent::NodeCenter(_) => "nodeCenter",
            SceneEvent::Dblclick { .. } => "dblclick",
            SceneEvent::SetText { .. } => "setText",
            SceneEvent::Link { .. } => "link",
            SceneEvent::WindowFn { .. } => "windowFn",
            SceneEvent::ScriptEmit { .. } => "scriptEmit",
        }
    }
}

/// Handle returned by [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&SceneEvent)>;

/// Name-keyed subscriber list. The name `"*"` receives every event.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriptionId, String, Handler)>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("handlers", &self.handlers.len()).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, name: impl Into<String>, handler: impl FnMut(&SceneEvent) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, name.into(), Box::new(handler)));
        id
    }

    /// Remove one subscription. Returns whether it existed.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _, _)| *sid != id);
        self.handlers.len() != before
    }

    /// Remove every subscription to `name`.
    pub fn off_all(&mut self, name: &str) {
        self.handlers.retain(|(_, n, _)| n != name);
    }

    pub fn emit(&mut self, event: &SceneEvent) {
        let name = event.name();
        log::trace!("emit {}", name);
        for (_, subscribed, handler) in self.handlers.iter_mut() {
            if subscribed == name || subscribed == "*" {
                handler(event);
            }
        }
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_on_off() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = bus.on("undo", move |e| sink.borrow_mut().push(e.name()));
        bus.emit(&SceneEvent::Undo);
        bus.emit(&SceneEvent::Redo);
        assert!(bus.off(id));
        assert!(!bus.off(id));
        bus.emit(&SceneEvent::Undo);
        assert_eq!(*seen.borrow(), vec!["undo"]);
    }

    #[test]
    fn test_wildcard() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        bus.on("*", move |_| *sink.borrow_mut() += 1);
        bus.emit(&SceneEvent::Opened);
        bus.emit(&SceneEvent::Scale(2.0));
        assert_eq!(*count.borrow(), 2);
    }
}
