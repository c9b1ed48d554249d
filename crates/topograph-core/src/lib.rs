//! Topograph Core Library
//!
//! Platform-agnostic diagram model and interaction engine: pens and their
//! geometry, the shape and route registry, the editing scene with undo
//! history and animations, and WebSocket/MQTT live data.

pub mod data;
pub mod draw;
pub mod error;
pub mod events;
pub mod geometry;
pub mod history;
pub mod input;
pub mod options;
pub mod pen;
pub mod realtime;
pub mod registry;
pub mod scene;
mod serde_util;

pub use data::{MqttOptions, TopologyData};
pub use draw::{NullPainter, Paint, Painter, PenStyle, TextRun};
pub use error::{Error, Result};
pub use events::{EventBus, SceneEvent, SubscriptionId};
pub use geometry::{AnchorMode, Direction, Point, Rect};
pub use history::History;
pub use input::{Key, KeyInput, Modifiers, MouseButton, PointerInput, TouchInput};
pub use options::{KeyType, Options};
pub use pen::{EventAction, EventType, Line, Lock, Node, Pen, PenEvent, PenProps};
pub use realtime::{ConnectionState, Message};
pub use registry::{LineRoute, Shape, ShapeRegistry};
pub use scene::{Cursor, HoverState, MoveIn, MoveInType, Scene, Selection};
