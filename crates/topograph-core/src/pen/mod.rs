//! Pens: the drawable elements of a diagram.
//!
//! A pen is either a [`Node`] (a rectangular shape, optionally holding
//! children) or a [`Line`] (a connector). Both carry the shared
//! [`PenProps`].

mod event;
mod line;
mod node;
pub mod tree;

pub use event::{EventAction, EventType, PenEvent};
pub use line::{Line, LineEnd};
pub use node::{AnimateFrame, AnimateStatus, BkType, MediaState, Node, ParentFrame, RectInParent, Sides};

use kurbo::{Affine, Stroke, Vec2};
use serde::{Deserialize, Deserializer, Serialize};

use crate::draw::{self, Paint, PenStyle, Painter};
use crate::geometry::Rect;
use crate::registry::ShapeRegistry;
use crate::serde_util::{is_false, is_zero, lenient, lenient_one, lenient_opt, lenient_true, one, yes};

/// Generate a fresh pen id.
pub fn new_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    uuid[..8].to_string()
}

/// How strongly a pen (or the whole diagram) resists editing.
///
/// Levels are ordered: each one implies the restrictions of the lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Lock {
    #[default]
    None,
    /// Selectable and clickable, but not editable.
    Readonly,
    /// Not movable, and the view cannot be panned.
    NoMove,
    /// Invisible to hit-testing.
    NoEvent,
}

impl Lock {
    pub fn is_none(&self) -> bool {
        *self == Lock::None
    }
}

impl From<u8> for Lock {
    fn from(value: u8) -> Self {
        match value {
            0 => Lock::None,
            1 => Lock::Readonly,
            2 => Lock::NoMove,
            _ => Lock::NoEvent,
        }
    }
}

impl From<Lock> for u8 {
    fn from(lock: Lock) -> Self {
        match lock {
            Lock::None => 0,
            Lock::Readonly => 1,
            Lock::NoMove => 2,
            Lock::NoEvent => 10,
        }
    }
}

/// Text styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Font {
    #[serde(deserialize_with = "lenient")]
    pub color: String,
    #[serde(deserialize_with = "lenient")]
    pub font_family: String,
    #[serde(deserialize_with = "lenient")]
    pub font_size: f64,
    #[serde(deserialize_with = "lenient")]
    pub line_height: f64,
    #[serde(deserialize_with = "lenient")]
    pub font_style: String,
    #[serde(deserialize_with = "lenient")]
    pub font_weight: String,
    #[serde(deserialize_with = "lenient")]
    pub text_align: String,
    #[serde(deserialize_with = "lenient")]
    pub text_baseline: String,
    #[serde(deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            color: String::new(),
            font_family: "\"Hiragino Sans GB\", \"Microsoft YaHei\", \"Helvetica Neue\", Helvetica, Arial".to_string(),
            font_size: 12.0,
            line_height: 1.5,
            font_style: "normal".to_string(),
            font_weight: "normal".to_string(),
            text_align: "center".to_string(),
            text_baseline: "middle".to_string(),
            background: None,
        }
    }
}

impl Font {
    /// Height of one line of text.
    pub fn line_px(&self) -> f64 {
        self.font_size * self.line_height
    }
}

/// Fields shared by nodes and lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenProps {
    #[serde(default = "new_id", deserialize_with = "lenient_id")]
    pub id: String,
    /// Registry key: a node shape name or a line route name.
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub rect: Rect,
    #[serde(default = "one", deserialize_with = "lenient_one")]
    pub line_width: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub rotate: f64,
    /// Rotation accumulated by an in-progress rotate gesture.
    #[serde(skip)]
    pub offset_rotate: f64,
    #[serde(default = "one", deserialize_with = "lenient_one")]
    pub global_alpha: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub dash: u8,
    /// Explicit dash pattern; overrides `dash` when set.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub line_dash: Option<Vec<f64>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub line_dash_offset: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub stroke_style: String,
    #[serde(default, deserialize_with = "lenient")]
    pub fill_style: String,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub line_cap: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub font: Font,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub text_max_line: u32,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub white_space: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub auto_rect: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub text_offset_x: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub text_offset_y: f64,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub shadow_color: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub shadow_blur: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub shadow_offset_x: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub shadow_offset_y: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "String::is_empty")]
    pub animate_type: String,
    /// Wall-clock start of the running animation in ms; zero when idle.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub animate_start: f64,
    /// Number of runs; zero or negative loops forever.
    #[serde(default, deserialize_with = "lenient")]
    pub animate_cycle: i32,
    #[serde(skip)]
    pub animate_cycle_index: i32,
    /// Tag of the pens to play when this animation ends.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub next_animate: Option<String>,
    /// Play automatically when the diagram opens.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub animate_play: bool,
    #[serde(skip)]
    pub animate_pos: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Lock::is_none")]
    pub locked: Lock,
    /// A child that is selected on its own instead of selecting its parent.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub stand: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub hide_input: bool,
    #[serde(rename = "hideRotateCP", default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub hide_rotate_cp: bool,
    #[serde(rename = "hideSizeCP", default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub hide_size_cp: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub hide_anchor: bool,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub tip_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<PenEvent>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub rect_in_parent: Option<RectInParent>,
    #[serde(default = "yes", deserialize_with = "lenient_true")]
    pub visible: bool,
    /// Free-form user payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.is_empty() => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => new_id(),
    })
}

impl Default for PenProps {
    fn default() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            tags: Vec::new(),
            rect: Rect::default(),
            line_width: 1.0,
            rotate: 0.0,
            offset_rotate: 0.0,
            global_alpha: 1.0,
            dash: 0,
            line_dash: None,
            line_dash_offset: 0.0,
            stroke_style: String::new(),
            fill_style: String::new(),
            line_cap: None,
            font: Font::default(),
            text: None,
            text_max_line: 0,
            white_space: None,
            auto_rect: false,
            text_offset_x: 0.0,
            text_offset_y: 0.0,
            shadow_color: None,
            shadow_blur: 0.0,
            shadow_offset_x: 0.0,
            shadow_offset_y: 0.0,
            animate_type: String::new(),
            animate_start: 0.0,
            animate_cycle: 0,
            animate_cycle_index: 0,
            next_animate: None,
            animate_play: false,
            animate_pos: 0.0,
            locked: Lock::None,
            stand: false,
            hide_input: false,
            hide_rotate_cp: false,
            hide_size_cp: false,
            hide_anchor: false,
            markdown: None,
            tip_id: None,
            title: None,
            events: Vec::new(),
            parent_id: None,
            rect_in_parent: None,
            visible: true,
            data: serde_json::Value::Null,
            value: None,
        }
    }
}

impl PenProps {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Matches an id or a tag.
    pub fn matches(&self, id_or_tag: &str) -> bool {
        self.id == id_or_tag || self.has_tag(id_or_tag)
    }

    /// Total rotation including an in-progress gesture.
    pub fn angle(&self) -> f64 {
        self.rotate + self.offset_rotate
    }

    pub fn dash_pattern(&self) -> Vec<f64> {
        match &self.line_dash {
            Some(pattern) => pattern.clone(),
            None => draw::dash_pattern(self.dash).to_vec(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.animate_start > 0.0
    }

    /// Stroke settings; `fallback` is used when `strokeStyle` is empty.
    pub fn style(&self, fallback: &str) -> PenStyle {
        let stroke_color = if self.stroke_style.is_empty() { fallback } else { &self.stroke_style };
        let stroke = draw::parse_color(stroke_color).map(Paint::Solid);
        let fill = draw::parse_color(&self.fill_style).map(Paint::Solid);
        let stroke_style = Stroke::new(self.line_width)
            .with_caps(draw::parse_cap(self.line_cap.as_deref()))
            .with_dashes(self.line_dash_offset, self.dash_pattern());
        PenStyle {
            stroke,
            fill,
            stroke_style,
        }
    }
}

/// A drawable diagram element.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Pen {
    Node(Node),
    Line(Line),
}

impl<'de> Deserialize<'de> for Pen {
    /// Lines are told apart from nodes by their `from` field (or the
    /// legacy `"type": 1` tag).
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let is_line = value.get("from").is_some_and(|v| v.is_object())
            || value.get("type").and_then(serde_json::Value::as_u64) == Some(1);
        if is_line {
            serde_json::from_value(value).map(Pen::Line).map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value).map(Pen::Node).map_err(serde::de::Error::custom)
        }
    }
}

impl From<Node> for Pen {
    fn from(node: Node) -> Self {
        Pen::Node(node)
    }
}

impl From<Line> for Pen {
    fn from(line: Line) -> Self {
        Pen::Line(line)
    }
}

impl Pen {
    pub fn props(&self) -> &PenProps {
        match self {
            Pen::Node(node) => &node.props,
            Pen::Line(line) => &line.props,
        }
    }

    pub fn props_mut(&mut self) -> &mut PenProps {
        match self {
            Pen::Node(node) => &mut node.props,
            Pen::Line(line) => &mut line.props,
        }
    }

    pub fn id(&self) -> &str {
        &self.props().id
    }

    pub fn name(&self) -> &str {
        &self.props().name
    }

    pub fn locked(&self) -> Lock {
        self.props().locked
    }

    pub fn visible(&self) -> bool {
        self.props().visible
    }

    pub fn is_line(&self) -> bool {
        matches!(self, Pen::Line(_))
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Pen::Node(node) => Some(node),
            Pen::Line(_) => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Pen::Node(node) => Some(node),
            Pen::Line(_) => None,
        }
    }

    pub fn as_line(&self) -> Option<&Line> {
        match self {
            Pen::Line(line) => Some(line),
            Pen::Node(_) => None,
        }
    }

    pub fn as_line_mut(&mut self) -> Option<&mut Line> {
        match self {
            Pen::Line(line) => Some(line),
            Pen::Node(_) => None,
        }
    }

    /// Children of a node; empty for lines.
    pub fn children(&self) -> &[Pen] {
        match self {
            Pen::Node(node) => &node.children,
            Pen::Line(_) => &[],
        }
    }

    /// Bounding rectangle in diagram space (unrotated).
    pub fn bounds(&self, registry: &ShapeRegistry) -> Rect {
        match self {
            Pen::Node(node) => node.props.rect,
            Pen::Line(line) => line.bounds(registry),
        }
    }

    /// Topmost pen in this subtree under `pt`. Children win over their
    /// parent; hidden and `NoEvent` pens are never hit.
    pub fn hit(&self, pt: kurbo::Point, padding: f64) -> Option<&Pen> {
        if !self.visible() || self.locked() == Lock::NoEvent {
            return None;
        }
        match self {
            Pen::Node(node) => {
                for child in node.children.iter().rev() {
                    if let Some(hit) = child.hit(pt, padding) {
                        return Some(hit);
                    }
                }
                node.hit_in_self(pt, padding).then_some(self)
            }
            Pen::Line(line) => (line.from.hit(pt, padding) || line.to.hit(pt, padding)).then_some(self),
        }
    }

    pub fn translate(&mut self, offset: Vec2) {
        match self {
            Pen::Node(node) => node.translate(offset),
            Pen::Line(line) => line.translate(offset),
        }
    }

    /// Scale about `center`, recursing into children and keyframes.
    pub fn scale(&mut self, scale: f64, center: kurbo::Point, registry: &ShapeRegistry) {
        match self {
            Pen::Node(node) => node.scale(scale, center, registry),
            Pen::Line(line) => line.scale(scale, center, registry),
        }
    }

    /// Deep copy with fresh ids for this pen and all its descendants.
    pub fn clone_fresh(&self) -> Pen {
        let mut copy = self.clone();
        copy.renew_ids();
        copy
    }

    fn renew_ids(&mut self) {
        let id = new_id();
        self.props_mut().id = id.clone();
        if let Pen::Node(node) = self {
            for child in node.children.iter_mut() {
                child.props_mut().parent_id = Some(id.clone());
                child.renew_ids();
            }
        }
    }

    /// Recompute derived geometry from the registry.
    pub fn init(&mut self, registry: &ShapeRegistry) {
        match self {
            Pen::Node(node) => {
                node.init(registry);
                node.calc_children_rect(registry);
            }
            Pen::Line(line) => line.calc_control_points(registry, false),
        }
    }

    /// Position this pen from its parent frame (nested pens only).
    pub fn calc_rect_by_parent(&mut self, frame: &ParentFrame, registry: &ShapeRegistry) {
        match self {
            Pen::Node(node) => {
                node.calc_rect_by_parent(frame);
                node.init(registry);
                node.calc_children_rect(registry);
            }
            Pen::Line(line) => line.calc_rect_by_parent(frame, registry),
        }
    }

    /// Store this pen's geometry relative to its parent frame.
    pub fn calc_rect_in_parent(&mut self, frame: &ParentFrame) {
        match self {
            Pen::Node(node) => node.calc_rect_in_parent(frame),
            Pen::Line(line) => line.calc_rect_in_parent(frame),
        }
    }

    /// Draw this pen, then its children.
    pub fn render(&self, ctx: &mut dyn Painter, registry: &ShapeRegistry, default_color: &str) {
        let props = self.props();
        if !props.visible {
            return;
        }
        ctx.save();
        ctx.set_alpha(props.global_alpha);
        match self {
            Pen::Node(node) => {
                let angle = props.angle();
                if angle != 0.0 {
                    ctx.transform(Affine::rotate_about(angle.to_radians(), props.rect.center()));
                }
                node.draw(ctx, registry, default_color);
            }
            Pen::Line(line) => line.draw(ctx, registry, default_color),
        }
        ctx.restore();
        for child in self.children() {
            child.render(ctx, registry, default_color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn test_lock_ordering_and_wire_values() {
        assert!(Lock::None < Lock::Readonly);
        assert!(Lock::NoMove < Lock::NoEvent);
        assert_eq!(u8::from(Lock::NoEvent), 10);
        assert_eq!(Lock::from(10), Lock::NoEvent);
        let json = serde_json::to_string(&Lock::NoMove).unwrap();
        assert_eq!(json, "2");
    }

    #[test]
    fn test_pen_tagged_by_from() {
        let node: Pen = serde_json::from_str(r#"{"id": "a", "name": "rectangle", "rect": {"x": 1, "y": 2, "width": 3, "height": 4}}"#).unwrap();
        let line: Pen = serde_json::from_str(r#"{"id": "b", "name": "curve", "from": {"x": 0, "y": 0}, "to": {"x": 5, "y": 5}}"#).unwrap();
        assert!(!node.is_line());
        assert!(line.is_line());
        assert_eq!(node.props().rect, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(line.as_line().unwrap().to, Point::new(5.0, 5.0));
    }

    #[test]
    fn test_missing_id_is_generated() {
        let pen: Pen = serde_json::from_str(r#"{"name": "rectangle"}"#).unwrap();
        assert_eq!(pen.id().len(), 8);
        assert!(pen.visible());
        assert_eq!(pen.props().line_width, 1.0);
    }

    #[test]
    fn test_bad_fields_fall_back() {
        let pen: Pen = serde_json::from_str(
            r#"{"id": 7, "name": "rectangle", "lineWidth": "wide", "locked": "x", "font": 3, "visible": null}"#,
        )
        .unwrap();
        assert_eq!(pen.id(), "7");
        assert_eq!(pen.props().line_width, 1.0);
        assert_eq!(pen.locked(), Lock::None);
        assert_eq!(pen.props().font.font_size, 12.0);
        assert!(pen.visible());
    }

    #[test]
    fn test_clone_fresh_renews_child_ids() {
        let mut parent = Node::new("combine", Rect::new(0.0, 0.0, 100.0, 100.0));
        parent.children.push(Pen::Node(Node::new("rectangle", Rect::new(0.0, 0.0, 10.0, 10.0))));
        let pen = Pen::Node(parent);
        let copy = pen.clone_fresh();
        assert_ne!(copy.id(), pen.id());
        assert_ne!(copy.children()[0].id(), pen.children()[0].id());
        assert_eq!(copy.children()[0].props().parent_id.as_deref(), Some(copy.id()));
    }

    #[test]
    fn test_style_fallback_color() {
        let props = PenProps::named("rectangle");
        let style = props.style("#ff0000");
        let color = match style.stroke {
            Some(Paint::Solid(c)) => c.to_rgba8(),
            _ => panic!("expected solid stroke"),
        };
        assert_eq!((color.r, color.g, color.b), (255, 0, 0));
        assert!(style.fill.is_none());
    }
}
