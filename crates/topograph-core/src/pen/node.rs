//! Rectangular shapes with anchors, content and optional children.

use kurbo::Vec2;
use serde::{Deserialize, Serialize};

use super::{Pen, PenProps};
use crate::draw::{self, Paint, Painter, TextRun};
use crate::geometry::{self, Direction, Length, Point, Rect};
use crate::registry::ShapeRegistry;
use crate::serde_util::{is_false, is_zero, lenient, lenient_opt, lenient_true, yes};

/// Background fill kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum BkType {
    #[default]
    Solid,
    LinearGradient,
    RadialGradient,
}

impl From<u8> for BkType {
    fn from(value: u8) -> Self {
        match value {
            1 => BkType::LinearGradient,
            2 => BkType::RadialGradient,
            _ => BkType::Solid,
        }
    }
}

impl From<BkType> for u8 {
    fn from(kind: BkType) -> Self {
        kind as u8
    }
}

impl BkType {
    pub fn is_solid(&self) -> bool {
        *self == BkType::Solid
    }
}

/// Absolute padding, resolved from the node's padding lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sides {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Geometry of a parent node as seen by its children.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParentFrame {
    pub rect: Rect,
    pub padding: Sides,
    /// Total rotation of the parent, including an in-progress gesture.
    pub rotate: f64,
}

impl ParentFrame {
    pub fn inner_width(&self) -> f64 {
        self.rect.width - self.padding.left - self.padding.right
    }

    pub fn inner_height(&self) -> f64 {
        self.rect.height - self.padding.top - self.padding.bottom
    }

    /// Top-left of the padded content box.
    pub fn origin(&self) -> kurbo::Point {
        kurbo::Point::new(self.rect.x + self.padding.left, self.rect.y + self.padding.top)
    }
}

/// A child's placement as percentages of its parent's content box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RectInParent {
    pub x: Length,
    pub y: Length,
    pub width: Length,
    pub height: Length,
    #[serde(skip_serializing_if = "Length::is_zero")]
    pub margin_top: Length,
    #[serde(skip_serializing_if = "Length::is_zero")]
    pub margin_right: Length,
    #[serde(skip_serializing_if = "Length::is_zero")]
    pub margin_bottom: Length,
    #[serde(skip_serializing_if = "Length::is_zero")]
    pub margin_left: Length,
    #[serde(skip_serializing_if = "is_zero")]
    pub rotate: f64,
}

/// Child placement written by older editors (fractions, not percentages).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyParentRect {
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
    pub rotate: f64,
    pub margin_x: f64,
    pub margin_y: f64,
}

/// One keyframe: animate toward `state` over `duration` ms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimateFrame {
    #[serde(default, deserialize_with = "lenient")]
    pub duration: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub linear: bool,
    #[serde(default)]
    pub state: Box<Node>,
    #[serde(skip)]
    pub start: f64,
    #[serde(skip)]
    pub end: f64,
    /// State at the start of this frame (the previous frame's target).
    #[serde(skip)]
    pub init_state: Option<Box<Node>>,
}

/// Loading state of a node's image.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum MediaState {
    #[default]
    None,
    Pending,
    Ready { width: f64, height: f64 },
    Failed,
}

/// Outcome of one animation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimateStatus {
    Idle,
    /// Still playing; `rect_changed` asks for dependent lines to be re-routed.
    Running { rect_changed: bool },
    Finished,
}

/// A rectangular diagram shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(flatten)]
    pub props: PenProps,
    /// Corner radius; values below 1 are a fraction of the shorter side.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub border_radius: f64,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub icon_family: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub icon_size: f64,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub icon_color: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub icon_rotate: f64,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub image_width: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub image_height: f64,
    /// Keep the image aspect ratio when fitting it into the icon rect.
    #[serde(default = "yes", deserialize_with = "lenient_true")]
    pub image_ratio: bool,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub image_align: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "BkType::is_solid")]
    pub bk_type: BkType,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub gradient_from_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub gradient_to_color: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub gradient_angle: f64,
    #[serde(default = "default_gradient_radius", deserialize_with = "lenient")]
    pub gradient_radius: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Length::is_zero")]
    pub padding_top: Length,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Length::is_zero")]
    pub padding_right: Length,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Length::is_zero")]
    pub padding_bottom: Length,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Length::is_zero")]
    pub padding_left: Length,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub only_size_x: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub only_size_y: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Pen>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Vec::is_empty")]
    pub animate_frames: Vec<AnimateFrame>,
    /// Total keyframe duration, computed by `init_animate`.
    #[serde(skip)]
    pub animate_duration: f64,
    /// Animating this node leaves its connected lines alone.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub animate_alone: bool,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub gif: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub iframe: Option<String>,
    /// Id of a host element to position over this node.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub play: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub play_loop: bool,
    /// Tag of the pens to play when this node's media ends.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub next_play: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing)]
    pub parent_rect: Option<LegacyParentRect>,

    #[serde(skip)]
    pub padding: Sides,
    /// Anchors in unrotated space.
    #[serde(skip)]
    pub anchors: Vec<Point>,
    /// Anchors after applying the node's rotation.
    #[serde(skip)]
    pub rotated_anchors: Vec<Point>,
    #[serde(skip)]
    pub icon_rect: Rect,
    #[serde(skip)]
    pub full_icon_rect: Rect,
    #[serde(skip)]
    pub text_rect: Rect,
    #[serde(skip)]
    pub full_text_rect: Rect,
    /// Baseline captured before the first animation run.
    #[serde(skip)]
    pub animate_ready: Option<Box<Node>>,
    #[serde(skip)]
    pub media: MediaState,
}

fn default_gradient_radius() -> f64 {
    0.01
}

impl Default for Node {
    fn default() -> Self {
        Self {
            props: PenProps::default(),
            border_radius: 0.0,
            icon: None,
            icon_family: None,
            icon_size: 0.0,
            icon_color: None,
            icon_rotate: 0.0,
            image: None,
            image_width: 0.0,
            image_height: 0.0,
            image_ratio: true,
            image_align: None,
            bk_type: BkType::Solid,
            gradient_from_color: None,
            gradient_to_color: None,
            gradient_angle: 0.0,
            gradient_radius: default_gradient_radius(),
            padding_top: Length::default(),
            padding_right: Length::default(),
            padding_bottom: Length::default(),
            padding_left: Length::default(),
            only_size_x: false,
            only_size_y: false,
            children: Vec::new(),
            animate_frames: Vec::new(),
            animate_duration: 0.0,
            animate_alone: false,
            gif: None,
            video: None,
            audio: None,
            iframe: None,
            element_id: None,
            play: false,
            play_loop: false,
            next_play: None,
            parent_rect: None,
            padding: Sides::default(),
            anchors: Vec::new(),
            rotated_anchors: Vec::new(),
            icon_rect: Rect::default(),
            full_icon_rect: Rect::default(),
            text_rect: Rect::default(),
            full_text_rect: Rect::default(),
            animate_ready: None,
            media: MediaState::None,
        }
    }
}

impl Node {
    pub fn new(name: impl Into<String>, rect: Rect) -> Self {
        let mut node = Self::default();
        node.props.name = name.into();
        node.props.rect = rect;
        node
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.props.text = Some(text.into());
        self
    }

    /// Recompute padding, sub-rects and anchors from the registry.
    pub fn init(&mut self, registry: &ShapeRegistry) {
        self.calc_abs_padding();
        let shape = registry.shape_or_default(&self.props.name);
        let (text_rect, full_text_rect) = shape.text_rect(self);
        self.text_rect = text_rect;
        self.full_text_rect = full_text_rect;
        let (icon_rect, full_icon_rect) = shape.icon_rect(self);
        self.icon_rect = icon_rect;
        self.full_icon_rect = full_icon_rect;
        self.anchors = shape.anchors(self);
        self.calc_rotate_anchors(None);
        if self.media == MediaState::None && self.image.as_deref().is_some_and(|s| !s.is_empty()) {
            self.media = MediaState::Pending;
        }
    }

    pub fn calc_abs_padding(&mut self) {
        let (w, h) = (self.props.rect.width, self.props.rect.height);
        self.padding = Sides {
            top: self.padding_top.resolve(h),
            right: self.padding_right.resolve(w),
            bottom: self.padding_bottom.resolve(h),
            left: self.padding_left.resolve(w),
        };
    }

    /// Rotate the anchors by `angle`, or by the node's own rotation.
    pub fn calc_rotate_anchors(&mut self, angle: Option<f64>) {
        let angle = angle.unwrap_or_else(|| self.props.angle());
        let center = self.props.rect.center();
        self.rotated_anchors = self
            .anchors
            .iter()
            .map(|anchor| {
                let mut p = anchor.clone();
                p.rotate(angle, center);
                p
            })
            .collect();
    }

    /// Whether `pt` lies in this node's own (rotated) rect grown by `padding`.
    pub fn hit_in_self(&self, pt: kurbo::Point, padding: f64) -> bool {
        let angle = self.props.angle();
        if angle % 360.0 == 0.0 {
            return self.props.rect.hit(pt, padding);
        }
        let mut grown = self.props.rect;
        grown.x -= padding;
        grown.y -= padding;
        grown.width += padding * 2.0;
        grown.height += padding * 2.0;
        grown.hit_rotate(pt, angle, self.props.rect.center())
    }

    /// Index and facing of the rotated anchor closest to `pt`.
    pub fn nearest_anchor(&self, pt: kurbo::Point) -> Option<(usize, Direction)> {
        geometry::nearest(&self.rotated_anchors, pt).map(|i| (i, self.rotated_anchors[i].direction))
    }

    pub fn frame(&self) -> ParentFrame {
        ParentFrame {
            rect: self.props.rect,
            padding: self.padding,
            rotate: self.props.angle(),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether this node needs a host overlay element (video, audio,
    /// iframe, animated GIF or an external element).
    pub fn needs_overlay(&self) -> bool {
        [&self.gif, &self.video, &self.audio, &self.iframe, &self.element_id]
            .iter()
            .any(|field| field.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// Move by `offset`, carrying derived geometry, keyframes and children.
    pub fn translate(&mut self, offset: Vec2) {
        self.props.rect.translate(offset);
        for p in self.anchors.iter_mut().chain(self.rotated_anchors.iter_mut()) {
            p.translate(offset);
        }
        for r in [
            &mut self.icon_rect,
            &mut self.full_icon_rect,
            &mut self.text_rect,
            &mut self.full_text_rect,
        ] {
            r.translate(offset);
        }
        for frame in self.animate_frames.iter_mut() {
            frame.state.translate(offset);
            if let Some(init) = frame.init_state.as_mut() {
                init.translate(offset);
            }
        }
        if let Some(ready) = self.animate_ready.as_mut() {
            ready.translate(offset);
        }
        for child in self.children.iter_mut() {
            child.translate(offset);
        }
    }

    /// Scale about `center`, carrying text, icon, keyframes and children.
    pub fn scale(&mut self, scale: f64, center: kurbo::Point, registry: &ShapeRegistry) {
        self.scale_own(scale, center);
        for frame in self.animate_frames.iter_mut() {
            frame.state.scale_own(scale, center);
            if let Some(init) = frame.init_state.as_mut() {
                init.scale_own(scale, center);
            }
        }
        if let Some(ready) = self.animate_ready.as_mut() {
            ready.scale_own(scale, center);
        }
        self.init(registry);
        for child in self.children.iter_mut() {
            child.scale(scale, center, registry);
        }
    }

    fn scale_own(&mut self, scale: f64, center: kurbo::Point) {
        self.props.rect.scale(scale, Some(center));
        self.props.font.font_size *= scale;
        self.props.text_offset_x *= scale;
        self.props.text_offset_y *= scale;
        self.icon_size *= scale;
        self.image_width *= scale;
        self.image_height *= scale;
        if self.border_radius >= 1.0 {
            self.border_radius *= scale;
        }
    }

    /// Place this node inside `frame` according to `rect_in_parent`.
    pub fn calc_rect_by_parent(&mut self, frame: &ParentFrame) {
        let Some(rip) = &self.props.rect_in_parent else {
            return;
        };
        let (w, h) = (frame.inner_width(), frame.inner_height());
        let origin = frame.origin();
        let width = rip.width.resolve(w);
        let height = rip.height.resolve(h);
        let mut rect = Rect::new(
            origin.x + rip.x.resolve(w) + rip.margin_left.resolve(w),
            origin.y + rip.y.resolve(h) + rip.margin_top.resolve(h),
            width,
            height,
        );
        if frame.rotate != 0.0 {
            let mut center = Point::from(rect.center());
            center.rotate(frame.rotate, frame.rect.center());
            rect.x = center.x - width / 2.0;
            rect.y = center.y - height / 2.0;
        }
        self.props.rotate = rip.rotate + frame.rotate;
        self.props.offset_rotate = 0.0;
        self.props.rect = rect;
    }

    /// Record this node's current rect as percentages of `frame`.
    pub fn calc_rect_in_parent(&mut self, frame: &ParentFrame) {
        let rect = self.props.rect;
        let mut center = Point::from(rect.center());
        center.rotate(-frame.rotate, frame.rect.center());
        let origin = frame.origin();
        let (w, h) = (frame.inner_width(), frame.inner_height());
        let pct = |value: f64, total: f64| if total == 0.0 { 0.0 } else { value / total * 100.0 };
        self.props.rect_in_parent = Some(RectInParent {
            x: Length::percent(pct(center.x - rect.width / 2.0 - origin.x, w)),
            y: Length::percent(pct(center.y - rect.height / 2.0 - origin.y, h)),
            width: Length::percent(pct(rect.width, w)),
            height: Length::percent(pct(rect.height, h)),
            rotate: self.props.rotate - frame.rotate,
            ..Default::default()
        });
    }

    /// Lay out all children from their `rect_in_parent`, top-down.
    pub fn calc_children_rect(&mut self, registry: &ShapeRegistry) {
        let frame = self.frame();
        for child in self.children.iter_mut() {
            child.calc_rect_by_parent(&frame, registry);
        }
    }

    /// Convert legacy `parentRect` placements, recursively.
    pub fn normalize_legacy(&mut self) {
        if let Some(legacy) = self.parent_rect.take() {
            self.props.rect_in_parent = Some(RectInParent {
                x: Length::percent(legacy.offset_x * 100.0),
                y: Length::percent(legacy.offset_y * 100.0),
                width: Length::percent(legacy.width * 100.0),
                height: Length::percent(legacy.height * 100.0),
                rotate: legacy.rotate,
                ..Default::default()
            });
            self.padding_left = Length::Px(legacy.margin_x);
            self.padding_right = Length::Px(legacy.margin_x);
            self.padding_top = Length::Px(legacy.margin_y);
            self.padding_bottom = Length::Px(legacy.margin_y);
        }
        let id = self.props.id.clone();
        for child in self.children.iter_mut() {
            child.props_mut().parent_id = Some(id.clone());
            if let Pen::Node(node) = child {
                node.normalize_legacy();
            }
        }
    }

    /// Copy of this node without children, keyframes or baseline.
    pub fn state_snapshot(&self) -> Node {
        let mut state = self.clone();
        state.children.clear();
        state.animate_frames.clear();
        state.animate_ready = None;
        state
    }

    /// Prepare keyframe timing and capture the pre-animation baseline.
    pub fn init_animate(&mut self) {
        let mut passed = 0.0;
        let mut previous = self.state_snapshot();
        for frame in self.animate_frames.iter_mut() {
            frame.start = passed;
            passed += frame.duration.max(0.0);
            frame.end = passed;
            frame.init_state = Some(Box::new(previous));
            previous = frame.state.state_snapshot();
        }
        self.animate_duration = passed;
        if self.animate_ready.is_none() {
            self.animate_ready = Some(Box::new(self.state_snapshot()));
        }
        self.props.animate_cycle_index = 0;
    }

    /// Advance the keyframe animation to wall-clock `now` (ms).
    pub fn animate(&mut self, now: f64, registry: &ShapeRegistry) -> AnimateStatus {
        if !self.props.is_playing() {
            return AnimateStatus::Idle;
        }
        if self.animate_frames.is_empty() {
            self.props.animate_start = 0.0;
            return AnimateStatus::Finished;
        }
        if self.animate_duration <= 0.0 || self.animate_frames[0].init_state.is_none() {
            self.init_animate();
        }
        let mut timeline = now - self.props.animate_start;
        if timeline < 0.0 {
            return AnimateStatus::Running { rect_changed: false };
        }
        if timeline > self.animate_duration {
            self.props.animate_cycle_index += 1;
            if self.props.animate_cycle > 0 && self.props.animate_cycle_index >= self.props.animate_cycle {
                self.props.animate_start = 0.0;
                self.props.animate_cycle_index = 0;
                let frames = std::mem::take(&mut self.animate_frames);
                if let Some(last) = frames.last() {
                    self.apply_style(&last.state);
                    self.apply_geometry(&last.state);
                }
                self.animate_frames = frames;
                self.init(registry);
                return AnimateStatus::Finished;
            }
            self.props.animate_start = now;
            timeline = 0.0;
        }

        let frames = std::mem::take(&mut self.animate_frames);
        let mut rect_changed = false;
        if let Some(frame) = frames.iter().find(|f| timeline >= f.start && timeline < f.end) {
            self.apply_style(&frame.state);
            let target = &frame.state;
            match frame.init_state.as_deref() {
                Some(init) if frame.linear && frame.duration > 0.0 => {
                    let rate = (timeline - frame.start) / frame.duration;
                    let lerp = |a: f64, b: f64| a + (b - a) * rate;
                    let (a, b) = (init.props.rect, target.props.rect);
                    if a != b {
                        self.props.rect = Rect::new(
                            lerp(a.x, b.x),
                            lerp(a.y, b.y),
                            lerp(a.width, b.width),
                            lerp(a.height, b.height),
                        );
                        rect_changed = true;
                    }
                    if init.props.rotate != target.props.rotate {
                        self.props.rotate = lerp(init.props.rotate, target.props.rotate);
                        rect_changed = true;
                    }
                    self.border_radius = lerp(init.border_radius, target.border_radius);
                    self.props.line_width = lerp(init.props.line_width, target.props.line_width);
                    self.props.global_alpha = lerp(init.props.global_alpha, target.props.global_alpha);
                    if let (Some(v0), Some(v1)) = (init.props.value, target.props.value) {
                        self.props.value = Some(lerp(v0, v1));
                    }
                }
                _ => {
                    rect_changed = self.props.rect != target.props.rect || self.props.rotate != target.props.rotate;
                    self.apply_geometry(target);
                }
            }
        }
        self.animate_frames = frames;
        if rect_changed {
            self.init(registry);
        }
        AnimateStatus::Running { rect_changed }
    }

    /// Return to `state`, or to the pre-animation baseline.
    pub fn restore(&mut self, state: Option<&Node>, registry: &ShapeRegistry) {
        let baseline = match state {
            Some(state) => state.clone(),
            None => match self.animate_ready.as_deref() {
                Some(ready) => ready.clone(),
                None => return,
            },
        };
        self.apply_style(&baseline);
        self.apply_geometry(&baseline);
        self.props.visible = baseline.props.visible;
        self.init(registry);
    }

    fn apply_style(&mut self, state: &Node) {
        let (dst, src) = (&mut self.props, &state.props);
        dst.stroke_style = src.stroke_style.clone();
        dst.fill_style = src.fill_style.clone();
        dst.dash = src.dash;
        dst.line_dash = src.line_dash.clone();
        dst.font = src.font.clone();
        if src.text.is_some() {
            dst.text = src.text.clone();
        }
        self.icon_color = state.icon_color.clone();
        self.bk_type = state.bk_type;
        self.gradient_from_color = state.gradient_from_color.clone();
        self.gradient_to_color = state.gradient_to_color.clone();
    }

    fn apply_geometry(&mut self, state: &Node) {
        self.props.rect = state.props.rect;
        self.props.rotate = state.props.rotate;
        self.props.line_width = state.props.line_width;
        self.props.global_alpha = state.props.global_alpha;
        self.props.value = state.props.value;
        self.border_radius = state.border_radius;
    }

    /// Background paint for the current `bk_type`.
    pub fn background(&self) -> Option<Paint> {
        let rect = self.props.rect;
        let center = rect.center();
        let color = |c: &Option<String>| c.as_deref().and_then(draw::parse_color);
        match self.bk_type {
            BkType::Solid => draw::parse_color(&self.props.fill_style).map(Paint::Solid),
            BkType::LinearGradient => {
                let (from, to) = (color(&self.gradient_from_color)?, color(&self.gradient_to_color)?);
                let mut start = Point::new(rect.x, center.y);
                let mut end = Point::new(rect.ex(), center.y);
                start.rotate(self.gradient_angle, center);
                end.rotate(self.gradient_angle, center);
                Some(Paint::Linear {
                    start: start.pos(),
                    end: end.pos(),
                    from,
                    to,
                })
            }
            BkType::RadialGradient => {
                let (from, to) = (color(&self.gradient_from_color)?, color(&self.gradient_to_color)?);
                Some(Paint::Radial {
                    center,
                    radius: rect.width.max(rect.height) / 2.0,
                    from,
                    to,
                })
            }
        }
    }

    /// Where the image sits inside the icon rect.
    pub fn image_rect(&self) -> Rect {
        let area = self.icon_rect;
        let (mut w, mut h) = (self.image_width, self.image_height);
        if let MediaState::Ready { width, height } = self.media {
            if w <= 0.0 && h <= 0.0 && self.image_ratio && width > 0.0 && height > 0.0 {
                let fit = (area.width / width).min(area.height / height);
                w = width * fit;
                h = height * fit;
            }
        }
        if w <= 0.0 {
            w = area.width;
        }
        if h <= 0.0 {
            h = area.height;
        }
        let x = match self.image_align.as_deref() {
            Some("left") | Some("left-top") | Some("left-bottom") => area.x,
            Some("right") | Some("right-top") | Some("right-bottom") => area.ex() - w,
            _ => area.x + (area.width - w) / 2.0,
        };
        let y = match self.image_align.as_deref() {
            Some("top") | Some("left-top") | Some("right-top") => area.y,
            Some("bottom") | Some("left-bottom") | Some("right-bottom") => area.ey() - h,
            _ => area.y + (area.height - h) / 2.0,
        };
        Rect::new(x, y, w, h)
    }

    /// Draw shape, image, icon and text. Unregistered shapes draw nothing.
    pub(crate) fn draw(&self, ctx: &mut dyn Painter, registry: &ShapeRegistry, default_color: &str) {
        let Some(shape) = registry.shape(&self.props.name) else {
            return;
        };
        let mut style = self.props.style(default_color);
        style.fill = self.background();
        shape.draw(ctx, self, &style);

        if let Some(src) = self.image.as_deref().filter(|s| !s.is_empty()) {
            if matches!(self.media, MediaState::Ready { .. }) {
                ctx.image(src, self.image_rect());
            }
        }

        let text_color = |c: &str| draw::parse_color(c).or_else(|| draw::parse_color(default_color));
        if let Some(icon) = self.icon.as_deref().filter(|s| !s.is_empty()) {
            let mut font = self.props.font.clone();
            if let Some(family) = &self.icon_family {
                font.font_family = family.clone();
            }
            if self.icon_size > 0.0 {
                font.font_size = self.icon_size;
            }
            if let Some(color) = text_color(self.icon_color.as_deref().unwrap_or_default()) {
                ctx.text(&TextRun {
                    text: icon.to_string(),
                    rect: self.icon_rect,
                    font,
                    color,
                    background: None,
                    max_lines: 1,
                    wrap: false,
                });
            }
        }

        if let Some(text) = self.props.text.as_deref().filter(|s| !s.is_empty()) {
            let font = &self.props.font;
            if let Some(color) = text_color(&font.color) {
                let mut rect = self.text_rect;
                rect.translate(Vec2::new(self.props.text_offset_x, self.props.text_offset_y));
                ctx.text(&TextRun {
                    text: text.to_string(),
                    rect,
                    font: font.clone(),
                    color,
                    background: font.background.as_deref().and_then(draw::parse_color),
                    max_lines: self.props.text_max_line,
                    wrap: self.props.white_space.as_deref() != Some("nowrap"),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Direction;

    fn registry() -> ShapeRegistry {
        ShapeRegistry::with_builtins()
    }

    fn node(x: f64, y: f64, w: f64, h: f64) -> Node {
        let mut n = Node::new("rectangle", Rect::new(x, y, w, h));
        n.init(&registry());
        n
    }

    #[test]
    fn test_default_anchors() {
        let n = node(0.0, 0.0, 100.0, 100.0);
        let dirs: Vec<_> = n.rotated_anchors.iter().map(|a| (a.x, a.y, a.direction)).collect();
        assert_eq!(
            dirs,
            vec![
                (0.0, 50.0, Direction::Left),
                (50.0, 0.0, Direction::Up),
                (100.0, 50.0, Direction::Right),
                (50.0, 100.0, Direction::Bottom),
            ]
        );
    }

    #[test]
    fn test_rotated_anchors_follow_rotation() {
        let mut n = node(0.0, 0.0, 100.0, 100.0);
        n.props.rotate = 90.0;
        n.calc_rotate_anchors(None);
        // The left anchor swings to the top.
        assert!((n.rotated_anchors[0].x - 50.0).abs() < 1e-9);
        assert!((n.rotated_anchors[0].y - 0.0).abs() < 1e-9);
        // Unrotated anchors are untouched.
        assert_eq!(n.anchors[0].pos(), kurbo::Point::new(0.0, 50.0));
    }

    #[test]
    fn test_padding_percent() {
        let mut n = Node::new("rectangle", Rect::new(0.0, 0.0, 200.0, 100.0));
        n.padding_left = Length::Text("10%".into());
        n.padding_top = Length::Px(5.0);
        n.init(&registry());
        assert_eq!(n.padding.left, 20.0);
        assert_eq!(n.padding.top, 5.0);
        assert_eq!(n.text_rect, Rect::new(20.0, 5.0, 180.0, 95.0));
    }

    #[test]
    fn test_translate_moves_everything() {
        let mut n = node(0.0, 0.0, 100.0, 100.0);
        n.children.push(Pen::Node(node(10.0, 10.0, 20.0, 20.0)));
        n.translate(Vec2::new(5.0, -5.0));
        assert_eq!(n.props.rect, Rect::new(5.0, -5.0, 100.0, 100.0));
        assert_eq!(n.rotated_anchors[2].pos(), kurbo::Point::new(105.0, 45.0));
        assert_eq!(n.children[0].props().rect, Rect::new(15.0, 5.0, 20.0, 20.0));
    }

    #[test]
    fn test_scale_carries_font_and_children() {
        let reg = registry();
        let mut n = node(0.0, 0.0, 100.0, 100.0);
        n.children.push(Pen::Node(node(50.0, 50.0, 10.0, 10.0)));
        n.scale(2.0, kurbo::Point::ZERO, &reg);
        assert_eq!(n.props.rect, Rect::new(0.0, 0.0, 200.0, 200.0));
        assert_eq!(n.props.font.font_size, 24.0);
        assert_eq!(n.children[0].props().rect, Rect::new(100.0, 100.0, 20.0, 20.0));
        assert_eq!(n.rotated_anchors[2].pos(), kurbo::Point::new(200.0, 100.0));
    }

    #[test]
    fn test_rect_in_parent_round_trip() {
        let reg = registry();
        let parent = node(100.0, 100.0, 200.0, 100.0);
        let mut child = node(150.0, 120.0, 50.0, 40.0);
        let frame = parent.frame();
        child.calc_rect_in_parent(&frame);
        let rip = child.props.rect_in_parent.clone().unwrap();
        assert_eq!(rip.x.resolve(200.0), 50.0);
        assert_eq!(rip.width.resolve(200.0), 50.0);

        child.props.rect = Rect::default();
        child.calc_rect_by_parent(&frame);
        child.init(&reg);
        let r = child.props.rect;
        assert!((r.x - 150.0).abs() < 1e-9 && (r.y - 120.0).abs() < 1e-9);
        assert!((r.width - 50.0).abs() < 1e-9 && (r.height - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotated_parent_moves_child_center() {
        let parent = node(0.0, 0.0, 100.0, 100.0);
        let mut child = node(0.0, 40.0, 20.0, 20.0);
        let mut frame = parent.frame();
        child.calc_rect_in_parent(&frame);
        frame.rotate = 90.0;
        child.calc_rect_by_parent(&frame);
        // Child center (10, 50) rotates to (50, 10) about (50, 50).
        let c = child.props.rect.center();
        assert!((c.x - 50.0).abs() < 1e-9 && (c.y - 10.0).abs() < 1e-9);
        assert_eq!(child.props.rotate, 90.0);
        // And back again.
        child.calc_rect_in_parent(&frame);
        assert_eq!(child.props.rect_in_parent.as_ref().unwrap().rotate, 0.0);
    }

    #[test]
    fn test_hit_in_self_rotated() {
        let mut n = node(0.0, 40.0, 100.0, 20.0);
        assert!(n.hit_in_self(kurbo::Point::new(95.0, 50.0), 0.0));
        n.props.rotate = 90.0;
        assert!(!n.hit_in_self(kurbo::Point::new(95.0, 50.0), 0.0));
        assert!(n.hit_in_self(kurbo::Point::new(50.0, 95.0), 0.0));
    }

    #[test]
    fn test_nearest_anchor() {
        let n = node(0.0, 0.0, 100.0, 100.0);
        assert_eq!(n.nearest_anchor(kurbo::Point::new(300.0, 40.0)), Some((2, Direction::Right)));
        assert_eq!(n.nearest_anchor(kurbo::Point::new(40.0, -300.0)), Some((1, Direction::Up)));
    }

    #[test]
    fn test_keyframes_interpolate_and_finish() {
        let reg = registry();
        let mut n = node(0.0, 0.0, 100.0, 100.0);
        let mut target = n.state_snapshot();
        target.props.rect = Rect::new(100.0, 0.0, 100.0, 100.0);
        n.animate_frames.push(AnimateFrame {
            duration: 1000.0,
            linear: true,
            state: Box::new(target),
            ..Default::default()
        });
        n.props.animate_cycle = 1;
        n.props.animate_start = 1.0;

        let status = n.animate(501.0, &reg);
        assert_eq!(status, AnimateStatus::Running { rect_changed: true });
        assert!((n.props.rect.x - 50.0).abs() < 1e-9);
        assert!(n.animate_ready.is_some());

        assert_eq!(n.animate(1_200.0, &reg), AnimateStatus::Finished);
        assert_eq!(n.props.rect.x, 100.0);
        assert!(!n.props.is_playing());

        n.restore(None, &reg);
        assert_eq!(n.props.rect.x, 0.0);
    }

    #[test]
    fn test_keyframes_loop_forever_with_zero_cycle() {
        let reg = registry();
        let mut n = node(0.0, 0.0, 10.0, 10.0);
        n.animate_frames.push(AnimateFrame {
            duration: 100.0,
            state: Box::new(n.state_snapshot()),
            ..Default::default()
        });
        n.props.animate_start = 1.0;
        for t in [50.0, 150.0, 260.0, 1_000.0] {
            assert!(matches!(n.animate(t, &reg), AnimateStatus::Running { .. }));
        }
    }

    #[test]
    fn test_legacy_parent_rect() {
        let json = r#"{"id": "p", "name": "combine", "rect": {"x": 0, "y": 0, "width": 100, "height": 100},
            "children": [{"id": "c", "name": "rectangle", "parentRect": {"offsetX": 0.5, "offsetY": 0.25, "width": 0.5, "height": 0.5, "marginX": 2, "marginY": 3}}]}"#;
        let mut n: Node = serde_json::from_str(json).unwrap();
        n.normalize_legacy();
        let child = n.children[0].as_node().unwrap();
        let rip = child.props.rect_in_parent.as_ref().unwrap();
        assert_eq!(rip.x.resolve(100.0), 50.0);
        assert_eq!(rip.y.resolve(100.0), 25.0);
        assert_eq!(child.padding_left, Length::Px(2.0));
        assert_eq!(child.props.parent_id.as_deref(), Some("p"));
    }

    #[test]
    fn test_image_pending_until_loaded() {
        let mut n = Node::new("image", Rect::new(0.0, 0.0, 100.0, 50.0));
        n.image = Some("a.png".into());
        n.init(&registry());
        assert_eq!(n.media, MediaState::Pending);
        n.media = MediaState::Ready { width: 200.0, height: 200.0 };
        let r = n.image_rect();
        assert_eq!(r.width, r.height);
    }

    #[test]
    fn test_needs_overlay() {
        let mut n = node(0.0, 0.0, 10.0, 10.0);
        assert!(!n.needs_overlay());
        n.video = Some("clip.mp4".into());
        assert!(n.needs_overlay());
    }
}
