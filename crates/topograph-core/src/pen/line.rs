//! Connectors between two points.

use std::cell::OnceCell;

use kurbo::{BezPath, Shape as _, Stroke, Vec2};
use serde::{Deserialize, Serialize};

use super::{AnimateStatus, ParentFrame, PenProps, RectInParent};
use crate::draw::{self, Paint, Painter, TextRun};
use crate::geometry::{Length, Point, Rect, bbox_of_points, point_in_line};
use crate::registry::{ArrowFill, ShapeRegistry};
use crate::serde_util::{is_false, is_zero, lenient, lenient_opt};

/// Milliseconds per animation step; line animations advance `animateSpan`
/// pixels per step, scaled by elapsed time.
const FRAME_MS: f64 = 1000.0 / 60.0;

/// Number of trailing dots drawn behind a comet.
const COMET_TAIL: usize = 30;

/// Which end of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
    From,
    To,
}

fn default_arrow_size() -> f64 {
    5.0
}

fn default_border_color() -> String {
    "#000000".to_string()
}

fn default_span() -> f64 {
    1.0
}

fn default_dot_size() -> f64 {
    3.0
}

/// A connector. `props.name` selects the route (`line`, `polyline`,
/// `curve`, `mind` or a registered custom route).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    #[serde(flatten)]
    pub props: PenProps,
    #[serde(default)]
    pub from: Point,
    #[serde(default)]
    pub to: Point,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Vec::is_empty")]
    pub control_points: Vec<Point>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "String::is_empty")]
    pub from_arrow: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "String::is_empty")]
    pub to_arrow: String,
    #[serde(default = "default_arrow_size", deserialize_with = "lenient")]
    pub from_arrow_size: f64,
    #[serde(default = "default_arrow_size", deserialize_with = "lenient")]
    pub to_arrow_size: f64,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub from_arrow_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub to_arrow_color: Option<String>,
    /// Route length cached when an animation starts.
    #[serde(skip)]
    pub length: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub border_width: f64,
    #[serde(default = "default_border_color", deserialize_with = "lenient")]
    pub border_color: String,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub animate_color: Option<String>,
    #[serde(default = "default_span", deserialize_with = "lenient")]
    pub animate_span: f64,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub animate_line_dash: Option<Vec<f64>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub animate_from_size: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero")]
    pub animate_to_size: f64,
    #[serde(default = "default_dot_size", deserialize_with = "lenient")]
    pub animate_dot_size: f64,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub line_join: Option<String>,
    /// Control points were edited by hand; keep them when the ends move.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub manual_cps: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub disable_empty_line: bool,

    /// Position of the travelling dot for `dot` and `comet` animations.
    #[serde(skip)]
    pub animate_dot: Option<Point>,
    #[serde(skip)]
    last_tick: f64,
    /// Flattened route, cached for hit-testing.
    #[serde(skip)]
    samples: OnceCell<Vec<kurbo::Point>>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            props: PenProps::default(),
            from: Point::default(),
            to: Point::default(),
            control_points: Vec::new(),
            from_arrow: String::new(),
            to_arrow: String::new(),
            from_arrow_size: default_arrow_size(),
            to_arrow_size: default_arrow_size(),
            from_arrow_color: None,
            to_arrow_color: None,
            length: 0.0,
            border_width: 0.0,
            border_color: default_border_color(),
            animate_color: None,
            animate_span: default_span(),
            animate_line_dash: None,
            animate_from_size: 0.0,
            animate_to_size: 0.0,
            animate_dot_size: default_dot_size(),
            line_join: None,
            manual_cps: false,
            disable_empty_line: false,
            animate_dot: None,
            last_tick: 0.0,
            samples: OnceCell::new(),
        }
    }
}

impl Line {
    pub fn new(name: impl Into<String>, from: Point, to: Point) -> Self {
        let mut line = Self::default();
        line.props.name = name.into();
        line.from = from;
        line.to = to;
        line
    }

    /// Drop cached route samples. Call after any routing-relevant edit.
    pub fn invalidate(&mut self) {
        self.samples = OnceCell::new();
    }

    pub fn end(&self, end: LineEnd) -> &Point {
        match end {
            LineEnd::From => &self.from,
            LineEnd::To => &self.to,
        }
    }

    pub fn end_mut(&mut self, end: LineEnd) -> &mut Point {
        self.invalidate();
        match end {
            LineEnd::From => &mut self.from,
            LineEnd::To => &mut self.to,
        }
    }

    /// Switch route, recomputing control points.
    pub fn set_route(&mut self, name: &str, registry: &ShapeRegistry) {
        self.props.name = name.to_string();
        self.calc_control_points(registry, true);
    }

    /// Recompute control points from the ends, unless they were edited by
    /// hand and `force` is not set.
    pub fn calc_control_points(&mut self, registry: &ShapeRegistry, force: bool) {
        if self.manual_cps && !force {
            self.invalidate();
            return;
        }
        let route = registry.route(&self.props.name);
        route.calc_control_points(self);
        self.invalidate();
    }

    pub fn path(&self, registry: &ShapeRegistry) -> BezPath {
        registry.route(&self.props.name).path(self)
    }

    /// Route flattened into a polyline.
    pub fn samples(&self, registry: &ShapeRegistry) -> &[kurbo::Point] {
        self.samples.get_or_init(|| {
            let path = self.path(registry);
            let mut points = Vec::new();
            kurbo::flatten(path.iter(), 0.5, |el| match el {
                kurbo::PathEl::MoveTo(p) | kurbo::PathEl::LineTo(p) => points.push(p),
                _ => {}
            });
            if points.is_empty() {
                points.push(self.from.pos());
                points.push(self.to.pos());
            }
            points
        })
    }

    /// Whether `pt` is on the route body.
    pub fn point_in(&self, pt: kurbo::Point, registry: &ShapeRegistry) -> bool {
        let samples = self.samples(registry);
        if samples.len() == 1 {
            return point_in_line(pt, samples[0], samples[0]);
        }
        samples.windows(2).any(|w| point_in_line(pt, w[0], w[1]))
    }

    pub fn bounds(&self, registry: &ShapeRegistry) -> Rect {
        let points: Vec<Point> = self.samples(registry).iter().map(|p| Point::from(*p)).collect();
        bbox_of_points(&points)
    }

    /// Route length, truncated to whole pixels.
    pub fn len(&self, registry: &ShapeRegistry) -> f64 {
        self.path(registry).perimeter(0.1).trunc()
    }

    /// Point `pos` pixels along the route from `from`.
    pub fn point_at(&self, pos: f64, registry: &ShapeRegistry) -> Point {
        let samples = self.samples(registry);
        let mut walked = 0.0;
        for w in samples.windows(2) {
            let seg = w[0].distance(w[1]);
            if seg > 0.0 && walked + seg >= pos {
                let t = ((pos - walked) / seg).clamp(0.0, 1.0);
                return Point::from(w[0].lerp(w[1], t));
            }
            walked += seg;
        }
        samples.last().map(|p| Point::from(*p)).unwrap_or_else(|| self.to.clone())
    }

    pub fn center(&self, registry: &ShapeRegistry) -> Point {
        registry.route(&self.props.name).center(self)
    }

    /// Box the line's text is laid out in, centered on the route.
    pub fn text_rect(&self, registry: &ShapeRegistry) -> Rect {
        let center = self.center(registry);
        let width = (self.from.x - self.to.x).abs().max(100.0);
        let lines = self.props.text.as_deref().map(|t| t.lines().count()).unwrap_or(1).max(1);
        let height = self.props.font.line_px() * lines as f64;
        Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn translate(&mut self, offset: Vec2) {
        self.from.translate(offset);
        self.to.translate(offset);
        for cp in self.control_points.iter_mut() {
            cp.translate(offset);
        }
        if let Some(dot) = self.animate_dot.as_mut() {
            dot.translate(offset);
        }
        self.invalidate();
    }

    pub fn scale(&mut self, scale: f64, center: kurbo::Point, registry: &ShapeRegistry) {
        self.from.scale(scale, center);
        self.to.scale(scale, center);
        for cp in self.control_points.iter_mut() {
            cp.scale(scale, center);
        }
        self.props.line_width *= scale;
        self.border_width *= scale;
        self.from_arrow_size *= scale;
        self.to_arrow_size *= scale;
        self.props.font.font_size *= scale;
        self.props.text_offset_x *= scale;
        self.props.text_offset_y *= scale;
        self.calc_control_points(registry, false);
    }

    /// Store both ends as percentages of `frame`: `x`/`y` for `from`,
    /// `width`/`height` for `to`.
    pub fn calc_rect_in_parent(&mut self, frame: &ParentFrame) {
        let origin = frame.origin();
        let center = frame.rect.center();
        let (w, h) = (frame.inner_width(), frame.inner_height());
        let pct = |value: f64, total: f64| if total == 0.0 { 0.0 } else { value / total * 100.0 };
        let local = |p: &Point| {
            let mut p = p.clone();
            p.rotate(-frame.rotate, center);
            p
        };
        let (from, to) = (local(&self.from), local(&self.to));
        self.props.rect_in_parent = Some(RectInParent {
            x: Length::percent(pct(from.x - origin.x, w)),
            y: Length::percent(pct(from.y - origin.y, h)),
            width: Length::percent(pct(to.x - origin.x, w)),
            height: Length::percent(pct(to.y - origin.y, h)),
            ..Default::default()
        });
    }

    pub fn calc_rect_by_parent(&mut self, frame: &ParentFrame, registry: &ShapeRegistry) {
        let Some(rip) = self.props.rect_in_parent.clone() else {
            return;
        };
        let origin = frame.origin();
        let center = frame.rect.center();
        let (w, h) = (frame.inner_width(), frame.inner_height());
        let old_from = self.from.pos();
        self.from.x = origin.x + rip.x.resolve(w);
        self.from.y = origin.y + rip.y.resolve(h);
        self.to.x = origin.x + rip.width.resolve(w);
        self.to.y = origin.y + rip.height.resolve(h);
        self.from.rotate(frame.rotate, center);
        self.to.rotate(frame.rotate, center);
        if self.manual_cps {
            let offset = self.from.pos() - old_from;
            for cp in self.control_points.iter_mut() {
                cp.translate(offset);
            }
        }
        self.calc_control_points(registry, false);
    }

    /// Advance a flow animation to wall-clock `now` (ms).
    pub fn animate(&mut self, now: f64, registry: &ShapeRegistry) -> AnimateStatus {
        if !self.props.is_playing() {
            return AnimateStatus::Idle;
        }
        if now < self.props.animate_start {
            return AnimateStatus::Running { rect_changed: false };
        }
        if self.props.animate_pos == 0.0 || self.length <= 0.0 {
            self.length = self.len(registry);
            self.last_tick = now;
        }
        let steps = ((now - self.last_tick) / FRAME_MS).max(1.0);
        self.last_tick = now;
        self.props.animate_pos += self.animate_span * steps;
        let pos = self.props.animate_pos;

        match self.props.animate_type.as_str() {
            "beads" => {
                let len = self.props.line_width.max(5.0);
                self.props.line_dash_offset = -pos;
                self.props.line_dash = Some(vec![len, len * 2.0]);
            }
            "dot" | "comet" => {
                self.animate_dot = Some(self.point_at(pos + self.animate_from_size, registry));
            }
            _ => {
                self.props.line_dash = Some(vec![pos, self.length - pos + 1.0]);
            }
        }

        if pos > self.length + self.animate_span - self.animate_from_size - self.animate_to_size {
            self.props.animate_cycle_index += 1;
            if self.props.animate_cycle > 0 && self.props.animate_cycle_index >= self.props.animate_cycle {
                self.props.animate_start = 0.0;
                self.props.animate_cycle_index = 0;
                self.props.animate_pos = 0.0;
                self.animate_dot = None;
                return AnimateStatus::Finished;
            }
            self.props.animate_pos = self.animate_span;
        }
        AnimateStatus::Running { rect_changed: false }
    }

    /// Trail of a comet animation with fading opacity, newest first.
    pub fn bubbles(&self, registry: &ShapeRegistry) -> Vec<(Point, f64)> {
        let pos = self.props.animate_pos;
        (0..COMET_TAIL)
            .map(|i| (i, pos - i as f64 * 2.0))
            .take_while(|(_, p)| *p > 0.0)
            .map(|(i, p)| (self.point_at(p, registry), 1.0 - i as f64 * 0.03))
            .collect()
    }

    fn stroke(&self) -> Stroke {
        Stroke::new(self.props.line_width)
            .with_caps(draw::parse_cap(self.props.line_cap.as_deref()))
            .with_join(draw::parse_join(self.line_join.as_deref()))
            .with_dashes(self.props.line_dash_offset, self.props.dash_pattern())
    }

    pub(crate) fn draw(&self, ctx: &mut dyn Painter, registry: &ShapeRegistry, default_color: &str) {
        let path = self.path(registry);
        if self.border_width > 0.0 {
            if let Some(color) = draw::parse_color(&self.border_color) {
                let border = Stroke::new(self.props.line_width + self.border_width * 2.0)
                    .with_join(draw::parse_join(self.line_join.as_deref()));
                ctx.stroke(&path, &border, &Paint::Solid(color));
            }
        }
        let style = self.props.style(default_color);
        let Some(paint) = style.stroke else {
            return;
        };
        ctx.stroke(&path, &self.stroke(), &paint);
        self.draw_arrows(ctx, registry, &paint);

        if let Some(text) = self.props.text.as_deref().filter(|t| !t.is_empty()) {
            let font = &self.props.font;
            let color = draw::parse_color(&font.color).unwrap_or(paint.average());
            let mut rect = self.text_rect(registry);
            rect.translate(Vec2::new(self.props.text_offset_x, self.props.text_offset_y));
            ctx.text(&TextRun {
                text: text.to_string(),
                rect,
                font: font.clone(),
                color,
                background: Some(font.background.as_deref().and_then(draw::parse_color).unwrap_or(peniko::Color::WHITE)),
                max_lines: self.props.text_max_line,
                wrap: false,
            });
        }
    }

    /// Draw the moving part of an animation on top of the persisted line.
    pub fn draw_animated(&self, ctx: &mut dyn Painter, registry: &ShapeRegistry, default_color: &str) {
        let color = self
            .animate_color
            .as_deref()
            .and_then(draw::parse_color)
            .or_else(|| draw::parse_color(default_color));
        let Some(color) = color else {
            return;
        };
        let paint = Paint::Solid(color);
        match self.props.animate_type.as_str() {
            "dot" => {
                if let Some(dot) = &self.animate_dot {
                    let circle = kurbo::Circle::new(dot.pos(), self.animate_dot_size);
                    ctx.fill(&circle.to_path(0.1), &paint);
                }
            }
            "comet" => {
                for (pt, alpha) in self.bubbles(registry) {
                    let circle = kurbo::Circle::new(pt.pos(), self.animate_dot_size);
                    ctx.fill(&circle.to_path(0.1), &Paint::Solid(draw::fade(color, alpha)));
                }
            }
            _ => {
                let path = self.path(registry);
                let mut stroke = self.stroke();
                if let Some(dash) = &self.animate_line_dash {
                    stroke = stroke.with_dashes(self.props.line_dash_offset, dash.iter().copied());
                }
                ctx.stroke(&path, &stroke, &paint);
            }
        }
    }

    fn draw_arrows(&self, ctx: &mut dyn Painter, registry: &ShapeRegistry, paint: &Paint) {
        let route = registry.route(&self.props.name);
        let ends = [
            (LineEnd::From, &self.from_arrow, self.from_arrow_size, &self.from_arrow_color),
            (LineEnd::To, &self.to_arrow, self.to_arrow_size, &self.to_arrow_color),
        ];
        for (end, kind, size, color) in ends {
            if kind.is_empty() {
                continue;
            }
            let Some(arrow) = registry.arrow(kind) else {
                continue;
            };
            let tip = self.end(end).pos();
            let tail = route.arrow_tail(self, end);
            let (path, fill) = arrow(tail, tip, size);
            let paint = color.as_deref().and_then(draw::parse_color).map(Paint::Solid).unwrap_or_else(|| paint.clone());
            let stroke = Stroke::new(self.props.line_width.max(1.0));
            match fill {
                ArrowFill::Solid => {
                    ctx.fill(&path, &paint);
                    ctx.stroke(&path, &stroke, &paint);
                }
                ArrowFill::Hollow => {
                    ctx.fill(&path, &Paint::Solid(peniko::Color::WHITE));
                    ctx.stroke(&path, &stroke, &paint);
                }
                ArrowFill::Open => ctx.stroke(&path, &stroke, &paint),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ShapeRegistry {
        ShapeRegistry::with_builtins()
    }

    #[test]
    fn test_straight_line_metrics() {
        let reg = registry();
        let line = Line::new("line", Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        assert_eq!(line.len(&reg), 100.0);
        assert_eq!(line.center(&reg).pos(), kurbo::Point::new(50.0, 0.0));
        assert_eq!(line.point_at(25.0, &reg).pos(), kurbo::Point::new(25.0, 0.0));
        assert!(line.point_in(kurbo::Point::new(60.0, 5.0), &reg));
        assert!(!line.point_in(kurbo::Point::new(60.0, 20.0), &reg));
    }

    #[test]
    fn test_cache_invalidated_on_translate() {
        let reg = registry();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        assert!(line.point_in(kurbo::Point::new(50.0, 0.0), &reg));
        line.translate(Vec2::new(0.0, 100.0));
        assert!(!line.point_in(kurbo::Point::new(50.0, 0.0), &reg));
        assert!(line.point_in(kurbo::Point::new(50.0, 100.0), &reg));
    }

    #[test]
    fn test_manual_cps_survive_recalc() {
        let reg = registry();
        let mut line = Line::new("polyline", Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        line.control_points = vec![Point::new(7.0, 7.0)];
        line.manual_cps = true;
        line.calc_control_points(&reg, false);
        assert_eq!(line.control_points, vec![Point::new(7.0, 7.0)]);
        line.calc_control_points(&reg, true);
        assert_ne!(line.control_points, vec![Point::new(7.0, 7.0)]);
    }

    #[test]
    fn test_text_rect_min_width() {
        let reg = registry();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(20.0, 0.0));
        line.props.text = Some("a\nb".into());
        let r = line.text_rect(&reg);
        assert_eq!(r.width, 100.0);
        assert_eq!(r.height, 36.0);
        assert_eq!(r.center(), kurbo::Point::new(10.0, 0.0));
    }

    #[test]
    fn test_scale_line_width_and_font() {
        let reg = registry();
        let mut line = Line::new("line", Point::new(10.0, 10.0), Point::new(20.0, 10.0));
        line.props.line_width = 2.0;
        line.scale(2.0, kurbo::Point::ZERO, &reg);
        assert_eq!(line.from.pos(), kurbo::Point::new(20.0, 20.0));
        assert_eq!(line.props.line_width, 4.0);
        assert_eq!(line.props.font.font_size, 24.0);
    }

    #[test]
    fn test_dash_flow_animation_ends_after_cycle() {
        let reg = registry();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        line.animate_span = 4.0;
        line.props.animate_cycle = 1;
        line.props.animate_start = 1.0;
        let mut now = 1.0;
        let mut status = AnimateStatus::Idle;
        for _ in 0..10 {
            now += FRAME_MS;
            status = line.animate(now, &reg);
            if status == AnimateStatus::Finished {
                break;
            }
            assert!(line.props.line_dash.is_some());
        }
        assert_eq!(status, AnimateStatus::Finished);
        assert!(!line.props.is_playing());
    }

    #[test]
    fn test_dot_animation_tracks_route() {
        let reg = registry();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        line.props.animate_type = "dot".into();
        line.props.animate_start = 1.0;
        line.animate(1.0, &reg);
        let dot = line.animate_dot.clone().unwrap();
        assert_eq!(dot.y, 0.0);
        assert!(dot.x > 0.0 && dot.x < 100.0);
    }

    #[test]
    fn test_comet_bubbles_fade() {
        let reg = registry();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        line.props.animate_pos = 80.0;
        let bubbles = line.bubbles(&reg);
        assert_eq!(bubbles.len(), COMET_TAIL);
        assert_eq!(bubbles[0].1, 1.0);
        assert!(bubbles[29].1 < bubbles[1].1);
    }

    #[test]
    fn test_rect_in_parent_round_trip() {
        let reg = registry();
        let frame = ParentFrame {
            rect: Rect::new(0.0, 0.0, 200.0, 100.0),
            ..Default::default()
        };
        let mut line = Line::new("line", Point::new(20.0, 10.0), Point::new(180.0, 90.0));
        line.calc_rect_in_parent(&frame);
        line.translate(Vec2::new(500.0, 500.0));
        line.calc_rect_by_parent(&frame, &reg);
        assert!((line.from.x - 20.0).abs() < 1e-9 && (line.to.y - 90.0).abs() < 1e-9);
    }
}
