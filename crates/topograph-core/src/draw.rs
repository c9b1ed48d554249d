//! The drawing context shapes render into.
//!
//! Pens never talk to a concrete graphics backend. They describe paths,
//! paints, text runs and images through [`Painter`]; the render crate
//! provides a display-list painter and a CPU rasterizer, and hosts can
//! plug their own.

use kurbo::{Affine, BezPath, Cap, Join, Stroke};
use peniko::Color;

use crate::geometry::Rect;
use crate::pen::Font;

/// How a path is filled or stroked.
#[derive(Debug, Clone)]
pub enum Paint {
    Solid(Color),
    Linear {
        start: kurbo::Point,
        end: kurbo::Point,
        from: Color,
        to: Color,
    },
    Radial {
        center: kurbo::Point,
        radius: f64,
        from: Color,
        to: Color,
    },
}

impl Paint {
    /// Color used by backends that cannot draw gradients.
    pub fn average(&self) -> Color {
        match self {
            Paint::Solid(color) => *color,
            Paint::Linear { from, to, .. } | Paint::Radial { from, to, .. } => lerp_color(*from, *to, 0.5),
        }
    }

    /// Color at `pt` in user space.
    pub fn color_at(&self, pt: kurbo::Point) -> Color {
        match self {
            Paint::Solid(color) => *color,
            Paint::Linear { start, end, from, to } => {
                let axis = *end - *start;
                let len2 = axis.hypot2();
                let t = if len2 == 0.0 { 0.0 } else { (pt - *start).dot(axis) / len2 };
                lerp_color(*from, *to, t.clamp(0.0, 1.0))
            }
            Paint::Radial { center, radius, from, to } => {
                let t = if *radius <= 0.0 { 1.0 } else { pt.distance(*center) / radius };
                lerp_color(*from, *to, t.clamp(0.0, 1.0))
            }
        }
    }
}

/// Stroke and fill resolved from a pen's style fields.
#[derive(Debug, Clone)]
pub struct PenStyle {
    pub stroke: Option<Paint>,
    pub fill: Option<Paint>,
    pub stroke_style: Stroke,
}

impl Default for PenStyle {
    fn default() -> Self {
        Self {
            stroke: Some(Paint::Solid(Color::BLACK)),
            fill: None,
            stroke_style: Stroke::new(1.0),
        }
    }
}

impl PenStyle {
    /// Fill then stroke `path`.
    pub fn paint(&self, ctx: &mut dyn Painter, path: &BezPath) {
        if let Some(fill) = &self.fill {
            ctx.fill(path, fill);
        }
        self.outline(ctx, path);
    }

    /// Stroke `path` only.
    pub fn outline(&self, ctx: &mut dyn Painter, path: &BezPath) {
        if let Some(stroke) = &self.stroke {
            if self.stroke_style.width > 0.0 {
                ctx.stroke(path, &self.stroke_style, stroke);
            }
        }
    }
}

/// A block of text to lay out inside `rect`.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: String,
    pub rect: Rect,
    pub font: Font,
    pub color: Color,
    pub background: Option<Color>,
    /// Zero means unlimited.
    pub max_lines: u32,
    pub wrap: bool,
}

/// Backend-neutral 2D drawing context.
pub trait Painter {
    fn save(&mut self);
    fn restore(&mut self);
    /// Pre-multiply the current transform.
    fn transform(&mut self, affine: Affine);
    /// Multiply the current opacity.
    fn set_alpha(&mut self, alpha: f64);
    fn fill(&mut self, path: &BezPath, paint: &Paint);
    fn stroke(&mut self, path: &BezPath, style: &Stroke, paint: &Paint);
    fn text(&mut self, run: &TextRun);
    fn image(&mut self, source: &str, rect: Rect);
}

/// Painter that draws nothing. Useful for measuring and tests.
#[derive(Debug, Default)]
pub struct NullPainter;

impl Painter for NullPainter {
    fn save(&mut self) {}
    fn restore(&mut self) {}
    fn transform(&mut self, _affine: Affine) {}
    fn set_alpha(&mut self, _alpha: f64) {}
    fn fill(&mut self, _path: &BezPath, _paint: &Paint) {}
    fn stroke(&mut self, _path: &BezPath, _style: &Stroke, _paint: &Paint) {}
    fn text(&mut self, _run: &TextRun) {}
    fn image(&mut self, _source: &str, _rect: Rect) {}
}

/// Dash presets selected by a pen's `dash` field.
pub fn dash_pattern(dash: u8) -> &'static [f64] {
    match dash {
        1 => &[5.0, 5.0],
        2 => &[10.0, 10.0],
        3 => &[10.0, 10.0, 2.0, 10.0],
        _ => &[],
    }
}

pub fn parse_cap(cap: Option<&str>) -> Cap {
    match cap {
        Some("round") => Cap::Round,
        Some("square") => Cap::Square,
        _ => Cap::Butt,
    }
}

pub fn parse_join(join: Option<&str>) -> Join {
    match join {
        Some("round") => Join::Round,
        Some("bevel") => Join::Bevel,
        _ => Join::Miter,
    }
}

/// Parse a CSS color: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb()`,
/// `rgba()` or a handful of common names.
///
/// Returns `None` for empty or unknown strings, which callers treat as
/// "don't paint".
pub fn parse_color(input: &str) -> Option<Color> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(hex) = s.strip_prefix('#') {
        let digit = |i: usize, len: usize| u8::from_str_radix(hex.get(i..i + len)?, 16).ok();
        return match hex.len() {
            3 | 4 => {
                let a = if hex.len() == 4 { digit(3, 1)? * 17 } else { 255 };
                Some(Color::from_rgba8(digit(0, 1)? * 17, digit(1, 1)? * 17, digit(2, 1)? * 17, a))
            }
            6 | 8 => {
                let a = if hex.len() == 8 { digit(6, 2)? } else { 255 };
                Some(Color::from_rgba8(digit(0, 2)?, digit(2, 2)?, digit(4, 2)?, a))
            }
            _ => None,
        };
    }
    let lower = s.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = |p: &str| p.parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
        let alpha = match parts.get(3) {
            Some(a) => (a.parse::<f64>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
            None => 255,
        };
        return Some(Color::from_rgba8(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha));
    }
    let named = match lower.as_str() {
        "transparent" => Color::from_rgba8(0, 0, 0, 0),
        "black" => Color::from_rgba8(0, 0, 0, 255),
        "white" => Color::from_rgba8(255, 255, 255, 255),
        "red" => Color::from_rgba8(255, 0, 0, 255),
        "green" => Color::from_rgba8(0, 128, 0, 255),
        "blue" => Color::from_rgba8(0, 0, 255, 255),
        "yellow" => Color::from_rgba8(255, 255, 0, 255),
        "gray" | "grey" => Color::from_rgba8(128, 128, 128, 255),
        "orange" => Color::from_rgba8(255, 165, 0, 255),
        _ => return None,
    };
    Some(named)
}

/// Same color with its alpha multiplied by `factor`.
pub fn fade(color: Color, factor: f64) -> Color {
    let rgba = color.to_rgba8();
    let a = (rgba.a as f64 * factor.clamp(0.0, 1.0)).round() as u8;
    Color::from_rgba8(rgba.r, rgba.g, rgba.b, a)
}

pub fn is_transparent(color: Color) -> bool {
    color.to_rgba8().a == 0
}

fn lerp_color(a: Color, b: Color, t: f64) -> Color {
    let (a, b) = (a.to_rgba8(), b.to_rgba8());
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    Color::from_rgba8(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b), mix(a.a, b.a))
}
