//! CPU rasterizer: painter calls become an SVG document, which resvg
//! renders into a pixmap. Text is laid out here and shaped by resvg with
//! the system fonts.

use std::fmt::Write as _;

use image::RgbaImage;
use kurbo::{Affine, BezPath, Cap, Join, Stroke};
use peniko::Color;
use resvg::{tiny_skia, usvg};
use topograph_core::draw::{Paint, Painter, TextRun};
use topograph_core::geometry::Rect;

use crate::display_list::DisplayList;
use crate::images::ImageCache;
use crate::renderer::{RenderResult, RendererError};

#[derive(Debug, Clone, Copy)]
struct State {
    transform: Affine,
    alpha: f64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
        }
    }
}

/// Painter that writes SVG markup.
pub struct SvgPainter<'a> {
    width: f64,
    height: f64,
    images: Option<&'a ImageCache>,
    defs: String,
    body: String,
    gradients: usize,
    state: State,
    stack: Vec<State>,
}

impl<'a> SvgPainter<'a> {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            images: None,
            defs: String::new(),
            body: String::new(),
            gradients: 0,
            state: State::default(),
            stack: Vec::new(),
        }
    }

    /// Resolve image sources through `images`; unknown sources are skipped.
    pub fn with_images(mut self, images: &'a ImageCache) -> Self {
        self.images = Some(images);
        self
    }

    /// The finished document.
    pub fn finish(self) -> String {
        let mut out = String::with_capacity(self.defs.len() + self.body.len() + 256);
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = num(self.width),
            h = num(self.height),
        );
        if !self.defs.is_empty() {
            out.push_str("<defs>");
            out.push_str(&self.defs);
            out.push_str("</defs>");
        }
        out.push_str(&self.body);
        out.push_str("</svg>");
        out
    }

    fn transform_attr(&self) -> String {
        let t = self.state.transform;
        if t == Affine::IDENTITY {
            return String::new();
        }
        let [a, b, c, d, e, f] = t.as_coeffs();
        format!(
            r#" transform="matrix({} {} {} {} {} {})""#,
            num(a),
            num(b),
            num(c),
            num(d),
            num(e),
            num(f)
        )
    }

    /// `(paint, opacity)` attribute values for `paint`.
    fn paint_ref(&mut self, paint: &Paint) -> (String, f64) {
        match paint {
            Paint::Solid(color) => {
                let (rgb, a) = rgb(*color);
                (rgb, a * self.state.alpha)
            }
            Paint::Linear { start, end, from, to } => {
                let id = self.next_gradient();
                let _ = write!(
                    self.defs,
                    r#"<linearGradient id="{id}" gradientUnits="userSpaceOnUse" x1="{}" y1="{}" x2="{}" y2="{}">{}</linearGradient>"#,
                    num(start.x),
                    num(start.y),
                    num(end.x),
                    num(end.y),
                    stops(*from, *to),
                );
                (format!("url(#{id})"), self.state.alpha)
            }
            Paint::Radial { center, radius, from, to } => {
                let id = self.next_gradient();
                let _ = write!(
                    self.defs,
                    r#"<radialGradient id="{id}" gradientUnits="userSpaceOnUse" cx="{}" cy="{}" r="{}">{}</radialGradient>"#,
                    num(center.x),
                    num(center.y),
                    num(*radius),
                    stops(*from, *to),
                );
                (format!("url(#{id})"), self.state.alpha)
            }
        }
    }

    fn next_gradient(&mut self) -> String {
        self.gradients += 1;
        format!("g{}", self.gradients)
    }

    fn text_block(&mut self, run: &TextRun) {
        let font = &run.font;
        let size = if font.font_size > 0.0 { font.font_size } else { 12.0 };
        let line_px = font.line_px().max(size);
        let mut lines = layout_lines(&run.text, size, run.rect.width, run.wrap);
        if run.max_lines > 0 && lines.len() > run.max_lines as usize {
            lines.truncate(run.max_lines as usize);
            if let Some(last) = lines.last_mut() {
                last.push('…');
            }
        }
        if lines.is_empty() {
            return;
        }
        let total = lines.len() as f64 * line_px;
        let top = match font.text_baseline.as_str() {
            "top" => run.rect.y,
            "bottom" => run.rect.ey() - total,
            _ => run.rect.y + (run.rect.height - total) / 2.0,
        };
        let (x, anchor) = match font.text_align.as_str() {
            "left" | "start" => (run.rect.x, "start"),
            "right" | "end" => (run.rect.ex(), "end"),
            _ => (run.rect.x + run.rect.width / 2.0, "middle"),
        };
        let transform = self.transform_attr();

        if let Some(bk) = run.background {
            let width = lines.iter().map(|l| estimate_width(l, size)).fold(0.0, f64::max);
            let left = match anchor {
                "start" => x,
                "end" => x - width,
                _ => x - width / 2.0,
            };
            let (fill, a) = rgb(bk);
            let _ = write!(
                self.body,
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{fill}" fill-opacity="{}"{transform}/>"#,
                num(left),
                num(top),
                num(width),
                num(total),
                num(a * self.state.alpha),
            );
        }

        let (fill, a) = rgb(run.color);
        let _ = write!(
            self.body,
            r#"<text font-family="{}" font-size="{}" font-weight="{}" font-style="{}" text-anchor="{anchor}" dominant-baseline="central" fill="{fill}" fill-opacity="{}"{transform}>"#,
            escape_xml(&font.font_family),
            num(size),
            escape_xml(&font.font_weight),
            escape_xml(&font.font_style),
            num(a * self.state.alpha),
        );
        for (i, line) in lines.iter().enumerate() {
            let y = top + i as f64 * line_px + line_px / 2.0;
            let _ = write!(
                self.body,
                r#"<tspan x="{}" y="{}">{}</tspan>"#,
                num(x),
                num(y),
                escape_xml(line)
            );
        }
        self.body.push_str("</text>");
    }
}

impl Painter for SvgPainter<'_> {
    fn save(&mut self) {
        self.stack.push(self.state);
    }

    fn restore(&mut self) {
        self.state = self.stack.pop().unwrap_or_default();
    }

    fn transform(&mut self, affine: Affine) {
        self.state.transform *= affine;
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.state.alpha *= alpha.clamp(0.0, 1.0);
    }

    fn fill(&mut self, path: &BezPath, paint: &Paint) {
        let (fill, opacity) = self.paint_ref(paint);
        let transform = self.transform_attr();
        let _ = write!(
            self.body,
            r#"<path d="{}" fill="{fill}" fill-opacity="{}"{transform}/>"#,
            path.to_svg(),
            num(opacity),
        );
    }

    fn stroke(&mut self, path: &BezPath, style: &Stroke, paint: &Paint) {
        if style.width <= 0.0 {
            return;
        }
        let (stroke, opacity) = self.paint_ref(paint);
        let transform = self.transform_attr();
        let mut attrs = format!(
            r#" stroke-width="{}" stroke-linecap="{}" stroke-linejoin="{}" stroke-miterlimit="{}""#,
            num(style.width),
            cap_name(style.start_cap),
            join_name(style.join),
            num(style.miter_limit),
        );
        if !style.dash_pattern.is_empty() {
            let dashes: Vec<String> = style.dash_pattern.iter().map(|d| num(*d)).collect();
            let _ = write!(
                attrs,
                r#" stroke-dasharray="{}" stroke-dashoffset="{}""#,
                dashes.join(" "),
                num(style.dash_offset)
            );
        }
        let _ = write!(
            self.body,
            r#"<path d="{}" fill="none" stroke="{stroke}" stroke-opacity="{}"{attrs}{transform}/>"#,
            path.to_svg(),
            num(opacity),
        );
    }

    fn text(&mut self, run: &TextRun) {
        if run.text.trim().is_empty() {
            return;
        }
        self.text_block(run);
    }

    fn image(&mut self, source: &str, rect: Rect) {
        let Some(image) = self.images.and_then(|images| images.get(source)) else {
            log::debug!("Skipping image not in cache");
            return;
        };
        let transform = self.transform_attr();
        let _ = write!(
            self.body,
            r#"<image href="{}" x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="none" opacity="{}"{transform}/>"#,
            image.data_url(),
            num(rect.x),
            num(rect.y),
            num(rect.width),
            num(rect.height),
            num(self.state.alpha),
        );
    }
}

/// Render `list` onto a `width` x `height` canvas, scaled by `scale`.
pub fn rasterize(
    list: &DisplayList,
    width: f64,
    height: f64,
    scale: f64,
    images: &ImageCache,
) -> RenderResult<RgbaImage> {
    let mut painter = SvgPainter::new(width, height).with_images(images);
    list.replay(&mut painter);
    rasterize_svg(&painter.finish(), scale)
}

/// Render an SVG document with resvg.
pub fn rasterize_svg(svg: &str, scale: f64) -> RenderResult<RgbaImage> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(RendererError::RenderFailed(format!("invalid scale {}", scale)));
    }
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = usvg::Tree::from_str(svg, &options).map_err(|e| RendererError::RenderFailed(e.to_string()))?;

    let size = tree.size();
    let width = (size.width() as f64 * scale).ceil();
    let height = (size.height() as f64 * scale).ceil();
    if width < 1.0 || height < 1.0 || width > u32::MAX as f64 || height > u32::MAX as f64 {
        return Err(RendererError::RenderFailed(format!("cannot render a {}x{} image", width, height)));
    }
    let (width, height) = (width as u32, height as u32);
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| RendererError::InitFailed(format!("failed to allocate {}x{} surface", width, height)))?;
    let transform = tiny_skia::Transform::from_scale(scale as f32, scale as f32);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut out = RgbaImage::new(width, height);
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(out)
}

/// Split `text` into lines, greedily wrapping at `max_width` when `wrap`.
fn layout_lines(text: &str, size: f64, max_width: f64, wrap: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for para in text.split('\n') {
        if !wrap || max_width <= 0.0 {
            lines.push(para.to_string());
            continue;
        }
        let mut line = String::new();
        let mut width = 0.0;
        for ch in para.chars() {
            let w = char_width(ch, size);
            if width + w > max_width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                width = 0.0;
            }
            line.push(ch);
            width += w;
        }
        lines.push(line);
    }
    lines
}

/// Rough advance of `ch`: wide scripts take a full em.
fn char_width(ch: char, size: f64) -> f64 {
    if ch as u32 >= 0x2E80 { size } else { size * 0.6 }
}

fn estimate_width(line: &str, size: f64) -> f64 {
    line.chars().map(|c| char_width(c, size)).sum()
}

fn rgb(color: Color) -> (String, f64) {
    let c = color.to_rgba8();
    (format!("rgb({},{},{})", c.r, c.g, c.b), c.a as f64 / 255.0)
}

fn stops(from: Color, to: Color) -> String {
    let (a, a_alpha) = rgb(from);
    let (b, b_alpha) = rgb(to);
    format!(
        r#"<stop offset="0" stop-color="{a}" stop-opacity="{}"/><stop offset="1" stop-color="{b}" stop-opacity="{}"/>"#,
        num(a_alpha),
        num(b_alpha)
    )
}

fn cap_name(cap: Cap) -> &'static str {
    match cap {
        Cap::Butt => "butt",
        Cap::Round => "round",
        Cap::Square => "square",
    }
}

fn join_name(join: Join) -> &'static str {
    match join {
        Join::Bevel => "bevel",
        Join::Miter => "miter",
        Join::Round => "round",
    }
}

/// Compact number formatting for attributes.
fn num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{:.3}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
