//! Vello renderer implementation.

use std::collections::HashMap;
use std::sync::Arc;

use kurbo::{Affine, BezPath, Rect, Shape as _, Stroke};
use parley::layout::PositionedLayoutItem;
use parley::{FontContext, LayoutContext, StyleProperty};
use peniko::{Brush, Color, Fill, Gradient};
use topograph_core::draw::{Paint, Painter, TextRun};
use topograph_core::geometry;
use vello::Scene;

use crate::images::ImageCache;
use crate::layers::Layers;
use crate::renderer::{RenderContext, Renderer};

/// Vello-based renderer for GPU-accelerated 2D graphics.
pub struct VelloRenderer {
    /// The Vello scene being built.
    scene: Scene,
    layers: Layers,
    images: ImageCache,
    /// Font context for text rendering (system fonts).
    font_cx: FontContext,
    layout_cx: LayoutContext<Brush>,
    /// Decoded images keyed by source, so frames don't re-decode.
    decoded: HashMap<String, peniko::ImageData>,
}

impl Default for VelloRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl VelloRenderer {
    pub fn new() -> Self {
        Self {
            scene: Scene::new(),
            layers: Layers::new(),
            images: ImageCache::new(),
            font_cx: FontContext::new(),
            layout_cx: LayoutContext::new(),
            decoded: HashMap::new(),
        }
    }

    /// Get the built scene for rendering.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take ownership of the scene (resets internal scene).
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    /// Images are loaded through here; see [`ImageCache::resolve_pending`].
    pub fn images_mut(&mut self) -> &mut ImageCache {
        &mut self.images
    }
}

impl Renderer for VelloRenderer {
    fn build_scene(&mut self, ctx: &RenderContext) {
        self.scene.reset();
        self.layers.update(ctx);
        let mut painter = VelloPainter {
            scene: &mut self.scene,
            font_cx: &mut self.font_cx,
            layout_cx: &mut self.layout_cx,
            decoded: &mut self.decoded,
            images: &self.images,
            transform: Affine::scale(ctx.scale_factor),
            alpha: 1.0,
            stack: Vec::new(),
        };
        self.layers.composite(&mut painter);
    }
}

/// Painter writing into a Vello scene.
struct VelloPainter<'a> {
    scene: &'a mut Scene,
    font_cx: &'a mut FontContext,
    layout_cx: &'a mut LayoutContext<Brush>,
    decoded: &'a mut HashMap<String, peniko::ImageData>,
    images: &'a ImageCache,
    transform: Affine,
    alpha: f64,
    stack: Vec<(Affine, f64)>,
}

impl VelloPainter<'_> {
    fn fade(&self, color: Color) -> Color {
        if self.alpha >= 1.0 {
            color
        } else {
            color.multiply_alpha(self.alpha as f32)
        }
    }

    fn brush(&self, paint: &Paint) -> Brush {
        match paint {
            Paint::Solid(color) => Brush::Solid(self.fade(*color)),
            Paint::Linear { start, end, from, to } => Brush::Gradient(
                Gradient::new_linear(*start, *end).with_stops([self.fade(*from), self.fade(*to)]),
            ),
            Paint::Radial { center, radius, from, to } => Brush::Gradient(
                Gradient::new_radial(*center, *radius as f32).with_stops([self.fade(*from), self.fade(*to)]),
            ),
        }
    }

    fn image_data(&mut self, source: &str) -> Option<peniko::ImageData> {
        if let Some(data) = self.decoded.get(source) {
            return Some(data.clone());
        }
        let rgba = match self.images.get(source)?.decode() {
            Ok(rgba) => rgba,
            Err(err) => {
                log::warn!("{}", err);
                return None;
            }
        };
        let (width, height) = rgba.dimensions();
        let data = peniko::ImageData {
            data: peniko::Blob::new(Arc::new(rgba.into_vec())),
            format: peniko::ImageFormat::Rgba8,
            width,
            height,
            alpha_type: peniko::ImageAlphaType::Alpha,
        };
        self.decoded.insert(source.to_string(), data.clone());
        Some(data)
    }
}

impl Painter for VelloPainter<'_> {
    fn save(&mut self) {
        self.stack.push((self.transform, self.alpha));
    }

    fn restore(&mut self) {
        (self.transform, self.alpha) = self.stack.pop().unwrap_or((Affine::IDENTITY, 1.0));
    }

    fn transform(&mut self, affine: Affine) {
        self.transform *= affine;
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.alpha *= alpha.clamp(0.0, 1.0);
    }

    fn fill(&mut self, path: &BezPath, paint: &Paint) {
        let brush = self.brush(paint);
        self.scene.fill(Fill::NonZero, self.transform, &brush, None, path);
    }

    fn stroke(&mut self, path: &BezPath, style: &Stroke, paint: &Paint) {
        if style.width <= 0.0 {
            return;
        }
        let brush = self.brush(paint);
        self.scene.stroke(style, self.transform, &brush, None, path);
    }

    fn text(&mut self, run: &TextRun) {
        if run.text.trim().is_empty() {
            return;
        }
        let font = &run.font;
        let font_size = if font.font_size > 0.0 { font.font_size } else { 12.0 } as f32;
        let brush = Brush::Solid(self.fade(run.color));
        let weight = match font.font_weight.as_str() {
            "bold" | "bolder" | "600" | "700" | "800" | "900" => parley::FontWeight::BOLD,
            "lighter" | "100" | "200" | "300" => parley::FontWeight::LIGHT,
            _ => parley::FontWeight::NORMAL,
        };

        let mut builder = self.layout_cx.ranged_builder(self.font_cx, &run.text, 1.0, false);
        builder.push_default(StyleProperty::FontSize(font_size));
        builder.push_default(StyleProperty::Brush(brush.clone()));
        builder.push_default(StyleProperty::FontWeight(weight));
        builder.push_default(StyleProperty::LineHeight(font.line_height.max(1.0) as f32));
        builder.push_default(StyleProperty::FontStack(parley::FontStack::Source(
            font.font_family.clone().into(),
        )));
        if font.font_style == "italic" {
            builder.push_default(StyleProperty::FontStyle(parley::FontStyle::Italic));
        }
        let mut layout = builder.build(&run.text);

        let max_width = (run.wrap && run.rect.width > 0.0).then_some(run.rect.width as f32);
        layout.break_all_lines(max_width);
        layout.align(None, parley::Alignment::Start, parley::AlignmentOptions::default());

        let line_count = match run.max_lines {
            0 => layout.len(),
            n => layout.len().min(n as usize),
        };
        let height: f64 = layout.lines().take(line_count).map(|line| line.metrics().line_height as f64).sum();
        let top = match font.text_baseline.as_str() {
            "top" => run.rect.y,
            "bottom" => run.rect.ey() - height,
            _ => run.rect.y + (run.rect.height - height) / 2.0,
        };

        if let Some(bk) = run.background {
            let width = layout.width() as f64;
            let rect = Rect::new(run.rect.x, top, run.rect.x + width.max(run.rect.width), top + height);
            let bk = self.fade(bk);
            self.scene.fill(Fill::NonZero, self.transform, bk, None, &rect.to_path(0.1));
        }

        for line in layout.lines().take(line_count) {
            let advance = line.metrics().advance as f64;
            let dx = match font.text_align.as_str() {
                "left" | "start" => 0.0,
                "right" | "end" => run.rect.width - advance,
                _ => (run.rect.width - advance) / 2.0,
            };
            let line_transform = self.transform * Affine::translate((run.rect.x + dx, top));
            for item in line.items() {
                let PositionedLayoutItem::GlyphRun(glyph_run) = item else {
                    continue;
                };
                let mut x = glyph_run.offset();
                let y = glyph_run.baseline();
                let parley_run = glyph_run.run();
                let synthesis = parley_run.synthesis();
                let glyph_xform = synthesis
                    .skew()
                    .map(|angle| Affine::skew(angle.to_radians().tan() as f64, 0.0));
                let glyphs: Vec<vello::Glyph> = glyph_run
                    .glyphs()
                    .map(|glyph| {
                        let gx = x + glyph.x;
                        let gy = y - glyph.y;
                        x += glyph.advance;
                        vello::Glyph { id: glyph.id, x: gx, y: gy }
                    })
                    .collect();
                if !glyphs.is_empty() {
                    self.scene
                        .draw_glyphs(parley_run.font())
                        .brush(&brush)
                        .hint(true)
                        .transform(line_transform)
                        .glyph_transform(glyph_xform)
                        .font_size(parley_run.font_size())
                        .normalized_coords(parley_run.normalized_coords())
                        .draw(Fill::NonZero, glyphs.into_iter());
                }
            }
        }
    }

    fn image(&mut self, source: &str, rect: geometry::Rect) {
        let Some(data) = self.image_data(source) else {
            return;
        };
        if data.width == 0 || data.height == 0 {
            return;
        }
        let scale_x = rect.width / data.width as f64;
        let scale_y = rect.height / data.height as f64;
        let image_transform =
            self.transform * Affine::translate((rect.x, rect.y)) * Affine::scale_non_uniform(scale_x, scale_y);
        self.scene.draw_image(&data.into(), image_transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topograph_core::Scene as Diagram;
    use topograph_core::pen::Node;

    #[test]
    fn test_renderer_creation() {
        let renderer = VelloRenderer::new();
        assert!(renderer.scene().encoding().is_empty());
    }

    #[test]
    fn test_build_scene_with_pens() {
        let mut renderer = VelloRenderer::new();
        let mut diagram = Diagram::default();
        diagram.add_node(
            Node::new("rectangle", geometry::Rect::new(100.0, 100.0, 200.0, 150.0)).with_text("hello"),
            false,
        );
        let ctx = RenderContext::new(&diagram).with_viewport(kurbo::Size::new(800.0, 600.0));
        renderer.build_scene(&ctx);
        assert!(!renderer.scene().encoding().is_empty());
        assert!(!renderer.layers().layer(crate::layers::LayerKind::Offscreen).is_empty());
    }
}
