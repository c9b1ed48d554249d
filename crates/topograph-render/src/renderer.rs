//! Renderer trait abstraction.

use kurbo::Size;
use peniko::Color;
use thiserror::Error;
use topograph_core::Scene;
use topograph_core::draw::parse_color;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("Image decode failed for {source_name}: {reason}")]
    ImageDecode { source_name: String, reason: String },
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Context for a single render frame.
pub struct RenderContext<'a> {
    /// The diagram to render.
    pub scene: &'a Scene,
    /// Viewport size in logical pixels.
    pub viewport_size: Size,
    /// Device pixel ratio (for HiDPI).
    pub scale_factor: f64,
    /// Background color, when neither the diagram nor the options set one.
    pub background_color: Option<Color>,
}

impl<'a> RenderContext<'a> {
    /// A context covering the scene's own view size.
    pub fn new(scene: &'a Scene) -> Self {
        let (width, height) = scene.size();
        Self {
            scene,
            viewport_size: Size::new(width, height),
            scale_factor: 1.0,
            background_color: None,
        }
    }

    /// Set the scale factor for HiDPI.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Set the viewport size.
    pub fn with_viewport(mut self, size: Size) -> Self {
        self.viewport_size = size;
        self
    }

    /// Set the fallback background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = Some(color);
        self
    }

    /// Diagram background, then options background, then the fallback.
    pub fn background(&self) -> Option<Color> {
        let data = self.scene.data();
        data.bk_color
            .as_deref()
            .or(self.scene.options().bk_color.as_deref())
            .and_then(parse_color)
            .or(self.background_color)
    }
}

/// Trait for rendering backends.
///
/// A backend turns the composited layers of one frame into its own command
/// buffer: a display list, an SVG document or a Vello scene.
pub trait Renderer {
    /// Build the command buffer for a frame.
    fn build_scene(&mut self, ctx: &RenderContext);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_precedence() {
        let mut scene = Scene::default();
        let ctx = RenderContext::new(&scene).with_background(Color::WHITE);
        assert_eq!(ctx.background().map(|c| c.to_rgba8().r), Some(255));

        scene.data_mut().bk_color = Some("#102030".to_string());
        let ctx = RenderContext::new(&scene).with_background(Color::WHITE);
        assert_eq!(ctx.background().map(|c| c.to_rgba8().g), Some(0x20));
    }

    #[test]
    fn test_error_messages() {
        let err = RendererError::ImageDecode {
            source_name: "a.png".to_string(),
            reason: "bad header".to_string(),
        };
        assert_eq!(err.to_string(), "Image decode failed for a.png: bad header");
    }
}
