//! Whole-diagram image export.

use std::io::Cursor;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use kurbo::{Affine, Shape as _};
use peniko::Color;
use topograph_core::Scene;
use topograph_core::draw::{Paint, Painter};
use topograph_core::geometry::Rect;

use crate::display_list::DisplayList;
use crate::images::ImageCache;
use crate::renderer::{RenderContext, RenderResult, RendererError};
use crate::svg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

impl ExportFormat {
    /// Format for a file name, by extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Space around the diagram: top, right, bottom, left.
    pub padding: [f64; 4],
    /// JPEG quality, 1 to 100.
    pub quality: u8,
    /// Output pixels per diagram unit.
    pub scale: f64,
    pub format: ExportFormat,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            padding: [0.0; 4],
            quality: 92,
            scale: 1.0,
            format: ExportFormat::Png,
        }
    }
}

impl ExportOptions {
    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = [padding; 4];
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// Record the export drawing of `scene`: background, background image and
/// every pen, translated so the padded diagram bounds start at the origin.
/// Returns the list and the canvas size.
pub fn export_display_list(scene: &Scene, options: &ExportOptions) -> RenderResult<(DisplayList, kurbo::Size)> {
    let rect = scene
        .get_rect()
        .ok_or_else(|| RendererError::RenderFailed("diagram is empty".to_string()))?;
    let [top, right, bottom, left] = options.padding;
    let width = rect.width + left + right;
    let height = rect.height + top + bottom;
    if width <= 0.0 || height <= 0.0 {
        return Err(RendererError::RenderFailed(format!("nothing to draw in {}x{}", width, height)));
    }

    let mut list = DisplayList::new();
    let canvas = kurbo::Rect::new(0.0, 0.0, width, height);
    if options.format == ExportFormat::Jpeg {
        list.fill(&canvas.to_path(0.1), &Paint::Solid(Color::WHITE));
    }
    if let Some(color) = RenderContext::new(scene).background() {
        list.fill(&canvas.to_path(0.1), &Paint::Solid(color));
    }
    let data = scene.data();
    if let Some(src) = data.bk_image.as_deref().filter(|s| !s.is_empty()) {
        list.image(src, Rect::new(0.0, 0.0, width, height));
    }

    list.save();
    list.transform(Affine::translate((left - rect.x, top - rect.y)));
    let registry = scene.registry();
    let color = &scene.options().color;
    for pen in scene.pens() {
        pen.render(&mut list, registry, color);
    }
    list.restore();
    Ok((list, kurbo::Size::new(width, height)))
}

/// Rasterize the whole diagram.
pub fn render_image(scene: &Scene, images: &ImageCache, options: &ExportOptions) -> RenderResult<RgbaImage> {
    let (list, size) = export_display_list(scene, options)?;
    svg::rasterize(&list, size.width, size.height, options.scale, images)
}

/// Encode pixels as PNG or JPEG. JPEG drops the alpha channel.
pub fn encode(image: &RgbaImage, format: ExportFormat, quality: u8) -> RenderResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let (width, height) = image.dimensions();
    match format {
        ExportFormat::Png => PngEncoder::new(&mut out)
            .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .map_err(|e| RendererError::Encode(e.to_string()))?,
        ExportFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .write_image(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
                .map_err(|e| RendererError::Encode(e.to_string()))?
        }
    }
    Ok(out.into_inner())
}

/// The exported diagram as a `data:` URL.
pub fn to_data_url(scene: &Scene, images: &ImageCache, options: &ExportOptions) -> RenderResult<String> {
    let image = render_image(scene, images, options)?;
    let bytes = encode(&image, options.format, options.quality)?;
    Ok(format!("data:{};base64,{}", options.format.mime(), STANDARD.encode(bytes)))
}

/// Export to `path`. The extension picks the format when it names one.
pub fn save(scene: &Scene, images: &ImageCache, path: impl AsRef<Path>, options: &ExportOptions) -> RenderResult<()> {
    let path = path.as_ref();
    let mut options = *options;
    if let Some(format) = ExportFormat::from_path(path) {
        options.format = format;
    }
    let image = render_image(scene, images, &options)?;
    let bytes = encode(&image, options.format, options.quality)?;
    std::fs::write(path, &bytes)?;
    log::info!(
        "Exported {}x{} {:?} to {}",
        image.width(),
        image.height(),
        options.format,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::png_data_url;
    use topograph_core::pen::Node;

    fn scene_with_box() -> Scene {
        let mut scene = Scene::default();
        let mut node = Node::new("rectangle", Rect::new(100.0, 50.0, 40.0, 20.0));
        node.props.fill_style = "#ff0000".to_string();
        scene.add_node(node, false);
        scene
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a.PNG")), Some(ExportFormat::Png));
        assert_eq!(ExportFormat::from_path(Path::new("a.jpeg")), Some(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_path(Path::new("a.gif")), None);
        assert_eq!(ExportFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_empty_diagram_is_an_error() {
        let scene = Scene::default();
        assert!(render_image(&scene, &ImageCache::new(), &ExportOptions::default()).is_err());
    }

    #[test]
    fn test_export_uses_padded_bounds() {
        let scene = scene_with_box();
        let options = ExportOptions::default().with_padding(10.0);
        let (list, size) = export_display_list(&scene, &options).unwrap();
        assert_eq!((size.width, size.height), (60.0, 40.0));
        let bounds = list.bounds().unwrap();
        assert_eq!((bounds.x0, bounds.y0), (10.0, 10.0));

        let image = render_image(&scene, &ImageCache::new(), &options).unwrap();
        assert_eq!(image.dimensions(), (60, 40));
        assert_eq!(image.get_pixel(30, 20).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(2, 2).0[3], 0);
    }

    #[test]
    fn test_jpeg_gets_white_background() {
        let scene = scene_with_box();
        let options = ExportOptions::default().with_padding(10.0).with_format(ExportFormat::Jpeg);
        let image = render_image(&scene, &ImageCache::new(), &options).unwrap();
        assert_eq!(image.get_pixel(2, 2).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_background_image_is_drawn() {
        let mut scene = scene_with_box();
        let url = png_data_url(4, 4);
        scene.data_mut().bk_image = Some(url.clone());
        let mut images = ImageCache::new();
        images.load(&url).unwrap();
        let image = render_image(&scene, &images, &ExportOptions::default().with_padding(10.0)).unwrap();
        assert_eq!(image.get_pixel(2, 2).0, [200, 10, 10, 255]);
    }

    #[test]
    fn test_data_url_and_save() {
        let scene = scene_with_box();
        let images = ImageCache::new();
        let url = to_data_url(&scene, &images, &ExportOptions::default()).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        save(&scene, &images, &path, &ExportOptions::default().with_quality(80)).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }
}
