//! Decoded node images, keyed by their source string.
//!
//! Sources are file paths (relative ones resolve against the cache's base
//! directory) or `data:` URLs with a base64 payload. Remote URLs are the
//! host's business: the host fetches them and hands the bytes to
//! [`ImageCache::insert`].

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, ImageReader, RgbaImage};
use topograph_core::Scene;
use topograph_core::pen::{MediaState, Pen, tree};

use crate::renderer::{RenderResult, RendererError};

/// An encoded image and its pixel size.
#[derive(Debug, Clone)]
pub struct CachedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl CachedImage {
    fn from_bytes(source: &str, bytes: Vec<u8>) -> RenderResult<Self> {
        let decode_err = |reason: String| RendererError::ImageDecode {
            source_name: short(source),
            reason,
        };
        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| decode_err(e.to_string()))?;
        let format = reader.format().ok_or_else(|| decode_err("unknown format".to_string()))?;
        let (width, height) = reader.into_dimensions().map_err(|e| decode_err(e.to_string()))?;
        Ok(Self {
            bytes,
            format,
            width,
            height,
        })
    }

    pub fn mime(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// The image as a `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime(), STANDARD.encode(&self.bytes))
    }

    pub fn decode(&self) -> RenderResult<RgbaImage> {
        image::load_from_memory_with_format(&self.bytes, self.format)
            .map(|img| img.to_rgba8())
            .map_err(|e| RendererError::ImageDecode {
                source_name: format!("{:?} image", self.format),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug)]
enum Slot {
    Ready(CachedImage),
    Failed,
}

#[derive(Debug, Default)]
pub struct ImageCache {
    base_dir: Option<PathBuf>,
    entries: HashMap<String, Slot>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `dir`, usually the diagram's folder.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, source: &str) -> Option<&CachedImage> {
        match self.entries.get(source) {
            Some(Slot::Ready(image)) => Some(image),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an image the host fetched itself.
    pub fn insert(&mut self, source: &str, bytes: Vec<u8>) -> RenderResult<&CachedImage> {
        let image = CachedImage::from_bytes(source, bytes);
        self.store(source, image)
    }

    /// Load `source`, decoding it at most once. A source that failed is
    /// not retried until [`ImageCache::forget`].
    pub fn load(&mut self, source: &str) -> RenderResult<&CachedImage> {
        match self.entries.get(source) {
            Some(Slot::Ready(_)) => {}
            Some(Slot::Failed) => {
                return Err(RendererError::ImageDecode {
                    source_name: short(source),
                    reason: "previously failed".to_string(),
                });
            }
            None => {
                let image = self.read(source).and_then(|bytes| CachedImage::from_bytes(source, bytes));
                return self.store(source, image);
            }
        }
        self.get(source).ok_or_else(|| RendererError::RenderFailed("image cache out of sync".to_string()))
    }

    pub fn forget(&mut self, source: &str) {
        self.entries.remove(source);
    }

    fn store(&mut self, source: &str, image: RenderResult<CachedImage>) -> RenderResult<&CachedImage> {
        match image {
            Ok(image) => {
                log::debug!("Cached {} ({}x{})", short(source), image.width, image.height);
                self.entries.insert(source.to_string(), Slot::Ready(image));
                self.get(source).ok_or_else(|| RendererError::RenderFailed("image cache out of sync".to_string()))
            }
            Err(err) => {
                self.entries.insert(source.to_string(), Slot::Failed);
                Err(err)
            }
        }
    }

    fn read(&self, source: &str) -> RenderResult<Vec<u8>> {
        if let Some(rest) = source.strip_prefix("data:") {
            let (meta, payload) = rest.split_once(',').ok_or_else(|| RendererError::ImageDecode {
                source_name: short(source),
                reason: "malformed data URL".to_string(),
            })?;
            if !meta.ends_with(";base64") {
                return Err(RendererError::ImageDecode {
                    source_name: short(source),
                    reason: "only base64 data URLs are supported".to_string(),
                });
            }
            return STANDARD.decode(payload.trim()).map_err(|e| RendererError::ImageDecode {
                source_name: short(source),
                reason: e.to_string(),
            });
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return Err(RendererError::ImageDecode {
                source_name: short(source),
                reason: "remote images must be inserted by the host".to_string(),
            });
        }
        let path = Path::new(source);
        let path = match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        Ok(std::fs::read(path)?)
    }

    /// Load every image the scene is waiting for and report each outcome
    /// back to it. Returns how many images became ready.
    pub fn resolve_pending(&mut self, scene: &mut Scene) -> usize {
        let pending: Vec<(String, String)> = tree::flatten(scene.pens())
            .into_iter()
            .filter_map(Pen::as_node)
            .filter(|node| node.media == MediaState::Pending)
            .filter_map(|node| {
                let src = node.image.as_deref().filter(|s| !s.is_empty())?;
                Some((node.props.id.clone(), src.to_string()))
            })
            .collect();

        let mut ready = 0;
        for (id, src) in pending {
            match self.load(&src) {
                Ok(image) => {
                    let size = (image.width as f64, image.height as f64);
                    scene.media_loaded(&id, Some(size));
                    ready += 1;
                }
                Err(err) => {
                    log::warn!("Image for {} unavailable: {}", id, err);
                    scene.media_loaded(&id, None);
                }
            }
        }
        if let Some(src) = scene.data().bk_image.clone().filter(|s| !s.is_empty()) {
            if let Err(err) = self.load(&src) {
                log::warn!("Background image unavailable: {}", err);
            }
        }
        ready
    }
}

/// Source name for messages; data URLs are cut short.
fn short(source: &str) -> String {
    if source.starts_with("data:") {
        let head: String = source.chars().take(32).collect();
        format!("{}...", head)
    } else {
        source.to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use topograph_core::geometry::Rect;
    use topograph_core::pen::Node;

    /// A small opaque PNG, encoded in memory.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    pub(crate) fn png_data_url(width: u32, height: u32) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(width, height)))
    }

    #[test]
    fn test_load_data_url() {
        let mut cache = ImageCache::new();
        let url = png_data_url(4, 3);
        let image = cache.load(&url).unwrap();
        assert_eq!((image.width, image.height), (4, 3));
        assert_eq!(image.mime(), "image/png");
        assert_eq!(cache.get(&url).unwrap().decode().unwrap().dimensions(), (4, 3));
    }

    #[test]
    fn test_load_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), png_bytes(2, 2)).unwrap();
        let mut cache = ImageCache::with_base_dir(dir.path());
        assert_eq!(cache.load("logo.png").unwrap().width, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failures_are_remembered() {
        let mut cache = ImageCache::new();
        assert!(matches!(cache.load("data:image/png;base64,!!!"), Err(RendererError::ImageDecode { .. })));
        assert!(cache.load("https://example.com/a.png").is_err());
        assert!(cache.load("/definitely/not/here.png").is_err());
        assert_eq!(cache.len(), 3);
        assert!(cache.get("/definitely/not/here.png").is_none());

        cache.forget("/definitely/not/here.png");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_host_inserted_bytes() {
        let mut cache = ImageCache::new();
        cache.insert("https://example.com/a.png", png_bytes(5, 1)).unwrap();
        assert_eq!(cache.load("https://example.com/a.png").unwrap().width, 5);
        assert!(cache.insert("junk", b"not an image".to_vec()).is_err());
    }

    #[test]
    fn test_resolve_pending_marks_nodes_ready() {
        let mut scene = Scene::default();
        let mut ok = Node::new("image", Rect::new(0.0, 0.0, 50.0, 50.0));
        ok.props.id = "ok".to_string();
        ok.image = Some(png_data_url(8, 4));
        let mut bad = Node::new("image", Rect::new(100.0, 0.0, 50.0, 50.0));
        bad.props.id = "bad".to_string();
        bad.image = Some("missing.png".to_string());
        scene.add_node(ok, false);
        scene.add_node(bad, false);

        let mut cache = ImageCache::new();
        assert_eq!(cache.resolve_pending(&mut scene), 1);
        let media = |id: &str| scene.find_pen(id).and_then(Pen::as_node).map(|n| n.media);
        assert_eq!(media("ok"), Some(MediaState::Ready { width: 8.0, height: 4.0 }));
        assert_eq!(media("bad"), Some(MediaState::Failed));
        assert_eq!(cache.resolve_pending(&mut scene), 0);
    }
}
