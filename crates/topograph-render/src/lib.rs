//! Topograph Render Library
//!
//! Turns a [`topograph_core::Scene`] into pixels. Frames are built as five
//! display-list layers; the CPU path rasterizes them through SVG, and the
//! optional Vello backend draws them on the GPU.

pub mod display_list;
pub mod export;
pub mod grid;
pub mod images;
pub mod layers;
mod renderer;
pub mod svg;

#[cfg(feature = "vello-renderer")]
mod vello_impl;

pub use display_list::{DisplayList, DrawCommand};
pub use export::{ExportFormat, ExportOptions};
pub use images::{CachedImage, ImageCache};
pub use layers::{LayerKind, Layers, Overlay, OverlayChange, OverlayKind};
pub use renderer::{RenderContext, RenderResult, Renderer, RendererError};
pub use svg::SvgPainter;

#[cfg(feature = "vello-renderer")]
pub use vello_impl::VelloRenderer;
