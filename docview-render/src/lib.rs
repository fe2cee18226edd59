//! Decoding engines for the viewer. The Pdfium-backed engine lives behind the
//! `pdf` feature; raster and geometry conversions are shared helpers.

use docview_core::{RenderImage, TextItem, TextRect};
use image::DynamicImage;
use thiserror::Error;

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable pdfium library ({})", attempts.join(", "))]
    Bind { attempts: Vec<String> },
    #[error("page {page} is outside 1..={page_count}")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("page {page} has a degenerate size {width}x{height}")]
    DegeneratePage { page: usize, width: f32, height: f32 },
}

/// Flattens any decoded bitmap into the RGBA layout the viewer draws.
pub fn raster_from_image(image: DynamicImage) -> RenderImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    RenderImage {
        width,
        height,
        pixels: rgba.into_raw(),
    }
}

/// Converts PDF user-space bounds (origin bottom-left, y up) into a rectangle
/// with its origin at the top-left corner of a page `page_height` tall.
pub fn rect_from_pdf_bounds(
    left: f32,
    bottom: f32,
    right: f32,
    top: f32,
    page_height: f32,
) -> TextRect {
    let (left, right) = if left <= right {
        (left, right)
    } else {
        (right, left)
    };
    let (bottom, top) = if bottom <= top {
        (bottom, top)
    } else {
        (top, bottom)
    };
    TextRect {
        x: left,
        y: page_height - top,
        width: right - left,
        height: top - bottom,
    }
}

/// Drops whitespace-only runs; the text layer has nothing to match there.
pub(crate) fn text_item(text: String, rect: TextRect) -> Option<TextItem> {
    if text.trim().is_empty() {
        return None;
    }
    Some(TextItem { text, rect })
}
