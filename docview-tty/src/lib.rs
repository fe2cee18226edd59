use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
};
use docview_core::{Panel, RenderImage, RenderedPage, TextRect, ViewState};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

mod input;

pub use input::{EventMapper, InputMode, UiEvent};

const HIGHLIGHT_COLOR: [u8; 3] = [255, 235, 0];
const HIGHLIGHT_ALPHA: f32 = 0.35;

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Largest cell box inside `columns` x `rows` that keeps the image's
    /// aspect ratio. Without a known cell size the box is filled.
    pub fn fit(image: &RenderImage, columns: u32, rows: u32, cell: Option<(f32, f32)>) -> Self {
        let bounds = Self::clamped(columns, rows);
        let Some((cell_width, cell_height)) = cell.filter(|(w, h)| *w > 0.0 && *h > 0.0) else {
            return bounds;
        };
        if image.width == 0 || image.height == 0 {
            return bounds;
        }

        let box_width = bounds.columns as f32 * cell_width;
        let box_height = bounds.rows as f32 * cell_height;
        let ratio = (box_width / image.width as f32).min(box_height / image.height as f32);
        let columns = (image.width as f32 * ratio / cell_width).round() as u32;
        let rows = (image.height as f32 * ratio / cell_height).round() as u32;
        Self::clamped(columns.min(bounds.columns), rows.min(bounds.rows))
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Draws a page raster with its highlighted text nodes tinted.
    pub fn draw_page(&mut self, page: &RenderedPage, params: DrawParams) -> Result<()> {
        let image = tint_highlights(page);
        self.draw(&image, params)
    }

    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        {
            let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
            encoder.set_color(ColorType::Rgba);
            encoder.set_depth(BitDepth::Eight);
            let mut png = encoder.write_header()?;
            png.write_image_data(&image.pixels)?;
            png.finish()?;
        }

        let encoded = BASE64.encode(&buffer);
        trace!(bytes = encoded.len(), "sending kitty image");
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={more},q=2")?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes the placed page image.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=i,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// The terminal paints everything buffered since `begin_sync_update`.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Copy of the page raster with every highlighted node's box blended in.
pub fn tint_highlights(page: &RenderedPage) -> RenderImage {
    let mut image = page.raster.clone();
    for node in page.text_layer.highlighted() {
        if let Some(rect) = PixelRect::covering(&node.rect, &image) {
            fill_rect(&mut image, rect, HIGHLIGHT_COLOR, HIGHLIGHT_ALPHA);
        }
    }
    image
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelRect {
    /// Pixel box covering `rect` (viewport units), clipped to the image.
    fn covering(rect: &TextRect, image: &RenderImage) -> Option<Self> {
        let clip = |value: f32, max: u32| -> u32 {
            if value.is_finite() {
                value.clamp(0.0, max as f32) as u32
            } else {
                0
            }
        };
        let x0 = clip(rect.x.floor(), image.width);
        let x1 = clip((rect.x + rect.width).ceil(), image.width);
        let y0 = clip(rect.y.floor(), image.height);
        let y1 = clip((rect.y + rect.height).ceil(), image.height);
        (x1 > x0 && y1 > y0).then_some(Self { x0, y0, x1, y1 })
    }
}

fn fill_rect(image: &mut RenderImage, rect: PixelRect, color: [u8; 3], alpha: f32) {
    let stride = image.width as usize * 4;
    for y in rect.y0..rect.y1 {
        let row = y as usize * stride;
        for x in rect.x0..rect.x1 {
            let idx = row + x as usize * 4;
            if let Some(pixel) = image.pixels.get_mut(idx..idx + 4) {
                blend_pixel(pixel, color, alpha);
            }
        }
    }
}

fn blend_pixel(pixel: &mut [u8], color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for (channel, tint) in pixel.iter_mut().zip(color) {
        let mixed = *channel as f32 * (1.0 - alpha) + tint as f32 * alpha;
        *channel = mixed.round().clamp(0.0, 255.0) as u8;
    }
}

/// One-line summary of the viewer for the bottom row of the terminal.
pub fn status_line(state: &ViewState, pending_input: Option<&str>) -> String {
    let mut status = match &state.panel {
        Panel::Welcome => "no document open".to_string(),
        Panel::Loading => match &state.document_id {
            Some(id) => format!("loading {id}..."),
            None => "loading...".to_string(),
        },
        Panel::LoadFailed { message, retry } => {
            format!("{retry}: {message} | r: retry")
        }
        Panel::RenderFailed { message } => format!("{message} | R: reload"),
        Panel::Document => {
            let name = state
                .document_name
                .clone()
                .or_else(|| state.document_id.as_ref().map(ToString::to_string))
                .unwrap_or_default();
            let mut status = format!(
                "{name} | page {}/{} | {}%",
                state.current_page, state.total_pages, state.zoom_percent
            );
            if let Some(query) = &state.highlight_query {
                status.push_str(&format!(" | /{query} ({} marked)", state.highlighted_nodes));
            }
            if state.fullscreen {
                status.push_str(" | fullscreen");
            }
            status
        }
    };

    if let Some(pending) = pending_input.filter(|pending| !pending.is_empty()) {
        status.push_str(" | ");
        status.push_str(pending);
    }
    status
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
