use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use docview_core::{DecodingEngine, DocumentHandle, PageHandle, RenderImage, TextItem, Viewport};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

use crate::{raster_from_image, rect_from_pdf_bounds, text_item, EngineError};

/// Opens PDF bytes with a process-wide Pdfium binding.
pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    /// Binds to the library staged at build time, then `./`, then the
    /// system library path.
    pub fn new() -> Result<Self> {
        let pdfium = match bind_staged_library() {
            Some(pdfium) => pdfium,
            None => bind_fallback_library()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DecodingEngine for PdfiumEngine {
    async fn open(&self, bytes: Bytes) -> Result<Arc<dyn DocumentHandle>> {
        let pdfium = Arc::clone(&self.pdfium);
        let loaded = tokio::task::spawn_blocking(move || LoadedPdf::decode(pdfium, bytes))
            .await
            .context("pdf decode task failed")??;
        debug!(pages = loaded.sizes.len(), "pdf decoded");
        let handle: Arc<dyn DocumentHandle> = Arc::new(PdfiumDocument {
            pdf: Arc::new(loaded),
        });
        Ok(handle)
    }
}

struct LoadedPdf {
    // Declared before `pdfium` so it drops first.
    document: Mutex<PdfDocument<'static>>,
    sizes: Vec<(f32, f32)>,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
}

impl LoadedPdf {
    fn decode(pdfium: Arc<Pdfium>, bytes: Bytes) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_byte_vec(bytes.to_vec(), None)
            .map_err(|err| anyhow!("not a readable PDF: {err}"))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. Both
        // live in this struct and `document` is declared first, so it is
        // dropped while the bindings are still alive.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };

        let sizes = document
            .pages()
            .iter()
            .map(|page| (page.width().value, page.height().value))
            .collect();

        Ok(Self {
            document: Mutex::new(document),
            sizes,
            pdfium,
        })
    }

    fn size(&self, page_number: usize) -> Result<(f32, f32)> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.sizes.get(idx).copied())
            .ok_or_else(|| {
                EngineError::PageOutOfRange {
                    page: page_number,
                    page_count: self.sizes.len(),
                }
                .into()
            })
    }

    fn with_page<R>(
        &self,
        page_number: usize,
        f: impl FnOnce(&PdfPage<'_>) -> Result<R>,
    ) -> Result<R> {
        let index: PdfPageIndex = page_number
            .checked_sub(1)
            .and_then(|idx| idx.try_into().ok())
            .ok_or_else(|| anyhow!("page {page_number} is out of supported range"))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {page_number} out of range"))?;
        f(&page)
    }

    fn render(&self, page_number: usize, scale: f32) -> Result<RenderImage> {
        self.with_page(page_number, |page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to rasterize page {page_number}"))?;
            Ok(raster_from_image(bitmap.as_image()))
        })
    }

    fn text(&self, page_number: usize) -> Result<Vec<TextItem>> {
        self.with_page(page_number, |page| {
            let page_height = page.height().value;
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {page_number}"))?;
            let items = text
                .segments()
                .iter()
                .filter_map(|segment| {
                    let bounds = segment.bounds();
                    let rect = rect_from_pdf_bounds(
                        bounds.left().value,
                        bounds.bottom().value,
                        bounds.right().value,
                        bounds.top().value,
                        page_height,
                    );
                    text_item(segment.text(), rect)
                })
                .collect();
            Ok(items)
        })
    }
}

struct PdfiumDocument {
    pdf: Arc<LoadedPdf>,
}

#[async_trait]
impl DocumentHandle for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.pdf.sizes.len()
    }

    async fn page(&self, page_number: usize) -> Result<Box<dyn PageHandle>> {
        let (width, height) = self.pdf.size(page_number)?;
        if !(width > 0.0 && height > 0.0) {
            warn!(page_number, width, height, "page has no drawable area");
            return Err(EngineError::DegeneratePage {
                page: page_number,
                width,
                height,
            }
            .into());
        }
        Ok(Box::new(PdfiumPage {
            pdf: Arc::clone(&self.pdf),
            page_number,
            size: (width, height),
        }))
    }
}

struct PdfiumPage {
    pdf: Arc<LoadedPdf>,
    page_number: usize,
    size: (f32, f32),
}

#[async_trait]
impl PageHandle for PdfiumPage {
    fn native_size(&self) -> (f32, f32) {
        self.size
    }

    #[instrument(skip(self), fields(page = self.page_number))]
    async fn render(&self, viewport: &Viewport) -> Result<RenderImage> {
        let pdf = Arc::clone(&self.pdf);
        let page_number = self.page_number;
        let scale = viewport.scale;
        tokio::task::spawn_blocking(move || pdf.render(page_number, scale))
            .await
            .context("render task failed")?
    }

    async fn text_content(&self) -> Result<Vec<TextItem>> {
        let pdf = Arc::clone(&self.pdf);
        let page_number = self.page_number;
        tokio::task::spawn_blocking(move || pdf.text(page_number))
            .await
            .context("text extraction task failed")?
    }
}

fn bind_staged_library() -> Option<Pdfium> {
    let path = option_env!("DOCVIEW_PDFIUM_LIBRARY_PATH").filter(|path| !path.is_empty())?;
    match Pdfium::bind_to_library(path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(path, %err, "staged pdfium library failed to load");
            None
        }
    }
}

fn bind_fallback_library() -> Result<Pdfium> {
    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    let local_err = match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => format!("{}: {err}", local.display()),
    };
    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => Err(EngineError::Bind {
            attempts: vec![local_err, format!("system: {err}")],
        }
        .into()),
    }
}
