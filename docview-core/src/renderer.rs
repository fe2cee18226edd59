use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use crate::{
    DocumentHandle, DocumentId, PageLayout, PageText, TextLayer, ViewerConfig, ViewerError,
};

/// Monotonic counter bumped by every render request, load and teardown.
#[derive(Debug, Clone, Default)]
pub struct RenderGeneration {
    counter: Arc<AtomicU64>,
}

impl RenderGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, superseding every outstanding token.
    pub fn begin(&self, document_id: DocumentId) -> RenderToken {
        let generation = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        RenderToken {
            generation,
            document_id,
            counter: Arc::clone(&self.counter),
        }
    }

    pub fn cancel(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RenderToken {
    generation: u64,
    document_id: DocumentId,
    counter: Arc<AtomicU64>,
}

impl RenderToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}

/// Exclusive access to one document handle's pages. A superseded pass keeps
/// its lease until it notices the cancellation, so passes never overlap on
/// the same handle.
#[derive(Debug, Clone, Default)]
pub struct RenderLease {
    inner: Arc<AsyncMutex<()>>,
}

impl RenderLease {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.inner).lock_owned().await
    }
}

#[derive(Debug)]
pub struct RenderedLayout {
    pub layout: PageLayout,
    pub texts: Vec<PageText>,
}

#[derive(Debug, Clone)]
pub struct PageRenderer {
    container_padding: f32,
    page_gap: f32,
}

impl PageRenderer {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            container_padding: config.container_padding,
            page_gap: config.page_gap,
        }
    }

    /// Renders every page in order into a fresh layout. Returns `Ok(None)`
    /// when `token` is superseded before the pass completes; a failing page
    /// aborts the whole pass.
    #[instrument(
        skip(self, document, lease, token),
        fields(document = %token.document_id(), generation = token.generation())
    )]
    pub async fn render_all(
        &self,
        document: &dyn DocumentHandle,
        lease: &RenderLease,
        scale: f32,
        token: &RenderToken,
    ) -> Result<Option<RenderedLayout>, ViewerError> {
        let _lease = lease.acquire().await;

        let page_count = document.page_count();
        let mut layout = PageLayout::new(self.container_padding, self.page_gap);
        let mut texts = Vec::with_capacity(page_count);

        for page_number in 1..=page_count {
            if !token.is_current() {
                debug!(page_number, "render pass superseded");
                return Ok(None);
            }

            let render_error = |source| ViewerError::Render {
                page: page_number,
                source,
            };
            let page = document.page(page_number).await.map_err(render_error)?;
            let viewport = page.viewport(scale);
            let raster = page.render(&viewport).await.map_err(render_error)?;
            let items = page.text_content().await.map_err(render_error)?;

            if !token.is_current() {
                debug!(page_number, "render pass superseded");
                return Ok(None);
            }

            texts.push(PageText::from_items(page_number, &items));
            let text_layer = TextLayer::from_items(&items, &viewport);
            layout.push_page(page_number, viewport, raster, text_layer);
        }

        debug!(page_count, scale, "render pass complete");
        Ok(Some(RenderedLayout { layout, texts }))
    }
}
