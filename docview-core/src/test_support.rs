use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::{
    ContentSearchHit, DecodingEngine, DocumentHandle, DocumentId, DocumentMetadata,
    DocumentSource, DocumentSummary, PageHandle, RenderImage, TextItem, TextRect, Viewer,
    ViewerConfig, Viewport,
};

#[derive(Debug, Clone)]
pub(crate) struct FakePage {
    width: f32,
    height: f32,
    items: Vec<TextItem>,
    fail: bool,
}

impl FakePage {
    pub(crate) fn new(texts: &[&str]) -> Self {
        let items = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| TextItem {
                text: text.to_string(),
                rect: TextRect {
                    x: 72.0,
                    y: 72.0 + idx as f32 * 14.0,
                    width: 8.0 * text.len() as f32,
                    height: 12.0,
                },
            })
            .collect();
        Self {
            width: 612.0,
            height: 792.0,
            items,
            fail: false,
        }
    }

    pub(crate) fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

/// Blocks page rendering until opened; reports when a render is waiting.
#[derive(Debug)]
pub(crate) struct Gate {
    open: Semaphore,
    entered: Semaphore,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            open: Semaphore::new(0),
            entered: Semaphore::new(0),
        })
    }

    pub(crate) fn open(&self) {
        self.open.add_permits(1);
    }

    pub(crate) async fn wait_entered(&self) {
        self.entered
            .acquire()
            .await
            .expect("gate semaphore closed")
            .forget();
    }

    async fn pass(&self) {
        self.entered.add_permits(1);
        let _permit = self.open.acquire().await.expect("gate semaphore closed");
    }
}

#[derive(Debug)]
pub(crate) struct FakeDocument {
    pages: Vec<FakePage>,
    gate: Option<Arc<Gate>>,
    log: Arc<Mutex<Vec<usize>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl FakeDocument {
    pub(crate) fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages,
            gate: None,
            log: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_texts(pages: &[&[&str]]) -> Self {
        Self::new(pages.iter().map(|texts| FakePage::new(texts)).collect())
    }

    pub(crate) fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn render_log(&self) -> Vec<usize> {
        self.log.lock().clone()
    }

    pub(crate) fn max_concurrent_renders(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentHandle for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn page(&self, page_number: usize) -> Result<Box<dyn PageHandle>> {
        let page = page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .ok_or_else(|| anyhow!("page {} out of range", page_number))?;
        Ok(Box::new(FakePageHandle {
            page_number,
            page: page.clone(),
            gate: self.gate.clone(),
            log: Arc::clone(&self.log),
            active: Arc::clone(&self.active),
            max_active: Arc::clone(&self.max_active),
        }))
    }
}

struct FakePageHandle {
    page_number: usize,
    page: FakePage,
    gate: Option<Arc<Gate>>,
    log: Arc<Mutex<Vec<usize>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl PageHandle for FakePageHandle {
    fn native_size(&self) -> (f32, f32) {
        (self.page.width, self.page.height)
    }

    async fn render(&self, viewport: &Viewport) -> Result<RenderImage> {
        self.log.lock().push(self.page_number);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.page.fail {
            return Err(anyhow!("rasterizer crashed on page {}", self.page_number));
        }
        let (width, height) = viewport.pixel_size();
        Ok(RenderImage {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        })
    }

    async fn text_content(&self) -> Result<Vec<TextItem>> {
        Ok(self.page.items.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    documents: Mutex<HashMap<String, Arc<FakeDocument>>>,
}

#[async_trait]
impl DecodingEngine for FakeEngine {
    async fn open(&self, bytes: Bytes) -> Result<Arc<dyn DocumentHandle>> {
        let key = String::from_utf8(bytes.to_vec())?;
        let document: Arc<dyn DocumentHandle> = self
            .documents
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("not a PDF: {}", key))?;
        Ok(document)
    }
}

#[derive(Default)]
pub(crate) struct FakeSource {
    metadata: Mutex<HashMap<String, DocumentMetadata>>,
    undecodable: Mutex<Vec<String>>,
    metadata_outages: Mutex<Vec<String>>,
    content_hits: Mutex<Vec<ContentSearchHit>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_metadata(&self, id: &str) {
        self.metadata_outages.lock().push(id.to_owned());
    }

    pub(crate) fn set_content_hits(&self, hits: Vec<ContentSearchHit>) {
        *self.content_hits.lock() = hits;
    }
}

#[async_trait]
impl DocumentSource for FakeSource {
    async fn fetch_document_bytes(&self, id: &DocumentId) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.undecodable.lock().iter().any(|bad| bad == id.as_str()) {
            return Ok(Bytes::from_static(b"\x00garbage"));
        }
        if !self.metadata.lock().contains_key(id.as_str()) {
            return Err(anyhow!("HTTP 404: document {} not found", id));
        }
        Ok(Bytes::from(id.as_str().to_owned()))
    }

    async fn fetch_document_metadata(&self, id: &DocumentId) -> Result<DocumentMetadata> {
        if self.metadata_outages.lock().iter().any(|down| down == id.as_str()) {
            return Err(anyhow!("HTTP 503: metadata service unavailable"));
        }
        self.metadata
            .lock()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("HTTP 404: document {} not found", id))
    }

    async fn search_names(&self, query: &str) -> Result<Vec<DocumentSummary>> {
        let query = query.to_lowercase();
        let mut found: Vec<DocumentSummary> = self
            .metadata
            .lock()
            .iter()
            .filter(|(_, meta)| meta.original_name.to_lowercase().contains(&query))
            .map(|(id, meta)| DocumentSummary {
                id: DocumentId::new(id.clone()),
                original_name: meta.original_name.clone(),
                category: meta.category.clone(),
                page_count: meta.page_count,
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn search_content(&self, _query: &str) -> Result<Vec<ContentSearchHit>> {
        Ok(self.content_hits.lock().clone())
    }
}

pub(crate) struct Fixture {
    pub(crate) source: Arc<FakeSource>,
    pub(crate) engine: Arc<FakeEngine>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self {
            source: Arc::new(FakeSource::default()),
            engine: Arc::new(FakeEngine::default()),
        }
    }

    pub(crate) fn add(&self, id: &str, document: FakeDocument) -> Arc<FakeDocument> {
        let document = Arc::new(document);
        self.source.metadata.lock().insert(
            id.to_owned(),
            DocumentMetadata {
                page_count: Some(document.page_count()),
                original_name: format!("{id}.pdf"),
                file_size: 1024,
                ..DocumentMetadata::default()
            },
        );
        self.engine
            .documents
            .lock()
            .insert(id.to_owned(), Arc::clone(&document));
        document
    }

    pub(crate) fn add_undecodable(&self, id: &str) {
        self.source.metadata.lock().insert(
            id.to_owned(),
            DocumentMetadata {
                original_name: format!("{id}.pdf"),
                ..DocumentMetadata::default()
            },
        );
        self.source.undecodable.lock().push(id.to_owned());
    }

    pub(crate) fn viewer(&self) -> Viewer {
        let viewer = Viewer::new(
            self.source.clone(),
            self.engine.clone(),
            ViewerConfig::default(),
        );
        viewer.set_container_width(692.0);
        viewer
    }
}
