use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

mod config;
mod error;
mod highlight;
mod layout;
mod renderer;
mod scale;
mod session;
mod text_index;
mod timer;
mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ViewerConfig;
pub use error::ViewerError;
pub use highlight::HighlightOverlay;
pub use layout::{PageLayout, RenderedPage, TextLayer, TextNode};
pub use renderer::{PageRenderer, RenderGeneration, RenderLease, RenderToken, RenderedLayout};
pub use scale::ScaleManager;
pub use session::{LoadState, Panel, ViewState, Viewer, EVENT_QUEUE_LIMIT};
pub use text_index::{contains_ignore_case, find_ignore_case, PageText, SearchMatch, TextIndex};
pub use timer::Debouncer;
pub use tracker::{NavigationState, PageTracker};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocumentMetadata {
    pub page_count: Option<usize>,
    pub original_name: String,
    pub file_size: u64,
    pub upload_date: Option<String>,
    pub category: Option<String>,
    pub classification_level: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A catalog entry returned by a name search.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub original_name: String,
    pub category: Option<String>,
    pub page_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHits {
    pub page: usize,
    pub matches: usize,
}

/// Multi-match content search result for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSearchHit {
    pub document_id: DocumentId,
    pub document_name: String,
    pub pages: Vec<PageHits>,
    pub total_matches: usize,
}

impl ContentSearchHit {
    pub fn first_page(&self) -> Option<usize> {
        self.pages.iter().map(|hit| hit.page).min()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    pub fn pixel_size(&self) -> (u32, u32) {
        (to_pixels(self.width), to_pixels(self.height))
    }
}

fn to_pixels(value: f32) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        1
    } else {
        value.ceil() as u32
    }
}

/// Rectangle in page space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TextRect {
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub rect: TextRect,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    NextPage,
    PreviousPage,
    GoToPage { page: usize },
    ZoomIn,
    ZoomOut,
    FitToWidth,
    ToggleFullscreen,
    Search { query: String },
    ClearHighlights,
    Reload,
    Retry,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    LoadStateChanged {
        document_id: Option<DocumentId>,
        state: LoadState,
    },
    PageChanged(NavigationState),
    ZoomChanged {
        percent: u32,
    },
    ScrollTo {
        page: usize,
        offset: f32,
        smooth: bool,
    },
    HighlightsChanged {
        query: Option<String>,
        marked: usize,
    },
    RenderFailed {
        page: Option<usize>,
        message: String,
    },
    FullscreenChanged(bool),
    RedrawNeeded,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_document_bytes(&self, id: &DocumentId) -> Result<Bytes>;
    async fn fetch_document_metadata(&self, id: &DocumentId) -> Result<DocumentMetadata>;
    async fn search_names(&self, query: &str) -> Result<Vec<DocumentSummary>>;
    async fn search_content(&self, query: &str) -> Result<Vec<ContentSearchHit>>;
}

#[async_trait]
pub trait DecodingEngine: Send + Sync {
    async fn open(&self, bytes: Bytes) -> Result<Arc<dyn DocumentHandle>>;
}

/// An opened document. Page access is not reentrant; callers hold a
/// [`RenderLease`] while talking to pages.
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;

    /// `page_number` is 1-based.
    async fn page(&self, page_number: usize) -> Result<Box<dyn PageHandle>>;
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Width and height in page units at scale 1.0.
    fn native_size(&self) -> (f32, f32);

    fn viewport(&self, scale: f32) -> Viewport {
        let (width, height) = self.native_size();
        Viewport {
            width: width * scale,
            height: height * scale,
            scale,
        }
    }

    async fn render(&self, viewport: &Viewport) -> Result<RenderImage>;

    async fn text_content(&self) -> Result<Vec<TextItem>>;
}
