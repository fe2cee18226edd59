use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    ContentSearchHit, DecodingEngine, Debouncer, DocumentHandle, DocumentId, DocumentMetadata,
    DocumentSource, DocumentSummary, HighlightOverlay, NavigationState, PageLayout, PageRenderer,
    PageText, PageTracker, RenderGeneration, RenderLease, RenderedLayout, ScaleManager,
    SearchMatch, TextIndex, ViewerCommand, ViewerConfig, ViewerError, ViewerEvent,
};

/// Undrained events beyond this count are dropped oldest first.
pub const EVENT_QUEUE_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// What the viewer area shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Panel {
    Welcome,
    Loading,
    Document,
    LoadFailed { message: String, retry: DocumentId },
    RenderFailed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub panel: Panel,
    pub load_state: LoadState,
    pub document_id: Option<DocumentId>,
    pub document_name: Option<String>,
    pub current_page: usize,
    pub total_pages: usize,
    pub zoom_percent: u32,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    pub fullscreen: bool,
    pub highlight_query: Option<String>,
    pub highlighted_nodes: usize,
}

struct DocumentSession {
    document_id: DocumentId,
    /// Generation of the `load` that created this session.
    serial: u64,
    handle: Option<Arc<dyn DocumentHandle>>,
    lease: RenderLease,
    metadata: Option<DocumentMetadata>,
    page_count: usize,
    first_page_width: f32,
    load_state: LoadState,
}

impl DocumentSession {
    fn loading(document_id: DocumentId, serial: u64) -> Self {
        Self {
            document_id,
            serial,
            handle: None,
            lease: RenderLease::new(),
            metadata: None,
            page_count: 0,
            first_page_width: 0.0,
            load_state: LoadState::Loading,
        }
    }
}

struct OpenedDocument {
    handle: Arc<dyn DocumentHandle>,
    metadata: DocumentMetadata,
    page_count: usize,
    first_page_width: f32,
}

struct ViewerState {
    session: Option<DocumentSession>,
    scale: ScaleManager,
    tracker: PageTracker,
    layout: PageLayout,
    text_index: TextIndex,
    highlights: HighlightOverlay,
    panel: Panel,
    fullscreen: bool,
    container_width: f32,
}

impl ViewerState {
    fn new(config: &ViewerConfig) -> Self {
        Self {
            session: None,
            scale: ScaleManager::new(config),
            tracker: PageTracker::new(),
            layout: PageLayout::new(config.container_padding, config.page_gap),
            text_index: TextIndex::new(),
            highlights: HighlightOverlay::new(),
            panel: Panel::Welcome,
            fullscreen: false,
            container_width: 0.0,
        }
    }

    fn clear_document(&mut self) {
        self.session = None;
        self.scale.reset();
        self.tracker.clear();
        self.layout.clear();
        self.text_index.clear();
        self.highlights = HighlightOverlay::new();
    }

    fn ready_handle(&self) -> Option<(Arc<dyn DocumentHandle>, RenderLease, DocumentId)> {
        let session = self.session.as_ref()?;
        let handle = session.handle.clone()?;
        Some((handle, session.lease.clone(), session.document_id.clone()))
    }

    fn has_document(&self) -> bool {
        self.ready_handle().is_some()
    }

    /// Highlight queries are kept for a loading session and re-applied on
    /// its first commit; without a live session they are dropped.
    fn accepts_highlights(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.load_state != LoadState::Failed)
    }

    fn is_session(&self, serial: u64) -> bool {
        self.session.as_ref().map(|s| s.serial) == Some(serial)
    }

    fn commit(&mut self, rendered: RenderedLayout) -> usize {
        self.layout = rendered.layout;
        self.text_index.replace(rendered.texts);
        self.layout.scroll_into_view(self.tracker.current_page());
        self.highlights.reapply(&mut self.layout)
    }
}

struct ViewerInner {
    source: Arc<dyn DocumentSource>,
    engine: Arc<dyn DecodingEngine>,
    config: ViewerConfig,
    renderer: PageRenderer,
    generation: RenderGeneration,
    resize: Debouncer,
    state: Mutex<ViewerState>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

/// Document session controller. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Viewer {
    inner: Arc<ViewerInner>,
}

impl Viewer {
    /// An invalid `config` is replaced by the defaults.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        engine: Arc<dyn DecodingEngine>,
        config: ViewerConfig,
    ) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                warn!(error = %err, "invalid viewer configuration, using defaults");
                ViewerConfig::default()
            }
        };
        let inner = ViewerInner {
            source,
            engine,
            renderer: PageRenderer::new(&config),
            generation: RenderGeneration::new(),
            resize: Debouncer::new(config.resize_debounce()),
            state: Mutex::new(ViewerState::new(&config)),
            events: Arc::new(Mutex::new(Vec::new())),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.inner.config
    }

    /// The shared event queue. Front ends drain it after every input; it
    /// holds at most [`EVENT_QUEUE_LIMIT`] events and drops the oldest.
    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.inner.events)
    }

    pub fn drain_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.inner.events.lock())
    }

    pub fn view_state(&self) -> ViewState {
        let state = self.inner.state.lock();
        let nav = state.tracker.navigation();
        let session = state.session.as_ref();
        ViewState {
            panel: state.panel.clone(),
            load_state: session.map(|s| s.load_state).unwrap_or(LoadState::Idle),
            document_id: session.map(|s| s.document_id.clone()),
            document_name: session
                .and_then(|s| s.metadata.as_ref())
                .map(|m| m.original_name.clone()),
            current_page: nav.current_page,
            total_pages: nav.page_count,
            zoom_percent: state.scale.zoom_percent(),
            prev_enabled: nav.prev_enabled,
            next_enabled: nav.next_enabled,
            fullscreen: state.fullscreen,
            highlight_query: state.highlights.query().map(str::to_owned),
            highlighted_nodes: state.highlights.len(),
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.view_state().load_state
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        let state = self.inner.state.lock();
        state.session.as_ref().map(|s| s.document_id.clone())
    }

    pub fn metadata(&self) -> Option<DocumentMetadata> {
        let state = self.inner.state.lock();
        state.session.as_ref().and_then(|s| s.metadata.clone())
    }

    pub fn scale(&self) -> f32 {
        self.inner.state.lock().scale.scale()
    }

    pub fn current_page(&self) -> usize {
        self.inner.state.lock().tracker.current_page()
    }

    pub fn page_count(&self) -> usize {
        self.inner.state.lock().tracker.page_count()
    }

    pub fn navigation(&self) -> NavigationState {
        self.inner.state.lock().tracker.navigation()
    }

    /// Runs `f` against the current scroll container.
    pub fn with_layout<R>(&self, f: impl FnOnce(&PageLayout) -> R) -> R {
        f(&self.inner.state.lock().layout)
    }

    pub fn page_texts(&self) -> Vec<PageText> {
        self.inner.state.lock().text_index.pages().to_vec()
    }

    pub fn container_width(&self) -> f32 {
        self.inner.state.lock().container_width
    }

    /// Records the container width without refitting.
    pub fn set_container_width(&self, width: f32) {
        self.inner.state.lock().container_width = width;
    }

    fn push_event(&self, event: ViewerEvent) {
        let mut events = self.inner.events.lock();
        if events.len() >= EVENT_QUEUE_LIMIT {
            let overflow = events.len() + 1 - EVENT_QUEUE_LIMIT;
            events.drain(..overflow);
        }
        events.push(event);
    }

    fn push_navigation(&self, nav: NavigationState) {
        self.push_event(ViewerEvent::PageChanged(nav));
    }

    #[instrument(skip_all, fields(document = %document_id))]
    pub async fn load(&self, document_id: DocumentId) -> Result<(), ViewerError> {
        let token = self.inner.generation.begin(document_id.clone());
        let serial = token.generation();
        let nav = {
            let mut state = self.inner.state.lock();
            state.clear_document();
            state.session = Some(DocumentSession::loading(document_id.clone(), serial));
            state.panel = Panel::Loading;
            state.tracker.navigation()
        };
        self.push_event(ViewerEvent::LoadStateChanged {
            document_id: Some(document_id.clone()),
            state: LoadState::Loading,
        });
        self.push_navigation(nav);
        info!("loading document");

        let opened = self.open_document(&document_id).await;
        if !token.is_current() {
            debug!("load superseded before the document opened");
            return Ok(());
        }

        let opened = match opened {
            Ok(opened) => opened,
            Err(err) => {
                self.fail_load(serial, &document_id, &err);
                return Err(err);
            }
        };

        let nav = {
            let mut state = self.inner.state.lock();
            if !token.is_current() || !state.is_session(serial) {
                debug!("load superseded before the document opened");
                return Ok(());
            }
            let page_count = opened.page_count;
            if let Some(session) = state.session.as_mut() {
                session.handle = Some(opened.handle);
                session.metadata = Some(opened.metadata);
                session.page_count = page_count;
                session.first_page_width = opened.first_page_width;
            }
            state.tracker.reset(page_count);
            state.tracker.navigation()
        };
        info!(page_count = nav.page_count, "document opened");
        self.push_navigation(nav);

        let rendered = self.fit_to_width().await;

        let became_ready = {
            let mut state = self.inner.state.lock();
            match state.session.as_mut() {
                Some(session) if session.serial == serial => {
                    session.load_state = LoadState::Ready;
                    true
                }
                _ => false,
            }
        };
        if became_ready {
            self.push_event(ViewerEvent::LoadStateChanged {
                document_id: Some(document_id),
                state: LoadState::Ready,
            });
        }
        rendered
    }

    async fn open_document(&self, id: &DocumentId) -> Result<OpenedDocument, ViewerError> {
        let metadata = match self.inner.source.fetch_document_metadata(id).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(error = %err, "metadata unavailable, using the document id as its name");
                DocumentMetadata {
                    original_name: id.to_string(),
                    ..DocumentMetadata::default()
                }
            }
        };
        let bytes = self
            .inner
            .source
            .fetch_document_bytes(id)
            .await
            .map_err(|source| ViewerError::Fetch {
                id: id.clone(),
                source,
            })?;
        debug!(bytes = bytes.len(), "fetched document bytes");

        let decode_error = |source| ViewerError::Decode {
            id: id.clone(),
            source,
        };
        let handle = self.inner.engine.open(bytes).await.map_err(decode_error)?;
        let page_count = handle.page_count();
        if page_count == 0 {
            return Err(ViewerError::ZeroPages { id: id.clone() });
        }
        if metadata.page_count.is_some_and(|expected| expected != page_count) {
            warn!(
                expected = metadata.page_count,
                decoded = page_count,
                "catalog page count disagrees with decoded document"
            );
        }

        let first_page = handle.page(1).await.map_err(decode_error)?;
        let (first_page_width, _) = first_page.native_size();

        Ok(OpenedDocument {
            handle,
            metadata,
            page_count,
            first_page_width,
        })
    }

    fn fail_load(&self, serial: u64, document_id: &DocumentId, err: &ViewerError) {
        error!(error = %err, "failed to load document");
        {
            let mut state = self.inner.state.lock();
            if !state.is_session(serial) {
                return;
            }
            if let Some(session) = state.session.as_mut() {
                session.load_state = LoadState::Failed;
            }
            state.panel = Panel::LoadFailed {
                message: err.to_string(),
                retry: document_id.clone(),
            };
        }
        self.push_event(ViewerEvent::LoadStateChanged {
            document_id: Some(document_id.clone()),
            state: LoadState::Failed,
        });
    }

    /// Re-runs `load` for a document whose load failed.
    pub async fn retry(&self) -> Result<(), ViewerError> {
        let target = match &self.inner.state.lock().panel {
            Panel::LoadFailed { retry, .. } => Some(retry.clone()),
            _ => None,
        };
        match target {
            Some(id) => self.load(id).await,
            None => Ok(()),
        }
    }

    /// Drops the session and shows the welcome panel. Outstanding render
    /// passes and the resize timer are cancelled.
    #[instrument(skip(self))]
    pub fn teardown(&self) {
        self.inner.generation.cancel();
        self.inner.resize.cancel();
        let nav = {
            let mut state = self.inner.state.lock();
            state.clear_document();
            state.panel = Panel::Welcome;
            state.tracker.navigation()
        };
        info!("viewer reset");
        self.push_event(ViewerEvent::LoadStateChanged {
            document_id: None,
            state: LoadState::Idle,
        });
        self.push_navigation(nav);
        self.push_event(ViewerEvent::RedrawNeeded);
    }

    /// Rebuilds every page at the current scale, superseding any pass in
    /// flight. A no-op without an opened document.
    async fn render_pass(&self) -> Result<(), ViewerError> {
        let (handle, lease, token, scale, percent) = {
            let mut state = self.inner.state.lock();
            let Some((handle, lease, document_id)) = state.ready_handle() else {
                return Ok(());
            };
            let token = self.inner.generation.begin(document_id);
            state.layout.clear();
            state.text_index.clear();
            state.highlights.detach();
            let scale = state.scale.scale();
            (handle, lease, token, scale, state.scale.zoom_percent())
        };
        self.push_event(ViewerEvent::ZoomChanged { percent });

        let result = self
            .inner
            .renderer
            .render_all(handle.as_ref(), &lease, scale, &token)
            .await;
        drop(handle);

        let mut state = self.inner.state.lock();
        let same_document = state
            .session
            .as_ref()
            .map(|s| &s.document_id == token.document_id())
            .unwrap_or(false);
        if !token.is_current() || !same_document {
            debug!(
                generation = token.generation(),
                "discarding stale render pass"
            );
            return Ok(());
        }

        match result {
            Ok(Some(rendered)) => {
                let marked = state.commit(rendered);
                if matches!(state.panel, Panel::Loading | Panel::RenderFailed { .. }) {
                    state.panel = Panel::Document;
                }
                let query = state.highlights.query().map(str::to_owned);
                let nav = state.tracker.navigation();
                drop(state);
                if query.is_some() {
                    self.push_event(ViewerEvent::HighlightsChanged { query, marked });
                }
                self.push_navigation(nav);
                self.push_event(ViewerEvent::RedrawNeeded);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                error!(error = %err, "render pass failed");
                state.layout.clear();
                state.text_index.clear();
                state.panel = Panel::RenderFailed {
                    message: err.to_string(),
                };
                drop(state);
                self.push_event(ViewerEvent::RenderFailed {
                    page: err.page(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Re-runs the render pass at the current scale.
    pub async fn reload(&self) -> Result<(), ViewerError> {
        self.render_pass().await
    }

    pub async fn zoom_in(&self) -> Result<(), ViewerError> {
        {
            let mut state = self.inner.state.lock();
            if !state.has_document() {
                return Ok(());
            }
            let scale = state.scale.zoom_in();
            debug!(scale, "zoom in");
        }
        self.render_pass().await
    }

    pub async fn zoom_out(&self) -> Result<(), ViewerError> {
        {
            let mut state = self.inner.state.lock();
            if !state.has_document() {
                return Ok(());
            }
            let scale = state.scale.zoom_out();
            debug!(scale, "zoom out");
        }
        self.render_pass().await
    }

    /// Fits page 1 to the last known container width.
    pub async fn fit_to_width(&self) -> Result<(), ViewerError> {
        {
            let mut state = self.inner.state.lock();
            let Some(page_width) = state
                .session
                .as_ref()
                .filter(|s| s.handle.is_some())
                .map(|s| s.first_page_width)
            else {
                return Ok(());
            };
            let container_width = state.container_width;
            let scale = state.scale.fit_to_width(container_width, page_width);
            debug!(container_width, page_width, scale, "fit to width");
        }
        self.render_pass().await
    }

    /// Coalesces container resizes; the refit runs once the container has
    /// been quiet for the configured debounce delay.
    pub fn on_resize(&self, container_width: f32) {
        self.set_container_width(container_width);
        if !self.inner.state.lock().has_document() {
            return;
        }
        let weak: Weak<ViewerInner> = Arc::downgrade(&self.inner);
        self.inner.resize.schedule(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let viewer = Viewer { inner };
            if let Err(err) = viewer.fit_to_width().await {
                warn!(error = %err, "refit after resize failed");
            }
        });
    }

    pub fn resize_pending(&self) -> bool {
        self.inner.resize.is_pending()
    }

    /// Out-of-range pages are ignored. Returns whether navigation happened.
    pub fn go_to_page(&self, page: usize) -> bool {
        self.navigate(|tracker| tracker.go_to(page))
    }

    fn navigate(&self, step: impl FnOnce(&mut PageTracker) -> Option<usize>) -> bool {
        let (page, nav, offset) = {
            let mut state = self.inner.state.lock();
            if !state.has_document() {
                return false;
            }
            let Some(page) = step(&mut state.tracker) else {
                debug!(
                    current = state.tracker.current_page(),
                    "ignoring out-of-range page"
                );
                return false;
            };
            let offset = state.layout.scroll_into_view(page);
            (page, state.tracker.navigation(), offset)
        };
        if let Some(offset) = offset {
            self.push_event(ViewerEvent::ScrollTo {
                page,
                offset,
                smooth: true,
            });
        }
        self.push_navigation(nav);
        true
    }

    pub fn next_page(&self) -> bool {
        self.navigate(PageTracker::next)
    }

    pub fn previous_page(&self) -> bool {
        self.navigate(PageTracker::previous)
    }

    /// Updates the current page from the container's scroll offset.
    pub fn on_scroll(&self, scroll_top: f32) {
        let nav = {
            let mut state = self.inner.state.lock();
            if !state.has_document() {
                return;
            }
            state.layout.set_scroll_top(scroll_top);
            let top = state.layout.scroll_top();
            let Some(page) = state.layout.page_at(top) else {
                return;
            };
            if !state.tracker.follow_scroll(page) {
                return;
            }
            state.tracker.navigation()
        };
        self.push_navigation(nav);
    }

    pub fn toggle_fullscreen(&self) -> bool {
        let fullscreen = {
            let mut state = self.inner.state.lock();
            state.fullscreen = !state.fullscreen;
            state.fullscreen
        };
        self.push_event(ViewerEvent::FullscreenChanged(fullscreen));
        fullscreen
    }

    /// First match per page of the current document. A blank query clears
    /// highlights and returns nothing.
    pub fn search(&self, query: &str) -> Vec<SearchMatch> {
        if query.trim().is_empty() {
            self.clear_highlights();
            return Vec::new();
        }
        let state = self.inner.state.lock();
        state
            .text_index
            .search(query, self.inner.config.snippet_radius)
    }

    /// Replaces any previous highlight set with nodes matching `query`.
    pub fn apply_highlights(&self, query: &str) -> usize {
        let (marked, active) = {
            let mut state = self.inner.state.lock();
            if !state.accepts_highlights() {
                return 0;
            }
            let state = &mut *state;
            let marked = state.highlights.apply(&mut state.layout, query);
            (marked, state.highlights.query().map(str::to_owned))
        };
        debug!(marked, "highlights applied");
        self.push_event(ViewerEvent::HighlightsChanged {
            query: active,
            marked,
        });
        marked
    }

    pub fn clear_highlights(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.highlights.query().is_none() && state.highlights.is_empty() {
                return;
            }
            let state = &mut *state;
            state.highlights.clear(&mut state.layout);
        }
        self.push_event(ViewerEvent::HighlightsChanged {
            query: None,
            marked: 0,
        });
    }

    pub async fn search_names(&self, query: &str) -> Result<Vec<DocumentSummary>, ViewerError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.inner
            .source
            .search_names(query.trim())
            .await
            .map_err(|source| ViewerError::Search { source })
    }

    pub async fn search_content(&self, query: &str) -> Result<Vec<ContentSearchHit>, ViewerError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.inner
            .source
            .search_content(query.trim())
            .await
            .map_err(|source| ViewerError::Search { source })
    }

    /// Opens the document of a content-search hit (unless it is already
    /// shown), jumps to its first matching page and highlights `query`.
    #[instrument(skip(self, hit), fields(document = %hit.document_id))]
    pub async fn open_content_match(
        &self,
        hit: &ContentSearchHit,
        query: &str,
    ) -> Result<Vec<SearchMatch>, ViewerError> {
        let already_open = {
            let state = self.inner.state.lock();
            state
                .session
                .as_ref()
                .map(|s| s.document_id == hit.document_id && s.load_state == LoadState::Ready)
                .unwrap_or(false)
        };
        if !already_open {
            self.load(hit.document_id.clone()).await?;
        }

        let matches = self.search(query);
        let target = hit
            .first_page()
            .or_else(|| matches.first().map(|found| found.page_number));
        if let Some(page) = target {
            self.go_to_page(page);
        }
        self.apply_highlights(query);
        Ok(matches)
    }

    /// Keyboard and UI entry point. Commands that need a document are
    /// no-ops while none is loaded.
    pub async fn dispatch(&self, command: ViewerCommand) -> Result<(), ViewerError> {
        let loaded = self.inner.state.lock().has_document();
        match command {
            ViewerCommand::Retry => return self.retry().await,
            ViewerCommand::Close => {
                self.teardown();
                return Ok(());
            }
            ViewerCommand::ToggleFullscreen => {
                self.toggle_fullscreen();
                return Ok(());
            }
            _ if !loaded => return Ok(()),
            _ => {}
        }

        match command {
            ViewerCommand::NextPage => {
                self.next_page();
            }
            ViewerCommand::PreviousPage => {
                self.previous_page();
            }
            ViewerCommand::GoToPage { page } => {
                self.go_to_page(page);
            }
            ViewerCommand::ZoomIn => self.zoom_in().await?,
            ViewerCommand::ZoomOut => self.zoom_out().await?,
            ViewerCommand::FitToWidth => self.fit_to_width().await?,
            ViewerCommand::Search { query } => {
                let matches = self.search(&query);
                if let Some(first) = matches.first() {
                    self.go_to_page(first.page_number);
                }
                if !query.trim().is_empty() {
                    self.apply_highlights(&query);
                }
            }
            ViewerCommand::ClearHighlights => self.clear_highlights(),
            ViewerCommand::Reload => self.reload().await?,
            ViewerCommand::Retry | ViewerCommand::Close | ViewerCommand::ToggleFullscreen => {}
        }
        Ok(())
    }
}
