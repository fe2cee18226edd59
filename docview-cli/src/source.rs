//! `DocumentSource` implementations: the document service REST API and a
//! plain directory of PDF files.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use docview_core::{
    contains_ignore_case, find_ignore_case, ContentSearchHit, DecodingEngine, DocumentId,
    DocumentMetadata, DocumentSource, DocumentSummary, PageHits, PageText,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the document service. `base` is the API root, e.g.
/// `http://localhost:8000/api`.
pub struct HttpDocumentSource {
    base: Url,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    id: i64,
    original_name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    page_count: Option<usize>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    classification_level: Option<String>,
}

impl WireDocument {
    fn id(&self) -> DocumentId {
        DocumentId::new(self.id.to_string())
    }

    fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id(),
            original_name: self.original_name.clone(),
            category: self.category.clone(),
            page_count: self.page_count,
        }
    }
}

impl From<WireDocument> for DocumentMetadata {
    fn from(doc: WireDocument) -> Self {
        Self {
            page_count: doc.page_count,
            original_name: doc.original_name,
            file_size: doc.file_size.unwrap_or_default(),
            upload_date: doc.upload_date,
            category: doc.category,
            classification_level: doc.classification_level,
            description: doc.description,
            tags: doc.tags.into_iter().filter(|tag| !tag.is_empty()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSearch {
    #[serde(default)]
    results: Vec<WirePageHits>,
    #[serde(default)]
    total_matches: usize,
}

#[derive(Debug, Deserialize)]
struct WirePageHits {
    page: usize,
    matches: usize,
}

impl HttpDocumentSource {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base).with_context(|| format!("invalid base url {base:?}"))?;
        if base.cannot_be_a_base() {
            bail!("base url {base} cannot carry a path");
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(HTTP_TIMEOUT)
            .timeout_read(HTTP_TIMEOUT)
            .build();
        Ok(Self { base, agent })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("base url {} cannot carry a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, id: &DocumentId) -> Result<Url> {
        self.endpoint(&["documents", "doc", id.as_str()])
    }

    fn content_url(&self, id: &DocumentId) -> Result<Url> {
        self.endpoint(&["documents", "doc", id.as_str(), "content"])
    }

    fn search_url(&self, id: &DocumentId, term: &str) -> Result<Url> {
        self.endpoint(&["documents", "doc", id.as_str(), "search", term])
    }

    fn listing_url(&self, search: &str) -> Result<Url> {
        let mut url = self.endpoint(&["documents", ""])?;
        url.query_pairs_mut().append_pair("search", search);
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let response = call(&agent, &url)?;
            response
                .into_json::<T>()
                .with_context(|| format!("unexpected response body from {url}"))
        })
        .await
        .context("http worker failed")?
    }

    async fn get_bytes(&self, url: Url) -> Result<Bytes> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || -> Result<Bytes> {
            let response = call(&agent, &url)?;
            let mut body = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut body)
                .with_context(|| format!("failed to read body from {url}"))?;
            Ok(Bytes::from(body))
        })
        .await
        .context("http worker failed")?
    }

    async fn list(&self, search: &str) -> Result<Vec<WireDocument>> {
        self.get_json(self.listing_url(search)?).await
    }
}

fn call(agent: &ureq::Agent, url: &Url) -> Result<ureq::Response> {
    debug!(%url, "GET");
    match agent.request_url("GET", url).call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, _)) => Err(anyhow!("GET {url} returned HTTP {code}")),
        Err(err) => Err(anyhow!("GET {url} failed: {err}")),
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_document_bytes(&self, id: &DocumentId) -> Result<Bytes> {
        self.get_bytes(self.content_url(id)?).await
    }

    async fn fetch_document_metadata(&self, id: &DocumentId) -> Result<DocumentMetadata> {
        let doc: WireDocument = self.get_json(self.document_url(id)?).await?;
        Ok(doc.into())
    }

    async fn search_names(&self, query: &str) -> Result<Vec<DocumentSummary>> {
        let docs = self.list(query).await?;
        Ok(docs.iter().map(WireDocument::summary).collect())
    }

    /// Asks the service for matches in every listed document and keeps the
    /// documents with at least one.
    #[instrument(skip(self))]
    async fn search_content(&self, query: &str) -> Result<Vec<ContentSearchHit>> {
        let docs = self.list("").await?;
        let mut hits = Vec::new();
        for doc in docs {
            let id = doc.id();
            let search: WireSearch = match self.get_json(self.search_url(&id, query)?).await {
                Ok(search) => search,
                Err(err) => {
                    warn!(document = %id, error = %err, "content search failed for document");
                    continue;
                }
            };
            if let Some(hit) = content_hit(id, doc.original_name, search) {
                hits.push(hit);
            }
        }
        Ok(hits)
    }
}

fn content_hit(
    document_id: DocumentId,
    document_name: String,
    search: WireSearch,
) -> Option<ContentSearchHit> {
    let pages: Vec<PageHits> = search
        .results
        .into_iter()
        .filter(|hit| hit.matches > 0)
        .map(|hit| PageHits {
            page: hit.page,
            matches: hit.matches,
        })
        .collect();
    if pages.is_empty() {
        return None;
    }
    let total_matches = if search.total_matches > 0 {
        search.total_matches
    } else {
        pages.iter().map(|hit| hit.matches).sum()
    };
    Some(ContentSearchHit {
        document_id,
        document_name,
        pages,
        total_matches,
    })
}

/// A directory of PDF files. A document's id is its file stem.
pub struct DirectorySource {
    root: PathBuf,
    engine: Arc<dyn DecodingEngine>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, engine: Arc<dyn DecodingEngine>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("{:?} is not a directory", root);
        }
        Ok(Self { root, engine })
    }

    fn path_for(&self, id: &DocumentId) -> Result<PathBuf> {
        self.documents()?
            .into_iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, path)| path)
            .ok_or_else(|| anyhow!("document {id} not found in {:?}", self.root))
    }

    fn documents(&self) -> Result<Vec<(DocumentId, PathBuf)>> {
        let mut found = Vec::new();
        for entry in
            fs::read_dir(&self.root).with_context(|| format!("failed to list {:?}", self.root))?
        {
            let path = entry?.path();
            if !is_pdf(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                found.push((DocumentId::new(stem), path.clone()));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    async fn scan(
        &self,
        id: DocumentId,
        path: &Path,
        query: &str,
    ) -> Result<Option<ContentSearchHit>> {
        let bytes = read_file(path.to_path_buf()).await?;
        let document = self.engine.open(bytes).await?;
        let mut pages = Vec::new();
        for page_number in 1..=document.page_count() {
            let items = document.page(page_number).await?.text_content().await?;
            let text = PageText::from_items(page_number, &items).text;
            let matches = count_matches(&text, query);
            if matches > 0 {
                pages.push(PageHits {
                    page: page_number,
                    matches,
                });
            }
        }
        if pages.is_empty() {
            return Ok(None);
        }
        Ok(Some(ContentSearchHit {
            document_name: file_name(path),
            document_id: id,
            total_matches: pages.iter().map(|hit| hit.matches).sum(),
            pages,
        }))
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn fetch_document_bytes(&self, id: &DocumentId) -> Result<Bytes> {
        read_file(self.path_for(id)?).await
    }

    async fn fetch_document_metadata(&self, id: &DocumentId) -> Result<DocumentMetadata> {
        let path = self.path_for(id)?;
        let meta = fs::metadata(&path).with_context(|| format!("failed to stat {:?}", path))?;
        Ok(DocumentMetadata {
            original_name: file_name(&path),
            file_size: meta.len(),
            ..DocumentMetadata::default()
        })
    }

    async fn search_names(&self, query: &str) -> Result<Vec<DocumentSummary>> {
        Ok(self
            .documents()?
            .into_iter()
            .filter(|(_, path)| {
                query.trim().is_empty() || contains_ignore_case(&file_name(path), query.trim())
            })
            .map(|(id, path)| DocumentSummary {
                id,
                original_name: file_name(&path),
                category: None,
                page_count: None,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn search_content(&self, query: &str) -> Result<Vec<ContentSearchHit>> {
        let mut hits = Vec::new();
        for (id, path) in self.documents()? {
            match self.scan(id.clone(), &path, query).await {
                Ok(Some(hit)) => hits.push(hit),
                Ok(None) => {}
                Err(err) => warn!(document = %id, error = %err, "skipping unreadable document"),
            }
        }
        Ok(hits)
    }
}

async fn read_file(path: PathBuf) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || {
        fs::read(&path)
            .map(Bytes::from)
            .with_context(|| format!("failed to read {:?}", path))
    })
    .await
    .context("file reader failed")?
}

fn is_pdf(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Non-overlapping case-insensitive occurrences of `query` in `text`.
fn count_matches(text: &str, query: &str) -> usize {
    let query = query.trim();
    let mut count = 0;
    let mut rest = text;
    while let Some((_, end)) = find_ignore_case(rest, query) {
        count += 1;
        rest = &rest[end..];
    }
    count
}
