use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use docview_core::{
    ContentSearchHit, DecodingEngine, DocumentId, DocumentSource, DocumentSummary, Viewer,
    ViewerCommand, ViewerConfig,
};
use docview_render::PdfiumEngine;
use docview_tty::{status_line, write_status_line, DrawParams, EventMapper, KittyRenderer, UiEvent};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod source;

use source::{DirectorySource, HttpDocumentSource};

/// Layout units moved per scroll step.
const SCROLL_STEP: f32 = 120.0;
/// Container width assumed per terminal column when the terminal does not
/// report its pixel size.
const FALLBACK_CELL_WIDTH: f32 = 8.0;

#[derive(Debug, Parser)]
#[command(
    name = "docview",
    version,
    about = "continuous document viewer for kitty-compatible terminals"
)]
struct Args {
    /// Document id to open (numeric id for the service, file stem for --dir)
    document: Option<String>,

    /// Document service API root
    #[arg(long, default_value = "http://localhost:8000/api", conflicts_with = "dir")]
    base_url: String,

    /// Serve documents from a local directory of PDFs instead of the service
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Viewer configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Page to show after loading (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Open the first document whose content matches and highlight the query
    #[arg(long = "match", value_name = "QUERY", conflicts_with = "document")]
    content_match: Option<String>,

    /// Print documents whose name matches and exit
    #[arg(long, value_name = "QUERY")]
    find_names: Option<String>,

    /// Print per-page content matches across all documents and exit
    #[arg(long, value_name = "QUERY")]
    find_content: Option<String>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "docview", "docview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = ViewerConfig::load(&config_path)?;
    info!(path = %config_path.display(), "configuration loaded");

    let engine: Arc<dyn DecodingEngine> = Arc::new(PdfiumEngine::new()?);
    let source: Arc<dyn DocumentSource> = match &args.dir {
        Some(dir) => Arc::new(DirectorySource::new(dir.clone(), Arc::clone(&engine))?),
        None => Arc::new(HttpDocumentSource::new(&args.base_url)?),
    };
    let viewer = Viewer::new(source, engine, config);

    if let Some(query) = &args.find_names {
        let found = viewer.search_names(query).await?;
        print_summaries(&found)?;
        return Ok(());
    }
    if let Some(query) = &args.find_content {
        let hits = viewer.search_content(query).await?;
        print_content_hits(&hits)?;
        return Ok(());
    }

    run_terminal(&viewer, &args).await
}

async fn run_terminal(viewer: &Viewer, args: &Args) -> Result<()> {
    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut renderer = KittyRenderer::new(stdout);
    let mut mapper = EventMapper::new();

    viewer.set_container_width(container_width()?);

    if let Some(id) = &args.document {
        if let Err(err) = viewer.load(DocumentId::new(id.as_str())).await {
            warn!(error = %err, "initial load failed");
        }
        if let Some(page) = args.page {
            viewer.go_to_page(page);
        }
    } else if let Some(query) = &args.content_match {
        open_first_match(viewer, query).await;
    }

    let mut dirty = true;
    loop {
        if !viewer.drain_events().is_empty() {
            dirty = true;
        }
        if dirty {
            redraw(&mut renderer, viewer, mapper.pending_input().as_deref())?;
            dirty = false;
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            Event::Resize(_, _) => {
                viewer.on_resize(container_width()?);
                dirty = true;
            }
            ev => match handle_event(viewer, mapper.map_event(ev)).await {
                LoopAction::Continue => {}
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Quit => break,
            },
        }
    }

    viewer.teardown();
    renderer.delete_image()?;
    renderer.clear_all()?;
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

async fn handle_event(viewer: &Viewer, event: UiEvent) -> LoopAction {
    match event {
        UiEvent::Command(command) => {
            if let Err(err) = viewer.dispatch(command).await {
                warn!(error = %err, "command failed");
            }
            LoopAction::ContinueRedraw
        }
        UiEvent::Scroll { steps } => {
            let top = viewer.with_layout(|layout| layout.scroll_top()) + steps as f32 * SCROLL_STEP;
            viewer.on_scroll(top);
            LoopAction::ContinueRedraw
        }
        UiEvent::SearchQueryChanged { query } => {
            if query.trim().is_empty() {
                viewer.clear_highlights();
            } else {
                viewer.apply_highlights(&query);
            }
            LoopAction::ContinueRedraw
        }
        UiEvent::SearchSubmit { query } => {
            if let Err(err) = viewer.dispatch(ViewerCommand::Search { query }).await {
                warn!(error = %err, "search failed");
            }
            LoopAction::ContinueRedraw
        }
        UiEvent::SearchCancel => {
            viewer.clear_highlights();
            LoopAction::ContinueRedraw
        }
        UiEvent::BeginSearch => LoopAction::ContinueRedraw,
        UiEvent::Quit => LoopAction::Quit,
        UiEvent::None => LoopAction::Continue,
    }
}

async fn open_first_match(viewer: &Viewer, query: &str) {
    let hits = match viewer.search_content(query).await {
        Ok(hits) => hits,
        Err(err) => {
            warn!(error = %err, "content search failed");
            return;
        }
    };
    let Some(hit) = hits.first() else {
        info!(query, "no document matches");
        return;
    };
    if let Err(err) = viewer.open_content_match(hit, query).await {
        warn!(error = %err, document = %hit.document_id, "failed to open match");
    }
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &Viewer,
    pending_input: Option<&str>,
) -> Result<()> {
    let window = terminal::window_size()?;
    let total_cols = u32::from(window.columns).max(1);
    let total_rows = u32::from(window.rows).max(1);
    let state = viewer.view_state();
    let image_rows = if state.fullscreen {
        total_rows
    } else {
        total_rows.saturating_sub(1).max(1)
    };
    let cell = (window.width > 0 && window.height > 0).then(|| {
        (
            f32::from(window.width) / total_cols as f32,
            f32::from(window.height) / total_rows as f32,
        )
    });

    renderer.begin_sync_update()?;
    renderer.delete_image()?;
    renderer.clear_all()?;

    let page = viewer.with_layout(|layout| layout.page(state.current_page).cloned());
    if let Some(page) = page {
        let params = DrawParams::fit(&page.raster, total_cols, image_rows, cell);
        let start_col = total_cols.saturating_sub(params.columns) / 2;
        crossterm::execute!(renderer.writer(), cursor::MoveTo(start_col as u16, 0))?;
        renderer.draw_page(&page, params)?;
    }

    if !state.fullscreen {
        crossterm::execute!(
            renderer.writer(),
            cursor::MoveTo(0, total_rows.saturating_sub(1) as u16),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(renderer.writer(), &status_line(&state, pending_input))?;
    }
    renderer.end_sync_update()?;
    Ok(())
}

/// Container width in layout units: the terminal's pixel width, or an
/// estimate from its column count.
fn container_width() -> Result<f32> {
    let window = terminal::window_size()?;
    if window.width > 0 {
        Ok(f32::from(window.width))
    } else {
        Ok(f32::from(window.columns) * FALLBACK_CELL_WIDTH)
    }
}

fn print_summaries(found: &[DocumentSummary]) -> Result<()> {
    let mut out = io::stdout().lock();
    for doc in found {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            doc.id,
            doc.original_name,
            doc.category.as_deref().unwrap_or("-"),
            doc.page_count
                .map(|count| count.to_string())
                .unwrap_or_else(|| "-".into())
        )?;
    }
    Ok(())
}

fn print_content_hits(hits: &[ContentSearchHit]) -> Result<()> {
    let mut out = io::stdout().lock();
    for hit in hits {
        let pages: Vec<String> = hit
            .pages
            .iter()
            .map(|page| format!("p{}({})", page.page, page.matches))
            .collect();
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            hit.document_id,
            hit.document_name,
            hit.total_matches,
            pages.join(" ")
        )?;
    }
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "docview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_and_base_url_are_exclusive() {
        let err = Args::try_parse_from([
            "docview",
            "--dir",
            "/tmp",
            "--base-url",
            "http://x/api",
            "7",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn defaults_target_the_local_service() {
        let args = Args::try_parse_from(["docview", "42", "-p", "3"]).unwrap();
        assert_eq!(args.document.as_deref(), Some("42"));
        assert_eq!(args.base_url, "http://localhost:8000/api");
        assert_eq!(args.page, Some(3));
        assert!(args.dir.is_none());
    }

    #[test]
    fn content_match_replaces_document_argument() {
        let args = Args::try_parse_from(["docview", "--match", "bridge"]).unwrap();
        assert_eq!(args.content_match.as_deref(), Some("bridge"));
        assert!(Args::try_parse_from(["docview", "7", "--match", "bridge"]).is_err());
    }
}
