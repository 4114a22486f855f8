
use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::extract::{is_supported, read_document};
use crate::rag::RagService;
use crate::server;
use crate::store::{DeletionFilter, Metadata};

pub const DEFAULT_INGEST_BATCH_SIZE: usize = 50;

/// Outcome of a folder ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub documents: usize,
    pub replaced: u64,
    pub failed: Vec<PathBuf>,
}

async fn connect(config: &Config) -> Result<RagService> {
    RagService::initialize(config)
        .await
        .context("Failed to initialize RAG service")
}

/// Run the HTTP server
#[inline]
pub async fn serve(config: &Config, bind: Option<&str>, warm_up: bool) -> Result<()> {
    let addr = match bind {
        Some(bind) => bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", bind))?,
        None => config.server.bind_addr()?,
    };

    let service = connect(config).await?;

    if warm_up {
        service
            .warm_up()
            .await
            .context("Warm-up failed; start with --no-warm-up to skip it")?;
    }

    server::serve(addr, Arc::new(service))
        .await
        .context("HTTP server failed")
}

/// Every supported file under `path`, in a stable order
#[inline]
pub fn collect_documents(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        if !is_supported(path) {
            bail!("Unsupported file format: {}", path.display());
        }
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        bail!("Path does not exist: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if entry.file_type().is_file() && is_supported(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    Ok(files)
}

fn title_filter(title: &str) -> DeletionFilter {
    let mut conditions = Metadata::new();
    conditions.insert("title".to_string(), json!(title));
    DeletionFilter::new(conditions)
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if visible {
        ProgressBar::new(len as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}

/// Chunk and ingest files, sending `batch_size` documents per call
///
/// A file that fails is recorded in the summary and the rest continue.
#[inline]
pub async fn ingest_files(
    service: &RagService,
    files: &[PathBuf],
    replace: bool,
    batch_size: usize,
    show_progress: bool,
) -> Result<IngestSummary> {
    let batch_size = batch_size.max(1);
    let progress = progress_bar(files.len(), show_progress);
    let mut summary = IngestSummary::default();

    for file in files {
        let title = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        progress.set_message(title.clone());

        match ingest_file(service, file, &title, replace, batch_size).await {
            Ok((documents, replaced)) => {
                summary.files += 1;
                summary.documents += documents;
                summary.replaced += replaced;
            }
            Err(e) => {
                warn!("Failed to ingest {}: {:#}", file.display(), e);
                summary.failed.push(file.clone());
            }
        }
        progress.inc(1);
    }

    progress.finish_and_clear();
    info!(
        "Ingested {} documents from {} files ({} failed)",
        summary.documents,
        summary.files,
        summary.failed.len()
    );
    Ok(summary)
}

async fn ingest_file(
    service: &RagService,
    file: &Path,
    title: &str,
    replace: bool,
    batch_size: usize,
) -> Result<(usize, u64)> {
    let text = read_document(file)?;

    let replaced = if replace {
        service.delete(&title_filter(title)).await?
    } else {
        0
    };

    let source = file.display().to_string();
    let documents = service.chunk_documents(title, Some(&source), &text)?;

    let mut written = 0;
    for batch in documents.chunks(batch_size) {
        written += service
            .ingest(batch.to_vec())
            .await
            .with_context(|| format!("Failed to ingest batch from {}", file.display()))?;
    }

    Ok((written, replaced))
}

/// Ingest a file or folder
#[inline]
pub async fn ingest_path(
    config: &Config,
    path: &Path,
    replace: bool,
    batch_size: usize,
) -> Result<()> {
    let files = collect_documents(path)?;
    if files.is_empty() {
        println!("No .txt or .md files found under {}", path.display());
        return Ok(());
    }

    let service = connect(config).await?;
    let summary = ingest_files(&service, &files, replace, batch_size, true).await?;

    println!(
        "{} Ingested {} chunks from {} files",
        style("✓").green(),
        summary.documents,
        summary.files
    );
    if replace {
        println!("  Replaced {} existing chunks", summary.replaced);
    }
    for failed in &summary.failed {
        println!("  {} {}", style("✗").red(), failed.display());
    }

    Ok(())
}

/// Answer a question and print it
#[inline]
pub async fn query(config: &Config, text: &str, top_k: Option<usize>) -> Result<()> {
    let service = connect(config).await?;
    let result = service.query(text, top_k).await?;

    println!("{}", result.answer);

    if let Some(sources) = result.sources.filter(|sources| !sources.is_empty()) {
        println!();
        println!("{}", style("Sources:").bold());
        for source in sources {
            println!(
                "  {:.3}  {}",
                source.score,
                source.title.as_deref().unwrap_or("(untitled)")
            );
        }
    }

    Ok(())
}

/// Parse `key=value` pairs; values are JSON when they parse, strings otherwise
#[inline]
pub fn parse_filter(pairs: &[String]) -> Result<DeletionFilter> {
    let mut conditions = Metadata::new();

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid filter '{}': expected key=value", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid filter '{}': key is empty", pair);
        }

        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| json!(raw));
        conditions.insert(key.to_string(), value);
    }

    Ok(DeletionFilter::new(conditions))
}

/// Delete every document matching the filter
#[inline]
pub async fn delete(config: &Config, pairs: &[String]) -> Result<()> {
    let filter = parse_filter(pairs)?;
    if filter.is_empty() {
        bail!("Refusing to delete with an empty filter; pass --filter key=value");
    }

    let service = connect(config).await?;
    let deleted = service.delete(&filter).await?;

    println!("Deleted {} documents", deleted);
    Ok(())
}

/// Print store and provider status
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let service = connect(config).await?;
    let status = service.status().await?;
    let health = service.provider_health().await;

    println!("{}", style("📊 kb-rag Status").bold().cyan());
    println!();
    println!("Vector store: {}", status.backend);
    println!("Documents:    {}", status.documents);
    println!(
        "Embedding:    {} ({})",
        config.embedding.backend.as_str(),
        config.embedding.model
    );
    print_health(health.embedding.as_deref());
    println!(
        "Generation:   {} ({})",
        config.generation.backend.as_str(),
        config.generation.model
    );
    print_health(health.generation.as_deref());

    Ok(())
}

fn print_health(error: Option<&str>) {
    match error {
        None => println!("              {}", style("healthy").green()),
        Some(error) => println!("              {} {}", style("unavailable:").red(), error),
    }
}
