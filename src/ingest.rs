//! Ingestion orchestration: documents and crawled web pages in, an
//! updated on-disk index out.
//!
//! Both paths share the same pipeline tail: chunk the extracted text,
//! embed the passages in batches, append to the index, persist after
//! every batch. Persisting per batch keeps progress durable, so an
//! interrupted run loses at most the in-flight batch. Per-source
//! failures are recorded and reported; they never abort the run.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::chunk::chunk;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::extract::{extract_file, SelectorExtractor, SUPPORTED_EXTENSIONS};
use crate::index::IndexStore;
use crate::models::{IngestReport, ManifestEntry, Passage, WebSource};
use crate::retry::CancelToken;

/// Default chunking for local documents.
pub const DOC_CHUNK_SIZE: usize = 1024;
pub const DOC_CHUNK_OVERLAP: usize = 128;

/// Default chunking for web pages, where blocks run shorter.
pub const WEB_CHUNK_SIZE: usize = 1000;
pub const WEB_CHUNK_OVERLAP: usize = 150;

const MANIFEST_FILE: &str = "manifest.json";
const SNIPPET_CHARS: usize = 200;

pub struct Ingestor<'a> {
    config: &'a Config,
    embedder: EmbeddingClient,
    index_dir: &'a Path,
}

impl<'a> Ingestor<'a> {
    pub fn new(config: &'a Config, index_dir: &'a Path) -> Result<Self> {
        Ok(Self {
            config,
            embedder: EmbeddingClient::new(config)?,
            index_dir,
        })
    }

    /// Ingest every supported document under `dir` (recursive). Files
    /// that fail to extract are reported and skipped.
    pub async fn ingest_documents(
        &self,
        dir: &Path,
        chunk_size: usize,
        overlap: usize,
        cancel: &CancelToken,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut pending: Vec<Passage> = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::Config(format!("cannot walk {}: {}", dir.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();
            if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            let source = path.display().to_string();
            match extract_file(path) {
                Ok(text) => {
                    let passages = chunk(&text, &source, chunk_size, overlap)?;
                    tracing::info!(source = %source, passages = passages.len(), "extracted document");
                    pending.extend(passages);
                    report.sources_processed += 1;
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "skipping unreadable document");
                    report.record_failure(source, e.to_string());
                }
            }
        }

        self.embed_and_store(pending, cancel, &mut report).await?;
        Ok(report)
    }

    /// Crawl the given web sources and ingest the extracted blocks.
    /// Writes a `manifest.json` into the index directory describing the
    /// provenance of every passage added by this run.
    pub async fn ingest_web(
        &self,
        sources: &[WebSource],
        max_depth: u32,
        chunk_size: usize,
        overlap: usize,
        cancel: &CancelToken,
    ) -> Result<IngestReport> {
        let crawler = Crawler::new(self.config, max_depth)?;
        let mut report = IngestReport::default();
        let mut pending: Vec<Passage> = Vec::new();
        let mut manifest: Vec<ManifestEntry> = Vec::new();
        // One visited set for the whole run: a URL listed under two
        // source entries is fetched once, under the first entry's rules.
        let mut visited: HashSet<String> = HashSet::new();

        for source in sources {
            let extractor =
                SelectorExtractor::new(source.selectors.clone(), source.tags.clone());
            let outcome = crawler
                .crawl(&source.url, &extractor, &mut visited, cancel)
                .await?;
            for (url, reason) in outcome.failures {
                report.record_failure(url, reason);
            }
            for page in outcome.pages {
                let mut page_passages = 0usize;
                for block in &page.blocks {
                    let passages = chunk(&block.text, &page.url, chunk_size, overlap)?;
                    for passage in passages {
                        manifest.push(ManifestEntry {
                            id: passage.id.clone(),
                            source: passage.source.clone(),
                            extract_method: block.method.as_str().to_string(),
                            extract_pattern: block.pattern.clone(),
                            position: passage.position,
                            snippet: snippet(&passage.text),
                        });
                        pending.push(passage);
                        page_passages += 1;
                    }
                }
                tracing::info!(url = %page.url, depth = page.depth, passages = page_passages, "ingested page");
                report.sources_processed += 1;
            }
        }

        self.embed_and_store(pending, cancel, &mut report).await?;

        fs::create_dir_all(self.index_dir)?;
        fs::write(
            self.index_dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        Ok(report)
    }

    /// Embed `passages` batch by batch, appending and persisting the
    /// index after each batch. Cancellation is honored on the batch
    /// boundary, so already-persisted batches survive. A backend outage
    /// mid-run does not abort: the sources whose passages are still
    /// unembedded are recorded as failed and the report survives.
    async fn embed_and_store(
        &self,
        passages: Vec<Passage>,
        cancel: &CancelToken,
        report: &mut IngestReport,
    ) -> Result<()> {
        if passages.is_empty() {
            return Ok(());
        }

        let mut index = IndexStore::open_or_create(self.index_dir, None)?;
        let mut offset = 0;
        while offset < passages.len() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let end = (offset + self.config.embed_batch_size).min(passages.len());
            let batch = &passages[offset..end];
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let vectors = match self.embedder.embed(&texts, cancel).await {
                Ok(vectors) => vectors,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e @ Error::BackendUnavailable { .. }) => {
                    // The backend is down after retries; further batches
                    // would only fail the same way. Mark what is left as
                    // failed and let the run report what it did persist.
                    tracing::warn!(error = %e, "embedding backend lost mid-run, stopping");
                    let reason = e.to_string();
                    let mut recorded: HashSet<&str> = HashSet::new();
                    for passage in &passages[offset..] {
                        if recorded.insert(passage.source.as_str()) {
                            report.record_failure(passage.source.clone(), reason.clone());
                        }
                    }
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            index.append(batch.iter().cloned().zip(vectors).collect())?;
            index.persist()?;
            report.passages_added += batch.len() as u64;
            tracing::debug!(batch = batch.len(), total = index.len(), "persisted batch");
            offset = end;
        }
        Ok(())
    }
}

/// Load web source definitions from a JSON file: either a single
/// object or an array of them. Entries without a `url` are skipped
/// with a warning.
pub fn load_web_sources(path: &Path) -> Result<Vec<WebSource>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let sources: Vec<WebSource> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };

    let (kept, dropped): (Vec<_>, Vec<_>) =
        sources.into_iter().partition(|s| !s.url.is_empty());
    if !dropped.is_empty() {
        tracing::warn!(
            file = %path.display(),
            skipped = dropped.len(),
            "skipping web sources without a url"
        );
    }
    Ok(kept)
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    text.chars().take(SNIPPET_CHARS).collect()
}
