use crate::chunking::chunk_paragraphs;
use crate::config::{ChunkingOptions, Settings};
use crate::extractor::{extract_titles, paragraphs_of, PdfExtractor};
use crate::index::ChunkIndex;
use crate::models::{
    ChunkMetadata, DocumentStatus, DocumentVersion, IndexOutcome, IndexProgress, IndexReport,
};
use crate::IngestError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Documents are identified by their path as given.
pub fn document_id_for(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicUsize,
    in_flight: AtomicUsize,
    done: AtomicUsize,
}

/// Decrements the in-flight counter when a job ends, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs the version-check / delete / extract / chunk / store cycle per
/// document, at most once at a time per document and `index_concurrency`
/// documents overall.
pub struct IndexingService {
    extractor: Arc<PdfExtractor>,
    index: Arc<ChunkIndex>,
    chunking: ChunkingOptions,
    title_index: bool,
    gate: Arc<Semaphore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    counters: Counters,
    schedule_delay: Duration,
}

impl IndexingService {
    pub fn new(extractor: Arc<PdfExtractor>, index: Arc<ChunkIndex>, settings: &Settings) -> Self {
        Self {
            extractor,
            index,
            chunking: settings.chunking,
            title_index: settings.index.title_index,
            gate: Arc::new(Semaphore::new(settings.indexing.index_concurrency.max(1))),
            locks: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            schedule_delay: Duration::from_millis(settings.indexing.schedule_delay_ms),
        }
    }

    fn lock_for(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(document_id.to_string()).or_default())
    }

    /// Make sure `path` is indexed at its current version. Idempotent.
    pub async fn index(&self, path: &Path) -> Result<IndexReport, IngestError> {
        let document_id = document_id_for(path);
        let lock = self.lock_for(&document_id);
        let _guard = lock.lock().await;
        let _permit = self.gate.acquire().await?;
        let _in_flight = InFlight::enter(&self.counters.in_flight);

        self.index_locked(path, &document_id).await
    }

    async fn index_locked(&self, path: &Path, document_id: &str) -> Result<IndexReport, IngestError> {
        let version = DocumentVersion::of_file(path)?;
        let report = |outcome| IndexReport {
            document_id: document_id.to_string(),
            version: version.to_string(),
            outcome,
        };

        let replaced = match self.index.get_document_version(document_id).await? {
            Some(stored) if stored == version.as_str() => {
                debug!(document = document_id, version = %version, "already indexed");
                return Ok(report(IndexOutcome::UpToDate));
            }
            Some(stored) => {
                let removed = self.index.delete_document(document_id).await?;
                info!(document = document_id, previous = %stored, version = %version, removed, "document changed, reindexing");
                true
            }
            None => false,
        };
        if self.title_index {
            self.index.delete_titles_for_doc(document_id).await?;
        }

        let pages = self.extractor.extract_pages(path).await;
        let chunks = chunk_paragraphs(&paragraphs_of(&pages), &self.chunking);
        if chunks.is_empty() {
            warn!(document = document_id, pages = pages.len(), "no usable text extracted");
            return Ok(report(IndexOutcome::NoText));
        }

        let metadata = ChunkMetadata::for_pdf(document_id, &version);
        let stored = self.index.add_chunks(document_id, &chunks, &metadata).await?;
        if stored < chunks.len() {
            warn!(document = document_id, stored, total = chunks.len(), "document partially indexed");
        } else {
            info!(document = document_id, stored, version = %version, "document indexed");
        }

        if self.title_index {
            let titles = extract_titles(&pages);
            match self.index.index_page_titles(document_id, &titles, &metadata).await {
                Ok(count) => debug!(document = document_id, count, "page titles indexed"),
                Err(error) => warn!(document = document_id, %error, "page titles not indexed"),
            }
        }

        Ok(report(IndexOutcome::Indexed {
            stored,
            total: chunks.len(),
            replaced,
        }))
    }

    /// Index `path` in the background. Failures are logged and the job
    /// still counts as done.
    pub fn schedule(self: &Arc<Self>, path: PathBuf) -> JoinHandle<Option<IndexReport>> {
        self.counters.scheduled.fetch_add(1, Ordering::SeqCst);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.index(&path).await;
            service.counters.done.fetch_add(1, Ordering::SeqCst);
            let progress = service.progress();
            match result {
                Ok(report) => {
                    debug!(path = %path.display(), done = progress.done, scheduled = progress.scheduled, "indexing job finished");
                    Some(report)
                }
                Err(error) => {
                    error!(path = %path.display(), %error, done = progress.done, scheduled = progress.scheduled, "indexing job failed");
                    None
                }
            }
        })
    }

    /// Schedule every path and wait for all jobs. Jobs may finish in any
    /// order; reports of successful jobs are returned in path order.
    pub async fn preindex_all(self: &Arc<Self>, paths: Vec<PathBuf>) -> Vec<IndexReport> {
        let mut handles = Vec::with_capacity(paths.len());
        for path in paths {
            handles.push(self.schedule(path));
            if !self.schedule_delay.is_zero() {
                tokio::time::sleep(self.schedule_delay).await;
            }
        }

        let mut reports = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(error) => error!(%error, "indexing task aborted"),
            }
        }
        info!(documents = reports.len(), "pre-indexing finished");
        reports
    }

    pub fn progress(&self) -> IndexProgress {
        let scheduled = self.counters.scheduled.load(Ordering::SeqCst);
        let done = self.counters.done.load(Ordering::SeqCst);
        IndexProgress {
            scheduled,
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            done,
            running: done < scheduled,
        }
    }

    pub async fn document_status(&self, path: &Path) -> Result<DocumentStatus, IngestError> {
        let document_id = document_id_for(path);
        let version = self.index.get_document_version(&document_id).await?;
        let chunks = self.index.chunk_count(&document_id).await?;
        let stale = match (&version, DocumentVersion::of_file(path)) {
            (Some(stored), Ok(current)) => stored != current.as_str(),
            _ => false,
        };

        Ok(DocumentStatus {
            document_id,
            indexed: chunks > 0,
            version,
            stale,
            chunks,
        })
    }
}
