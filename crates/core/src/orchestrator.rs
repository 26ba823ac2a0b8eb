use crate::config::Settings;
use crate::embeddings::{build_embedder, Embedder};
use crate::extractor::{page_label_map, resolve_page_label, PdfExtractor};
use crate::index::ChunkIndex;
use crate::ingest::{discover_pdf_files, IndexingService};
use crate::models::{
    CollectionStats, DocumentStatus, IndexProgress, IndexReport, RetrievedChunk, SearchScope,
    TitleEntry,
};
use crate::retrieval::Retriever;
use crate::stores::open_index;
use crate::traits::VectorIndex;
use crate::{IngestError, SearchError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// The surface the answer-generation and chat layers talk to.
pub struct RagCoordinator {
    settings: Settings,
    index: Arc<ChunkIndex>,
    indexing: Arc<IndexingService>,
    retriever: Retriever,
}

impl RagCoordinator {
    /// Wire the configured embedder, vector index and extraction chain.
    pub fn from_settings(settings: Settings) -> Result<Self, SearchError> {
        let embedder = build_embedder(&settings.embedding)?;
        let store = open_index(&settings.index)?;
        let ocr_gate = Arc::new(Semaphore::new(settings.extraction.ocr_concurrency.max(1)));
        let extractor = PdfExtractor::from_options(&settings.extraction, ocr_gate);
        info!(
            backend = ?settings.index.backend,
            location = %store.location(),
            model = %embedder.model_name(),
            "retrieval core ready"
        );
        Self::with_components(settings, embedder, store, extractor)
    }

    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorIndex>,
        extractor: PdfExtractor,
    ) -> Result<Self, SearchError> {
        let index = Arc::new(ChunkIndex::new(embedder, store, &settings));
        let indexing = Arc::new(IndexingService::new(
            Arc::new(extractor),
            Arc::clone(&index),
            &settings,
        ));
        let retriever = Retriever::new(
            Arc::clone(&index),
            settings.terms.clone(),
            &settings.definitions,
            settings.retrieval.clone(),
        )?;

        Ok(Self {
            settings,
            index,
            indexing,
            retriever,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ensure a document is indexed at its current version.
    pub async fn index(&self, path: &Path) -> Result<IndexReport, IngestError> {
        self.indexing.index(path).await
    }

    /// Ordered chunks for `query`; `limit` defaults per scope.
    pub async fn retrieve(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }
        let limit = limit.unwrap_or_else(|| self.retriever.default_limit(scope));
        self.retriever.retrieve(query, scope, limit).await
    }

    pub fn detect_term(&self, query: &str) -> Option<String> {
        self.retriever.detect_term(query)
    }

    pub async fn document_status(&self, path: &Path) -> Result<DocumentStatus, IngestError> {
        self.indexing.document_status(path).await
    }

    /// Current status; schedules background indexing when the document is
    /// missing or stale instead of waiting for it.
    pub async fn request_index(&self, path: &Path) -> Result<DocumentStatus, IngestError> {
        let status = self.indexing.document_status(path).await?;
        if !status.indexed || status.stale {
            info!(path = %path.display(), stale = status.stale, "scheduling indexing");
            // completion is observed through `progress` and `document_status`
            drop(self.indexing.schedule(path.to_path_buf()));
        }
        Ok(status)
    }

    /// Index every PDF under the configured directory.
    pub async fn preindex_folder(&self) -> Vec<IndexReport> {
        let paths = discover_pdf_files(&self.settings.pdf_dir);
        info!(dir = %self.settings.pdf_dir.display(), documents = paths.len(), "pre-indexing");
        self.indexing.preindex_all(paths).await
    }

    pub fn progress(&self) -> IndexProgress {
        self.indexing.progress()
    }

    pub async fn collection_stats(&self) -> Result<CollectionStats, SearchError> {
        self.index.collection_stats().await
    }

    pub async fn find_titles(&self, path: &Path, keyword: &str) -> Result<Vec<TitleEntry>, SearchError> {
        self.index
            .find_titles(&crate::ingest::document_id_for(path), keyword)
            .await
    }

    /// Physical page for a printed page label.
    pub async fn resolve_page(&self, path: &Path, label: &str) -> Result<Option<u32>, IngestError> {
        let owned = path.to_path_buf();
        let map = tokio::task::spawn_blocking(move || page_label_map(&owned)).await?;
        Ok(resolve_page_label(&map, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::test_support::{structural_then_ocr, write_pdf};
    use crate::extractor::SufficiencyCheck;
    use crate::models::IndexOutcome;
    use crate::stores::LocalStore;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn coordinator(settings: Settings) -> Result<RagCoordinator, SearchError> {
        RagCoordinator::with_components(
            settings,
            Arc::new(CharacterNgramEmbedder { dimensions: 64 }),
            Arc::new(LocalStore::in_memory()),
            structural_then_ocr(
                HashMap::new(),
                SufficiencyCheck {
                    min_chars: 20,
                    min_alnum_ratio: 0.5,
                    min_words: 3,
                },
            ),
        )
    }

    #[tokio::test]
    async fn folder_is_preindexed_and_queryable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_pdf(
            &dir.path().join("a.pdf"),
            &[Some("CAN - Controller Area Network is a vehicle bus standard.")],
        )?;
        write_pdf(
            &dir.path().join("b.pdf"),
            &[Some("Risk assessment requires a TARA for every item.")],
        )?;

        let mut settings = Settings::default();
        settings.pdf_dir = dir.path().to_path_buf();
        settings.chunking.min_chunk_chars = 20;
        settings.indexing.schedule_delay_ms = 0;
        let rag = coordinator(settings)?;

        let reports = rag.preindex_folder().await;
        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|report| matches!(report.outcome, IndexOutcome::Indexed { .. })));
        assert_eq!(rag.collection_stats().await?.total_chunks, 2);

        let found = rag.retrieve("what is TARA?", &SearchScope::Global, None).await?;
        assert!(found[0].text.contains("TARA"));
        assert!(found[0].document_id.ends_with("b.pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let rag = coordinator(Settings::default())?;
        assert!(rag.retrieve("   ", &SearchScope::Global, None).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn request_index_schedules_unindexed_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("a.pdf");
        write_pdf(&path, &[Some("Cybersecurity management system overview and scope.")])?;
        let mut settings = Settings::default();
        settings.chunking.min_chunk_chars = 20;
        let rag = coordinator(settings)?;

        let status = rag.request_index(&path).await?;
        assert!(!status.indexed);
        assert_eq!(rag.progress().scheduled, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unlabelled_documents_resolve_to_physical_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("a.pdf");
        write_pdf(&path, &[Some("first page text"), Some("second page text")])?;
        let rag = coordinator(Settings::default())?;

        assert_eq!(rag.resolve_page(&path, "2").await?, Some(2));
        assert_eq!(rag.resolve_page(&path, "ii").await?, Some(2));
        Ok(())
    }
}
