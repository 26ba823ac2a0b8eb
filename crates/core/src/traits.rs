use crate::models::{ChunkRecord, ScoredRecord};
use crate::SearchError;
use async_trait::async_trait;

/// Restricts an operation to the records of one document, or none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub document_id: Option<String>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn document(document_id: &str) -> Self {
        Self {
            document_id: Some(document_id.to_string()),
        }
    }

    pub fn matches(&self, record: &ChunkRecord) -> bool {
        self.document_id
            .as_deref()
            .map_or(true, |document_id| record.document_id == document_id)
    }
}

/// Storage and similarity primitives of an external vector index engine.
///
/// Distances are cosine distances (`1 - cosine similarity`).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), SearchError>;

    /// Insert or replace records by id; returns how many were stored.
    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<usize, SearchError>;

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, SearchError>;

    /// Remove matching records; returns how many were removed when known.
    async fn delete(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError>;

    /// Any one matching record.
    async fn first(&self, collection: &str, filter: &RecordFilter) -> Result<Option<ChunkRecord>, SearchError>;

    async fn count(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError>;

    /// Matching records in unspecified order, without embeddings.
    async fn scan(&self, collection: &str, filter: &RecordFilter) -> Result<Vec<ChunkRecord>, SearchError>;

    /// Where the data lives, for status output.
    fn location(&self) -> String;
}
