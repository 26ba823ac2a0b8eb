//! Embedding, persistence and similarity queries over the chunk collection.

use crate::config::Settings;
use crate::embeddings::{fallback_vector, Embedder};
use crate::models::{
    ChunkMetadata, ChunkRecord, CollectionStats, MatchKind, RetrievedChunk, ScoredRecord,
    TitleEntry, TitleKind,
};
use crate::terms::{matches_term, normalize_for_match};
use crate::traits::{RecordFilter, VectorIndex};
use crate::SearchError;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

const TITLE_KIND_KEY: &str = "title_kind";

/// Deterministic record id: hash of the document path and chunk index.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b"#");
    hasher.update(chunk_index.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn title_id(document_id: &str, position: usize) -> String {
    chunk_id(&format!("{document_id}::titles"), position)
}

pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

pub fn apply_term_boost(similarity: f32, boost: f32) -> f32 {
    (similarity + boost).min(1.0)
}

/// Turn raw hits into scored chunks: distance to similarity, the term boost,
/// the similarity floor, best first.
pub fn rank_hits(
    hits: Vec<ScoredRecord>,
    term: Option<&str>,
    term_boost: f32,
    min_similarity: f32,
) -> Vec<RetrievedChunk> {
    let mut ranked = hits
        .into_iter()
        .filter_map(|hit| {
            let similarity = similarity_from_distance(hit.distance);
            let boosted = term.is_some_and(|term| matches_term(term, &hit.record.text));
            let score = if boosted {
                apply_term_boost(similarity, term_boost)
            } else {
                similarity
            };
            if score < min_similarity {
                return None;
            }
            let record = hit.record;
            Some(RetrievedChunk {
                chunk_id: record.id,
                document_id: record.document_id,
                chunk_index: record.chunk_index,
                total_chunks: record.total_chunks,
                text: record.text,
                similarity_score: score,
                boosted,
                match_kind: MatchKind::Similarity,
                metadata: record.metadata,
            })
        })
        .collect::<Vec<_>>();

    ranked.sort_by(|left, right| {
        right
            .similarity_score
            .total_cmp(&left.similarity_score)
            .then_with(|| left.document_id.cmp(&right.document_id))
            .then_with(|| left.chunk_index.cmp(&right.chunk_index))
    });
    ranked
}

pub struct ChunkIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorIndex>,
    collection: String,
    title_collection: String,
    embed_batch: usize,
    upsert_batch: usize,
    term_boost: f32,
    min_similarity: f32,
}

impl ChunkIndex {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorIndex>, settings: &Settings) -> Self {
        Self {
            embedder,
            store,
            collection: settings.index.collection.clone(),
            title_collection: settings.index.title_collection.clone(),
            embed_batch: settings.embedding.batch_size.max(1),
            upsert_batch: settings.index.upsert_batch_size.max(1),
            term_boost: settings.retrieval.term_boost,
            min_similarity: settings.retrieval.min_similarity,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `texts` concurrently; failures become the fallback vector.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let dimensions = self.embedder.dimensions();
        join_all(texts.iter().map(|text| self.embedder.embed(text)))
            .await
            .into_iter()
            .enumerate()
            .map(|(position, result)| match result {
                Ok(vector) => vector,
                Err(error) => {
                    warn!(%error, position, "embedding failed, using fallback vector");
                    fallback_vector(dimensions)
                }
            })
            .collect()
    }

    async fn embed_query(&self, query: &str) -> Vec<f32> {
        match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(%error, "query embedding failed, using fallback vector");
                fallback_vector(self.embedder.dimensions())
            }
        }
    }

    /// Embed records `embed_batch` at a time and write them `upsert_batch`
    /// at a time; a rejected write is logged and the rest continue. Returns
    /// how many records were stored.
    async fn store_records(
        &self,
        collection: &str,
        mut records: Vec<ChunkRecord>,
    ) -> Result<usize, SearchError> {
        self.store
            .ensure_collection(collection, self.embedder.dimensions())
            .await?;

        let mut stored = 0;
        for (batch_number, batch) in records.chunks_mut(self.upsert_batch).enumerate() {
            for slice in batch.chunks_mut(self.embed_batch) {
                let texts = slice.iter().map(|record| record.text.clone()).collect::<Vec<_>>();
                for (record, embedding) in slice.iter_mut().zip(self.embed_batch(&texts).await) {
                    record.embedding = embedding;
                }
            }
            match self.store.upsert(collection, batch).await {
                Ok(count) => stored += count,
                Err(error) => warn!(%error, collection, batch = batch_number, "storing batch failed"),
            }
        }
        Ok(stored)
    }

    /// Embed and persist one document's chunks. Prior chunks of the document
    /// must have been deleted first.
    pub async fn add_chunks(
        &self,
        document_id: &str,
        chunks: &[String],
        metadata: &ChunkMetadata,
    ) -> Result<usize, SearchError> {
        let total_chunks = chunks.len();
        let records = chunks
            .iter()
            .enumerate()
            .map(|(chunk_index, text)| ChunkRecord {
                id: chunk_id(document_id, chunk_index),
                document_id: document_id.to_string(),
                chunk_index,
                total_chunks,
                text: text.clone(),
                embedding: Vec::new(),
                metadata: metadata.clone(),
            })
            .collect::<Vec<_>>();

        let stored = self.store_records(&self.collection, records).await?;
        debug!(document = document_id, stored, total = total_chunks, "chunks stored");
        Ok(stored)
    }

    async fn search(
        &self,
        query: &str,
        filter: &RecordFilter,
        k: usize,
        term: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let vector = self.embed_query(query).await;
        let hits = self.store.query(&self.collection, &vector, filter, k).await?;
        Ok(rank_hits(hits, term, self.term_boost, self.min_similarity))
    }

    pub async fn search_in_document(
        &self,
        query: &str,
        document_id: &str,
        k: usize,
        term: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        self.search(query, &RecordFilter::document(document_id), k, term)
            .await
    }

    pub async fn search_global(
        &self,
        query: &str,
        k: usize,
        term: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        self.search(query, &RecordFilter::all(), k, term).await
    }

    pub async fn has_document(&self, document_id: &str) -> Result<bool, SearchError> {
        Ok(self
            .store
            .first(&self.collection, &RecordFilter::document(document_id))
            .await?
            .is_some())
    }

    pub async fn get_document_version(&self, document_id: &str) -> Result<Option<String>, SearchError> {
        Ok(self
            .store
            .first(&self.collection, &RecordFilter::document(document_id))
            .await?
            .and_then(|record| record.metadata.doc_version))
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<usize, SearchError> {
        self.store
            .delete(&self.collection, &RecordFilter::document(document_id))
            .await
    }

    pub async fn chunk_count(&self, document_id: &str) -> Result<usize, SearchError> {
        self.store
            .count(&self.collection, &RecordFilter::document(document_id))
            .await
    }

    /// Stored chunks of one document in chunk order, without embeddings.
    pub async fn document_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, SearchError> {
        let mut records = self
            .store
            .scan(&self.collection, &RecordFilter::document(document_id))
            .await?;
        records.sort_by_key(|record| record.chunk_index);
        Ok(records)
    }

    pub async fn index_page_titles(
        &self,
        document_id: &str,
        titles: &[TitleEntry],
        metadata: &ChunkMetadata,
    ) -> Result<usize, SearchError> {
        let records = titles
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let mut metadata = metadata.clone();
                metadata.page = Some(entry.page);
                metadata
                    .extra
                    .insert(TITLE_KIND_KEY.to_string(), entry.kind.as_str().to_string());
                ChunkRecord {
                    id: title_id(document_id, position),
                    document_id: document_id.to_string(),
                    chunk_index: position,
                    total_chunks: titles.len(),
                    text: entry.title.clone(),
                    embedding: Vec::new(),
                    metadata,
                }
            })
            .collect::<Vec<_>>();

        self.store_records(&self.title_collection, records).await
    }

    pub async fn delete_titles_for_doc(&self, document_id: &str) -> Result<usize, SearchError> {
        self.store
            .delete(&self.title_collection, &RecordFilter::document(document_id))
            .await
    }

    /// Titles of a document containing `keyword` (case, space and hyphen
    /// insensitive), by page. An empty keyword lists every title.
    pub async fn find_titles(&self, document_id: &str, keyword: &str) -> Result<Vec<TitleEntry>, SearchError> {
        let needle = normalize_for_match(keyword);
        let records = self
            .store
            .scan(&self.title_collection, &RecordFilter::document(document_id))
            .await?;

        let mut titles = records
            .into_iter()
            .filter(|record| needle.is_empty() || normalize_for_match(&record.text).contains(&needle))
            .filter_map(|record| {
                Some(TitleEntry {
                    page: record.metadata.page?,
                    kind: record
                        .metadata
                        .extra
                        .get(TITLE_KIND_KEY)
                        .and_then(|kind| TitleKind::parse(kind))
                        .unwrap_or(TitleKind::Section),
                    title: record.text,
                })
            })
            .collect::<Vec<_>>();
        titles.sort_by(|left, right| left.page.cmp(&right.page).then_with(|| left.title.cmp(&right.title)));
        Ok(titles)
    }

    pub async fn collection_stats(&self) -> Result<CollectionStats, SearchError> {
        Ok(CollectionStats {
            total_chunks: self.store.count(&self.collection, &RecordFilter::all()).await?,
            location: self.store.location(),
            embedding_model: self.embedder.model_name(),
            batch_size: self.embed_batch,
        })
    }
}
