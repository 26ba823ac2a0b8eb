//! Exhaustive cosine search over records kept in memory and persisted as one
//! JSON file per collection.

use crate::models::{ChunkRecord, ScoredRecord};
use crate::traits::{RecordFilter, VectorIndex};
use crate::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    dimensions: usize,
    records: BTreeMap<String, ChunkRecord>,
}

pub struct LocalStore {
    persist_dir: Option<PathBuf>,
    collections: RwLock<HashMap<String, Collection>>,
}

impl LocalStore {
    /// Persisted under `persist_dir`.
    pub fn open(persist_dir: impl Into<PathBuf>) -> Self {
        Self {
            persist_dir: Some(persist_dir.into()),
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            persist_dir: None,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{collection}.json")))
    }

    async fn load(&self, collection: &str) -> Result<Option<Collection>, SearchError> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn persist(&self, collection: &str, data: &Collection) -> Result<(), SearchError> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(data)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &path).await?;
        debug!(path = %path.display(), records = data.records.len(), "persisted collection");
        Ok(())
    }

    /// Bring a collection into memory if it exists on disk.
    async fn hydrate(&self, collection: &str) -> Result<(), SearchError> {
        if self.collections.read().await.contains_key(collection) {
            return Ok(());
        }
        let loaded = self.load(collection).await?;
        let mut collections = self.collections.write().await;
        if !collections.contains_key(collection) {
            if let Some(loaded) = loaded {
                collections.insert(collection.to_string(), loaded);
            }
        }
        Ok(())
    }
}

pub fn cosine_distance(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm * right_norm)
}

fn without_embedding(record: &ChunkRecord) -> ChunkRecord {
    ChunkRecord {
        embedding: Vec::new(),
        ..record.clone()
    }
}

#[async_trait]
impl VectorIndex for LocalStore {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), SearchError> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        if entry.dimensions == 0 {
            entry.dimensions = dimensions;
        } else if entry.dimensions != dimensions {
            return Err(SearchError::Request(format!(
                "collection {collection} has {} dimensions, requested {dimensions}",
                entry.dimensions
            )));
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<usize, SearchError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        if entry.dimensions == 0 {
            entry.dimensions = records[0].embedding.len();
        }

        if let Some(bad) = records
            .iter()
            .find(|record| record.embedding.len() != entry.dimensions)
        {
            return Err(SearchError::Request(format!(
                "embedding dimension {} != {} for record {}",
                bad.embedding.len(),
                entry.dimensions,
                bad.id
            )));
        }

        let previous = records
            .iter()
            .map(|record| {
                let replaced = entry.records.insert(record.id.clone(), record.clone());
                (record.id.clone(), replaced)
            })
            .collect::<Vec<_>>();

        // a batch only becomes visible once it is on disk
        if let Err(error) = self.persist(collection, entry).await {
            for (id, replaced) in previous.into_iter().rev() {
                match replaced {
                    Some(record) => entry.records.insert(id, record),
                    None => entry.records.remove(&id),
                };
            }
            return Err(error);
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, SearchError> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if entry.dimensions != 0 && vector.len() != entry.dimensions {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                vector.len(),
                entry.dimensions
            )));
        }

        let mut scored = entry
            .records
            .values()
            .filter(|record| filter.matches(record))
            .map(|record| ScoredRecord {
                distance: cosine_distance(vector, &record.embedding),
                record: record.clone(),
            })
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then_with(|| left.record.id.cmp(&right.record.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let doomed = entry
            .records
            .iter()
            .filter(|(_, record)| filter.matches(record))
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        if doomed.is_empty() {
            return Ok(0);
        }
        let removed = doomed
            .iter()
            .filter_map(|id| entry.records.remove(id))
            .collect::<Vec<_>>();

        if let Err(error) = self.persist(collection, entry).await {
            for record in removed {
                entry.records.insert(record.id.clone(), record);
            }
            return Err(error);
        }
        Ok(removed.len())
    }

    async fn first(&self, collection: &str, filter: &RecordFilter) -> Result<Option<ChunkRecord>, SearchError> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|entry| {
            entry
                .records
                .values()
                .find(|record| filter.matches(record))
                .map(without_embedding)
        }))
    }

    async fn count(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |entry| {
            entry
                .records
                .values()
                .filter(|record| filter.matches(record))
                .count()
        }))
    }

    async fn scan(&self, collection: &str, filter: &RecordFilter) -> Result<Vec<ChunkRecord>, SearchError> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or_else(Vec::new, |entry| {
            entry
                .records
                .values()
                .filter(|record| filter.matches(record))
                .map(without_embedding)
                .collect()
        }))
    }

    fn location(&self) -> String {
        self.persist_dir
            .as_deref()
            .map_or_else(|| "memory".to_string(), |dir: &Path| dir.display().to_string())
    }
}
