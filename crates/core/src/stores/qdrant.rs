use crate::models::{ChunkMetadata, ChunkRecord, ScoredRecord};
use crate::traits::{RecordFilter, VectorIndex};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const SCROLL_PAGE: usize = 256;

/// Qdrant over its REST API. Collections use cosine distance.
pub struct QdrantStore {
    endpoint: String,
    client: Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct PointPayload {
    chunk_id: String,
    document_id: String,
    chunk_index: usize,
    total_chunks: usize,
    text: String,
    metadata: ChunkMetadata,
}

impl QdrantStore {
    pub fn new(endpoint: &str) -> Result<Self, SearchError> {
        let parsed = Url::parse(endpoint)?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, collection: &str, path: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, collection, path)
    }

    /// Send a request; a missing collection comes back as `None`.
    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>, SearchError> {
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("{status}: {body}"),
            });
        }
        Ok(Some(response.json().await?))
    }

    async fn scroll_page(
        &self,
        collection: &str,
        filter: &RecordFilter,
        limit: usize,
        offset: Option<Value>,
    ) -> Result<(Vec<ChunkRecord>, Option<Value>), SearchError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(condition) = filter_json(filter) {
            body["filter"] = condition;
        }
        if let Some(offset) = offset {
            body["offset"] = offset;
        }

        let Some(parsed) = self
            .send(self.client.post(self.url(collection, "/points/scroll")).json(&body))
            .await?
        else {
            return Ok((Vec::new(), None));
        };

        let records = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .map(|points| points.iter().filter_map(record_from_point).collect())
            .unwrap_or_default();
        let next = parsed
            .pointer("/result/next_page_offset")
            .filter(|offset| !offset.is_null())
            .cloned();
        Ok((records, next))
    }
}

/// Qdrant ids must be integers or UUIDs; derive a stable UUID from the record id.
pub fn point_id(record_id: &str) -> Uuid {
    let digest = Sha256::digest(record_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn filter_json(filter: &RecordFilter) -> Option<Value> {
    filter.document_id.as_ref().map(|document_id| {
        json!({
            "must": [{ "key": "document_id", "match": { "value": document_id } }]
        })
    })
}

fn record_from_point(point: &Value) -> Option<ChunkRecord> {
    let payload: PointPayload = serde_json::from_value(point.pointer("/payload")?.clone()).ok()?;
    let embedding = point
        .pointer("/vector")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|value| value as f32)
                .collect()
        })
        .unwrap_or_default();
    Some(ChunkRecord {
        id: payload.chunk_id,
        document_id: payload.document_id,
        chunk_index: payload.chunk_index,
        total_chunks: payload.total_chunks,
        text: payload.text,
        embedding,
        metadata: payload.metadata,
    })
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), SearchError> {
        if self.send(self.client.get(self.url(collection, ""))).await?.is_some() {
            return Ok(());
        }
        self.send(self.client.put(self.url(collection, "")).json(&json!({
            "vectors": { "size": dimensions, "distance": "Cosine" }
        })))
        .await?;
        self.send(
            self.client
                .put(self.url(collection, "/index?wait=true"))
                .json(&json!({ "field_name": "document_id", "field_schema": "keyword" })),
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<usize, SearchError> {
        if records.is_empty() {
            return Ok(0);
        }

        let points = records
            .iter()
            .map(|record| {
                let payload = PointPayload {
                    chunk_id: record.id.clone(),
                    document_id: record.document_id.clone(),
                    chunk_index: record.chunk_index,
                    total_chunks: record.total_chunks,
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                };
                Ok(json!({
                    "id": point_id(&record.id).to_string(),
                    "vector": record.embedding,
                    "payload": serde_json::to_value(payload)?,
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        let stored = self
            .send(
                self.client
                    .put(self.url(collection, "/points?wait=true"))
                    .json(&json!({ "points": points })),
            )
            .await?;
        if stored.is_none() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("collection {collection} does not exist"),
            });
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
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(condition) = filter_json(filter) {
            body["filter"] = condition;
        }

        let Some(parsed) = self
            .send(self.client.post(self.url(collection, "/points/search")).json(&body))
            .await?
        else {
            return Ok(Vec::new());
        };

        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .iter()
            .filter_map(|hit| {
                let score = hit.pointer("/score").and_then(Value::as_f64)? as f32;
                Some(ScoredRecord {
                    record: record_from_point(hit)?,
                    distance: 1.0 - score,
                })
            })
            .collect())
    }

    async fn delete(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError> {
        let existing = self.count(collection, filter).await?;
        if existing == 0 {
            return Ok(0);
        }
        let body = match filter_json(filter) {
            Some(condition) => json!({ "filter": condition }),
            None => json!({ "filter": { "must": [] } }),
        };
        self.send(
            self.client
                .post(self.url(collection, "/points/delete?wait=true"))
                .json(&body),
        )
        .await?;
        Ok(existing)
    }

    async fn first(&self, collection: &str, filter: &RecordFilter) -> Result<Option<ChunkRecord>, SearchError> {
        let (records, _) = self.scroll_page(collection, filter, 1, None).await?;
        Ok(records.into_iter().next())
    }

    async fn count(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError> {
        let mut body = json!({ "exact": true });
        if let Some(condition) = filter_json(filter) {
            body["filter"] = condition;
        }
        let parsed = self
            .send(self.client.post(self.url(collection, "/points/count")).json(&body))
            .await?;
        Ok(parsed
            .as_ref()
            .and_then(|value| value.pointer("/result/count"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }

    async fn scan(&self, collection: &str, filter: &RecordFilter) -> Result<Vec<ChunkRecord>, SearchError> {
        let mut records = Vec::new();
        let mut offset = None;
        loop {
            let (page, next) = self.scroll_page(collection, filter, SCROLL_PAGE, offset).await?;
            records.extend(page);
            match next {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    fn location(&self) -> String {
        self.endpoint.clone()
    }
}
