use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Cheap fingerprint of a file on disk: `{size}-{mtime seconds}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentVersion(String);

impl DocumentVersion {
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Ok(Self(format!("{}-{}", metadata.len(), modified)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored with every record. Named fields cover what the core relies
/// on; `extra` carries caller-supplied values without widening the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub content_type: String,
    #[serde(default)]
    pub doc_version: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ChunkMetadata {
    pub fn for_pdf(source: &str, version: &DocumentVersion) -> Self {
        Self {
            source: source.to_string(),
            content_type: "pdf".to_string(),
            doc_version: Some(version.to_string()),
            page: None,
            indexed_at: Some(Utc::now()),
            extra: BTreeMap::new(),
        }
    }
}

/// One persisted record of a vector index collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A record returned by a similarity query with its raw cosine distance.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: ChunkRecord,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchKind {
    /// Ranked by embedding similarity (possibly term-boosted).
    Similarity,
    /// Kept because it literally contains the query term.
    TermMatch,
    /// Text was replaced by an extracted `TERM - explanation` line.
    Definition,
}

/// What the retrieval path hands to answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    pub similarity_score: f32,
    pub boosted: bool,
    pub match_kind: MatchKind,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchScope {
    Document(String),
    Global,
}

impl SearchScope {
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Document(id) => Some(id),
            Self::Global => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    pub document_id: String,
    pub indexed: bool,
    /// Version stored in the index, if any.
    pub version: Option<String>,
    /// Indexed, but the file on disk has changed since.
    pub stale: bool,
    pub chunks: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TitleKind {
    Table,
    Figure,
    Section,
}

impl TitleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Figure => "figure",
            Self::Section => "section",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "table" => Some(Self::Table),
            "figure" => Some(Self::Figure),
            "section" => Some(Self::Section),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TitleEntry {
    pub page: u32,
    pub title: String,
    pub kind: TitleKind,
}

#[derive(Debug, Clone, Serialize)]
pub enum IndexOutcome {
    /// Already indexed at the current version.
    UpToDate,
    /// Extraction produced no usable text.
    NoText,
    Indexed {
        stored: usize,
        total: usize,
        /// A previous version was deleted first.
        replaced: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub document_id: String,
    pub version: String,
    pub outcome: IndexOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexProgress {
    pub scheduled: usize,
    pub in_flight: usize,
    pub done: usize,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub total_chunks: usize,
    pub location: String,
    pub embedding_model: String,
    pub batch_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn version_changes_with_size() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"abc")?;
        let first = DocumentVersion::of_file(&path)?;
        assert!(first.as_str().starts_with("3-"));

        fs::write(&path, b"abcdef")?;
        let second = DocumentVersion::of_file(&path)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn version_of_missing_file_is_an_error() {
        assert!(DocumentVersion::of_file(Path::new("/definitely/not/here.pdf")).is_err());
    }
}
