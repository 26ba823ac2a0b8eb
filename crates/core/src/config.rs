//! Settings for the retrieval core.
//!
//! Values come from [`Settings::default`], then an optional TOML file, then
//! `PDF_RAG_*` environment variables (nested keys split on `__`).

use crate::error::ConfigError;
use crate::retrieval::DefinitionRules;
use crate::terms::TermRules;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "PDF_RAG_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pdf_dir: PathBuf,
    pub extraction: ExtractionOptions,
    pub chunking: ChunkingOptions,
    pub embedding: EmbeddingOptions,
    pub index: IndexOptions,
    pub retrieval: RetrievalOptions,
    pub indexing: IndexingOptions,
    pub terms: TermRules,
    pub definitions: DefinitionRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pdf_dir: PathBuf::from("."),
            extraction: ExtractionOptions::default(),
            chunking: ChunkingOptions::default(),
            embedding: EmbeddingOptions::default(),
            index: IndexOptions::default(),
            retrieval: RetrievalOptions::default(),
            indexing: IndexingOptions::default(),
            terms: TermRules::default(),
            definitions: DefinitionRules::default(),
        }
    }
}

impl Settings {
    /// Layer defaults, an optional TOML file and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunking.chunk_size must be > 0".into()));
        }
        if self.extraction.ocr_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "extraction.ocr_concurrency must be > 0".into(),
            ));
        }
        if self.indexing.index_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "indexing.index_concurrency must be > 0".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid("embedding.dimensions must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionOptions {
    /// Minimum whitespace-collapsed characters for a page to count as read.
    pub min_page_chars: usize,
    /// Minimum share of alphanumeric characters among non-space characters.
    pub min_alnum_ratio: f32,
    pub min_page_words: usize,
    /// Simultaneous rasterize + OCR operations across all documents.
    pub ocr_concurrency: usize,
    /// Pages extracted concurrently within one document.
    pub page_batch_size: usize,
    pub light_ocr_dpi: u32,
    pub light_ocr_psm: u8,
    pub heavy_ocr_dpi: u32,
    pub heavy_ocr_psm: u8,
    pub ocr_language: String,
    /// Rendered pages wider than this are downscaled before recognition.
    pub max_ocr_width: u32,
    pub enhance_contrast: bool,
    pub layout_tool: String,
    pub render_tool: String,
    pub ocr_tool: String,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            min_page_chars: 40,
            min_alnum_ratio: 0.5,
            min_page_words: 5,
            ocr_concurrency: 2,
            page_batch_size: 4,
            light_ocr_dpi: 200,
            light_ocr_psm: 6,
            heavy_ocr_dpi: 300,
            heavy_ocr_psm: 3,
            ocr_language: "deu+eng".to_string(),
            max_ocr_width: 2_000,
            enhance_contrast: true,
            layout_tool: "pdftotext".to_string(),
            render_tool: "pdftoppm".to_string(),
            ocr_tool: "tesseract".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingOptions {
    /// Window length in words.
    pub chunk_size: usize,
    /// Words shared by consecutive windows.
    pub chunk_overlap: usize,
    pub min_chunk_chars: usize,
    pub min_alpha_ratio: f32,
    /// When false every non-empty window is kept.
    pub quality_filter: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 40,
            min_chunk_chars: 80,
            min_alpha_ratio: 0.25,
            quality_filter: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Ollama,
    Ngram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOptions {
    pub provider: EmbeddingProvider,
    pub url: String,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 16,
            max_input_chars: 500,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    pub backend: IndexBackend,
    pub persist_dir: PathBuf,
    pub qdrant_url: String,
    pub collection: String,
    pub title_collection: String,
    /// Maintain the page-title collection next to the chunks.
    pub title_index: bool,
    pub upsert_batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Local,
            persist_dir: PathBuf::from("./vector_db"),
            qdrant_url: "http://localhost:6333".to_string(),
            collection: "pdf_paragraphs".to_string(),
            title_collection: "page_titles".to_string(),
            title_index: false,
            upsert_batch_size: 64,
        }
    }
}

/// One search pass: fetch `max(limit * factor, floor)` candidates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchStep {
    pub factor: usize,
    pub floor: usize,
}

impl FetchStep {
    pub fn candidates_for(&self, limit: usize) -> usize {
        limit.saturating_mul(self.factor).max(self.floor).max(1)
    }
}

/// Successively wider searches, tried while too few unique candidates are found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WideningPlan {
    pub steps: Vec<FetchStep>,
    /// Absolute minimum of unique candidates.
    pub min_unique: usize,
    /// Minimum of unique candidates per requested result.
    pub min_unique_per_result: usize,
}

impl WideningPlan {
    pub fn unique_floor(&self, limit: usize) -> usize {
        self.min_unique
            .max(limit.saturating_mul(self.min_unique_per_result))
    }

    fn document_default() -> Self {
        Self {
            steps: vec![
                FetchStep { factor: 3, floor: 0 },
                FetchStep { factor: 10, floor: 0 },
                FetchStep { factor: 30, floor: 0 },
            ],
            min_unique: 5,
            min_unique_per_result: 0,
        }
    }

    fn global_default() -> Self {
        Self {
            steps: vec![
                FetchStep { factor: 6, floor: 0 },
                FetchStep { factor: 20, floor: 200 },
                FetchStep { factor: 40, floor: 400 },
            ],
            min_unique: 0,
            min_unique_per_result: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    /// Added to the similarity of candidates containing the query term.
    pub term_boost: f32,
    pub min_similarity: f32,
    pub document_limit: usize,
    pub global_limit: usize,
    pub document_plan: WideningPlan,
    pub global_plan: WideningPlan,
    /// Characters of text used with the chunk id to detect duplicates.
    pub dedup_prefix_chars: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            term_boost: 0.30,
            min_similarity: 0.35,
            document_limit: 4,
            global_limit: 12,
            document_plan: WideningPlan::document_default(),
            global_plan: WideningPlan::global_default(),
            dedup_prefix_chars: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingOptions {
    /// Whole-document indexing jobs allowed to run at once.
    pub index_concurrency: usize,
    /// Pause between scheduling consecutive bulk jobs.
    pub schedule_delay_ms: u64,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            index_concurrency: 1,
            schedule_delay_ms: 50,
        }
    }
}
