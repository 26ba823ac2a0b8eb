pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod stores;
pub mod terms;
pub mod traits;

pub use chunking::{chunk_paragraphs, normalize_whitespace, window_words, QualityFilter};
pub use config::Settings;
pub use embeddings::{
    build_embedder, CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, EmbedError, IngestError, SearchError};
pub use extractor::{page_label_map, resolve_page_label, PageText, PdfExtractor};
pub use index::ChunkIndex;
pub use ingest::{discover_pdf_files, document_id_for, IndexingService};
pub use models::{
    ChunkMetadata, ChunkRecord, CollectionStats, DocumentStatus, DocumentVersion, IndexOutcome,
    IndexProgress, IndexReport, MatchKind, RetrievedChunk, SearchScope, TitleEntry, TitleKind,
};
pub use orchestrator::RagCoordinator;
pub use retrieval::{find_sentence_with_term, DefinitionRules, Retriever};
pub use stores::{LocalStore, QdrantStore};
pub use terms::{matches_term, TermRules};
pub use traits::{RecordFilter, VectorIndex};
