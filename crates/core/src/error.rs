use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("external tool `{tool}` failed: {details}")]
    Tool { tool: String, details: String },

    #[error("OCR failed on page {page}: {details}")]
    OcrFailed { page: u32, details: String },

    #[error("vector index error: {0}")]
    Index(#[from] SearchError),

    #[error("indexing gate closed: {0}")]
    GateClosed(#[from] tokio::sync::AcquireError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("embedding setup failed: {0}")]
    Embedding(#[from] EmbedError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
