pub mod local;
pub mod qdrant;

pub use local::LocalStore;
pub use qdrant::QdrantStore;

use crate::config::{IndexBackend, IndexOptions};
use crate::traits::VectorIndex;
use crate::SearchError;
use std::sync::Arc;

pub fn open_index(options: &IndexOptions) -> Result<Arc<dyn VectorIndex>, SearchError> {
    Ok(match options.backend {
        IndexBackend::Local => Arc::new(LocalStore::open(&options.persist_dir)),
        IndexBackend::Qdrant => Arc::new(QdrantStore::new(&options.qdrant_url)?),
    })
}
