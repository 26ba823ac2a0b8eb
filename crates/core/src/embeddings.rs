use crate::config::{EmbeddingOptions, EmbeddingProvider};
use crate::error::EmbedError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Value of every component of the vector substituted for a failed embedding.
pub const FALLBACK_COMPONENT: f32 = 0.1;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> String;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

pub fn fallback_vector(dimensions: usize) -> Vec<f32> {
    vec![FALLBACK_COMPONENT; dimensions.max(1)]
}

pub fn build_embedder(options: &EmbeddingOptions) -> Result<Arc<dyn Embedder>, EmbedError> {
    Ok(match options.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(options)?),
        EmbeddingProvider::Ngram => Arc::new(CharacterNgramEmbedder {
            dimensions: options.dimensions,
        }),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> String {
        format!("char-trigram-{}", self.dimensions)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Clone, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Ollama `/api/embeddings`.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_input_chars: usize,
}

impl OllamaEmbedder {
    pub fn new(options: &EmbeddingOptions) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", options.url.trim_end_matches('/')),
            model: options.model.clone(),
            dimensions: options.dimensions,
            max_input_chars: options.max_input_chars,
        })
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: truncate_chars(text, self.max_input_chars),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbedError::Status(response.status()));
        }

        let payload: OllamaEmbeddingResponse = response.json().await?;
        match payload.embedding {
            Some(vector) if vector.len() == self.dimensions => Ok(vector),
            Some(vector) => Err(EmbedError::Malformed(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                vector.len()
            ))),
            None => Err(EmbedError::Malformed("missing `embedding` field".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_sync("Hydraulic pressure and flow");
        let second = embedder.embed_sync("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() -> Result<(), EmbedError> {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await?;
        assert_eq!(vector.len(), 32);
        Ok(())
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("Größe", 3), "Grö");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn ollama_endpoint_is_normalized() -> Result<(), EmbedError> {
        let options = EmbeddingOptions {
            url: "http://localhost:11434/".to_string(),
            ..EmbeddingOptions::default()
        };
        let embedder = OllamaEmbedder::new(&options)?;
        assert_eq!(embedder.endpoint, "http://localhost:11434/api/embeddings");
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_service_is_an_error() -> Result<(), EmbedError> {
        let options = EmbeddingOptions {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..EmbeddingOptions::default()
        };
        let embedder = OllamaEmbedder::new(&options)?;
        assert!(embedder.embed("anything").await.is_err());
        Ok(())
    }

    #[test]
    fn fallback_vector_has_requested_dimensions() {
        assert_eq!(fallback_vector(4), vec![0.1; 4]);
        assert_eq!(fallback_vector(0).len(), 1);
    }
}
