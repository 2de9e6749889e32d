//! Embedding client abstraction and adapters.
//!
//! Corpus chunks and queries must go through the same client: the model identifier reported by
//! [`EmbeddingClient::model_name`] is persisted next to the index and compared at query time.
//! [`embed_texts`] is the only entry point the pipeline uses; it validates provider output and
//! L2-normalizes every vector so inner product equals cosine similarity.

mod ollama;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use thiserror::Error;

pub use ollama::OllamaEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Provider returned vectors of an unexpected width.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;

    /// Width of every produced vector.
    fn dimension(&self) -> usize;

    /// Produce an embedding vector for each supplied text, preserving order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embed `texts` and return one L2-normalized vector per input, in input order.
pub async fn embed_texts(
    client: &dyn EmbeddingClient,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let expected = texts.len();
    tracing::debug!(
        model = client.model_name(),
        dimension = client.dimension(),
        count = expected,
        "Generating embeddings"
    );
    let mut vectors = client.generate_embeddings(texts).await?;
    if vectors.len() != expected {
        return Err(EmbeddingClientError::CountMismatch {
            expected,
            actual: vectors.len(),
        });
    }
    for vector in &mut vectors {
        if vector.len() != client.dimension() {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: client.dimension(),
                actual: vector.len(),
            });
        }
        normalize(vector);
    }
    Ok(vectors)
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Prefix on identifiers reported by [`HashingEmbeddingClient`].
pub const HASHING_MODEL_PREFIX: &str = "hashing:";

/// Deterministic embedding client that hashes word features into a fixed-width vector.
///
/// Texts sharing vocabulary land close together, and identical texts always produce identical
/// vectors. Used offline and in tests. The reported identifier is `hashing:<model>`, so a corpus
/// hashed under a model name never pairs with a real provider serving that name.
pub struct HashingEmbeddingClient {
    model: String,
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing client reporting `hashing:<model>` as its identifier.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: format!("{HASHING_MODEL_PREFIX}{}", model.into()),
            dimension,
        }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if text.is_empty() {
            return embedding;
        }

        let lowered = text.to_lowercase();
        let mut saw_token = false;
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            saw_token = true;
            let hash = fnv1a(token.as_bytes());
            let slot = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[slot] += sign;
        }

        if !saw_token {
            // Punctuation-only input: fall back to positional byte hashing.
            for (idx, byte) in text.bytes().enumerate() {
                embedding[idx % self.dimension] += f32::from(byte) / 255.0;
            }
        }

        normalize(&mut embedding);
        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(config: &Config) -> Box<dyn EmbeddingClient> {
    match config.embedding_provider {
        EmbeddingProvider::Hashing => Box::new(HashingEmbeddingClient::new(
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
    }
}
