//! Query text to ranked chunks over one corpus snapshot.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    embedding::{EmbeddingClient, EmbeddingClientError, embed_texts},
    index::{CorpusSnapshot, IndexError},
    processing::SearchResult,
};

/// Errors emitted while searching the active corpus.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Query would be embedded with a different model than the corpus.
    #[error(
        "Embedding model mismatch: corpus was built with '{stored}' but queries use '{active}'; re-ingest the document"
    )]
    ModelMismatch {
        /// Model recorded in the metadata store.
        stored: String,
        /// Model of the active embedding client.
        active: String,
    },
    /// Active embedding client produces vectors of a different width than the index.
    #[error("Embedding dimension mismatch: index expects {expected}, client produces {actual}")]
    DimensionMismatch {
        /// Index width.
        expected: usize,
        /// Client width.
        actual: usize,
    },
    /// Query embedding failed.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index rejected the query vector.
    #[error("Index search failed: {0}")]
    Index(#[from] IndexError),
}

/// Composes an embedding client with a corpus snapshot.
pub struct Retriever {
    snapshot: Arc<CorpusSnapshot>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl Retriever {
    /// Pair `embedder` with `snapshot`, refusing combinations that would yield meaningless scores.
    pub fn new(
        snapshot: Arc<CorpusSnapshot>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, RetrievalError> {
        match snapshot.embedding_model() {
            Some(stored) if stored != embedder.model_name() => {
                return Err(RetrievalError::ModelMismatch {
                    stored: stored.to_string(),
                    active: embedder.model_name().to_string(),
                });
            }
            Some(_) => {}
            None => tracing::warn!(
                active = embedder.model_name(),
                "Corpus does not record its embedding model; skipping model check"
            ),
        }
        if snapshot.index().dimension() != embedder.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: snapshot.index().dimension(),
                actual: embedder.dimension(),
            });
        }
        Ok(Self { snapshot, embedder })
    }

    /// Snapshot this retriever searches.
    pub fn snapshot(&self) -> &Arc<CorpusSnapshot> {
        &self.snapshot
    }

    /// Return at most `top_k` results for `query`, best first.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if top_k == 0 || self.snapshot.is_empty() {
            return Ok(Vec::new());
        }
        // The index pads to `k` slots; anything past the corpus size would only be padding.
        let top_k = top_k.min(self.snapshot.len());

        let vector = embed_texts(self.embedder.as_ref(), vec![query.to_string()])
            .await?
            .pop()
            .ok_or(EmbeddingClientError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let neighbors = self.snapshot.index().search(&vector, top_k)?;
        let store = self.snapshot.store();
        let results: Vec<SearchResult> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let position = neighbor.position?;
                let chunk = store.get(position)?;
                Some(SearchResult {
                    score: neighbor.score,
                    page: chunk.page_number,
                    chunk_id: chunk.chunk_id.clone(),
                    text: chunk.text.clone(),
                })
            })
            .collect();

        tracing::debug!(top_k, returned = results.len(), "Retrieved chunks");
        Ok(results)
    }
}
