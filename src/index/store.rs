use serde::{Deserialize, Serialize};

use crate::processing::Chunk;

/// Positional chunk metadata paired with a [`super::FlatIpIndex`].
///
/// Serialized as `{"embedding_model", "dimension", "created_at", "index_checksum", "corpus"}`.
/// Only `corpus` is required when loading, so stores written without provenance still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataStore {
    /// Embedding model used to build the paired index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Width of the paired index vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    /// RFC 3339 timestamp of the ingestion that produced the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// SHA-256 of the index file written alongside this store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_checksum: Option<String>,
    /// Chunks in index order.
    pub corpus: Vec<Chunk>,
}

impl MetadataStore {
    /// Build a store for a freshly embedded corpus.
    pub fn new(embedding_model: impl Into<String>, dimension: usize, corpus: Vec<Chunk>) -> Self {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .ok();
        Self {
            embedding_model: Some(embedding_model.into()),
            dimension: Some(dimension),
            created_at,
            index_checksum: None,
            corpus,
        }
    }

    /// Chunk stored at `position`.
    pub fn get(&self, position: usize) -> Option<&Chunk> {
        self.corpus.get(position)
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_bare_corpus_document() {
        let json = r#"{"corpus": [{"page": 2, "chunk_id": "p2_c0", "text": "Tax revenue"}]}"#;
        let store: MetadataStore = serde_json::from_str(json).expect("store");
        assert_eq!(store.len(), 1);
        assert_eq!(store.embedding_model, None);
        assert_eq!(store.get(0).map(|chunk| chunk.page_number), Some(2));
        assert!(store.get(1).is_none());
    }

    #[test]
    fn new_store_records_provenance() {
        let store = MetadataStore::new("all-MiniLM-L6-v2", 384, Vec::new());
        assert_eq!(store.embedding_model.as_deref(), Some("all-MiniLM-L6-v2"));
        assert_eq!(store.dimension, Some(384));
        assert!(store.created_at.is_some());
        assert!(store.is_empty());
    }
}
