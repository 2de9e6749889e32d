//! Vector index, metadata store, and their persistence as one unit.
//!
//! An index and its store are written together and loaded together. The store records the
//! SHA-256 of the index file it was written with, so a store can never be paired with a stale or
//! foreign index. Both files are written to temporary siblings first and then renamed into place.

mod active;
mod flat;
mod store;

pub use active::ActiveCorpus;
pub use flat::{FlatIpIndex, Neighbor};
pub use store::MetadataStore;

use crate::processing::Chunk;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building, persisting, or loading an index/store pair.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Metadata store could not be encoded or decoded.
    #[error("Invalid metadata store: {0}")]
    Json(#[from] serde_json::Error),
    /// Index file failed validation.
    #[error("Corrupt vector index: {0}")]
    Corrupt(String),
    /// Vector width disagrees with the index.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Width of the index.
        expected: usize,
        /// Width supplied.
        actual: usize,
    },
    /// One of the paired artifacts is absent.
    #[error("Index artifact not found at {}", .0.display())]
    MissingArtifact(PathBuf),
    /// Index and store disagree on corpus size.
    #[error("Index holds {index} vectors but store holds {store} chunks")]
    LengthMismatch {
        /// Vector count.
        index: usize,
        /// Chunk count.
        store: usize,
    },
    /// Store was written for a different index file.
    #[error("Metadata store does not belong to the index at {}", .0.display())]
    ChecksumMismatch(PathBuf),
}

impl IndexError {
    /// Whether the failure reflects inconsistent or missing persisted state rather than I/O.
    pub fn is_state(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}

/// Immutable, length-consistent pairing of a vector index and its metadata store.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    index: FlatIpIndex,
    store: MetadataStore,
}

impl CorpusSnapshot {
    /// Pair `index` with `store`, rejecting mismatched lengths or widths.
    pub fn new(index: FlatIpIndex, store: MetadataStore) -> Result<Self, IndexError> {
        if index.len() != store.len() {
            return Err(IndexError::LengthMismatch {
                index: index.len(),
                store: store.len(),
            });
        }
        if let Some(dimension) = store.dimension {
            if dimension != index.dimension() {
                return Err(IndexError::DimensionMismatch {
                    expected: index.dimension(),
                    actual: dimension,
                });
            }
        }
        Ok(Self { index, store })
    }

    /// Vector index half of the pair.
    pub fn index(&self) -> &FlatIpIndex {
        &self.index
    }

    /// Metadata half of the pair.
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Number of chunks in the corpus.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Embedding model recorded for the corpus, if known.
    pub fn embedding_model(&self) -> Option<&str> {
        self.store.embedding_model.as_deref()
    }
}

#[derive(Serialize)]
struct StoreRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding_model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<&'a str>,
    index_checksum: &'a str,
    corpus: &'a [Chunk],
}

/// Persist `snapshot` as an index file plus a JSON metadata store.
pub async fn save_index_and_store(
    snapshot: &CorpusSnapshot,
    index_path: &Path,
    store_path: &Path,
) -> Result<(), IndexError> {
    let bytes = snapshot.index.to_bytes();
    let checksum = checksum(&bytes);
    let store = &snapshot.store;
    let record = StoreRecord {
        embedding_model: store.embedding_model.as_deref(),
        dimension: store.dimension,
        created_at: store.created_at.as_deref(),
        index_checksum: &checksum,
        corpus: &store.corpus,
    };
    let json = serde_json::to_vec_pretty(&record)?;

    for path in [index_path, store_path] {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| IndexError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
    }

    write_atomically(index_path, &bytes).await?;
    write_atomically(store_path, &json).await?;
    tracing::info!(
        index_path = %index_path.display(),
        store_path = %store_path.display(),
        chunks = snapshot.len(),
        "Saved index and store"
    );
    Ok(())
}

/// Load and cross-check a persisted index/store pair.
pub async fn load_index_and_store(
    index_path: &Path,
    store_path: &Path,
) -> Result<CorpusSnapshot, IndexError> {
    for path in [index_path, store_path] {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(IndexError::MissingArtifact(path.to_path_buf()));
        }
    }

    let bytes = read(index_path).await?;
    let index = FlatIpIndex::from_bytes(&bytes)?;
    let store: MetadataStore = serde_json::from_slice(&read(store_path).await?)?;

    match store.index_checksum.as_deref() {
        Some(expected) if expected != checksum(&bytes) => {
            return Err(IndexError::ChecksumMismatch(index_path.to_path_buf()));
        }
        Some(_) => {}
        None => tracing::warn!(
            store_path = %store_path.display(),
            "Metadata store carries no index checksum; pairing not verified"
        ),
    }

    let snapshot = CorpusSnapshot::new(index, store)?;
    tracing::info!(
        chunks = snapshot.len(),
        model = snapshot.embedding_model().unwrap_or("unknown"),
        "Loaded index and store"
    );
    Ok(snapshot)
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn read(path: &Path) -> Result<Vec<u8>, IndexError> {
    tokio::fs::read(path).await.map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), IndexError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let staging = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let result = async {
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, path).await
    }
    .await;

    if let Err(source) = result {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(IndexError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(page: u32, window: usize, text: &str) -> Chunk {
        Chunk {
            page_number: page,
            chunk_id: format!("p{page}_c{window}"),
            text: text.to_string(),
        }
    }

    fn snapshot() -> CorpusSnapshot {
        let index = FlatIpIndex::build(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).expect("index");
        let store = MetadataStore::new(
            "test-model",
            2,
            vec![chunk(1, 0, "alpha"), chunk(1, 1, "beta")],
        );
        CorpusSnapshot::new(index, store).expect("snapshot")
    }

    #[test]
    fn snapshot_rejects_length_mismatch() {
        let index = FlatIpIndex::build(2, &[vec![1.0, 0.0]]).expect("index");
        let store = MetadataStore::new("m", 2, Vec::new());
        assert!(matches!(
            CorpusSnapshot::new(index, store),
            Err(IndexError::LengthMismatch { index: 1, store: 0 })
        ));
    }

    #[tokio::test]
    async fn saved_pair_loads_with_matching_lengths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index_path = dir.path().join("models/index.faiss");
        let store_path = dir.path().join("models/store.json");

        save_index_and_store(&snapshot(), &index_path, &store_path)
            .await
            .expect("save");
        let loaded = load_index_and_store(&index_path, &store_path)
            .await
            .expect("load");

        assert_eq!(loaded.store().len(), loaded.index().len());
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.embedding_model(), Some("test-model"));
        assert!(loaded.store().index_checksum.is_some());

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&store_path).expect("read")).expect("json");
        assert_eq!(raw["corpus"][1]["chunk_id"], "p1_c1");
        assert_eq!(raw["corpus"][1]["page"], 1);
    }

    #[tokio::test]
    async fn missing_store_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index_path = dir.path().join("index.faiss");
        let store_path = dir.path().join("store.json");
        save_index_and_store(&snapshot(), &index_path, &store_path)
            .await
            .expect("save");
        std::fs::remove_file(&store_path).expect("remove");

        let error = load_index_and_store(&index_path, &store_path)
            .await
            .expect_err("missing store");
        assert!(matches!(error, IndexError::MissingArtifact(path) if path == store_path));
    }

    #[tokio::test]
    async fn foreign_index_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index_path = dir.path().join("index.faiss");
        let store_path = dir.path().join("store.json");
        save_index_and_store(&snapshot(), &index_path, &store_path)
            .await
            .expect("save");

        let other = FlatIpIndex::build(2, &[vec![0.0, 1.0], vec![1.0, 0.0]]).expect("index");
        std::fs::write(&index_path, other.to_bytes()).expect("overwrite");

        let error = load_index_and_store(&index_path, &store_path)
            .await
            .expect_err("checksum");
        assert!(matches!(error, IndexError::ChecksumMismatch(_)));
        assert!(error.is_state());
    }
}
