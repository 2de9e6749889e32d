//! Core data types and error definitions for the ingestion and query pipeline.

use crate::{
    answer::AnswerError, embedding::EmbeddingClientError, index::IndexError,
    retriever::RetrievalError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Text extracted from a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number within the source document.
    #[serde(rename = "page")]
    pub page_number: u32,
    /// Extracted, non-empty page text.
    pub text: String,
}

impl Page {
    /// Build a page record.
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// Page-attributed slice of document text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Page the chunk was cut from.
    #[serde(rename = "page")]
    pub page_number: u32,
    /// Identifier of the form `p<page>_c<window>`, unique within a corpus.
    pub chunk_id: String,
    /// Trimmed chunk text.
    pub text: String,
}

/// Ranked retrieval hit handed to answer generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Inner-product similarity between the query and the chunk.
    pub score: f32,
    /// Page the chunk was cut from.
    pub page: u32,
    /// Identifier of the matching chunk.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
}

/// Errors produced while splitting text into windows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Window length of zero never advances.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap at or above the window length would never advance.
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Requested window length.
        chunk_size: usize,
        /// Requested overlap.
        overlap: usize,
    },
}

/// Errors raised while reading a document for ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Ingestion path does not exist.
    #[error("PDF not found: {}", .0.display())]
    NotFound(PathBuf),
    /// File exists but could not be parsed as a PDF.
    #[error("Failed to read PDF {}: {reason}", path.display())]
    Unreadable {
        /// Offending file.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },
    /// Document contained no extractable text.
    #[error("No extractable text in the PDF.")]
    NoText,
    /// Upload rejected before parsing.
    #[error("{0}")]
    Unsupported(String),
}

/// Classification of pipeline failures used by callers to decide how to report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied bad input; reported immediately, never retried.
    Input,
    /// Precondition failed (no corpus, inconsistent artifacts).
    State,
    /// External dependency (embedding or summarization provider) failed.
    Collaborator,
    /// Query embedding model differs from the one used for the corpus.
    ModelMismatch,
    /// Local I/O or serialization failure.
    Internal,
}

/// Errors emitted by the document pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Chunking parameters were invalid.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Source document could not be ingested.
    #[error("{0}")]
    Ingest(#[from] IngestError),
    /// Embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index or metadata store could not be built, persisted, or loaded.
    #[error("{0}")]
    Index(#[from] IndexError),
    /// Retrieval against the active corpus failed.
    #[error("{0}")]
    Retrieval(#[from] RetrievalError),
    /// Answer generation failed.
    #[error("{0}")]
    Answer(#[from] AnswerError),
    /// Query arrived before any corpus was ingested.
    #[error("Index not found. Please upload or ingest a PDF first.")]
    NoCorpus,
    /// Request was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Local file could not be written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Map the error onto the pipeline's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Chunking(_) | Self::Ingest(_) | Self::InvalidRequest(_) => ErrorKind::Input,
            Self::NoCorpus => ErrorKind::State,
            Self::Io { .. } => ErrorKind::Internal,
            Self::Embedding(_) | Self::Answer(_) => ErrorKind::Collaborator,
            Self::Index(error) => {
                if error.is_state() {
                    ErrorKind::State
                } else {
                    ErrorKind::Internal
                }
            }
            Self::Retrieval(error) => match error {
                RetrievalError::ModelMismatch { .. } => ErrorKind::ModelMismatch,
                RetrievalError::DimensionMismatch { .. } => ErrorKind::State,
                RetrievalError::Embedding(_) => ErrorKind::Collaborator,
                RetrievalError::Index(_) => ErrorKind::Internal,
            },
        }
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// Number of chunks in the new corpus.
    pub chunks: usize,
    /// Number of pages with extractable text.
    pub pages: usize,
    /// Location of the persisted vector index.
    pub index_path: PathBuf,
    /// Location of the persisted metadata store.
    pub store_path: PathBuf,
}

/// How an answer is assembled from retrieval results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStrategy {
    /// Cite retrieved snippets verbatim.
    #[default]
    Extractive,
    /// Delegate to the external summarization provider.
    Summarize,
}

impl AnswerStrategy {
    /// Pick the summarizing strategy when `use_llm` is set.
    pub fn from_flag(use_llm: bool) -> Self {
        if use_llm {
            Self::Summarize
        } else {
            Self::Extractive
        }
    }
}

/// Parameters of a single question.
#[derive(Debug, Clone)]
pub struct AskRequest {
    /// Conversation scope for follow-up handling.
    pub session_id: String,
    /// Question as typed by the user.
    pub question: String,
    /// Result count override; `None` or zero uses the configured default.
    pub top_k: Option<usize>,
    /// Answer assembly strategy.
    pub strategy: AnswerStrategy,
}

/// Answer plus the ranked results it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    /// Generated answer text.
    pub answer: String,
    /// Ranked retrieval results, best first.
    pub results: Vec<SearchResult>,
    /// Question text actually sent to retrieval.
    pub contextualized_question: String,
}
