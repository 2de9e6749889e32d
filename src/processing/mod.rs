//! Document pipeline: PDF extraction, chunking, corpus building, and query orchestration.

pub mod chunking;
pub mod pdf;
mod service;
pub mod types;

pub use chunking::{build_corpus, chunk_text};
pub use pdf::read_pdf_with_pages;
pub use service::{DocumentPipeline, PipelineApi};
pub use types::{
    AnswerStrategy, AskOutcome, AskRequest, Chunk, ChunkingError, ErrorKind, IngestError,
    IngestOutcome, Page, PipelineError, SearchResult,
};
