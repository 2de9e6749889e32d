#![deny(missing_docs)]

//! Core library for the document question-answering service.
//!
//! A PDF is split into overlapping character windows, embedded, and indexed for inner-product
//! search. Questions are contextualized with per-session memory, matched against the active
//! corpus, and answered either extractively or through an external language model.

/// Answer assembly strategies.
pub mod answer;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Vector index, metadata store, and the active corpus handle.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Per-session conversation memory.
pub mod memory;
/// Ingestion and query counters.
pub mod metrics;
/// Document pipeline: extraction, chunking, and orchestration.
pub mod processing;
/// Query embedding and nearest-chunk lookup.
pub mod retriever;
/// Remote language model clients for summarized answers.
pub mod summarization;
