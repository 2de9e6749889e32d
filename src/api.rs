//! HTTP surface for the document QA service.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /ingest` – Ingest a PDF that already exists on the server's filesystem and replace the
//!   active corpus. Returns `{ chunks, index_path, store_path }`.
//! - `POST /upload_pdf` – Multipart upload of a `.pdf` file, saved under `DATA_DIR` and ingested.
//! - `POST /ask` – Answer a question for a session. Returns `{ answer, results }`.
//! - `GET /metrics` – Observe ingestion and query counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Failures are reported as `{ "detail": message }` with a status derived from the error kind.

use crate::processing::{
    AnswerStrategy, AskRequest, IngestError, PipelineApi, PipelineError, SearchResult,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const UPLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the pipeline.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/ingest", post(ingest::<S>))
        .route(
            "/upload_pdf",
            post(upload_pdf::<S>).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/ask", post(ask::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /ingest` endpoint.
#[derive(Deserialize)]
struct IngestRequest {
    /// Server-side path of the PDF to ingest.
    pdf_path: PathBuf,
}

/// Success response for the `POST /ingest` endpoint.
#[derive(Serialize)]
struct IngestResponse {
    chunks: usize,
    index_path: String,
    store_path: String,
}

/// Ingest a PDF already present on the server.
async fn ingest<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: PipelineApi,
{
    let outcome = service.ingest_pdf(&request.pdf_path).await?;
    tracing::info!(
        path = %request.pdf_path.display(),
        chunks = outcome.chunks,
        pages = outcome.pages,
        "Ingest request completed"
    );
    Ok(Json(IngestResponse {
        chunks: outcome.chunks,
        index_path: outcome.index_path.display().to_string(),
        store_path: outcome.store_path.display().to_string(),
    }))
}

/// Success response for the `POST /upload_pdf` endpoint.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    chunks: usize,
}

/// Accept a PDF upload, save it under the upload directory, and ingest it.
///
/// The first multipart field carrying a file name is used; any directory components in the
/// client-supplied name are discarded.
async fn upload_pdf<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: PipelineApi,
{
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| PipelineError::InvalidRequest(error.to_string()))?
    {
        let Some(file_name) = field.file_name().and_then(sanitize_file_name) else {
            continue;
        };
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            return Err(IngestError::Unsupported("Only PDF files are supported.".into()).into());
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|error| PipelineError::InvalidRequest(error.to_string()))?;

        let upload_dir = service.upload_dir();
        let save_path = upload_dir.join(&file_name);
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: upload_dir.clone(),
                source,
            })?;
        tokio::fs::write(&save_path, &bytes)
            .await
            .map_err(|source| PipelineError::Io {
                path: save_path.clone(),
                source,
            })?;
        tracing::info!(path = %save_path.display(), bytes = bytes.len(), "Saved upload");

        let outcome = service.ingest_pdf(&save_path).await?;
        return Ok(Json(UploadResponse {
            message: "PDF uploaded and ingested successfully!",
            chunks: outcome.chunks,
        }));
    }

    Err(PipelineError::InvalidRequest("multipart body has no file field".into()).into())
}

fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw.trim()).file_name()?.to_str()?;
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

/// Request body for the `POST /ask` endpoint.
#[derive(Deserialize)]
struct AskBody {
    session_id: String,
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    use_llm: bool,
}

/// Success response for the `POST /ask` endpoint.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
    results: Vec<SearchResult>,
}

/// Answer a question for a session.
async fn ask<S>(
    State(service): State<Arc<S>>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>, AppError>
where
    S: PipelineApi,
{
    let outcome = service
        .ask(AskRequest {
            session_id: body.session_id,
            question: body.question,
            top_k: body.top_k,
            strategy: AnswerStrategy::from_flag(body.use_llm),
        })
        .await?;
    Ok(Json(AskResponse {
        answer: outcome.answer,
        results: outcome.results,
    }))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: PipelineApi,
{
    Json(json!(service.metrics_snapshot()))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Chunk and embed a PDF from the server filesystem, replacing the active corpus.",
                request_example: Some(json!({ "pdf_path": "data/budget.pdf" })),
            },
            CommandDescriptor {
                name: "upload_pdf",
                method: "POST",
                path: "/upload_pdf",
                description: "Upload a PDF as multipart field 'file'; it is saved and ingested.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Answer a question with cited page snippets, or an LLM summary when use_llm is set.",
                request_example: Some(json!({
                    "session_id": "demo",
                    "question": "What is the budget deficit?",
                    "top_k": 3,
                    "use_llm": false
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and query counters.",
                request_example: None,
            },
        ],
    })
}

struct AppError(PipelineError);

impl AppError {
    fn status(&self) -> StatusCode {
        use crate::processing::ErrorKind;
        match self.0.kind() {
            ErrorKind::Input | ErrorKind::State => StatusCode::BAD_REQUEST,
            ErrorKind::ModelMismatch => StatusCode::CONFLICT,
            ErrorKind::Collaborator => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "Request rejected");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<PipelineError>,
{
    fn from(inner: E) -> Self {
        Self(inner.into())
    }
}
