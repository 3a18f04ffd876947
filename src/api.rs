//! HTTP surface for RAGForge.
//!
//! One shared [`SessionOrchestrator`] sits behind a Tokio mutex. The router exposes:
//!
//! - `GET /session` – Full session snapshot (state, document, configuration, transcript, progress).
//! - `POST /session/document?name=` – Upload raw PDF bytes. The `Content-Type` header is used when
//!   present, otherwise the type is guessed from `name`.
//! - `PATCH /session/config` – Apply a partial configuration edit.
//! - `POST /session/process` – Start the simulated ingestion in the background (`202 Accepted`).
//! - `POST /session/messages` – Ask a question; returns the assistant message.
//! - `GET /session/export` – Download the session export bundle.
//! - `POST /session/reset` – Return to the upload state.
//! - `GET /metrics` – Session counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! The mutex is never held across a backend call or a stage wait.

use crate::document::{DocumentSummary, MAX_UPLOAD_BYTES, Upload, UploadError};
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::pipeline::{ConfigUpdate, PipelineConfig};
use crate::sequencer::{Clock, Stage};
use crate::session::{
    Message, QueryStart, SessionError, SessionOrchestrator, SessionSnapshot, drive_processing,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Content types that carry no information about the payload.
const GENERIC_CONTENT_TYPES: [&str; 2] = [
    "application/octet-stream",
    "application/x-www-form-urlencoded",
];

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<SessionOrchestrator>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SessionMetrics>,
}

impl AppState {
    /// Wrap an orchestrator; `clock` paces every processing run started over HTTP.
    pub fn new(orchestrator: SessionOrchestrator, clock: Arc<dyn Clock>) -> Self {
        let metrics = Arc::clone(orchestrator.metrics());
        Self {
            session: Arc::new(Mutex::new(orchestrator)),
            clock,
            metrics,
        }
    }

    /// Handle to the shared orchestrator.
    pub fn session(&self) -> Arc<Mutex<SessionOrchestrator>> {
        Arc::clone(&self.session)
    }
}

/// Build the HTTP router exposing the session API surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/document", post(upload_document))
        .route("/session/config", patch(update_config))
        .route("/session/process", post(start_processing))
        .route("/session/messages", post(post_message))
        .route("/session/export", get(export_session))
        .route("/session/reset", post(reset_session))
        .route("/metrics", get(get_metrics))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(2 * MAX_UPLOAD_BYTES as usize))
        .with_state(state)
}

async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.lock().await.snapshot())
}

/// Query string for `POST /session/document`.
#[derive(Deserialize)]
struct UploadParams {
    /// Original file name.
    name: String,
}

/// Validate and store an uploaded PDF.
async fn upload_document(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DocumentSummary>, AppError> {
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| {
            !GENERIC_CONTENT_TYPES
                .iter()
                .any(|generic| value.starts_with(generic))
        })
        .map(str::to_string);
    let upload = Upload::new(params.name, declared, body.to_vec());

    let mut session = state.session.lock().await;
    let document = session.accept_upload(upload)?;
    Ok(Json(document.summary()))
}

async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<PipelineConfig>, AppError> {
    let mut session = state.session.lock().await;
    let config = session.configure(update)?;
    Ok(Json(config.clone()))
}

/// Response body for `POST /session/process`.
#[derive(Serialize)]
struct ProcessingStarted {
    /// Stage table that will run.
    stages: Vec<Stage>,
    /// Expected wall-clock time until chat opens.
    total_duration_ms: u64,
}

/// Freeze the configuration and spawn the sequencer.
async fn start_processing(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ProcessingStarted>), AppError> {
    let run = state
        .session
        .lock()
        .await
        .start_processing(Arc::clone(&state.clock))?;
    let body = ProcessingStarted {
        stages: run.sequencer().stages().to_vec(),
        total_duration_ms: run.sequencer().total_duration().as_millis() as u64,
    };

    let session = state.session();
    tokio::spawn(async move {
        if let Err(error) = drive_processing(session, run).await {
            tracing::warn!(error = %error, "Processing run did not start");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(body)))
}

/// Request body for `POST /session/messages`.
#[derive(Deserialize)]
struct MessageRequest {
    /// Question text.
    text: String,
}

/// Response body for `POST /session/messages`.
#[derive(Serialize)]
struct MessageResponse {
    /// Assistant message appended for the question.
    message: Message,
}

/// Ask one question. The lock is released while the backend call runs.
///
/// The call and the transcript update run in their own task, so a client that disconnects
/// mid-call still gets its reply recorded (or dropped by epoch after a reset).
async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let start = state.session.lock().await.begin_query(&request.text)?;
    let message = match start {
        QueryStart::Refused(message) => message,
        QueryStart::Pending(pending) => {
            let session = state.session();
            tokio::spawn(async move {
                let completed = pending.execute().await;
                session.lock().await.complete_query(completed)
            })
            .await
            .map_err(AppError::Task)?
            .ok_or(SessionError::SessionReset)?
        }
    };
    Ok(Json(MessageResponse { message }))
}

/// Download the export bundle as a JSON attachment.
async fn export_session(State(state): State<AppState>) -> Result<Response, AppError> {
    let bundle = state.session.lock().await.export_bundle()?;
    let body = bundle.to_json().map_err(AppError::Serialization)?;

    let mut response = body.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        attachment_disposition(&bundle.file_name()),
    );
    Ok(response)
}

/// `attachment; filename="..."` with quotes, backslashes and non-printable or non-ASCII
/// characters replaced by `_`.
fn attachment_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii_graphic() || ch == ' ' => ch,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

async fn reset_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    let mut session = state.session.lock().await;
    session.reset();
    Json(session.snapshot())
}

/// Return session counters.
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
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
                name: "session",
                method: "GET",
                path: "/session",
                description: "Return the session state, document summary, configuration, transcript and processing progress.",
                request_example: None,
            },
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/session/document?name=spec.pdf",
                description: "Upload raw PDF bytes (max 10MB). Only accepted in the upload state.",
                request_example: None,
            },
            CommandDescriptor {
                name: "configure",
                method: "PATCH",
                path: "/session/config",
                description: "Edit the simulated pipeline. Numeric values are clamped to their slider grid; switching provider resets the model.",
                request_example: Some(json!({
                    "chunk_size": 256,
                    "overlap": 32,
                    "retrieval_k": 5,
                    "parser": "docling",
                    "model_provider": "google",
                    "model": "gemini-2.5-flash",
                    "export_enabled": true
                })),
            },
            CommandDescriptor {
                name: "process",
                method: "POST",
                path: "/session/process",
                description: "Start the simulated ingestion. Poll /session until the state is chat.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/session/messages",
                description: "Ask a question about the document. Returns { \"message\": { \"role\": \"model\", \"text\": ... } }.",
                request_example: Some(json!({ "text": "What is the operating voltage?" })),
            },
            CommandDescriptor {
                name: "export",
                method: "GET",
                path: "/session/export",
                description: "Download the session export bundle (configuration metadata and transcript).",
                request_example: None,
            },
            CommandDescriptor {
                name: "reset",
                method: "POST",
                path: "/session/reset",
                description: "Discard the document and transcript and return to the upload state.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return session counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Session(SessionError),
    Serialization(serde_json::Error),
    Task(tokio::task::JoinError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Session(error) => match error {
                SessionError::InvalidState { .. }
                | SessionError::QueryInFlight
                | SessionError::SessionReset => StatusCode::CONFLICT,
                SessionError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
                SessionError::Upload(UploadError::UnsupportedType { .. }) => {
                    StatusCode::UNSUPPORTED_MEDIA_TYPE
                }
                SessionError::Upload(_)
                | SessionError::InvalidConfiguration(_)
                | SessionError::EmptyQuery => StatusCode::BAD_REQUEST,
                SessionError::ExportDisabled => StatusCode::NOT_FOUND,
            },
            Self::Serialization(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Session(error) => error.to_string(),
            Self::Serialization(error) => format!("failed to encode export: {error}"),
            Self::Task(error) => format!("query task failed: {error}"),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(inner: SessionError) -> Self {
        Self::Session(inner)
    }
}
