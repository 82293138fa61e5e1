//! HTTP API.
//!
//! A thin JSON layer over [`RagSystem`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST`   | `/api/query` | Answer a question, optionally within a session |
//! | `GET`    | `/api/courses` | Course count and titles |
//! | `DELETE` | `/api/session/{id}` | Forget a session's history |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "generation_failed", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `generation_failed` (502), `index_unavailable` (503), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use course_rag_core::models::{CourseCatalog, SourceRef};
use course_rag_core::RagError;

use crate::config::Config;
use crate::rag::RagSystem;

/// Ingest the documents root, then serve until the process is stopped.
///
/// Documents that fail to ingest are logged and skipped; the server starts
/// regardless.
pub async fn run_server(config: &Config, system: RagSystem) -> anyhow::Result<()> {
    match system.ingest_all(None).await {
        Ok(report) => {
            info!(
                courses = report.courses.len(),
                chunks = report.chunk_count(),
                failures = report.failures.len(),
                "startup ingestion finished"
            );
        }
        Err(e) => warn!(error = %e, "startup ingestion skipped"),
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(system)).await?;
    Ok(())
}

/// Build the application router.
pub fn router(system: RagSystem) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/courses", get(handle_courses))
        .route("/api/session/{id}", delete(handle_clear_session))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(system)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::Generation(_) => StatusCode::BAD_GATEWAY,
            RagError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::CourseNotFound(_) => StatusCode::NOT_FOUND,
            RagError::Parse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(code = err.code(), error = %err, "request failed");
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct SourceBody {
    title: String,
    url: Option<String>,
}

impl From<SourceRef> for SourceBody {
    fn from(source: SourceRef) -> Self {
        Self {
            title: source.label(),
            url: source.url,
        }
    }
}

#[derive(Serialize)]
struct QueryResponseBody {
    answer: String,
    sources: Vec<SourceBody>,
    session_id: String,
}

async fn handle_query(
    State(system): State<RagSystem>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponseBody>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let response = system.query(&req.query, req.session_id.as_deref()).await?;

    Ok(Json(QueryResponseBody {
        answer: response.answer,
        sources: response.sources.into_iter().map(SourceBody::from).collect(),
        session_id: response.session_id,
    }))
}

// ============ GET /api/courses ============

async fn handle_courses(State(system): State<RagSystem>) -> Result<Json<CourseCatalog>, AppError> {
    Ok(Json(system.list_courses().await?))
}

// ============ DELETE /api/session/{id} ============

#[derive(Serialize)]
struct ClearSessionResponse {
    success: bool,
    message: String,
}

async fn handle_clear_session(
    State(system): State<RagSystem>,
    Path(id): Path<String>,
) -> Result<Json<ClearSessionResponse>, AppError> {
    if !system.clear_session(&id).await {
        return Err(not_found(format!("unknown session: {}", id)));
    }
    Ok(Json(ClearSessionResponse {
        success: true,
        message: "Session cleared successfully".to_string(),
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
