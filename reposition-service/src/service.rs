use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use reposition_flow::{
    AnalysisRunner, AnalysisStatus, EngineConfig, FlowError, RigReasoningClient, SessionRegistry,
    SimulatedReasoningClient,
};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt, wrappers::UnboundedReceiverStream};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::models::{AnalyzeRequest, AnalyzeResponse, ServiceStatusResponse, SessionStatusResponse};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub runner: AnalysisRunner,
    pub registry: Arc<SessionRegistry>,
}

/// Wire up a runner with the live OpenRouter-backed client and the
/// deterministic simulated client for dry-run requests.
pub fn build_runner() -> AnalysisRunner {
    let registry = Arc::new(SessionRegistry::new());

    let max_retries = std::env::var("MAX_RETRIES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(reposition_flow::DEFAULT_MAX_RETRIES);

    AnalysisRunner::new(
        registry,
        Arc::new(RigReasoningClient::new()),
        Arc::new(SimulatedReasoningClient::new()),
        EngineConfig { max_retries },
    )
}

pub fn create_app(runner: AnalysisRunner) -> Router {
    let registry = runner.registry().clone();
    let state = AppState { runner, registry };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/status", get(service_status))
        .route("/analyze", post(start_analysis))
        .route("/analysis/{session_id}", get(get_analysis))
        .route("/analysis/{session_id}/events", get(stream_progress))
        .route("/analysis/{session_id}/cancel", post(cancel_analysis))
        .route("/history", get(get_history))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Drug Repositioning Analysis Service",
        "version": "1.0.0",
        "description": "LLM-assisted drug repositioning with staged real-time progress",
        "endpoints": {
            "POST /analyze": "Start a new analysis (user_input, dry_run)",
            "GET /analysis/{session_id}": "Non-blocking status and result query",
            "GET /analysis/{session_id}/events": "SSE progress stream (replay + live)",
            "POST /analysis/{session_id}/cancel": "Cancel a running analysis",
            "GET /history": "Recently completed analyses",
            "GET /status": "Reasoning-service configuration status",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn service_status() -> Json<ServiceStatusResponse> {
    Json(ServiceStatusResponse {
        api_key_configured: std::env::var("OPENROUTER_API_KEY").is_ok(),
        dry_run_available: true,
    })
}

async fn start_analysis(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<AnalyzeResponse> {
    info!(dry_run = request.dry_run, "analysis requested");

    match state.runner.start_analysis(&request.user_input, request.dry_run) {
        Ok(session_id) => Ok(Json(AnalyzeResponse {
            session_id,
            status: "started".to_string(),
        })),
        Err(FlowError::EmptyInput) => Err(bad_request_error(
            "Please provide a disease name or molecular pathology description",
        )),
        Err(e) => {
            error!("failed to start analysis: {e}");
            Err(internal_error("Failed to start analysis", &e.to_string()))
        }
    }
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionStatusResponse> {
    match state.registry.get_result(&session_id) {
        Ok(AnalysisStatus::Pending { state: workflow_state }) => Ok(Json(SessionStatusResponse {
            session_id,
            status: "pending".to_string(),
            state: Some(workflow_state),
            result: None,
            error: None,
            message: None,
        })),
        Ok(AnalysisStatus::Completed(result)) => {
            let message = result
                .candidates
                .is_empty()
                .then(|| "No qualifying repositioning candidates were found".to_string());
            Ok(Json(SessionStatusResponse {
                session_id,
                status: "completed".to_string(),
                state: None,
                result: Some(result),
                error: None,
                message,
            }))
        }
        Ok(AnalysisStatus::Failed(detail)) => Ok(Json(SessionStatusResponse {
            session_id,
            status: "failed".to_string(),
            state: None,
            result: None,
            error: Some(detail),
            message: None,
        })),
        Err(_) => Err(not_found_error("Session not found", &session_id)),
    }
}

/// Stream a session's progress as Server-Sent Events.
///
/// The existing event log is replayed first, then live events follow; the
/// stream ends after the terminal Completed/Failed event.
async fn stream_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (_, rx) = state
        .registry
        .subscribe(&session_id)
        .map_err(|_| not_found_error("Session not found", &session_id))?;

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .event("progress")
            .json_data(&event)
            .unwrap_or_else(|e| {
                error!("failed to serialize progress event: {e}");
                Event::default().event("error").data("serialization failure")
            }))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn cancel_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    match state.registry.cancel(&session_id) {
        Ok(()) => {
            info!(session_id = %session_id, "cancellation requested");
            Ok(Json(json!({
                "session_id": session_id,
                "status": "cancelling"
            })))
        }
        Err(_) => Err(not_found_error("Session not found", &session_id)),
    }
}

async fn get_history(State(state): State<AppState>) -> Json<Value> {
    let completed = state.registry.list_completed();
    let skip = completed.len().saturating_sub(10);
    Json(json!({ "analyses": &completed[skip..] }))
}
