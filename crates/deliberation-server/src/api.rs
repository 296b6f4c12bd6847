//! HTTP surface: synchronous analysis, SSE progress streams, cancellation
//! and history queries.
//!
//! ```text
//! GET    /health
//! POST   /api/analyze/text              {text, show_updates}
//! GET    /api/analyze/stream/:session   ?text=   (SSE)
//! DELETE /api/analyze/:session
//! GET    /api/history                   ?limit=
//! GET    /api/history/:id
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use deliberation::{
    stream_deliberation, Deliberation, DeliberationError, DeliberationOrchestrator,
    DeliberationSummary, HistoryError, ProgressEvent, SharedHistoryStore,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error type for API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<DeliberationError> for ApiError {
    fn from(e: DeliberationError) -> Self {
        match e {
            DeliberationError::EmptyProblem => Self::BadRequest(e.to_string()),
            DeliberationError::Cancelled => Self::Conflict(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::NotFound(id) => Self::NotFound(format!("Deliberation {id} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// A registered streaming session.
struct Session {
    /// Problem text registered by `POST /api/analyze/text`, taken when the
    /// stream opens
    pending_text: Option<String>,
    cancel: CancellationToken,
    streaming: bool,
}

/// How long a registered session waits for its stream to open.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(300);

/// Shared handler state.
pub struct AppState {
    orchestrator: DeliberationOrchestrator,
    history: SharedHistoryStore,
    sessions: Mutex<HashMap<String, Session>>,
    pending_ttl: Duration,
}

/// Shared reference to AppState
pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn new(orchestrator: DeliberationOrchestrator, history: SharedHistoryStore) -> Self {
        Self {
            orchestrator,
            history,
            sessions: Mutex::new(HashMap::new()),
            pending_ttl: DEFAULT_PENDING_TTL,
        }
    }

    /// Drop registered sessions whose stream has not opened within `ttl`.
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn shared(self) -> SharedAppState {
        Arc::new(self)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of registered sessions, pending or streaming.
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Remove `session_id` unless its stream has opened.
    fn expire_pending(&self, session_id: &str) {
        let mut sessions = self.sessions();
        if sessions.get(session_id).is_some_and(|s| !s.streaming) {
            sessions.remove(session_id);
            debug!(session_id = %session_id, "Unopened session expired");
        }
    }
}

/// Expire the session once its TTL passes without a stream.
fn schedule_expiry(state: &SharedAppState, session_id: String) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        tokio::time::sleep(state.pending_ttl).await;
        state.expire_pending(&session_id);
    });
}

/// Drops the session entry when its stream ends or the client leaves.
struct SessionGuard {
    state: SharedAppState,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.sessions().remove(&self.session_id);
    }
}

pub fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze/text", post(analyze_text))
        .route("/api/analyze/stream/:session_id", get(analyze_stream))
        .route("/api/analyze/:session_id", delete(cancel_session))
        .route("/api/history", get(list_history))
        .route("/api/history/:id", get(get_history))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: SharedAppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(default)]
    pub show_updates: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub deliberation: Deliberation,
    pub history_id: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamSession {
    pub session_id: String,
    pub stream_url: String,
}

async fn analyze_text(
    State(state): State<SharedAppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Response> {
    let text = request.text.trim().to_string();
    if text.is_empty() {
        return Err(DeliberationError::EmptyProblem.into());
    }

    if request.show_updates {
        let session_id = Uuid::new_v4().to_string();
        state.sessions().insert(
            session_id.clone(),
            Session {
                pending_text: Some(text),
                cancel: CancellationToken::new(),
                streaming: false,
            },
        );
        schedule_expiry(&state, session_id.clone());
        info!(session_id = %session_id, "Streaming session registered");
        let body = StreamSession {
            stream_url: format!("/api/analyze/stream/{session_id}"),
            session_id,
        };
        return Ok(Json(body).into_response());
    }

    let outcome = state.orchestrator.deliberate(&text).await?;
    Ok(Json(AnalyzeResponse {
        deliberation: outcome.deliberation,
        history_id: outcome.history_id,
        warnings: outcome.warnings,
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub text: Option<String>,
}

fn sse_event(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.data().to_string())
}

async fn analyze_stream(
    State(state): State<SharedAppState>,
    Path(session_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let query_text = query.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());

    let (text, cancel) = {
        let mut sessions = state.sessions();
        match sessions.get_mut(&session_id) {
            Some(session) if session.streaming => {
                return Err(ApiError::Conflict(format!(
                    "Session {session_id} is already streaming"
                )));
            }
            Some(session) => {
                let text = query_text
                    .or_else(|| session.pending_text.take())
                    .ok_or_else(|| ApiError::BadRequest("No problem text for session".into()))?;
                session.streaming = true;
                (text, session.cancel.clone())
            }
            None => {
                let text = query_text.ok_or_else(|| {
                    ApiError::NotFound(format!("Session {session_id} not found"))
                })?;
                let cancel = CancellationToken::new();
                sessions.insert(
                    session_id.clone(),
                    Session {
                        pending_text: None,
                        cancel: cancel.clone(),
                        streaming: true,
                    },
                );
                (text, cancel)
            }
        }
    };

    info!(session_id = %session_id, chars = text.chars().count(), "Progress stream opened");
    let rx = stream_deliberation(
        state.orchestrator.clone(),
        text,
        session_id.clone(),
        cancel,
    );
    let guard = SessionGuard {
        state: state.clone(),
        session_id,
    };
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _session = &guard;
        Ok(sse_event(&event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn cancel_session(
    State(state): State<SharedAppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut sessions = state.sessions();
    let session = sessions
        .get(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("Session {session_id} not found")))?;
    session.cancel.cancel();
    let streaming = session.streaming;
    if !streaming {
        sessions.remove(&session_id);
    }
    info!(session_id = %session_id, streaming, "Session cancelled");
    Ok(Json(json!({ "session_id": session_id, "cancelled": true })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

async fn list_history(
    State(state): State<SharedAppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<DeliberationSummary>>> {
    let limit = query
        .limit
        .unwrap_or(state.orchestrator.config().history_limit);
    Ok(Json(state.history.list(limit).await?))
}

async fn get_history(
    State(state): State<SharedAppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deliberation>> {
    Ok(Json(state.history.get(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ApiError::from(DeliberationError::EmptyProblem).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DeliberationError::Cancelled).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(HistoryError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl deliberation::ReasoningEngine for Unreachable {
        async fn generate(
            &self,
            _request: deliberation::EngineRequest,
        ) -> Result<String, deliberation::EngineError> {
            Err(deliberation::EngineError::Request("offline".to_string()))
        }
    }

    fn state(ttl: Duration) -> SharedAppState {
        let orchestrator = DeliberationOrchestrator::new(
            Arc::new(Unreachable),
            deliberation::DeliberationConfig::default(),
        );
        AppState::new(orchestrator, Arc::new(deliberation::InMemoryHistoryStore::new()))
            .with_pending_ttl(ttl)
            .shared()
    }

    async fn register(state: &SharedAppState) -> String {
        let request = AnalyzeRequest {
            text: "Should we expand?".to_string(),
            show_updates: true,
        };
        let response = analyze_text(State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut sessions = state.sessions();
        assert_eq!(sessions.len(), 1);
        sessions.keys().next().cloned().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unopened_sessions_expire() {
        let state = state(Duration::from_secs(60));
        for _ in 0..3 {
            let request = AnalyzeRequest {
                text: "Should we expand?".to_string(),
                show_updates: true,
            };
            analyze_text(State(state.clone()), Json(request)).await.unwrap();
        }
        assert_eq!(state.session_count(), 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(state.session_count(), 3);

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(state.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_session_outlives_ttl() {
        let state = state(Duration::from_secs(60));
        let session_id = register(&state).await;
        if let Some(session) = state.sessions().get_mut(&session_id) {
            session.streaming = true;
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(state.session_count(), 1);
    }

    #[test]
    fn test_analyze_request_defaults_to_sync() {
        let request: AnalyzeRequest = serde_json::from_str(r#"{"text": "p"}"#).unwrap();
        assert!(!request.show_updates);
    }
}
