//! HTTP server hosting the chat UI and its JSON API.
//!
//! Each browser tab creates a session; the session holds the two pieces of
//! per-session state (the chain handle and the transcript). Setting the API
//! key runs [`session::initialize`]; submitting a message runs
//! [`TurnDispatcher::handle_turn`].
//!
//! Sessions live in memory only. The page deletes its session when it is
//! closed, and sessions idle for longer than `[server].session_ttl_secs` are
//! dropped on lookup, on create and by a periodic sweep.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/ui` | Title, placeholder and example questions |
//! | `POST` | `/api/sessions` | Create a session |
//! | `GET`  | `/api/sessions/{id}` | Session transcript and whether a chain is set |
//! | `DELETE` | `/api/sessions/{id}` | Drop a session |
//! | `POST` | `/api/sessions/{id}/key` | Set (or clear) the API key |
//! | `POST` | `/api/sessions/{id}/chat` | Send a message |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no session with id: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `chain_construction` (400), `chain_error` (502).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::chain::ChainHandle;
use crate::config::Config;
use crate::dispatch::TurnDispatcher;
use crate::index::DocumentIndex;
use crate::models::{Credential, Transcript};
use crate::session;

const INDEX_HTML: &str = include_str!("ui/index.html");

/// Per-session state: the chain handle (absent until a key is supplied)
/// and the transcript.
struct SessionState {
    chain: Option<ChainHandle>,
    transcript: Transcript,
    created_at: DateTime<Utc>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            chain: None,
            transcript: Transcript::new(),
            created_at: Utc::now(),
        }
    }
}

/// A stored session and the last time a request touched it.
struct SessionSlot {
    state: Arc<Mutex<SessionState>>,
    last_used: Instant,
}

impl SessionSlot {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_used.elapsed() > ttl
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    index: Arc<DocumentIndex>,
    dispatcher: TurnDispatcher,
    /// Each session has its own lock so turns within one session are
    /// applied in order.
    sessions: Arc<RwLock<HashMap<Uuid, SessionSlot>>>,
    session_ttl: Duration,
}

impl AppState {
    pub fn new(config: Arc<Config>, index: Arc<DocumentIndex>) -> Self {
        let dispatcher = TurnDispatcher::new(config.dispatch.max_concurrent_turns);
        let session_ttl = Duration::from_secs(config.server.session_ttl_secs);
        Self {
            config,
            index,
            dispatcher,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl,
        }
    }

    /// Look up a live session and mark it as used. An expired session is
    /// removed and reported as not found.
    async fn session(&self, id: &str) -> Result<(Uuid, Arc<Mutex<SessionState>>), AppError> {
        let id = Uuid::parse_str(id).map_err(|_| bad_request(format!("invalid session id: {}", id)))?;
        let mut sessions = self.sessions.write().await;

        if let Some(slot) = sessions.get_mut(&id) {
            if !slot.is_expired(self.session_ttl) {
                slot.last_used = Instant::now();
                return Ok((id, Arc::clone(&slot.state)));
            }
            sessions.remove(&id);
            tracing::info!(session = %id, "idle session expired");
        }

        Err(not_found(format!("no session with id: {}", id)))
    }

    /// Drop every session idle for longer than the TTL. Returns how many
    /// were removed.
    pub async fn purge_expired(&self) -> usize {
        let ttl = self.session_ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| !slot.is_expired(ttl));
        before - sessions.len()
    }
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_page))
        .route("/health", get(handle_health))
        .route("/api/ui", get(handle_ui))
        .route("/api/sessions", post(handle_create_session))
        .route(
            "/api/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/api/sessions/{id}/key", post(handle_set_key))
        .route("/api/sessions/{id}/chat", post(handle_chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Load the document index and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = Arc::new(DocumentIndex::load(&config.index.path)?);
    index.check_embedding_model(&config.openai.embedding_model);

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(Arc::new(config.clone()), index);

    tracing::info!(
        max_concurrent_turns = state.dispatcher.max_concurrent(),
        session_ttl_secs = state.session_ttl.as_secs(),
        "turn dispatcher ready"
    );

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(sweeper.session_ttl.min(Duration::from_secs(60)));
        loop {
            ticks.tick().await;
            let removed = sweeper.purge_expired().await;
            if removed > 0 {
                tracing::info!(removed, "dropped idle sessions");
            }
        }
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("chat server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn chain_construction(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "chain_construction",
        message: format!("{:#}", err),
    }
}

/// Downstream failures (network, auth, malformed replies) during a turn.
fn chain_error(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "chain_error",
        message: format!("{:#}", err),
    }
}

// ============ GET / and GET /health ============

async fn handle_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

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

// ============ GET /api/ui ============

#[derive(Serialize)]
struct UiResponse {
    title: String,
    placeholder: String,
    examples: Vec<String>,
}

async fn handle_ui(State(state): State<AppState>) -> Json<UiResponse> {
    let server = &state.config.server;
    Json(UiResponse {
        title: server.title.clone(),
        placeholder: server.placeholder.clone(),
        examples: server.examples.clone(),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
}

async fn handle_create_session(State(state): State<AppState>) -> Json<CreateSessionResponse> {
    let removed = state.purge_expired().await;
    if removed > 0 {
        tracing::info!(removed, "dropped idle sessions");
    }

    let id = Uuid::new_v4();
    state.sessions.write().await.insert(
        id,
        SessionSlot {
            state: Arc::new(Mutex::new(SessionState::new())),
            last_used: Instant::now(),
        },
    );
    tracing::info!(session = %id, "session created");
    Json(CreateSessionResponse { session_id: id })
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: Uuid,
    configured: bool,
    created_at: DateTime<Utc>,
    transcript: Transcript,
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let (id, session) = state.session(&id).await?;
    let session = session.lock().await;
    Ok(Json(SessionResponse {
        session_id: id,
        configured: session.chain.is_some(),
        created_at: session.created_at,
        transcript: session.transcript.clone(),
    }))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let (id, _) = state.session(&id).await?;
    state.sessions.write().await.remove(&id);
    tracing::info!(session = %id, "session dropped");
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /api/sessions/{id}/key ============

#[derive(Deserialize)]
struct SetKeyRequest {
    #[serde(default)]
    api_key: String,
}

#[derive(Serialize)]
struct SetKeyResponse {
    configured: bool,
}

/// Runs the session initializer. An empty key clears the session's chain.
async fn handle_set_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetKeyRequest>,
) -> Result<Json<SetKeyResponse>, AppError> {
    let (id, entry) = state.session(&id).await?;
    let credential = Credential::from(req.api_key);

    let chain = session::initialize(&credential, &state.index, &state.config).map_err(|e| {
        tracing::warn!(session = %id, error = %e, "chain construction failed");
        chain_construction(e)
    })?;

    let configured = chain.is_some();
    entry.lock().await.chain = chain;
    tracing::info!(session = %id, configured, "session key updated");

    Ok(Json(SetKeyResponse { configured }))
}

// ============ POST /api/sessions/{id}/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    api_key: String,
    message: String,
}

/// Both fields carry the same transcript: one for the chat widget, one as
/// the session state the client may keep.
#[derive(Serialize)]
struct ChatResponse {
    chatbot: Transcript,
    state: Transcript,
}

async fn handle_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let (id, entry) = state.session(&id).await?;
    let credential = Credential::from(req.api_key);

    let mut session = entry.lock().await;
    let started = Instant::now();
    let (chatbot, transcript) = state
        .dispatcher
        .handle_turn(
            &credential,
            &req.message,
            Some(session.transcript.clone()),
            session.chain.as_ref(),
        )
        .await
        .map_err(|e| {
            tracing::warn!(session = %id, error = %format!("{:#}", e), "chat turn failed");
            chain_error(e)
        })?;

    session.transcript = transcript.clone();
    tracing::info!(
        session = %id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        turns = transcript.len(),
        "chat turn completed"
    );

    Ok(Json(ChatResponse {
        chatbot,
        state: transcript,
    }))
}
