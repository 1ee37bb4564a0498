//! HTTP + WebSocket API for survey sessions
//!
//! Endpoints:
//! - POST /session/new - Create session
//! - POST /session/{id}/start - Leave the consent screen, start phase 1
//! - GET /session/{id} - Get session status
//! - POST /session/{id}/response - Submit one use
//! - POST /session/{id}/tick - Poll the phase clock
//! - POST /session/{id}/finish - Flush writes, get the completion link, close
//! - WS /ws/{id} - Live updates
//! - GET /health - Health check

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::config::SurveyConfig;
use crate::core::driver::{SessionParams, SurveySession};
use crate::core::gateway::CategorizationGateway;
use crate::core::writer::TrialWriter;
use crate::types::{
    CompletionOutput, PhaseState, PollOutput, ReasonCode, SessionStatus, SubmitOutput,
};

/// Map entry: the session plus its live-update channel
#[derive(Clone)]
pub struct SessionEntry {
    pub session: Arc<Mutex<SurveySession>>,
    pub update_tx: broadcast::Sender<SessionUpdate>,
}

/// Live update message
#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdate {
    pub event: String,
    pub reason: Option<ReasonCode>,
    pub status: SessionStatus,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, SessionEntry>>,
    pub config: SurveyConfig,
    pub gateway: CategorizationGateway,
    pub writer: TrialWriter,
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewSessionRequest {
    pub participant_id: Option<String>,
    pub study_id: Option<String>,
    pub return_url: Option<String>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
    pub group_id: u8,
    pub hints_enabled: bool,
    pub state: PhaseState,
}

/// Submit response request
#[derive(Debug, Deserialize)]
pub struct ResponseRequest {
    pub text: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Create the API router
pub fn create_router(
    config: SurveyConfig,
    gateway: CategorizationGateway,
    writer: TrialWriter,
) -> Router {
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        config,
        gateway,
        writer,
    });

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/start", post(start_session))
        .route("/session/:id/response", post(submit_response))
        .route("/session/:id/tick", post(tick))
        .route("/session/:id/finish", post(finish_session))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
    })
}

/// Create new session
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Json<NewSessionResponse> {
    let session_id = generate_session_id();
    let (tx, _) = broadcast::channel(100);

    let params = SessionParams {
        participant_id: req.participant_id,
        study_id: req.study_id,
        return_url: req.return_url,
    };
    let session = SurveySession::new(
        session_id.clone(),
        params,
        &state.config,
        state.gateway.clone(),
        state.writer.clone(),
    );
    let response = NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
        group_id: session.group().id(),
        hints_enabled: session.group().hints_enabled(),
        state: session.phase_state(),
    };

    let mut sessions = state.sessions.write().await;
    sessions.insert(
        session_id.clone(),
        SessionEntry {
            session: Arc::new(Mutex::new(session)),
            update_tx: tx,
        },
    );
    tracing::info!(session = %session_id, "session created");

    Json(response)
}

/// Look up a session without holding the map lock
async fn entry(state: &AppState, id: &str) -> Result<SessionEntry, StatusCode> {
    let sessions = state.sessions.read().await;
    sessions.get(id).cloned().ok_or(StatusCode::NOT_FOUND)
}

/// Get session status
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, StatusCode> {
    let entry = entry(&state, &id).await?;
    let session = entry.session.lock().await;
    Ok(Json(session.status()))
}

/// Start phase 1
async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, StatusCode> {
    let entry = entry(&state, &id).await?;
    let mut session = entry.session.lock().await;
    session.begin();
    let status = session.status();
    publish(&entry, "started", None, status.clone());
    Ok(Json(status))
}

/// Submit one use
async fn submit_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ResponseRequest>,
) -> Result<Json<SubmitOutput>, StatusCode> {
    let entry = entry(&state, &id).await?;
    let mut session = entry.session.lock().await;
    let output = session.submit(&req.text).await;
    if output.is_accepted() {
        publish(&entry, "response", Some(output.reason), session.status());
    }
    Ok(Json(output))
}

/// Poll the phase clock; ends the phase when time is up
async fn tick(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PollOutput>, StatusCode> {
    let entry = entry(&state, &id).await?;
    let mut session = entry.session.lock().await;
    let before = session.phase_state();
    let output = session.poll().await;
    if output.state != before {
        publish(&entry, "phase", Some(output.reason), session.status());
    }
    Ok(Json(output))
}

/// Completion screen data; the session is dropped afterwards
async fn finish_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CompletionOutput>, StatusCode> {
    let entry = entry(&state, &id).await?;
    let output = {
        let mut session = entry.session.lock().await;
        let output = session.finish().await;
        publish(
            &entry,
            "finished",
            Some(ReasonCode::C001_STUDY_COMPLETE),
            session.status(),
        );
        output
    };

    state.sessions.write().await.remove(&id);
    tracing::info!(session = %id, "session closed");
    Ok(Json(output))
}

fn publish(entry: &SessionEntry, event: &str, reason: Option<ReasonCode>, status: SessionStatus) {
    let update = SessionUpdate {
        event: event.to_string(),
        reason,
        status,
    };
    // no subscribers is fine
    let _ = entry.update_tx.send(update);
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let entry = entry(&state, &id).await?;
    let rx = entry.update_tx.subscribe();

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward updates until either side goes away
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<SessionUpdate>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            update = rx.recv() => {
                let update = match update {
                    Ok(update) => update,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "websocket subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let json = serde_json::to_string(&update).unwrap_or_default();
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Generate session ID
fn generate_session_id() -> String {
    format!("session_{:016x}", rand::random::<u64>())
}

/// Run the API server
pub async fn run_server(
    addr: &str,
    config: SurveyConfig,
    gateway: CategorizationGateway,
    writer: TrialWriter,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(config, gateway, writer);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "survey API listening");
    println!("AUT survey API running on {}", addr);
    println!("  POST /session/new           - Create session");
    println!("  POST /session/:id/start     - Start phase 1");
    println!("  GET  /session/:id           - Get status");
    println!("  POST /session/:id/response  - Submit a use");
    println!("  POST /session/:id/tick      - Poll the phase clock");
    println!("  POST /session/:id/finish    - Completion link");
    println!("  WS   /ws/:id                - Live updates");
    println!("  GET  /health                - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
