//! HTTP surface: the chat WebSocket, history and the login session.
//!
//! Every user-facing endpoint identifies the caller through the signed
//! session cookie. Page routes redirect anonymous callers to `/`; the
//! WebSocket upgrade is accepted and immediately closed.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocketUpgrade, close_code};
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::{Deserialize, Serialize};

use crate::record::MessageRecord;
use crate::server::SharedState;

/// Build the axum router.
pub fn router(state: Arc<SharedState>) -> Router {
    let mut app = Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/messages", get(messages))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/api/v1/chat-users", get(chat_users))
        .route("/api/v1/health", get(api_health));

    // Login/chat pages are plain static files rendered by the browser.
    if let Some(ref web_dir) = state.config.static_dir {
        let dir = std::path::PathBuf::from(web_dir);
        if dir.exists() {
            tracing::info!("Serving static pages from {}", dir.display());
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir).append_index_html_on_directories(true),
            );
        } else {
            tracing::warn!("Static dir not found: {}", dir.display());
        }
    }

    app.with_state(state)
}

// ── WebSocket ──────────────────────────────────────────────────────────

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<SharedState>>,
) -> Response {
    match state.sessions.identity(&headers) {
        Some(identity) => {
            ws.on_upgrade(move |socket| crate::chat::run_connection(socket, state, identity))
        }
        None => {
            tracing::warn!("Chat connection rejected: no session");
            // Upgrade, then close right away so browsers get a clean close event.
            ws.on_upgrade(|mut socket| async move {
                let frame = CloseFrame {
                    code: close_code::POLICY,
                    reason: "Not signed in".into(),
                };
                let _ = socket.send(WsMessage::Close(Some(frame))).await;
            })
        }
    }
}

// ── Session ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(state): State<Arc<SharedState>>, Form(form): Form<LoginForm>) -> Response {
    if !state.directory.verify(&form.username, &form.password) {
        tracing::info!(username = %form.username, "Login failed");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "message": "Invalid credentials" })),
        )
            .into_response();
    }
    tracing::info!(username = %form.username, "Login");
    let cookie = state.sessions.set_cookie(&form.username);
    ([(SET_COOKIE, cookie)], Redirect::to("/index")).into_response()
}

async fn logout(State(state): State<Arc<SharedState>>) -> Response {
    ([(SET_COOKIE, state.sessions.clear_cookie())], Redirect::to("/")).into_response()
}

// ── Chat data ──────────────────────────────────────────────────────────

async fn messages(State(state): State<Arc<SharedState>>, headers: HeaderMap) -> Response {
    let Some(identity) = state.sessions.identity(&headers) else {
        return Redirect::to("/").into_response();
    };
    let records: Vec<MessageRecord> = match state.log.visible_to(&identity).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(%identity, "History read failed: {e}");
            Vec::new()
        }
    };
    Json(records).into_response()
}

#[derive(Serialize)]
struct ChatUsersResponse {
    username: String,
    phone: Option<String>,
    chat_users: Vec<String>,
}

async fn chat_users(State(state): State<Arc<SharedState>>, headers: HeaderMap) -> Response {
    let Some(identity) = state.sessions.identity(&headers) else {
        return Redirect::to("/").into_response();
    };
    Json(ChatUsersResponse {
        phone: state.directory.phone(&identity).map(str::to_string),
        chat_users: state.directory.chat_users(&identity),
        username: identity,
    })
    .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    connections: usize,
    online: Vec<String>,
    uptime_secs: u64,
}

async fn api_health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        connections: state.registry.len(),
        online: state.registry.online(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
