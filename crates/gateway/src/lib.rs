//! HTTP gateway for Loregate.
//!
//! Endpoints:
//!
//! - `GET  /health`              — liveness probe
//! - `GET  /api/character/{id}`  — card metadata after a successful parse
//! - `POST /api/chat`            — apply a card to a history, forward the
//!   composed prompt upstream, return the reply
//!
//! Built on Axum. Cards are loaded per request from the configured
//! characters directory; the composed message sequence goes to the upstream
//! completion client verbatim.

pub mod store;
pub mod upstream;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use loregate_core::{CardSettings, CompletionClient, Error, Message, StoreError};
use store::CardStore;
use upstream::OpenAiCompatClient;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub store: CardStore,
    pub upstream: Arc<dyn CompletionClient>,
    pub model: String,
    pub settings: CardSettings,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/character/{id}", get(character_handler))
        .route("/api/chat", post(chat_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server from configuration.
pub async fn start(config: loregate_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate_for_serving()?;

    let upstream = OpenAiCompatClient::new(
        "upstream",
        config.upstream.base_url.clone(),
        config.upstream.api_key.clone().unwrap_or_default(),
    )?;
    let state = Arc::new(GatewayState {
        store: CardStore::new(config.gateway.characters_dir.clone()),
        upstream: Arc::new(upstream),
        model: config.upstream.model.clone(),
        settings: config.card_settings(),
    });

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!(%addr, model = %config.upstream.model, "starting gateway");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    character_id: String,
    #[serde(default)]
    history: Vec<Message>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
}

#[derive(Serialize)]
struct CharacterResponse {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    greeting: Option<String>,
    alternate_greetings: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        Error::Store(StoreError::InvalidId(_)) => StatusCode::BAD_REQUEST,
        // A card that exists but fails to parse is a server-side problem.
        Error::Store(_) | Error::Card(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::History(_) | Error::Entry(_) => StatusCode::BAD_REQUEST,
        Error::Upstream(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        warn!(%err, "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn character_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<CharacterResponse>, ApiError> {
    let card = state.store.load(&id).map_err(api_error)?;
    Ok(Json(CharacterResponse {
        name: card.name().to_string(),
        greeting: card.greeting().map(str::to_string),
        alternate_greetings: card.alternate_greetings().to_vec(),
    }))
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(character_id = %payload.character_id, history = payload.history.len(), "chat request");

    let card = state.store.load(&payload.character_id).map_err(api_error)?;
    let messages = card
        .apply(&payload.history, &state.settings)
        .map_err(api_error)?;

    let reply = state
        .upstream
        .complete(&state.model, &messages)
        .await
        .map_err(|e| api_error(e.into()))?;

    Ok(Json(ChatResponse { reply }))
}
