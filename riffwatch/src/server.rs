//! Query API
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/state` | GET | current read model |
//! | `/health` | GET | `{status, version}` |
//! | `/live-ai/toggle` | POST | `{liveAiEnabled}` |
//! | `/shutdown` | POST | 202, then the server drains and exits |

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use riffwatch_core::{EngineHandle, ReadModel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Body of `POST /live-ai/toggle`.
///
/// Missing fields fall back to the song currently shown.
#[derive(Debug, Default, Deserialize)]
pub struct ToggleRequest {
    #[serde(default)]
    pub song: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub live_ai_enabled: bool,
}

pub fn router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/state", get(state))
        .route("/health", get(health))
        .route("/live-ai/toggle", post(toggle_live_ai))
        .route("/shutdown", post(shutdown))
        .with_state(engine)
}

async fn state(State(engine): State<EngineHandle>) -> Json<ReadModel> {
    Json(engine.read_model().as_ref().clone())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// An empty body toggles for the current song; a body that is present must
/// parse.
async fn toggle_live_ai(
    State(engine): State<EngineHandle>,
    body: Bytes,
) -> Result<Json<ToggleResponse>, (StatusCode, String)> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ToggleRequest::default()
    } else {
        serde_json::from_slice::<ToggleRequest>(&body).map_err(|e| {
            tracing::debug!(error = %e, "Rejecting toggle request body");
            (StatusCode::BAD_REQUEST, format!("invalid toggle request: {e}"))
        })?
    };
    let current = engine.read_model();
    let song = request.song.unwrap_or_else(|| current.snapshot.song.clone());
    let artist = request
        .artist
        .unwrap_or_else(|| current.snapshot.artist.clone());

    Ok(Json(ToggleResponse {
        live_ai_enabled: engine.toggle_live_ai(&song, &artist).await,
    }))
}

async fn shutdown(State(engine): State<EngineHandle>) -> StatusCode {
    tracing::info!("Shutdown requested over the query API");
    engine.request_shutdown();
    StatusCode::ACCEPTED
}
