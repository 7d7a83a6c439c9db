use crate::interface_adapters::state::AppState;
use crate::use_cases::ControlEvent;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::warn;

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, serde::Serialize)]
struct AcceptedResponse {
    // Command name echoed back; the game task applies it asynchronously.
    command: &'static str,
}

fn game_task_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "game task unavailable".to_string(),
        }),
    )
        .into_response()
}

async fn send_command(state: &AppState, command: &'static str, event: ControlEvent) -> Response {
    match state.control_tx.send(event).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(AcceptedResponse { command })).into_response(),
        Err(_) => {
            warn!(command, "control channel closed");
            game_task_unavailable()
        }
    }
}

pub async fn start_game_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    send_command(&state, "start", ControlEvent::StartGame).await
}

pub async fn stop_game_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    send_command(&state, "stop", ControlEvent::StopGame).await
}

pub async fn pause_game_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    send_command(&state, "pause", ControlEvent::PauseGame).await
}

pub async fn resume_game_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    send_command(&state, "resume", ControlEvent::ResumeGame).await
}

pub async fn game_state_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (reply, reply_rx) = oneshot::channel();
    if state
        .control_tx
        .send(ControlEvent::QueryState { reply })
        .await
        .is_err()
    {
        return game_task_unavailable();
    }
    match reply_rx.await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(_) => game_task_unavailable(),
    }
}
