use crate::interface_adapters::net::SerializedOutbound;
use crate::use_cases::{ControlEvent, IntentCollector, ServerState};
use axum::extract::ws::Utf8Bytes;
use tokio::sync::{broadcast, mpsc, watch};

#[derive(Clone)]
pub struct AppState {
    // Joins, leaves, ready signals and controller commands for the game task.
    pub control_tx: mpsc::Sender<ControlEvent>,
    // Intents bypass the control channel and merge straight into the pending map.
    pub collector: IntentCollector,
    // Outbound messages serialized once, tagged with their recipient.
    pub outbound_bytes_tx: broadcast::Sender<SerializedOutbound>,
    // Latest serialized observer turn for lag recovery and late joiners.
    pub observer_latest_tx: watch::Sender<Utf8Bytes>,
    // High-level scheduler state (lobby, ready, running, paused, ended).
    pub server_state_tx: watch::Sender<ServerState>,
}
