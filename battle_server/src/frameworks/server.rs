// Framework bootstrap for the battle server runtime.

use crate::frameworks::config;
use crate::interface_adapters::net::{
    game_state_handler, outbound_serializer, pause_game_handler, resume_game_handler,
    start_game_handler, stop_game_handler, ws_handler,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{
    IntentCollector, Outbound, SchedulerSettings, ServerState, TurnScheduler, game_task,
};

use axum::{
    Router,
    extract::ws::Utf8Bytes,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::{Notify, broadcast, mpsc, watch};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Serves with settings taken from the environment.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let settings = SchedulerSettings {
        setup: config::game_setup(),
        expected_participants: config::expected_participants(),
    };
    run_with_settings(listener, settings).await
}

pub async fn run_with_settings(
    listener: tokio::net::TcpListener,
    settings: SchedulerSettings,
) -> Result<()> {
    let address = listener.local_addr()?;
    let shutdown = Arc::new(Notify::new());
    let state = build_state(settings, shutdown.clone());

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/game/start", post(start_game_handler))
        .route("/game/stop", post(stop_game_handler))
        .route("/game/pause", post(pause_game_handler))
        .route("/game/resume", post(resume_game_handler))
        .route("/game/state", get(game_state_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });
    shutdown.notify_one();
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state(settings: SchedulerSettings, shutdown: Arc<Notify>) -> Arc<AppState> {
    tracing::debug!(
        arena_width = settings.setup.arena.width,
        arena_height = settings.setup.arena.height,
        rounds = settings.setup.number_of_rounds,
        turn_timeout_ms = settings.setup.turn_timeout_ms,
        expected_participants = settings.expected_participants,
        "game configured"
    );

    // control_tx/rx: joins, leaves, ready signals and controller commands.
    let (control_tx, control_rx) = mpsc::channel(config::CONTROL_CHANNEL_CAPACITY);
    // outbound_tx: messages produced by the scheduler (domain structs).
    let (outbound_tx, _) = broadcast::channel::<Outbound>(config::OUTBOUND_BROADCAST_CAPACITY);
    // outbound_bytes_tx: the same messages serialized once for every session.
    let (outbound_bytes_tx, _) = broadcast::channel(config::OUTBOUND_BROADCAST_CAPACITY);
    let (observer_latest_tx, _) = watch::channel(Utf8Bytes::from(""));
    let (server_state_tx, _) = watch::channel(ServerState::default());

    let collector = IntentCollector::new();

    // Subscribe the serializer before the game task can publish anything.
    tokio::spawn(outbound_serializer(
        outbound_tx.subscribe(),
        outbound_bytes_tx.clone(),
        observer_latest_tx.clone(),
    ));

    let (scheduler, timer_rx) = TurnScheduler::new(
        settings,
        collector.clone(),
        outbound_tx,
        server_state_tx.clone(),
    );
    tokio::spawn(game_task(
        scheduler,
        control_rx,
        timer_rx,
        collector.clone(),
        shutdown,
    ));

    Arc::new(AppState {
        control_tx,
        collector,
        outbound_bytes_tx,
        observer_latest_tx,
        server_state_tx,
    })
}
