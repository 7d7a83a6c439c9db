use crate::domain::{BotId, BotIntent};
use crate::interface_adapters::protocol::{ClientMessage, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{
    ControlEvent, GameMessage, IntentCollector, Outbound, Recipient, ServerState,
};

use axum::{
    Error,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::SinkExt;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    ControlClosed,
    OutboundClosed,
    ServerStateClosed,
    JoinRequired,
    JoinTimeout,
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Bot,
    Observer,
}

#[derive(Debug, serde::Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    role: Role,
}

/// A game message serialized once and shared by every session.
#[derive(Debug, Clone)]
pub struct SerializedOutbound {
    pub recipient: Recipient,
    pub bytes: Utf8Bytes,
}

impl SerializedOutbound {
    fn is_for(&self, role: Role, bot_id: Option<BotId>) -> bool {
        match (self.recipient, role) {
            (Recipient::Everyone, _) => true,
            (Recipient::Observers, Role::Observer) => true,
            (Recipient::Bot(id), Role::Bot) => Some(id) == bot_id,
            _ => false,
        }
    }
}

pub async fn outbound_serializer(
    mut outbound_rx: broadcast::Receiver<Outbound>,
    outbound_bytes_tx: broadcast::Sender<SerializedOutbound>,
    observer_latest_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each outbound message once and broadcast the shared bytes.
    loop {
        match outbound_rx.recv().await {
            Ok(outbound) => {
                let is_observer_turn = matches!(outbound.message, GameMessage::ObserverTurn(_));
                let msg = ServerMessage::from(outbound.message);
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, "failed to serialize outbound message");
                        continue;
                    }
                };

                let bytes = Utf8Bytes::from(txt);
                if is_observer_turn {
                    observer_latest_tx.send_replace(bytes.clone());
                }
                let _ = outbound_bytes_tx.send(SerializedOutbound {
                    recipient: outbound.recipient,
                    bytes,
                });
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "outbound serializer lagged; messages dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                warn!("outbound channel closed; serializer exiting");
                break;
            }
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.role))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, role: Role) {
    // Separate connection id for correlating logs before/after a bot id exists.
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let span = info_span!("conn", conn_id, ?role, bot_id = tracing::field::Empty);
    let _enter = span.enter();

    let mut ctx = match bootstrap_connection(&mut socket, &state, role).await {
        Ok(ctx) => ctx,
        Err(NetError::ClosedBeforeJoin) => {
            info!("client disconnected before join handshake");
            return;
        }
        Err(e) => {
            error!(error = ?e, "failed to bootstrap connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "bootstrap failed".into(),
                })))
                .await;
            let _ = socket.close().await;
            return;
        }
    };

    if let Some(bot_id) = ctx.bot_id {
        span.record("bot_id", bot_id);
        info!(bot_id, name = %ctx.name, "bot connected");
    } else {
        info!("observer connected");
    }

    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

struct ConnCtx {
    pub role: Role,
    // Set for bots once the game task has assigned an id.
    pub bot_id: Option<BotId>,
    pub name: String,
    pub control_tx: mpsc::Sender<ControlEvent>,
    pub collector: IntentCollector,
    pub outbound_rx: broadcast::Receiver<SerializedOutbound>,
    pub observer_latest_rx: watch::Receiver<Utf8Bytes>,
    pub server_state_rx: watch::Receiver<ServerState>,
    // Count lag recovery snapshots sent to this client.
    pub lag_recovery_count: u64,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,

    pub last_outbound_lag_log: Instant,
    pub last_invalid_input_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

#[derive(Debug)]
struct JoinHandshake {
    name: String,
    bytes_in: u64,
    msgs_in: u64,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &AppState,
    role: Role,
) -> Result<ConnCtx, NetError> {
    // Subscribe to updates *before* doing anything else (awaits) to not miss packets.
    let outbound_rx = state.outbound_bytes_tx.subscribe();
    let observer_latest_rx = state.observer_latest_tx.subscribe();
    let server_state_rx = state.server_state_tx.subscribe();

    let (bot_id, join) = match role {
        Role::Bot => {
            let join = match timeout(JOIN_HANDSHAKE_TIMEOUT, read_join_handshake(socket)).await {
                Ok(result) => result?,
                Err(_) => {
                    let _ = send_close_with_reason(socket, close_code::POLICY, "join timeout").await;
                    return Err(NetError::JoinTimeout);
                }
            };

            let (reply, reply_rx) = oneshot::channel();
            state
                .control_tx
                .send(ControlEvent::Join {
                    name: join.name.clone(),
                    reply,
                })
                .await
                .map_err(|_| NetError::ControlClosed)?;
            let bot_id = reply_rx.await.map_err(|_| NetError::ControlClosed)?;
            (Some(bot_id), join)
        }
        Role::Observer => (
            None,
            JoinHandshake {
                name: String::new(),
                bytes_in: 0,
                msgs_in: 0,
            },
        ),
    };

    // From here on a failure must release the bot slot again.
    let greeted = greet(socket, bot_id, &server_state_rx, &observer_latest_rx, role).await;
    if let Err(e) = greeted {
        if let Some(bot_id) = bot_id {
            let _ = state.control_tx.send(ControlEvent::Leave { bot_id }).await;
        }
        return Err(e);
    }

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        role,
        bot_id,
        name: join.name,
        control_tx: state.control_tx.clone(),
        collector: state.collector.clone(),
        outbound_rx,
        observer_latest_rx,
        server_state_rx,
        lag_recovery_count: 0,

        msgs_in: join.msgs_in,
        msgs_out: 0,
        bytes_in: join.bytes_in,
        bytes_out: 0,

        invalid_json: 0,

        last_outbound_lag_log: now,
        last_invalid_input_log: now,

        close_frame: None,
    })
}

/// Identity, current server state and, for observers, the latest turn snapshot.
async fn greet(
    socket: &mut WebSocket,
    bot_id: Option<BotId>,
    server_state_rx: &watch::Receiver<ServerState>,
    observer_latest_rx: &watch::Receiver<Utf8Bytes>,
    role: Role,
) -> Result<(), NetError> {
    send_message(socket, &ServerMessage::Identity { bot_id }).await?;

    // Clone as soon as we borrow to avoid holding the lock across an await.
    let initial_state = server_state_rx.borrow().clone();
    send_message(socket, &ServerMessage::ServerState(initial_state)).await?;

    if role == Role::Observer {
        let latest = observer_latest_rx.borrow().clone();
        if !latest.is_empty() {
            socket.send(Message::Text(latest)).await?;
        }
    }
    Ok(())
}

enum LoopControl {
    Continue,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_NAME_LEN: usize = 64;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

async fn read_join_handshake(socket: &mut WebSocket) -> Result<JoinHandshake, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                let bytes_in = text.len() as u64;
                let payload = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(payload)) => payload,
                    Ok(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "join required")
                            .await;
                        return Err(NetError::JoinRequired);
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "invalid join payload",
                        )
                        .await;
                        return Err(NetError::JoinRequired);
                    }
                };

                let name = payload.name.trim();
                if name.is_empty() || name.len() > MAX_NAME_LEN {
                    let _ = send_close_with_reason(socket, close_code::POLICY, "invalid bot name")
                        .await;
                    return Err(NetError::JoinRequired);
                }

                return Ok(JoinHandshake {
                    name: name.to_string(),
                    bytes_in,
                    msgs_in: 1,
                });
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::JoinRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

fn process_intent(
    bot_id: BotId,
    collector: &IntentCollector,
    intent: BotIntent,
    last_invalid_input_log: &mut Instant,
) -> LoopControl {
    if !intent.is_finite() {
        if should_log(last_invalid_input_log) {
            warn!(bot_id, "invalid intent values (NaN/inf); dropping");
        }
        return LoopControl::Continue;
    }
    collector.submit(bot_id, intent);
    LoopControl::Continue
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let role = ctx.role;
    let bot_id = ctx.bot_id;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        control_tx,
        collector,
        outbound_rx,
        observer_latest_rx,
        server_state_rx,
        lag_recovery_count,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_outbound_lag_log,
        last_invalid_input_log,
        close_frame,
        ..
    } = ctx;

    let mut fatal: Option<NetError> = None;

    loop {
        // disconnect becomes true on error
        let disconnect: bool = tokio::select! {
            incoming = socket.recv() => {
                match handle_incoming_ws(
                    incoming,
                    bot_id,
                    control_tx,
                    collector,
                    msgs_in,
                    bytes_in,
                    invalid_json,
                    last_invalid_input_log,
                    close_frame,
                ).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Ok(outbound) if outbound.is_for(role, bot_id) => {
                        match forward_bytes(outbound.bytes, socket, msgs_out, bytes_out).await {
                            LoopControl::Continue => false,
                            LoopControl::Disconnect => true,
                        }
                    }
                    Ok(_) => false,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(last_outbound_lag_log) {
                            warn!(missed = n, "outbound messages lagged");
                        }

                        // Observers resync from the latest snapshot; bots simply see skipped turns.
                        let latest = observer_latest_rx.borrow().clone();
                        if role == Role::Observer && !latest.is_empty() {
                            *lag_recovery_count += 1;
                            debug!(count = *lag_recovery_count, "sent lag recovery snapshot");
                            match forward_bytes(latest, socket, msgs_out, bytes_out).await {
                                LoopControl::Continue => false,
                                LoopControl::Disconnect => true,
                            }
                        } else {
                            false
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::OutboundClosed);
                        true
                    }
                }
            }

            changed_state = server_state_rx.changed() => {
                match changed_state {
                    Ok(()) => match forward_server_state(server_state_rx, socket, msgs_out, bytes_out).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    Err(_) => {
                        warn!("server state channel closed; disconnecting");
                        fatal = Some(NetError::ServerStateClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    if let Err(e) = disconnect_cleanup(
        bot_id,
        control_tx,
        *msgs_in,
        *msgs_out,
        *bytes_in,
        *bytes_out,
        *invalid_json,
        *lag_recovery_count,
    )
    .await
    {
        warn!(error = ?e, "error during disconnect cleanup");
        if fatal.is_none() {
            fatal = Some(e);
        }
    }

    if let Some(err) = fatal {
        Err(err)
    } else {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    bot_id: Option<BotId>,
    control_tx: &mpsc::Sender<ControlEvent>,
    collector: &IntentCollector,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    invalid_json: &mut u32,
    last_invalid_input_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(_)) => {
                        // Ignore repeated Join packets after bootstrap to keep the session stable.
                        if should_log(last_invalid_input_log) {
                            warn!("duplicate join ignored");
                        }
                        Ok(LoopControl::Continue)
                    }
                    Ok(ClientMessage::Ready) => {
                        let Some(bot_id) = bot_id else {
                            if should_log(last_invalid_input_log) {
                                warn!("observer ready ignored");
                            }
                            return Ok(LoopControl::Continue);
                        };
                        control_tx
                            .send(ControlEvent::Ready { bot_id })
                            .await
                            .map_err(|_| NetError::ControlClosed)?;
                        Ok(LoopControl::Continue)
                    }
                    Ok(ClientMessage::Intent(intent)) => {
                        let Some(bot_id) = bot_id else {
                            // Observers cannot steer bots.
                            if should_log(last_invalid_input_log) {
                                warn!("observer intent ignored");
                            }
                            return Ok(LoopControl::Continue);
                        };
                        Ok(process_intent(
                            bot_id,
                            collector,
                            intent,
                            last_invalid_input_log,
                        ))
                    }
                    Err(parse_err) => {
                        *invalid_json += 1;
                        if should_log(last_invalid_input_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if *invalid_json > MAX_INVALID_JSON {
                            *close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                *close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn forward_bytes(
    bytes: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let bytes_len = bytes.len();
    match socket.send(Message::Text(bytes)).await.map_err(NetError::Ws) {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(error = ?err, "failed to send outbound message");
            LoopControl::Disconnect
        }
    }
}

async fn forward_server_state(
    server_state_rx: &watch::Receiver<ServerState>,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let st = server_state_rx.borrow().clone();
    match send_message(socket, &ServerMessage::ServerState(st)).await {
        Ok(bytes) => {
            *msgs_out += 1;
            *bytes_out += bytes as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send server state");
            LoopControl::Disconnect
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn disconnect_cleanup(
    bot_id: Option<BotId>,
    control_tx: &mpsc::Sender<ControlEvent>,
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
    lag_recovery_count: u64,
) -> Result<(), NetError> {
    if let Some(bot_id) = bot_id {
        control_tx
            .send(ControlEvent::Leave { bot_id })
            .await
            .map_err(|_| NetError::ControlClosed)?;
    }

    debug!(
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        lag_recovery_count,
        "connection stats"
    );
    info!("client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound(recipient: Recipient) -> SerializedOutbound {
        SerializedOutbound {
            recipient,
            bytes: Utf8Bytes::from_static("{}"),
        }
    }

    #[test]
    fn when_message_is_addressed_to_a_bot_then_only_that_bot_receives_it() {
        let message = outbound(Recipient::Bot(3));
        assert!(message.is_for(Role::Bot, Some(3)));
        assert!(!message.is_for(Role::Bot, Some(4)));
        assert!(!message.is_for(Role::Observer, None));
    }

    #[test]
    fn when_message_is_for_observers_then_bots_do_not_receive_it() {
        let message = outbound(Recipient::Observers);
        assert!(message.is_for(Role::Observer, None));
        assert!(!message.is_for(Role::Bot, Some(1)));
        assert!(outbound(Recipient::Everyone).is_for(Role::Bot, Some(1)));
    }

    #[tokio::test]
    async fn when_observer_turn_is_serialized_then_latest_snapshot_is_kept() {
        let (outbound_tx, outbound_rx) = broadcast::channel(8);
        let (bytes_tx, mut bytes_rx) = broadcast::channel(8);
        let (latest_tx, latest_rx) = watch::channel(Utf8Bytes::from_static(""));
        let task = tokio::spawn(outbound_serializer(outbound_rx, bytes_tx, latest_tx));

        outbound_tx
            .send(Outbound {
                recipient: Recipient::Bot(2),
                message: GameMessage::SkippedTurn { turn_number: 5 },
            })
            .unwrap();
        let serialized = bytes_rx.recv().await.unwrap();
        assert_eq!(serialized.recipient, Recipient::Bot(2));
        assert!(serialized.bytes.as_str().contains("SkippedTurn"));
        assert!(latest_rx.borrow().is_empty());

        drop(outbound_tx);
        task.await.unwrap();
    }
}
