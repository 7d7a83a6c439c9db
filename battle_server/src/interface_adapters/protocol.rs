// Wire protocol DTOs and conversions for the public battle server socket.

use crate::domain::{
    BotId, BotIntent, BotTurnView, GameResults, GameSetup, ObserverTurnView, RoundResults,
};
use crate::use_cases::{GameMessage, ServerState};
use serde::{Deserialize, Serialize};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Assigned identity after the handshake; observers get no bot id.
    Identity { bot_id: Option<BotId> },
    GameStarted(GameStartedDto),
    RoundStarted { round_number: u32 },
    // Private per-bot view of the latest turn.
    Turn(BotTurnView),
    ObserverTurn(ObserverTurnView),
    SkippedTurn { turn_number: u32 },
    RoundEnded(RoundResults),
    GameEnded(GameResults),
    GameAborted { reason: String },
    ServerState(ServerState),
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Initial handshake for bots.
    Join(JoinPayload),
    Ready,
    // Partial intent; present fields overwrite the pending ones.
    Intent(BotIntent),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinPayload {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStartedDto {
    pub setup: GameSetup,
    pub participants: Vec<BotId>,
}

impl From<GameMessage> for ServerMessage {
    fn from(message: GameMessage) -> Self {
        match message {
            GameMessage::GameStarted {
                setup,
                participants,
            } => ServerMessage::GameStarted(GameStartedDto {
                setup,
                participants,
            }),
            GameMessage::RoundStarted { round_number } => {
                ServerMessage::RoundStarted { round_number }
            }
            GameMessage::BotTurn(view) => ServerMessage::Turn(view),
            GameMessage::ObserverTurn(view) => ServerMessage::ObserverTurn(view),
            GameMessage::SkippedTurn { turn_number } => ServerMessage::SkippedTurn { turn_number },
            GameMessage::RoundEnded(results) => ServerMessage::RoundEnded(results),
            GameMessage::GameEnded(results) => ServerMessage::GameEnded(results),
            GameMessage::GameAborted { reason } => ServerMessage::GameAborted { reason },
        }
    }
}
