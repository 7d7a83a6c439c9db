// Use-case level inputs/outputs for the game task.

use crate::domain::{
    Arena, BotId, BotTurnView, GameResults, GameSetup, ObserverTurnView, RoundResults,
};
use serde::Serialize;
use tokio::sync::oneshot;

/// Requests from sessions and the controller into the game task.
#[derive(Debug)]
pub enum ControlEvent {
    Join {
        name: String,
        reply: oneshot::Sender<BotId>,
    },
    Leave {
        bot_id: BotId,
    },
    Ready {
        bot_id: BotId,
    },
    StartGame,
    StopGame,
    PauseGame,
    ResumeGame,
    QueryState {
        reply: oneshot::Sender<GameSummary>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerPhase {
    Idle,
    AwaitingReady,
    Running,
    Paused,
    Ended,
}

/// High-level server state pushed to every connection on change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerState {
    pub phase: SchedulerPhase,
    pub round_number: u32,
    pub turn_number: u32,
    pub participants: Vec<BotId>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            round_number: 0,
            turn_number: 0,
            participants: Vec::new(),
        }
    }
}

/// Who an outbound message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Bot(BotId),
    Observers,
    Everyone,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    GameStarted {
        setup: GameSetup,
        participants: Vec<BotId>,
    },
    RoundStarted {
        round_number: u32,
    },
    BotTurn(BotTurnView),
    ObserverTurn(ObserverTurnView),
    SkippedTurn {
        turn_number: u32,
    },
    RoundEnded(RoundResults),
    GameEnded(GameResults),
    GameAborted {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipient: Recipient,
    pub message: GameMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSummary {
    pub round_number: u32,
    pub turns: usize,
    pub ended: bool,
}

/// Answer to a state query: the engine history condensed plus the scheduler phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSummary {
    pub phase: SchedulerPhase,
    pub arena: Arena,
    pub participants: Vec<BotId>,
    pub ready: Vec<BotId>,
    pub rounds: Vec<RoundSummary>,
    pub game_ended: bool,
}
