// Use cases layer: turn scheduling and the game task around the engine.

pub mod collector;
pub mod game;
pub mod scheduler;
pub mod timer;
pub mod types;

pub use collector::IntentCollector;
pub use game::game_task;
pub use scheduler::{SchedulerSettings, TurnScheduler};
pub use types::{
    ControlEvent, GameMessage, GameSummary, Outbound, Recipient, SchedulerPhase, ServerState,
};
