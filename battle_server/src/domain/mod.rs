// Domain layer: rules, per-turn simulation and the round/turn engine.

pub mod collision;
pub mod events;
pub mod gun;
pub mod intent;
pub mod math;
pub mod physics;
pub mod rules;
pub mod scan;
pub mod score;
pub mod setup;
pub mod state;
pub mod updater;

pub use events::{Event, TurnEvents};
pub use intent::BotIntent;
pub use score::{BotResult, Score};
pub use setup::{GameSetup, SetupError, UpdateError};
pub use state::{
    Arena, BotId, BotState, BotTurnView, BulletState, GameState, ObserverTurnView, Round, Turn,
};
pub use updater::{EnginePhase, GameResults, ModelUpdater, RoundResults, TurnOutcome};
