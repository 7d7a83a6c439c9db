// Per-game configuration and the errors the engine can surface.

use super::rules::PLACEMENT_CELL_SIZE;
use super::state::Arena;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSetup {
    pub arena: Arena,
    pub number_of_rounds: u32,
    pub gun_cooling_rate: f64,
    pub max_inactivity_turns: u32,
    pub min_participants: usize,
    pub ready_timeout_ms: u64,
    pub turn_timeout_ms: u64,
    /// Seed for bot placement; the same seed and intents replay the same game.
    pub seed: u64,
}

impl Default for GameSetup {
    fn default() -> Self {
        Self {
            arena: Arena {
                width: 800.0,
                height: 600.0,
            },
            number_of_rounds: 10,
            gun_cooling_rate: 0.1,
            max_inactivity_turns: 450,
            min_participants: 2,
            ready_timeout_ms: 10_000,
            turn_timeout_ms: 30,
            seed: 0,
        }
    }
}

impl GameSetup {
    /// Placement grid dimensions `(columns, rows)` for this arena.
    pub fn grid(&self) -> (usize, usize) {
        let columns = (self.arena.width / PLACEMENT_CELL_SIZE).floor().max(0.0) as usize;
        let rows = (self.arena.height / PLACEMENT_CELL_SIZE).floor().max(0.0) as usize;
        (columns, rows)
    }

    /// Fails when the arena cannot give every participant its own grid cell.
    pub fn check_capacity(&self, participants: usize) -> Result<(), SetupError> {
        if participants == 0 {
            return Err(SetupError::NoParticipants);
        }
        let (columns, rows) = self.grid();
        if columns * rows < participants {
            return Err(SetupError::ArenaTooSmall {
                width: self.arena.width,
                height: self.arena.height,
                participants,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SetupError {
    #[error("arena {width}x{height} cannot hold {participants} bots")]
    ArenaTooSmall {
        width: f64,
        height: f64,
        participants: usize,
    },
    #[error("a round needs at least one participant")]
    NoParticipants,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpdateError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("game has already ended")]
    GameEnded,
}
