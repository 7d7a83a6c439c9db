use crate::domain::{Arena, GameSetup};
use std::{env, str::FromStr};

// Runtime/server constants and game setup read from the environment.

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn http_port() -> u16 {
    env_or("BATTLE_SERVER_PORT", 3001)
}

/// Start automatically once this many bots have joined; 0 leaves it to the controller.
pub fn expected_participants() -> usize {
    env_or("EXPECTED_PARTICIPANTS", 0)
}

pub fn game_setup() -> GameSetup {
    let defaults = GameSetup::default();
    GameSetup {
        arena: Arena {
            width: env_or("ARENA_WIDTH", defaults.arena.width),
            height: env_or("ARENA_HEIGHT", defaults.arena.height),
        },
        number_of_rounds: env_or("NUMBER_OF_ROUNDS", defaults.number_of_rounds),
        gun_cooling_rate: env_or("GUN_COOLING_RATE", defaults.gun_cooling_rate),
        max_inactivity_turns: env_or("MAX_INACTIVITY_TURNS", defaults.max_inactivity_turns),
        min_participants: env_or("MIN_PARTICIPANTS", defaults.min_participants),
        ready_timeout_ms: env_or("READY_TIMEOUT_MS", defaults.ready_timeout_ms),
        turn_timeout_ms: env_or("TURN_TIMEOUT_MS", defaults.turn_timeout_ms),
        seed: env_or("GAME_SEED", defaults.seed),
    }
}

pub const CONTROL_CHANNEL_CAPACITY: usize = 1024;
pub const OUTBOUND_BROADCAST_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_variable_is_unset_or_garbage_then_default_is_used() {
        assert_eq!(env_or("BATTLE_SERVER_TEST_SURELY_UNSET", 42_u32), 42);
        assert_eq!(env_or::<f64>("BATTLE_SERVER_TEST_SURELY_UNSET", 0.5), 0.5);
    }
}
