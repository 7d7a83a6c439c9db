// Round/turn engine: owns the live simulation and produces immutable turn snapshots.

use super::collision::{
    advance_bullets, handle_bot_collisions, handle_bot_wall_collisions, handle_bullet_collisions,
    handle_bullet_hits, handle_bullet_wall_collisions,
};
use super::events::{Event, TurnEvents};
use super::gun::handle_fire;
use super::intent::BotIntent;
use super::math::Point;
use super::physics::{self, MotionPlan};
use super::rules::{INACTIVITY_ZAP, PLACEMENT_CELL_SIZE, START_ENERGY, START_GUN_HEAT};
use super::scan::handle_scans;
use super::score::{AccumulatedScores, BotResult, ScoreTracker};
use super::setup::{GameSetup, SetupError, UpdateError};
use super::state::{BotId, BulletId, BulletState, GameState, Round, SimBot, Turn};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnginePhase {
    AwaitingRound,
    InRound,
    RoundEnded,
    GameEnded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundResults {
    pub round_number: u32,
    pub turn_number: u32,
    pub results: Vec<BotResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameResults {
    pub number_of_rounds: u32,
    pub results: Vec<BotResult>,
}

/// What a single `advance_turn` call produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn: Arc<Turn>,
    /// The turn is the turn-0 snapshot of a freshly started round.
    pub round_started: bool,
    pub round_ended: Option<RoundResults>,
    pub game_ended: Option<GameResults>,
}

#[derive(Debug)]
pub struct ModelUpdater {
    setup: GameSetup,
    participant_ids: Vec<BotId>,
    rng: ChaCha8Rng,
    phase: EnginePhase,
    game: GameState,

    round_number: u32,
    turn_number: u32,
    bots: Vec<SimBot>,
    bullets: Vec<BulletState>,
    next_bullet_id: BulletId,
    scores: ScoreTracker,
    game_scores: AccumulatedScores,
    inactivity_turns: u32,
    previous_wall_hits: BTreeSet<BotId>,
}

impl ModelUpdater {
    pub fn new(setup: GameSetup, participant_ids: Vec<BotId>) -> Result<Self, SetupError> {
        setup.check_capacity(participant_ids.len())?;
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(setup.seed),
            game: GameState::new(setup.arena),
            setup,
            participant_ids,
            phase: EnginePhase::AwaitingRound,
            round_number: 0,
            turn_number: 0,
            bots: Vec::new(),
            bullets: Vec::new(),
            next_bullet_id: 1,
            scores: ScoreTracker::default(),
            game_scores: AccumulatedScores::default(),
            inactivity_turns: 0,
            previous_wall_hits: BTreeSet::new(),
        })
    }

    pub fn setup(&self) -> &GameSetup {
        &self.setup
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn participant_ids(&self) -> &[BotId] {
        &self.participant_ids
    }

    /// Bots still alive in the current round.
    pub fn active_bot_ids(&self) -> Vec<BotId> {
        self.bots
            .iter()
            .filter(|b| b.is_alive())
            .map(SimBot::id)
            .collect()
    }

    pub fn is_active(&self, bot_id: BotId) -> bool {
        self.bots.iter().any(|b| b.id() == bot_id && b.is_alive())
    }

    /// Read-only history of every round and turn so far.
    pub fn current_state(&self) -> GameState {
        self.game.clone()
    }

    /// (Re)starts a round with the given participants and returns its turn-0 snapshot.
    pub fn start_round(&mut self, participant_ids: &[BotId]) -> Result<Arc<Turn>, UpdateError> {
        if self.phase == EnginePhase::GameEnded {
            return Err(UpdateError::GameEnded);
        }
        self.setup.check_capacity(participant_ids.len())?;
        self.participant_ids = participant_ids.to_vec();
        Ok(self.begin_round())
    }

    /// Merges a partial intent into the bot's stored intent. Unknown or dead bots are ignored.
    pub fn submit_intent(&mut self, bot_id: BotId, mut update: BotIntent) {
        let Some(bot) = self
            .bots
            .iter_mut()
            .find(|b| b.id() == bot_id && b.is_alive())
        else {
            return;
        };
        bot.plan.absorb(&mut update);
        bot.intent.merge(update);
    }

    /// Replaces the bot's intent with the zeroed one and drops any motion plan.
    pub fn zero_intent(&mut self, bot_id: BotId) {
        if let Some(bot) = self.bots.iter_mut().find(|b| b.id() == bot_id) {
            bot.intent.zero_motion();
            bot.plan = MotionPlan::default();
        }
    }

    /// Submits all `intents`, then advances one turn.
    ///
    /// Between rounds the next round is started first so the intents land on
    /// its fresh bots and drive its first tick.
    pub fn update(
        &mut self,
        intents: impl IntoIterator<Item = (BotId, BotIntent)>,
    ) -> Result<TurnOutcome, UpdateError> {
        if self.phase == EnginePhase::InRound {
            for (bot_id, intent) in intents {
                self.submit_intent(bot_id, intent);
            }
            return self.advance_turn();
        }
        let outcome = self.advance_turn()?;
        for (bot_id, intent) in intents {
            self.submit_intent(bot_id, intent);
        }
        Ok(outcome)
    }

    /// Runs one step of the state machine. Never blocks.
    ///
    /// Outside a round this starts the next one and returns its turn-0 snapshot.
    pub fn advance_turn(&mut self) -> Result<TurnOutcome, UpdateError> {
        match self.phase {
            EnginePhase::GameEnded => Err(UpdateError::GameEnded),
            EnginePhase::AwaitingRound | EnginePhase::RoundEnded => {
                self.setup.check_capacity(self.participant_ids.len())?;
                let turn = self.begin_round();
                Ok(TurnOutcome {
                    turn,
                    round_started: true,
                    round_ended: None,
                    game_ended: None,
                })
            }
            EnginePhase::InRound => Ok(self.tick()),
        }
    }

    fn begin_round(&mut self) -> Arc<Turn> {
        if let Some(round) = self.game.rounds.last_mut() {
            round.ended = true;
        }

        self.round_number += 1;
        self.turn_number = 0;
        self.bullets.clear();
        self.next_bullet_id = 1;
        self.inactivity_turns = 0;
        self.previous_wall_hits.clear();
        self.scores = ScoreTracker::new(self.participant_ids.iter().copied());

        let positions = self.place_bots(self.participant_ids.len());
        let mut bots = Vec::with_capacity(positions.len());
        for (id, position) in self.participant_ids.iter().zip(positions) {
            let direction = self.rng.gen_range(0.0..360.0);
            bots.push(SimBot::new(
                *id,
                position,
                direction,
                START_ENERGY,
                START_GUN_HEAT,
            ));
        }
        self.bots = bots;

        let turn = Arc::new(self.snapshot(TurnEvents::default()));
        self.game.rounds.push(Round {
            round_number: self.round_number,
            turns: vec![turn.clone()],
            ended: false,
        });
        self.phase = EnginePhase::InRound;

        tracing::debug!(
            round_number = self.round_number,
            bots = self.bots.len(),
            "round started"
        );
        turn
    }

    /// Distinct random grid cells; bots sit at the cell centres.
    fn place_bots(&mut self, count: usize) -> Vec<Point> {
        let (columns, rows) = self.setup.grid();
        rand::seq::index::sample(&mut self.rng, columns * rows, count)
            .into_iter()
            .map(|cell| {
                let column = (cell % columns) as f64;
                let row = (cell / columns) as f64;
                Point::new(
                    (column + 0.5) * PLACEMENT_CELL_SIZE,
                    (row + 0.5) * PLACEMENT_CELL_SIZE,
                )
            })
            .collect()
    }

    fn tick(&mut self) -> TurnOutcome {
        self.turn_number += 1;
        let arena = self.setup.arena;
        let mut events = TurnEvents::default();

        for bot in self.bots.iter_mut().filter(|b| b.is_alive()) {
            if bot.is_disabled() {
                bot.intent.zero_motion();
                bot.plan = MotionPlan::default();
            }
            bot.plan.steer(bot.state.speed, &mut bot.intent);
            bot.previous_position = bot.state.position();
            let rotation = physics::step(&mut bot.state, &bot.intent);
            bot.plan
                .settle(&mut bot.intent, bot.state.speed, &rotation);
        }

        self.previous_wall_hits = handle_bot_wall_collisions(
            &mut self.bots,
            arena,
            &self.previous_wall_hits,
            &mut events,
        );
        handle_bot_collisions(&mut self.bots, arena, &mut self.scores, &mut events);

        advance_bullets(&mut self.bullets);
        handle_bullet_wall_collisions(&mut self.bullets, arena, &mut events);
        handle_bullet_collisions(&mut self.bullets, &mut events);
        let bullet_hit =
            handle_bullet_hits(&mut self.bullets, &mut self.bots, &mut self.scores, &mut events);

        if bullet_hit {
            self.inactivity_turns = 0;
        } else {
            self.inactivity_turns += 1;
        }
        if self.inactivity_turns > self.setup.max_inactivity_turns {
            for bot in self.bots.iter_mut().filter(|b| b.is_alive()) {
                bot.take_damage(INACTIVITY_ZAP);
            }
        }

        let mut newly_dead = Vec::new();
        for bot in self.bots.iter_mut() {
            if bot.dead && !bot.death_announced {
                bot.death_announced = true;
                newly_dead.push(bot.id());
                events.emit_public(Event::BotDeath {
                    victim_id: bot.id(),
                });
            }
        }
        self.scores.register_deaths(&newly_dead);

        handle_fire(
            &mut self.bots,
            self.setup.gun_cooling_rate,
            &mut self.next_bullet_id,
            &mut self.bullets,
            &mut events,
        );
        handle_scans(&self.bots, &mut events);

        let turn = Arc::new(self.snapshot(events));
        if let Some(round) = self.game.rounds.last_mut() {
            round.turns.push(turn.clone());
        }
        self.bots.retain(SimBot::is_alive);

        let mut outcome = TurnOutcome {
            turn,
            round_started: false,
            round_ended: None,
            game_ended: None,
        };
        if self.bots.len() <= 1 {
            self.end_round(&mut outcome);
        }
        outcome
    }

    fn end_round(&mut self, outcome: &mut TurnOutcome) {
        if let Some(round) = self.game.rounds.last_mut() {
            round.ended = true;
        }

        let results = self.scores.rankings();
        self.game_scores.add_round(&results);
        outcome.round_ended = Some(RoundResults {
            round_number: self.round_number,
            turn_number: self.turn_number,
            results,
        });
        tracing::debug!(
            round_number = self.round_number,
            turn_number = self.turn_number,
            "round ended"
        );

        if self.round_number >= self.setup.number_of_rounds {
            self.phase = EnginePhase::GameEnded;
            self.game.ended = true;
            outcome.game_ended = Some(GameResults {
                number_of_rounds: self.round_number,
                results: self.game_scores.rankings(),
            });
            tracing::info!(rounds = self.round_number, "game ended");
        } else {
            self.phase = EnginePhase::RoundEnded;
        }
    }

    fn snapshot(&self, events: TurnEvents) -> Turn {
        Turn {
            round_number: self.round_number,
            turn_number: self.turn_number,
            bots: self.bots.iter().map(SimBot::snapshot).collect(),
            bullets: self.bullets.clone(),
            events,
        }
    }

    #[cfg(test)]
    fn bot_mut(&mut self, bot_id: BotId) -> Option<&mut SimBot> {
        self.bots.iter_mut().find(|b| b.id() == bot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::Arena;

    fn updater(setup: GameSetup, ids: &[BotId]) -> ModelUpdater {
        ModelUpdater::new(setup, ids.to_vec()).expect("arena fits participants")
    }

    fn place(engine: &mut ModelUpdater, bot_id: BotId, x: f64, y: f64, direction: f64) {
        let bot = engine.bot_mut(bot_id).expect("bot is in the round");
        bot.state.set_position(Point::new(x, y));
        bot.previous_position = Point::new(x, y);
        bot.state.direction = direction;
        bot.state.gun_direction = direction;
        bot.state.radar_direction = direction;
    }

    #[test]
    fn when_bot_drives_and_fires_from_a_cold_gun_then_heat_bullet_and_speed_follow_the_rules() {
        let mut engine = updater(GameSetup::default(), &[1, 2]);
        let start = engine.advance_turn().expect("round starts");
        assert!(start.round_started);
        assert_eq!(start.turn.turn_number, 0);

        place(&mut engine, 1, 100.0, 100.0, 0.0);
        place(&mut engine, 2, 700.0, 500.0, 180.0);
        if let Some(bot) = engine.bot_mut(1) {
            bot.state.gun_heat = 0.0;
        }

        let outcome = engine
            .update([(
                1,
                BotIntent {
                    target_speed: Some(8.0),
                    firepower: Some(2.0),
                    ..BotIntent::default()
                },
            )])
            .expect("turn advances");

        let bot = outcome.turn.bot(1).expect("bot 1 in snapshot");
        assert!((bot.gun_heat - 1.4).abs() < 1e-12);
        assert_eq!(bot.speed, 1.0);
        assert!(outcome.turn.bullets.iter().any(|b| b.owner_id == 1));
        assert_eq!(outcome.turn.turn_number, 1);
    }

    #[test]
    fn when_only_one_bot_is_left_then_round_ends_and_last_game_round_ends_the_game() {
        let setup = GameSetup {
            number_of_rounds: 1,
            ..GameSetup::default()
        };
        let mut engine = updater(setup, &[1, 2]);
        engine.advance_turn().expect("round starts");
        place(&mut engine, 1, 100.0, 100.0, 0.0);
        place(&mut engine, 2, 138.0, 100.0, 90.0);
        if let Some(bot) = engine.bot_mut(1) {
            bot.state.gun_heat = 0.0;
        }
        if let Some(bot) = engine.bot_mut(2) {
            bot.state.energy = 1.0;
        }

        let fired = engine
            .update([(
                1,
                BotIntent {
                    firepower: Some(3.0),
                    ..BotIntent::default()
                },
            )])
            .expect("turn advances");
        assert!(fired.round_ended.is_none());

        let hit = engine.advance_turn().expect("turn advances");
        assert!(
            hit.turn
                .events
                .for_bot(1)
                .contains(&Event::BotDeath { victim_id: 2 })
        );
        let round = hit.round_ended.expect("round ended");
        assert_eq!(round.results[0].score.bot_id, 1);
        assert_eq!(round.results[0].rank, 1);
        let game = hit.game_ended.expect("game ended");
        assert_eq!(game.number_of_rounds, 1);

        assert_eq!(engine.phase(), EnginePhase::GameEnded);
        assert_eq!(engine.advance_turn().err(), Some(UpdateError::GameEnded));
    }

    #[test]
    fn when_ten_rounds_are_configured_then_game_ends_exactly_after_round_ten() {
        let mut engine = updater(GameSetup::default(), &[1]);

        for round_number in 1..=10 {
            let start = engine.advance_turn().expect("round starts");
            assert!(start.round_started);
            assert_eq!(start.turn.round_number, round_number);

            let end = engine.advance_turn().expect("round ends");
            assert_eq!(
                end.round_ended.as_ref().map(|r| r.round_number),
                Some(round_number)
            );
            assert_eq!(end.game_ended.is_some(), round_number == 10);
        }

        let state = engine.current_state();
        assert!(state.ended);
        assert_eq!(state.rounds.len(), 10);
        assert!(state.rounds.iter().all(|r| r.ended));
    }

    #[test]
    fn when_inactivity_limit_is_passed_then_a_disabled_bot_dies_from_the_zap() {
        let setup = GameSetup {
            max_inactivity_turns: 0,
            ..GameSetup::default()
        };
        let mut engine = updater(setup, &[1, 2]);
        engine.advance_turn().expect("round starts");
        if let Some(bot) = engine.bot_mut(2) {
            bot.state.energy = 0.0;
        }

        let outcome = engine.advance_turn().expect("turn advances");

        let bot1 = outcome.turn.bot(1).expect("bot 1 in snapshot");
        assert!((bot1.energy - (START_ENERGY - INACTIVITY_ZAP)).abs() < 1e-12);
        assert!(
            outcome
                .turn
                .events
                .observer()
                .contains(&Event::BotDeath { victim_id: 2 })
        );
        assert!(outcome.round_ended.is_some());
        assert_eq!(engine.active_bot_ids(), vec![1]);
    }

    #[test]
    fn when_bot_is_disabled_then_its_intent_is_ignored() {
        let mut engine = updater(GameSetup::default(), &[1, 2]);
        engine.advance_turn().expect("round starts");
        place(&mut engine, 1, 100.0, 100.0, 0.0);
        place(&mut engine, 2, 700.0, 500.0, 0.0);
        if let Some(bot) = engine.bot_mut(1) {
            bot.state.energy = 0.0;
        }

        let outcome = engine
            .update([(
                1,
                BotIntent {
                    target_speed: Some(8.0),
                    turn_rate: Some(10.0),
                    ..BotIntent::default()
                },
            )])
            .expect("turn advances");

        let bot = outcome.turn.bot(1).expect("bot 1 in snapshot");
        assert!(bot.is_disabled);
        assert_eq!(bot.speed, 0.0);
        assert_eq!(bot.direction, 0.0);
    }

    #[test]
    fn when_seed_and_intents_match_then_games_replay_identically() {
        let run = || {
            let mut engine = updater(GameSetup::default(), &[1, 2, 3]);
            for turn in 0..40 {
                let intents = [1, 2, 3].map(|id| {
                    (
                        id,
                        BotIntent {
                            target_speed: Some(8.0),
                            turn_rate: Some(f64::from(id) * 2.0),
                            gun_turn_rate: Some(5.0),
                            firepower: Some(if turn % 5 == 0 { 1.0 } else { 0.0 }),
                            ..BotIntent::default()
                        },
                    )
                });
                if engine.update(intents).is_err() {
                    break;
                }
            }
            engine.current_state()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn when_round_starts_then_bots_sit_in_distinct_cells_inside_the_arena() {
        let mut engine = updater(GameSetup::default(), &[1, 2, 3, 4, 5, 6]);
        let start = engine.advance_turn().expect("round starts");
        let arena = engine.setup().arena;

        for (i, a) in start.turn.bots.iter().enumerate() {
            assert!(arena.contains_bot(a.position()));
            assert_eq!(a.energy, START_ENERGY);
            assert_eq!(a.gun_heat, START_GUN_HEAT);
            for b in &start.turn.bots[i + 1..] {
                assert!(a.position().distance_to(b.position()) >= PLACEMENT_CELL_SIZE);
            }
        }
        assert!(start.turn.bullets.is_empty());
        assert!(start.turn.events.is_empty());
    }

    #[test]
    fn when_arena_cannot_hold_everyone_then_setup_fails() {
        let setup = GameSetup {
            arena: Arena {
                width: 60.0,
                height: 60.0,
            },
            ..GameSetup::default()
        };
        assert!(matches!(
            ModelUpdater::new(setup, vec![1, 2]),
            Err(SetupError::ArenaTooSmall { .. })
        ));
    }

    #[test]
    fn when_move_by_is_submitted_then_the_plan_drives_the_bot() {
        let mut engine = updater(GameSetup::default(), &[1, 2]);
        engine.advance_turn().expect("round starts");
        place(&mut engine, 1, 100.0, 100.0, 0.0);
        place(&mut engine, 2, 700.0, 500.0, 0.0);

        engine.submit_intent(
            1,
            BotIntent {
                move_by: Some(100.0),
                ..BotIntent::default()
            },
        );
        let mut last = None;
        for _ in 0..30 {
            last = Some(engine.advance_turn().expect("turn advances"));
        }

        let turn = last.expect("ran turns").turn;
        let bot = turn.bot(1).expect("bot 1 in snapshot");
        assert!((bot.x - 200.0).abs() < 1e-6, "x = {}", bot.x);
        assert_eq!(bot.speed, 0.0);
    }

    #[test]
    fn when_round_is_started_explicitly_then_turn_zero_snapshot_is_returned() {
        let mut engine = updater(GameSetup::default(), &[1, 2]);

        let turn = engine.start_round(&[1, 2]).expect("round starts");

        assert_eq!(turn.round_number, 1);
        assert_eq!(turn.turn_number, 0);
        assert_eq!(turn.bots.len(), 2);
        assert_eq!(engine.phase(), EnginePhase::InRound);
        assert_eq!(engine.active_bot_ids(), vec![1, 2]);
    }

    #[test]
    fn when_round_is_restarted_mid_round_then_the_running_round_is_closed() {
        let mut engine = updater(GameSetup::default(), &[1, 2]);
        engine.advance_turn().expect("round starts");
        engine.advance_turn().expect("turn advances");

        let turn = engine.start_round(&[1]).expect("round restarts");

        assert_eq!(turn.round_number, 2);
        assert_eq!(turn.turn_number, 0);
        assert_eq!(engine.participant_ids(), &[1]);
        let state = engine.current_state();
        assert_eq!(state.rounds.len(), 2);
        assert!(state.rounds[0].ended);
        assert_eq!(state.rounds[0].turns.len(), 2);
        assert!(!state.rounds[1].ended);
    }

    #[test]
    fn when_round_is_started_with_too_many_bots_then_arena_too_small_is_returned() {
        let setup = GameSetup {
            arena: Arena {
                width: 100.0,
                height: 100.0,
            },
            ..GameSetup::default()
        };
        let mut engine = updater(setup, &[1, 2]);

        let result = engine.start_round(&[1, 2, 3, 4, 5]);

        assert_eq!(
            result.map(|turn| turn.turn_number),
            Err(UpdateError::Setup(SetupError::ArenaTooSmall {
                width: 100.0,
                height: 100.0,
                participants: 5,
            }))
        );
        assert_eq!(engine.phase(), EnginePhase::AwaitingRound);
        assert_eq!(engine.round_number(), 0);
        assert_eq!(engine.participant_ids(), &[1, 2]);
    }

    #[test]
    fn when_game_has_ended_then_starting_a_round_fails() {
        let setup = GameSetup {
            number_of_rounds: 1,
            ..GameSetup::default()
        };
        let mut engine = updater(setup, &[1]);
        engine.advance_turn().expect("round starts");
        let end = engine.advance_turn().expect("round ends");
        assert!(end.game_ended.is_some());

        assert_eq!(
            engine.start_round(&[1]).map(|turn| turn.turn_number),
            Err(UpdateError::GameEnded)
        );
    }

    #[test]
    fn when_intents_arrive_between_rounds_then_they_drive_the_next_round() {
        let mut engine = updater(GameSetup::default(), &[1, 2]);

        let start = engine
            .update([(
                1,
                BotIntent {
                    target_speed: Some(8.0),
                    ..BotIntent::default()
                },
            )])
            .expect("round starts");
        assert!(start.round_started);

        let outcome = engine.advance_turn().expect("turn advances");
        let bot = outcome.turn.bot(1).expect("bot 1 in snapshot");
        assert_eq!(bot.speed, 1.0);
    }
}
