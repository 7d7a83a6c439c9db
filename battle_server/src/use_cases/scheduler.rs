// Turn scheduler: ready phase, turn windows, pause/resume and lifecycle notices.

use super::collector::IntentCollector;
use super::timer::{ResettableTimer, TimerFired, TimerKind};
use super::types::{
    ControlEvent, GameMessage, GameSummary, Outbound, Recipient, RoundSummary, SchedulerPhase,
    ServerState,
};
use crate::domain::{BotId, EnginePhase, GameSetup, ModelUpdater, TurnOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Capacity for timer expiry notifications; at most two timers are ever armed.
const TIMER_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub setup: GameSetup,
    /// Start automatically once this many bots are connected (0 waits for the controller).
    pub expected_participants: usize,
}

#[derive(Debug)]
struct Participant {
    name: String,
    connected: bool,
}

/// Single owner of the engine. Driven by the game task; never awaits.
#[derive(Debug)]
pub struct TurnScheduler {
    settings: SchedulerSettings,
    phase: SchedulerPhase,
    lobby: BTreeMap<BotId, Participant>,
    next_bot_id: BotId,
    game_participants: Vec<BotId>,
    ready: BTreeSet<BotId>,
    engine: Option<ModelUpdater>,
    collector: IntentCollector,
    ready_timer: ResettableTimer,
    turn_timer: ResettableTimer,
    outbound_tx: broadcast::Sender<Outbound>,
    state_tx: watch::Sender<ServerState>,
}

impl TurnScheduler {
    pub fn new(
        settings: SchedulerSettings,
        collector: IntentCollector,
        outbound_tx: broadcast::Sender<Outbound>,
        state_tx: watch::Sender<ServerState>,
    ) -> (Self, mpsc::Receiver<TimerFired>) {
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_CHANNEL_CAPACITY);
        let scheduler = Self {
            settings,
            phase: SchedulerPhase::Idle,
            lobby: BTreeMap::new(),
            next_bot_id: 1,
            game_participants: Vec::new(),
            ready: BTreeSet::new(),
            engine: None,
            collector,
            ready_timer: ResettableTimer::new(TimerKind::Ready, timer_tx.clone()),
            turn_timer: ResettableTimer::new(TimerKind::Turn, timer_tx),
            outbound_tx,
            state_tx,
        };
        (scheduler, timer_rx)
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn handle_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Join { name, reply } => {
                let bot_id = self.join(name);
                if reply.send(bot_id).is_err() {
                    // The session died while waiting for its id.
                    self.leave(bot_id);
                }
            }
            ControlEvent::Leave { bot_id } => self.leave(bot_id),
            ControlEvent::Ready { bot_id } => self.ready(bot_id),
            ControlEvent::StartGame => self.start_game(),
            ControlEvent::StopGame => self.stop_game(),
            ControlEvent::PauseGame => self.pause(),
            ControlEvent::ResumeGame => self.resume(),
            ControlEvent::QueryState { reply } => {
                let _ = reply.send(self.summary());
            }
        }
    }

    /// Registers a participant in the lobby and returns its id.
    pub fn join(&mut self, name: String) -> BotId {
        let bot_id = self.next_bot_id;
        self.next_bot_id += 1;
        info!(bot_id, name = %name, "participant joined");
        self.lobby.insert(
            bot_id,
            Participant {
                name,
                connected: true,
            },
        );
        self.publish_state();

        let expected = self.settings.expected_participants;
        if expected > 0
            && matches!(self.phase, SchedulerPhase::Idle | SchedulerPhase::Ended)
            && self.connected_ids().len() >= expected
        {
            self.start_game();
        }
        bot_id
    }

    /// Handles a disconnect. Bots in a running game stay in the simulation with a zeroed
    /// intent until the round ends; everyone else just leaves the lobby.
    pub fn leave(&mut self, bot_id: BotId) {
        let in_game = self.game_participants.contains(&bot_id)
            && matches!(
                self.phase,
                SchedulerPhase::AwaitingReady | SchedulerPhase::Running | SchedulerPhase::Paused
            );

        if !in_game {
            if let Some(participant) = self.lobby.remove(&bot_id) {
                info!(bot_id, name = %participant.name, "participant left");
            }
            self.publish_state();
            return;
        }

        if let Some(participant) = self.lobby.get_mut(&bot_id) {
            participant.connected = false;
        }
        info!(bot_id, "participant disconnected mid-game");
        self.ready.remove(&bot_id);
        self.collector.disconnect(bot_id);
        if let Some(engine) = self.engine.as_mut() {
            engine.zero_intent(bot_id);
        }

        if self.phase == SchedulerPhase::AwaitingReady {
            let connected = self
                .game_participants
                .iter()
                .filter(|id| self.is_connected(**id))
                .count();
            if connected < self.settings.setup.min_participants {
                warn!(
                    connected,
                    min = self.settings.setup.min_participants,
                    "too few participants left before the game started"
                );
                self.abort("not enough participants connected");
                return;
            }
            self.check_all_ready();
        }
        self.publish_state();
    }

    pub fn ready(&mut self, bot_id: BotId) {
        if self.phase != SchedulerPhase::AwaitingReady || !self.game_participants.contains(&bot_id) {
            debug!(bot_id, phase = ?self.phase, "ready signal ignored");
            return;
        }
        self.ready.insert(bot_id);
        debug!(bot_id, ready = self.ready.len(), "participant ready");
        self.check_all_ready();
    }

    fn check_all_ready(&mut self) {
        let connected: Vec<BotId> = self
            .game_participants
            .iter()
            .copied()
            .filter(|id| self.is_connected(*id))
            .collect();
        if connected.len() >= self.settings.setup.min_participants.max(1)
            && connected.iter().all(|id| self.ready.contains(id))
        {
            self.ready_timer.cancel();
            self.begin_game(connected);
        }
    }

    /// Invites every connected lobby member and opens the ready window.
    pub fn start_game(&mut self) {
        if !matches!(self.phase, SchedulerPhase::Idle | SchedulerPhase::Ended) {
            warn!(phase = ?self.phase, "start requested while a game is active");
            return;
        }
        let participants = self.connected_ids();
        if participants.is_empty() {
            warn!("start requested with an empty lobby");
            return;
        }

        self.lobby.retain(|_, p| p.connected);
        self.engine = None;
        self.collector.reset();
        self.ready.clear();
        self.game_participants = participants.clone();
        self.phase = SchedulerPhase::AwaitingReady;

        info!(participants = participants.len(), "game starting; awaiting ready");
        self.publish(
            Recipient::Everyone,
            GameMessage::GameStarted {
                setup: self.settings.setup.clone(),
                participants,
            },
        );
        self.ready_timer
            .start(Duration::from_millis(self.settings.setup.ready_timeout_ms));
        self.publish_state();
    }

    pub fn stop_game(&mut self) {
        match self.phase {
            SchedulerPhase::AwaitingReady | SchedulerPhase::Running | SchedulerPhase::Paused => {
                self.abort("stopped by controller");
            }
            SchedulerPhase::Idle | SchedulerPhase::Ended => {
                debug!(phase = ?self.phase, "stop requested without an active game");
            }
        }
    }

    pub fn pause(&mut self) {
        if self.phase == SchedulerPhase::Running {
            self.phase = SchedulerPhase::Paused;
            info!("game paused");
            self.publish_state();
        }
    }

    pub fn resume(&mut self) {
        if self.phase == SchedulerPhase::Paused {
            self.phase = SchedulerPhase::Running;
            info!("game resumed");
            self.publish_state();
        }
    }

    pub fn on_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Ready => {
                if !self.ready_timer.accept(fired) || self.phase != SchedulerPhase::AwaitingReady {
                    return;
                }
                let ready: Vec<BotId> = self
                    .ready
                    .iter()
                    .copied()
                    .filter(|id| self.is_connected(*id))
                    .collect();
                if ready.len() >= self.settings.setup.min_participants {
                    info!(ready = ready.len(), "ready timeout; starting with ready subset");
                    self.begin_game(ready);
                } else {
                    warn!(
                        ready = ready.len(),
                        min = self.settings.setup.min_participants,
                        "ready timeout with too few participants"
                    );
                    self.abort("not enough participants ready");
                }
            }
            TimerKind::Turn => {
                if !self.turn_timer.accept(fired) {
                    return;
                }
                match self.phase {
                    SchedulerPhase::Paused => self.arm_turn_timer(),
                    SchedulerPhase::Running => {
                        let turn_number = self.collector.turn_number();
                        for bot_id in self.collector.missing() {
                            debug!(bot_id, turn_number, "turn skipped");
                            self.publish(
                                Recipient::Bot(bot_id),
                                GameMessage::SkippedTurn { turn_number },
                            );
                        }
                        self.advance();
                    }
                    _ => {}
                }
            }
        }
    }

    /// Called when the collector reports that every awaited bot has submitted.
    pub fn on_intents_complete(&mut self) {
        if self.phase == SchedulerPhase::Running && self.collector.is_complete() {
            self.turn_timer.cancel();
            self.advance();
        }
    }

    pub fn summary(&self) -> GameSummary {
        let state = self.engine.as_ref().map(ModelUpdater::current_state);
        GameSummary {
            phase: self.phase,
            arena: self.settings.setup.arena,
            participants: if self.game_participants.is_empty() {
                self.connected_ids()
            } else {
                self.game_participants.clone()
            },
            ready: self.ready.iter().copied().collect(),
            rounds: state
                .as_ref()
                .map(|s| {
                    s.rounds
                        .iter()
                        .map(|r| RoundSummary {
                            round_number: r.round_number,
                            turns: r.turns.len(),
                            ended: r.ended,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            game_ended: state.is_some_and(|s| s.ended),
        }
    }

    fn begin_game(&mut self, participant_ids: Vec<BotId>) {
        match ModelUpdater::new(self.settings.setup.clone(), participant_ids.clone()) {
            Ok(engine) => {
                self.engine = Some(engine);
                self.game_participants = participant_ids;
                self.phase = SchedulerPhase::Running;
                info!(participants = self.game_participants.len(), "game running");
                self.advance();
            }
            Err(e) => {
                error!(error = %e, "failed to set up game");
                self.abort(&e.to_string());
            }
        }
    }

    fn advance(&mut self) {
        let pending = self.collector.take_pending();
        let connected: BTreeSet<BotId> = self.connected_ids().into_iter().collect();
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        let result = if engine.phase() == EnginePhase::InRound {
            for (bot_id, intent) in pending {
                engine.submit_intent(bot_id, intent);
            }
            engine.advance_turn()
        } else {
            // Disconnected bots sit out every round after the one they left in.
            let participants: Vec<BotId> = engine
                .participant_ids()
                .iter()
                .copied()
                .filter(|id| connected.contains(id))
                .collect();
            engine.start_round(&participants).map(|turn| {
                for (bot_id, intent) in pending {
                    engine.submit_intent(bot_id, intent);
                }
                TurnOutcome {
                    turn,
                    round_started: true,
                    round_ended: None,
                    game_ended: None,
                }
            })
        };

        match result {
            Ok(outcome) => self.publish_outcome(outcome),
            Err(e) => {
                error!(error = %e, "turn update failed");
                self.abort(&e.to_string());
            }
        }
    }

    fn publish_outcome(&mut self, outcome: TurnOutcome) {
        let turn = outcome.turn;

        // Open the next window before anyone sees this turn, or a fast reply is lost.
        if outcome.game_ended.is_none() {
            let awaited: Vec<BotId> = match self.engine.as_ref() {
                Some(engine) if engine.phase() == EnginePhase::InRound => engine
                    .active_bot_ids()
                    .into_iter()
                    .filter(|id| self.is_connected(*id))
                    .collect(),
                _ => Vec::new(),
            };
            self.collector.begin_turn(turn.turn_number, awaited);
        }

        if outcome.round_started {
            self.publish(
                Recipient::Everyone,
                GameMessage::RoundStarted {
                    round_number: turn.round_number,
                },
            );
        }
        for bot in &turn.bots {
            if let Some(view) = turn.bot_view(bot.id) {
                self.publish(Recipient::Bot(bot.id), GameMessage::BotTurn(view));
            }
        }
        self.publish(
            Recipient::Observers,
            GameMessage::ObserverTurn(turn.observer_view()),
        );

        if let Some(results) = outcome.round_ended {
            info!(round_number = results.round_number, "round ended");
            self.publish(Recipient::Everyone, GameMessage::RoundEnded(results));
        }
        if let Some(results) = outcome.game_ended {
            self.publish(Recipient::Everyone, GameMessage::GameEnded(results));
            self.finish_game();
            return;
        }

        self.arm_turn_timer();
        self.publish_state();
    }

    fn arm_turn_timer(&mut self) {
        self.turn_timer
            .start(Duration::from_millis(self.settings.setup.turn_timeout_ms));
    }

    fn finish_game(&mut self) {
        info!("game ended");
        self.ready_timer.cancel();
        self.turn_timer.cancel();
        self.phase = SchedulerPhase::Ended;
        self.lobby.retain(|_, p| p.connected);
        self.publish_state();
    }

    fn abort(&mut self, reason: &str) {
        warn!(reason, "game aborted");
        self.publish(
            Recipient::Everyone,
            GameMessage::GameAborted {
                reason: reason.to_string(),
            },
        );
        self.ready_timer.cancel();
        self.turn_timer.cancel();
        self.engine = None;
        self.game_participants.clear();
        self.ready.clear();
        self.collector.reset();
        self.phase = SchedulerPhase::Idle;
        self.lobby.retain(|_, p| p.connected);
        self.publish_state();
    }

    fn is_connected(&self, bot_id: BotId) -> bool {
        self.lobby.get(&bot_id).is_some_and(|p| p.connected)
    }

    fn connected_ids(&self) -> Vec<BotId> {
        self.lobby
            .iter()
            .filter(|(_, p)| p.connected)
            .map(|(id, _)| *id)
            .collect()
    }

    fn publish(&self, recipient: Recipient, message: GameMessage) {
        // No subscribers simply means nobody is connected right now.
        let _ = self.outbound_tx.send(Outbound { recipient, message });
    }

    fn publish_state(&self) {
        let (round_number, turn_number) = self
            .engine
            .as_ref()
            .map(|e| (e.round_number(), e.turn_number()))
            .unwrap_or_default();
        self.state_tx.send_replace(ServerState {
            phase: self.phase,
            round_number,
            turn_number,
            participants: self.connected_ids(),
        });
    }
}
