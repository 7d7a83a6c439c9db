// Shared pending-intent map filled by sessions and drained by the game task.

use crate::domain::{BotId, BotIntent};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Pending {
    turn_number: u32,
    awaited: BTreeSet<BotId>,
    submitted: BTreeSet<BotId>,
    disconnected: BTreeSet<BotId>,
    intents: BTreeMap<BotId, BotIntent>,
}

impl Pending {
    fn is_complete(&self) -> bool {
        !self.awaited.is_empty() && self.awaited.is_subset(&self.submitted)
    }
}

#[derive(Debug, Default)]
struct Inner {
    pending: Mutex<Pending>,
    complete: Notify,
}

/// Collects partial intents for the current turn.
///
/// Cloning is cheap; every clone points at the same map. The game task is woken
/// through [`IntentCollector::completed`] once every awaited bot has submitted.
#[derive(Debug, Clone, Default)]
pub struct IntentCollector {
    inner: Arc<Inner>,
}

impl IntentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        // A panicking writer cannot leave the map half-merged, so keep using it.
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges a partial intent into the bot's pending one (present fields overwrite).
    pub fn submit(&self, bot_id: BotId, intent: BotIntent) {
        let mut pending = self.lock();
        if pending.disconnected.contains(&bot_id) {
            return;
        }
        pending.intents.entry(bot_id).or_default().merge(intent);
        pending.submitted.insert(bot_id);
        if pending.is_complete() {
            self.inner.complete.notify_one();
        }
    }

    /// Opens the window for `turn_number` and waits on the given bots.
    pub fn begin_turn(&self, turn_number: u32, awaited: impl IntoIterator<Item = BotId>) {
        let mut pending = self.lock();
        pending.turn_number = turn_number;
        pending.submitted.clear();
        let disconnected = pending.disconnected.clone();
        pending.awaited = awaited
            .into_iter()
            .filter(|id| !disconnected.contains(id))
            .collect();
    }

    /// Stops waiting on a bot and ignores anything it still sends.
    pub fn disconnect(&self, bot_id: BotId) {
        let mut pending = self.lock();
        pending.disconnected.insert(bot_id);
        pending.awaited.remove(&bot_id);
        pending.intents.remove(&bot_id);
        if pending.is_complete() {
            self.inner.complete.notify_one();
        }
    }

    /// Drains the merged intents to hand them to the engine.
    pub fn take_pending(&self) -> Vec<(BotId, BotIntent)> {
        std::mem::take(&mut self.lock().intents).into_iter().collect()
    }

    /// Awaited bots that have not submitted for the current turn.
    pub fn missing(&self) -> Vec<BotId> {
        let pending = self.lock();
        pending
            .awaited
            .difference(&pending.submitted)
            .copied()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.lock().is_complete()
    }

    pub fn turn_number(&self) -> u32 {
        self.lock().turn_number
    }

    /// Forgets everything, including disconnects; used between games.
    pub fn reset(&self) {
        *self.lock() = Pending::default();
    }

    /// Resolves after a submission completed the current turn. May wake spuriously.
    pub async fn completed(&self) {
        self.inner.complete.notified().await;
    }
}
