// Single-shot, restartable timers reporting back to the game task.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Ready,
    Turn,
}

/// Delivered when a timer expires. Only the latest generation of a timer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug)]
pub struct ResettableTimer {
    kind: TimerKind,
    generation: u64,
    armed: bool,
    handle: Option<JoinHandle<()>>,
    fired_tx: mpsc::Sender<TimerFired>,
}

impl ResettableTimer {
    pub fn new(kind: TimerKind, fired_tx: mpsc::Sender<TimerFired>) -> Self {
        Self {
            kind,
            generation: 0,
            armed: false,
            handle: None,
            fired_tx,
        }
    }

    /// (Re)arms the timer; any earlier firing becomes stale.
    pub fn start(&mut self, after: Duration) {
        self.cancel();
        self.armed = true;

        let fired = TimerFired {
            kind: self.kind,
            generation: self.generation,
        };
        let fired_tx = self.fired_tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The game task may be gone during shutdown.
            let _ = fired_tx.send(fired).await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Consumes `fired` if it belongs to the current arming of this timer.
    ///
    /// Stale or repeated firings return false, so a completion racing an expiry
    /// is handled once.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        if !self.armed || fired.kind != self.kind || fired.generation != self.generation {
            return false;
        }
        self.armed = false;
        self.handle = None;
        true
    }
}

impl Drop for ResettableTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
