use super::collector::IntentCollector;
use super::scheduler::TurnScheduler;
use super::timer::TimerFired;
use super::types::ControlEvent;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

/// Owns the scheduler (and through it the engine) for the lifetime of the server.
///
/// Everything that mutates game state funnels through this loop, so the engine
/// never needs a lock.
pub async fn game_task(
    mut scheduler: TurnScheduler,
    mut control_rx: mpsc::Receiver<ControlEvent>,
    mut timer_rx: mpsc::Receiver<TimerFired>,
    collector: IntentCollector,
    shutdown: Arc<Notify>,
) {
    info!("game task started");
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                break;
            }
            event = control_rx.recv() => {
                let Some(event) = event else {
                    debug!("control channel closed");
                    break;
                };
                scheduler.handle_control(event);
            }
            Some(fired) = timer_rx.recv() => {
                scheduler.on_timer(fired);
            }
            _ = collector.completed() => {
                scheduler.on_intents_complete();
            }
        }
    }
    scheduler.stop_game();
    info!("game task stopped");
}
