// Radar scanning over the sector swept during the current turn.

use super::events::{Event, TurnEvents};
use super::math::is_angle_within_arc;
use super::rules::{BOT_RADIUS, RADAR_RADIUS};
use super::state::SimBot;

/// Emits a scan event for every bot whose bounding circle touches a scanner's sector.
pub fn handle_scans(bots: &[SimBot], events: &mut TurnEvents) {
    for scanner in bots.iter().filter(|b| b.is_alive()) {
        let origin = scanner.state.position();
        let (start, extent) = sweep_arc(scanner.state.radar_direction, scanner.state.radar_sweep);

        for target in bots.iter().filter(|b| b.is_alive() && b.id() != scanner.id()) {
            let position = target.state.position();
            let distance = origin.distance_to(position);
            if distance > RADAR_RADIUS + BOT_RADIUS {
                continue;
            }

            // Angular half-width of the target as seen from the scanner.
            let tolerance = (BOT_RADIUS / distance).min(1.0).asin().to_degrees();
            if !is_angle_within_arc(origin.angle_to(position), start, extent, tolerance) {
                continue;
            }

            events.emit(
                &[scanner.id()],
                Event::ScannedBot {
                    scanned_by_bot_id: scanner.id(),
                    scanned_bot_id: target.id(),
                    energy: target.state.energy,
                    x: position.x,
                    y: position.y,
                    direction: target.state.direction,
                    speed: target.state.speed,
                },
            );
        }
    }
}

/// Counter-clockwise arc `(start, extent)` covered by a radar that ended at `direction`
/// after rotating by `sweep`.
fn sweep_arc(direction: f64, sweep: f64) -> (f64, f64) {
    if sweep >= 0.0 {
        (direction - sweep, sweep)
    } else {
        (direction, -sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::math::Point;

    fn scanner(radar_direction: f64, radar_sweep: f64) -> SimBot {
        let mut bot = SimBot::new(1, Point::new(100.0, 100.0), 0.0, 100.0, 0.0);
        bot.state.radar_direction = radar_direction;
        bot.state.radar_sweep = radar_sweep;
        bot
    }

    fn target(x: f64, y: f64) -> SimBot {
        SimBot::new(2, Point::new(x, y), 0.0, 100.0, 0.0)
    }

    fn scanned(bots: &[SimBot]) -> usize {
        let mut events = TurnEvents::default();
        handle_scans(bots, &mut events);
        events
            .for_bot(1)
            .iter()
            .filter(|e| matches!(e, Event::ScannedBot { scanned_bot_id: 2, .. }))
            .count()
    }

    #[test]
    fn when_radar_does_not_move_then_bots_on_the_ray_are_still_scanned() {
        assert_eq!(scanned(&[scanner(0.0, 0.0), target(500.0, 110.0)]), 1);
        assert_eq!(scanned(&[scanner(0.0, 0.0), target(100.0, 500.0)]), 0);
    }

    #[test]
    fn when_radar_sweeps_past_a_bot_then_it_is_scanned() {
        // Radar went from 20° to 70° this turn; the target sits at 45°.
        assert_eq!(scanned(&[scanner(70.0, 50.0), target(300.0, 300.0)]), 1);
        // Same arc swept clockwise, from 70° down to 20°.
        assert_eq!(scanned(&[scanner(20.0, -50.0), target(300.0, 300.0)]), 1);
    }

    #[test]
    fn when_bot_is_behind_the_swept_arc_then_it_is_not_scanned() {
        assert_eq!(scanned(&[scanner(70.0, 50.0), target(50.0, 100.0)]), 0);
    }

    #[test]
    fn when_bot_is_beyond_radar_range_then_it_is_not_scanned() {
        assert_eq!(scanned(&[scanner(0.0, 10.0), target(1400.0, 100.0)]), 0);
    }

    #[test]
    fn when_scanning_then_only_the_scanner_and_observers_see_the_event() {
        let bots = [scanner(0.0, 0.0), target(500.0, 100.0)];
        let mut events = TurnEvents::default();
        handle_scans(&bots, &mut events);
        assert_eq!(events.for_bot(1).len(), 1);
        assert!(events.for_bot(2).is_empty());
        assert_eq!(events.observer().len(), 1);
    }
}
