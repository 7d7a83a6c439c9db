// Per-tick kinematics for a single bot, plus the continuous-motion planner.

use super::intent::BotIntent;
use super::math::{is_near_zero, normalize_absolute_angle};
use super::rules::{
    ACCELERATION, DECELERATION, MAX_BACKWARD_SPEED, MAX_FORWARD_SPEED, MAX_GUN_TURN_RATE,
    MAX_RADAR_TURN_RATE, MAX_SPEED, calc_max_turn_rate,
};
use super::state::BotState;

const ABS_DECELERATION: f64 = -DECELERATION;

/// Rotations applied during one tick, in degrees.
///
/// `*_own` is what the bot asked for after clamping; `*_net` adds the rotation
/// inherited from the part it is mounted on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotation {
    pub body: f64,
    pub gun_own: f64,
    pub gun_net: f64,
    pub radar_own: f64,
    pub radar_net: f64,
}

/// Speed reached after one tick when steering from `speed` towards `target_speed`.
pub fn calc_new_speed(speed: f64, target_speed: f64) -> f64 {
    let target = target_speed.clamp(MAX_BACKWARD_SPEED, MAX_FORWARD_SPEED);
    let delta = target - speed;

    let new_speed = if speed >= 0.0 {
        if delta >= 0.0 {
            speed + delta.min(ACCELERATION)
        } else {
            speed + delta.max(-max_deceleration(speed))
        }
    } else if delta < 0.0 {
        speed + delta.max(-ACCELERATION)
    } else {
        speed + delta.min(max_deceleration(-speed))
    };

    new_speed.clamp(MAX_BACKWARD_SPEED, MAX_FORWARD_SPEED)
}

/// Largest speed reduction available this tick for a non-negative `speed`.
///
/// Below the full deceleration step the bot crosses zero mid-tick and spends the rest
/// of the tick accelerating the other way.
fn max_deceleration(speed: f64) -> f64 {
    let decel_time = speed / ABS_DECELERATION;
    let accel_time = 1.0 - decel_time;
    decel_time.min(1.0) * ABS_DECELERATION + accel_time.max(0.0) * ACCELERATION
}

/// Turns the bot, gun and radar and records the radar sweep.
///
/// Rotation is inherited body -> gun -> radar through one accumulator unless the
/// intent decouples a part.
pub fn rotate(bot: &mut BotState, intent: &BotIntent) -> Rotation {
    let max_body = calc_max_turn_rate(bot.speed);
    let body = intent.turn_rate.unwrap_or(0.0).clamp(-max_body, max_body);
    bot.direction = normalize_absolute_angle(bot.direction + body);

    let mut inherited = if intent.adjust_gun_for_body_turn.unwrap_or(false) {
        0.0
    } else {
        body
    };
    let gun_own = intent
        .gun_turn_rate
        .unwrap_or(0.0)
        .clamp(-MAX_GUN_TURN_RATE, MAX_GUN_TURN_RATE);
    let gun_net = gun_own + inherited;
    bot.gun_direction = normalize_absolute_angle(bot.gun_direction + gun_net);

    inherited = if intent.adjust_radar_for_gun_turn.unwrap_or(false) {
        0.0
    } else {
        gun_net
    };
    let radar_own = intent
        .radar_turn_rate
        .unwrap_or(0.0)
        .clamp(-MAX_RADAR_TURN_RATE, MAX_RADAR_TURN_RATE);
    let radar_net = radar_own + inherited;
    bot.radar_direction = normalize_absolute_angle(bot.radar_direction + radar_net);

    bot.turn_rate = body;
    bot.gun_turn_rate = gun_net;
    bot.radar_sweep = radar_net;

    Rotation {
        body,
        gun_own,
        gun_net,
        radar_own,
        radar_net,
    }
}

/// Advances one bot by a tick: rotations first, then speed, then position.
pub fn step(bot: &mut BotState, intent: &BotIntent) -> Rotation {
    let rotation = rotate(bot, intent);
    bot.speed = calc_new_speed(bot.speed, intent.target_speed.unwrap_or(0.0));
    let position = bot.position().translated(bot.direction, bot.speed);
    bot.set_position(position);
    rotation
}

/// Target speed that covers `distance` as fast as possible and still stops on it.
pub fn new_target_speed(speed: f64, distance: f64) -> f64 {
    if distance < 0.0 {
        return -new_target_speed(-speed, -distance);
    }

    let target = if distance.is_infinite() {
        MAX_SPEED
    } else {
        MAX_SPEED.min(max_speed_for_distance(distance))
    };

    if speed >= 0.0 {
        target.clamp(speed - ABS_DECELERATION, speed + ACCELERATION)
    } else {
        target.clamp(speed - ACCELERATION, speed + max_deceleration(-speed))
    }
}

fn max_speed_for_distance(distance: f64) -> f64 {
    let decel_time = ((((4.0 * 2.0 / ABS_DECELERATION) * distance + 1.0).sqrt() - 1.0) / 2.0)
        .ceil()
        .max(1.0);
    if decel_time.is_infinite() {
        return MAX_SPEED;
    }
    let decel_distance = (decel_time / 2.0) * (decel_time - 1.0) * ABS_DECELERATION;
    (decel_time - 1.0) * ABS_DECELERATION + (distance - decel_distance) / decel_time
}

/// Distance still covered after this tick if the bot brakes as hard as it can.
pub fn distance_until_stop(speed: f64) -> f64 {
    let mut speed = speed.abs();
    let mut distance = 0.0;
    while speed > 0.0 {
        speed = new_target_speed(speed, 0.0);
        distance += speed;
    }
    distance
}

/// In-flight continuous motion ("move/turn until the remaining amount is used up").
///
/// Owned by the engine per bot; it survives pauses because the engine is simply not
/// stepped while paused.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionPlan {
    pub distance_remaining: f64,
    pub turn_remaining: f64,
    pub gun_turn_remaining: f64,
    pub radar_turn_remaining: f64,
    driving: bool,
    over_driving: bool,
}

impl MotionPlan {
    /// Moves one-shot motion commands out of `update` into the plan.
    ///
    /// An explicit speed or rate in the same update cancels the matching plan.
    pub fn absorb(&mut self, update: &mut BotIntent) {
        if update.target_speed.is_some() {
            self.distance_remaining = 0.0;
            self.driving = false;
            self.over_driving = false;
        }
        if update.turn_rate.is_some() {
            self.turn_remaining = 0.0;
        }
        if update.gun_turn_rate.is_some() {
            self.gun_turn_remaining = 0.0;
        }
        if update.radar_turn_rate.is_some() {
            self.radar_turn_remaining = 0.0;
        }

        if let Some(distance) = update.move_by.take() {
            self.distance_remaining = distance;
            self.driving = true;
            self.over_driving = false;
            update.target_speed = None;
        }
        if let Some(turn) = update.turn_by.take() {
            self.turn_remaining = turn;
            update.turn_rate = None;
        }
        if let Some(turn) = update.turn_gun_by.take() {
            self.gun_turn_remaining = turn;
            update.gun_turn_rate = None;
        }
        if let Some(turn) = update.turn_radar_by.take() {
            self.radar_turn_remaining = turn;
            update.radar_turn_rate = None;
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.driving
            && self.turn_remaining == 0.0
            && self.gun_turn_remaining == 0.0
            && self.radar_turn_remaining == 0.0
    }

    pub fn is_over_driving(&self) -> bool {
        self.over_driving
    }

    /// Writes the speed and rates the plan wants for this tick into `intent`.
    pub fn steer(&self, speed: f64, intent: &mut BotIntent) {
        if self.driving {
            intent.target_speed = Some(new_target_speed(speed, self.distance_remaining));
        }
        if self.turn_remaining != 0.0 {
            intent.turn_rate = Some(self.turn_remaining);
        }
        if self.gun_turn_remaining != 0.0 {
            intent.gun_turn_rate = Some(self.gun_turn_remaining);
        }
        if self.radar_turn_remaining != 0.0 {
            intent.radar_turn_rate = Some(self.radar_turn_remaining);
        }
    }

    /// Consumes what the tick actually covered. Finished parts zero their intent field
    /// so the bot stops instead of coasting on the last derived value.
    pub fn settle(&mut self, intent: &mut BotIntent, new_speed: f64, rotation: &Rotation) {
        if self.driving {
            self.settle_distance(new_speed);
            if !self.driving {
                intent.target_speed = Some(0.0);
            }
        }

        if self.turn_remaining != 0.0 {
            self.turn_remaining = remaining_after(self.turn_remaining, rotation.body);
            if self.turn_remaining == 0.0 {
                intent.turn_rate = Some(0.0);
            }
        }
        if self.gun_turn_remaining != 0.0 {
            self.gun_turn_remaining = remaining_after(self.gun_turn_remaining, rotation.gun_own);
            if self.gun_turn_remaining == 0.0 {
                intent.gun_turn_rate = Some(0.0);
            }
        }
        if self.radar_turn_remaining != 0.0 {
            self.radar_turn_remaining =
                remaining_after(self.radar_turn_remaining, rotation.radar_own);
            if self.radar_turn_remaining == 0.0 {
                intent.radar_turn_rate = Some(0.0);
            }
        }
    }

    fn settle_distance(&mut self, new_speed: f64) {
        let distance = self.distance_remaining;

        // Over-driving and now stopped: snap instead of reversing back onto the mark.
        if self.over_driving && is_near_zero(new_speed) {
            self.distance_remaining = 0.0;
            self.over_driving = false;
            self.driving = false;
            return;
        }

        if distance * new_speed >= 0.0 {
            self.over_driving = distance_until_stop(new_speed) > distance.abs();
        }

        self.distance_remaining = distance - new_speed;
        if is_near_zero(self.distance_remaining) && is_near_zero(new_speed) {
            self.distance_remaining = 0.0;
            self.over_driving = false;
            self.driving = false;
        }
    }
}

fn remaining_after(remaining: f64, applied: f64) -> f64 {
    let left = remaining - applied;
    if is_near_zero(left) || left.signum() != remaining.signum() {
        0.0
    } else {
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::math::Point;
    use crate::domain::state::SimBot;

    fn speeds() -> impl Iterator<Item = f64> {
        (-16..=16).map(|i| f64::from(i) * 0.5)
    }

    #[test]
    fn when_steering_between_any_speeds_then_step_and_bounds_hold() {
        for current in speeds() {
            for target in (-20..=20).map(|i| f64::from(i) * 0.5) {
                let new_speed = calc_new_speed(current, target);
                let delta = new_speed - current;

                assert!(delta.abs() <= 2.0 + 1e-12, "{current} -> {target}: {new_speed}");
                if new_speed.abs() > current.abs() && new_speed.signum() == current.signum() {
                    assert!(delta.abs() <= 1.0 + 1e-12, "{current} -> {target}: {new_speed}");
                }
                assert!((MAX_BACKWARD_SPEED..=MAX_FORWARD_SPEED).contains(&new_speed));
                // Never overshoots the target.
                if target >= current {
                    assert!(new_speed <= target.min(MAX_FORWARD_SPEED) + 1e-12);
                } else {
                    assert!(new_speed >= target.max(MAX_BACKWARD_SPEED) - 1e-12);
                }
            }
        }
    }

    #[test]
    fn when_accelerating_from_rest_then_speed_grows_by_one() {
        assert_eq!(calc_new_speed(0.0, 8.0), 1.0);
        assert_eq!(calc_new_speed(7.5, 8.0), 8.0);
        assert_eq!(calc_new_speed(0.0, -8.0), -1.0);
    }

    #[test]
    fn when_braking_then_speed_drops_by_two() {
        assert_eq!(calc_new_speed(8.0, 0.0), 6.0);
        assert_eq!(calc_new_speed(-8.0, 0.0), -6.0);
        assert_eq!(calc_new_speed(8.0, -8.0), 6.0);
    }

    #[test]
    fn when_reversing_from_slow_speed_then_zero_is_crossed_within_the_tick() {
        // Half a tick braking from 1 to 0, half a tick accelerating backwards.
        assert_eq!(calc_new_speed(1.0, -8.0), -0.5);
    }

    #[test]
    fn when_turning_at_any_speed_then_body_rate_respects_the_speed_penalty() {
        for speed in speeds() {
            let mut bot = SimBot::new(1, Point::new(100.0, 100.0), 0.0, 100.0, 0.0).state;
            bot.speed = speed;
            let intent = BotIntent {
                turn_rate: Some(90.0),
                ..BotIntent::default()
            };
            let rotation = rotate(&mut bot, &intent);
            let limit = (10.0 - 0.75 * speed.abs()).max(0.0);
            assert!(rotation.body.abs() <= limit + 1e-12);
            assert!((rotation.body - limit).abs() < 1e-12);
        }
    }

    #[test]
    fn when_body_turns_then_gun_and_radar_inherit_the_rotation() {
        let mut bot = SimBot::new(1, Point::new(100.0, 100.0), 0.0, 100.0, 0.0).state;
        let intent = BotIntent {
            turn_rate: Some(10.0),
            gun_turn_rate: Some(5.0),
            radar_turn_rate: Some(-45.0),
            ..BotIntent::default()
        };

        let rotation = rotate(&mut bot, &intent);

        assert_eq!(rotation.gun_net, 15.0);
        assert_eq!(rotation.radar_net, -30.0);
        assert_eq!(bot.direction, 10.0);
        assert_eq!(bot.gun_direction, 15.0);
        assert_eq!(bot.radar_direction, 330.0);
        assert_eq!(bot.radar_sweep, -30.0);
    }

    #[test]
    fn when_parts_are_decoupled_then_only_own_rotation_applies() {
        let mut bot = SimBot::new(1, Point::new(100.0, 100.0), 0.0, 100.0, 0.0).state;
        let intent = BotIntent {
            turn_rate: Some(10.0),
            gun_turn_rate: Some(5.0),
            radar_turn_rate: Some(20.0),
            adjust_gun_for_body_turn: Some(true),
            adjust_radar_for_gun_turn: Some(true),
            ..BotIntent::default()
        };

        let rotation = rotate(&mut bot, &intent);

        assert_eq!(rotation.gun_net, 5.0);
        assert_eq!(rotation.radar_net, 20.0);
    }

    #[test]
    fn when_gun_and_radar_requests_are_excessive_then_they_are_clamped() {
        let mut bot = SimBot::new(1, Point::new(100.0, 100.0), 0.0, 100.0, 0.0).state;
        let intent = BotIntent {
            gun_turn_rate: Some(100.0),
            radar_turn_rate: Some(-100.0),
            adjust_radar_for_gun_turn: Some(true),
            ..BotIntent::default()
        };
        let rotation = rotate(&mut bot, &intent);
        assert_eq!(rotation.gun_own, MAX_GUN_TURN_RATE);
        assert_eq!(rotation.radar_own, -MAX_RADAR_TURN_RATE);
    }

    #[test]
    fn when_stepping_then_bot_moves_along_the_new_heading() {
        let mut bot = SimBot::new(1, Point::new(100.0, 100.0), 90.0, 100.0, 0.0).state;
        bot.speed = 4.0;
        let intent = BotIntent {
            target_speed: Some(8.0),
            ..BotIntent::default()
        };
        step(&mut bot, &intent);
        assert_eq!(bot.speed, 5.0);
        assert!((bot.x - 100.0).abs() < 1e-9);
        assert!((bot.y - 105.0).abs() < 1e-9);
    }

    fn run_plan(plan: &mut MotionPlan, mut speed: f64, ticks: usize) -> (f64, f64, Vec<f64>) {
        let mut intent = BotIntent::zeroed();
        let mut traveled = 0.0;
        let mut history = Vec::new();
        for _ in 0..ticks {
            plan.steer(speed, &mut intent);
            speed = calc_new_speed(speed, intent.target_speed.unwrap_or(0.0));
            traveled += speed;
            history.push(speed);
            plan.settle(&mut intent, speed, &Rotation::default());
        }
        (traveled, speed, history)
    }

    #[test]
    fn when_moving_a_fixed_distance_from_rest_then_bot_stops_on_the_mark() {
        let mut plan = MotionPlan::default();
        let mut update = BotIntent {
            move_by: Some(100.0),
            ..BotIntent::default()
        };
        plan.absorb(&mut update);

        let (traveled, speed, history) = run_plan(&mut plan, 0.0, 60);

        assert!(plan.is_idle());
        assert_eq!(plan.distance_remaining, 0.0);
        assert_eq!(speed, 0.0);
        assert!((traveled - 100.0).abs() < 1.0, "traveled {traveled}");
        assert!(history.iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn when_stopping_distance_exceeds_remaining_then_plan_snaps_to_zero_without_reversing() {
        let mut plan = MotionPlan::default();
        let mut update = BotIntent {
            move_by: Some(3.0),
            ..BotIntent::default()
        };
        plan.absorb(&mut update);

        let (_, speed, history) = run_plan(&mut plan, 8.0, 20);

        assert_eq!(plan.distance_remaining, 0.0);
        assert!(plan.is_idle());
        assert!(!plan.is_over_driving());
        assert_eq!(speed, 0.0);
        assert!(history.iter().all(|s| *s >= 0.0), "{history:?}");
    }

    #[test]
    fn when_explicit_target_speed_arrives_then_distance_plan_is_cancelled() {
        let mut plan = MotionPlan::default();
        plan.absorb(&mut BotIntent {
            move_by: Some(50.0),
            ..BotIntent::default()
        });
        assert!(!plan.is_idle());

        plan.absorb(&mut BotIntent {
            target_speed: Some(2.0),
            ..BotIntent::default()
        });
        assert!(plan.is_idle());
    }

    #[test]
    fn when_turn_plan_runs_then_remaining_turn_is_consumed_by_applied_rate() {
        let mut plan = MotionPlan::default();
        let mut update = BotIntent {
            turn_by: Some(25.0),
            ..BotIntent::default()
        };
        plan.absorb(&mut update);
        assert_eq!(update.turn_by, None);

        let mut bot = SimBot::new(1, Point::new(100.0, 100.0), 0.0, 100.0, 0.0).state;
        let mut intent = BotIntent::zeroed();
        for _ in 0..3 {
            plan.steer(bot.speed, &mut intent);
            let rotation = step(&mut bot, &intent);
            plan.settle(&mut intent, bot.speed, &rotation);
        }

        assert_eq!(plan.turn_remaining, 0.0);
        assert_eq!(intent.turn_rate, Some(0.0));
        assert!((bot.direction - 25.0).abs() < 1e-9);
    }
}
