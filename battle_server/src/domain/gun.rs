// Gun cooling and firing.

use super::events::{Event, TurnEvents};
use super::rules::{MAX_FIREPOWER, MIN_FIREPOWER, calc_gun_heat};
use super::state::{BulletId, BulletState, SimBot};

/// Gun heat below this is treated as fully cooled.
const COOLED_EPSILON: f64 = 1e-9;

/// Fires every ready gun that was asked to fire and cools the rest.
///
/// Dead and disabled bots are skipped entirely: they neither fire nor cool.
pub fn handle_fire(
    bots: &mut [SimBot],
    gun_cooling_rate: f64,
    next_bullet_id: &mut BulletId,
    bullets: &mut Vec<BulletState>,
    events: &mut TurnEvents,
) {
    for bot in bots.iter_mut() {
        if !bot.is_alive() || bot.is_disabled() {
            continue;
        }

        let requested = bot.intent.firepower.unwrap_or(0.0);
        let power = requested.min(MAX_FIREPOWER).min(bot.state.energy);

        if bot.state.gun_heat <= 0.0 && requested >= MIN_FIREPOWER && power >= MIN_FIREPOWER {
            let bullet = BulletState {
                bullet_id: *next_bullet_id,
                owner_id: bot.id(),
                power,
                origin: bot.state.position(),
                direction: bot.state.gun_direction,
                age: 0,
                color: bot.intent.bullet_color.clone(),
            };
            *next_bullet_id += 1;

            bot.state.gun_heat = calc_gun_heat(power);
            bot.state.energy = (bot.state.energy - power).max(0.0);

            tracing::trace!(bot_id = bot.id(), power, "bullet fired");
            events.emit(
                &[bot.id()],
                Event::BulletFired {
                    bullet: bullet.clone(),
                },
            );
            bullets.push(bullet);
        } else {
            let cooled = bot.state.gun_heat - gun_cooling_rate;
            bot.state.gun_heat = if cooled < COOLED_EPSILON { 0.0 } else { cooled };
        }
    }
}
