// Collision passes run once per turn after movement, in the order the updater calls them.

use super::events::{Event, TurnEvents};
use super::math::{
    Point, normalize_absolute_angle, normalize_relative_angle, segment_intersects_circle,
    segments_intersect,
};
use super::rules::{
    BOT_DIAMETER, BOT_RADIUS, MAX_BULLET_SPEED, RAM_DAMAGE, calc_bullet_damage,
    calc_bullet_hit_bonus, calc_wall_damage,
};
use super::score::ScoreTracker;
use super::state::{Arena, BotId, BulletState, SimBot};
use std::collections::BTreeSet;

/// Pulls bots that left the arena back onto the boundary along their travel path.
///
/// Returns the ids that received a wall-hit event this turn. A bot listed in
/// `previous_wall_hits` is still clamped and stopped but takes no damage and gets no
/// event.
pub fn handle_bot_wall_collisions(
    bots: &mut [SimBot],
    arena: Arena,
    previous_wall_hits: &BTreeSet<BotId>,
    events: &mut TurnEvents,
) -> BTreeSet<BotId> {
    let mut hits = BTreeSet::new();

    for bot in bots.iter_mut().filter(|b| b.is_alive()) {
        let position = bot.state.position();
        if arena.contains_bot(position) {
            continue;
        }

        bot.state
            .set_position(pull_back_inside(bot.previous_position, position, arena));
        let speed = bot.state.speed;
        bot.state.speed = 0.0;

        let bot_id = bot.id();
        if previous_wall_hits.contains(&bot_id) {
            continue;
        }
        bot.take_damage(calc_wall_damage(speed));
        events.emit(&[bot_id], Event::BotHitWall { victim_id: bot_id });
        hits.insert(bot_id);
    }

    hits
}

/// Walks back along `from -> to` to the last point where the bot fits, then clamps.
fn pull_back_inside(from: Point, to: Point, arena: Arena) -> Point {
    let moved_x = to.x - from.x;
    let moved_y = to.y - from.y;
    let mut t: f64 = 1.0;

    let min_x = BOT_RADIUS;
    let max_x = arena.width - BOT_RADIUS;
    let min_y = BOT_RADIUS;
    let max_y = arena.height - BOT_RADIUS;

    if moved_x != 0.0 {
        if to.x < min_x {
            t = t.min((min_x - from.x) / moved_x);
        } else if to.x > max_x {
            t = t.min((max_x - from.x) / moved_x);
        }
    }
    if moved_y != 0.0 {
        if to.y < min_y {
            t = t.min((min_y - from.y) / moved_y);
        } else if to.y > max_y {
            t = t.min((max_y - from.y) / moved_y);
        }
    }
    let t = t.clamp(0.0, 1.0);

    clamp_to_arena(
        Point::new(from.x + moved_x * t, from.y + moved_y * t),
        arena,
    )
}

fn clamp_to_arena(p: Point, arena: Arena) -> Point {
    Point::new(
        p.x.clamp(BOT_RADIUS, arena.width - BOT_RADIUS),
        p.y.clamp(BOT_RADIUS, arena.height - BOT_RADIUS),
    )
}

/// Heading the bot is actually travelling along.
fn travel_direction(bot: &SimBot) -> f64 {
    if bot.state.speed < 0.0 {
        normalize_absolute_angle(bot.state.direction + 180.0)
    } else {
        bot.state.direction
    }
}

/// A bot rams when it moves and the other bot lies within ±90° of its travel heading.
fn is_ramming(bot: &SimBot, other: Point) -> bool {
    if bot.state.speed == 0.0 {
        return false;
    }
    let bearing = bot.state.position().angle_to(other);
    normalize_relative_angle(bearing - travel_direction(bot)).abs() < 90.0
}

/// Resolves overlapping bots: ram damage, ram credit and bounce.
///
/// Both bots are credited when both satisfy the ramming test.
pub fn handle_bot_collisions(
    bots: &mut [SimBot],
    arena: Arena,
    scores: &mut ScoreTracker,
    events: &mut TurnEvents,
) {
    for i in 0..bots.len() {
        for j in (i + 1)..bots.len() {
            if !bots[i].is_alive() || !bots[j].is_alive() {
                continue;
            }
            let (head, tail) = bots.split_at_mut(j);
            collide_pair(&mut head[i], &mut tail[0], arena, scores, events);
        }
    }
}

fn collide_pair(
    a: &mut SimBot,
    b: &mut SimBot,
    arena: Arena,
    scores: &mut ScoreTracker,
    events: &mut TurnEvents,
) {
    let pa = a.state.position();
    let pb = b.state.position();

    if (pa.x - pb.x).abs() >= BOT_DIAMETER || (pa.y - pb.y).abs() >= BOT_DIAMETER {
        return;
    }
    let distance = pa.distance_to(pb);
    if distance >= BOT_DIAMETER {
        return;
    }
    let overlap = BOT_DIAMETER - distance;

    let a_rams = is_ramming(a, pb);
    let b_rams = is_ramming(b, pa);
    let speed_a = a.state.speed.abs();
    let speed_b = b.state.speed.abs();

    // Bounce headings are taken before speeds are zeroed.
    let a_bounce_dir = bounce_direction(a, a_rams, pb, pa);
    let b_bounce_dir = bounce_direction(b, b_rams, pa, pb);

    let a_killed = a.take_damage(RAM_DAMAGE);
    let b_killed = b.take_damage(RAM_DAMAGE);

    if a_rams {
        scores.register_ram_hit(a.id(), b.id(), RAM_DAMAGE, b_killed);
        a.state.speed = 0.0;
    }
    if b_rams {
        scores.register_ram_hit(b.id(), a.id(), RAM_DAMAGE, a_killed);
        b.state.speed = 0.0;
    }

    events.emit(
        &[a.id()],
        Event::BotHitBot {
            bot_id: a.id(),
            victim_id: b.id(),
            victim_energy: b.state.energy,
            x: pb.x,
            y: pb.y,
            rammed: a_rams,
        },
    );
    events.emit(
        &[b.id()],
        Event::BotHitBot {
            bot_id: b.id(),
            victim_id: a.id(),
            victim_energy: a.state.energy,
            x: pa.x,
            y: pa.y,
            rammed: b_rams,
        },
    );

    // Each bot gives way in proportion to the other bot's speed.
    let total_speed = speed_a + speed_b;
    let (mut a_share, mut b_share) = if total_speed == 0.0 {
        (overlap / 2.0, overlap / 2.0)
    } else {
        (
            overlap * speed_b / total_speed,
            overlap * speed_a / total_speed,
        )
    };

    if !arena.contains_bot(pa.translated(a_bounce_dir, a_share)) {
        b_share += a_share;
        a_share = 0.0;
    } else if !arena.contains_bot(pb.translated(b_bounce_dir, b_share)) {
        a_share += b_share;
        b_share = 0.0;
    }

    a.state
        .set_position(clamp_to_arena(pa.translated(a_bounce_dir, a_share), arena));
    b.state
        .set_position(clamp_to_arena(pb.translated(b_bounce_dir, b_share), arena));
}

/// Rammers back off along their travel path; everybody else is pushed away from
/// the other bot's centre.
fn bounce_direction(bot: &SimBot, rams: bool, other: Point, own: Point) -> f64 {
    if rams {
        return normalize_absolute_angle(travel_direction(bot) + 180.0);
    }
    if own == other {
        normalize_absolute_angle(bot.state.direction + 180.0)
    } else {
        other.angle_to(own)
    }
}

pub fn advance_bullets(bullets: &mut [BulletState]) {
    for bullet in bullets {
        bullet.age += 1;
    }
}

pub fn handle_bullet_wall_collisions(
    bullets: &mut Vec<BulletState>,
    arena: Arena,
    events: &mut TurnEvents,
) {
    bullets.retain(|bullet| {
        if arena.contains_point(bullet.position()) {
            return true;
        }
        events.emit(
            &[bullet.owner_id],
            Event::BulletHitWall {
                bullet: bullet.clone(),
            },
        );
        false
    });
}

/// Removes bullets whose paths cross this turn.
///
/// Each owner is told about the other bullet; observers get a single event per pair.
pub fn handle_bullet_collisions(bullets: &mut Vec<BulletState>, events: &mut TurnEvents) {
    let mut removed = vec![false; bullets.len()];

    for i in 0..bullets.len() {
        if removed[i] {
            continue;
        }
        for j in (i + 1)..bullets.len() {
            if removed[j] {
                continue;
            }
            let (a, b) = (&bullets[i], &bullets[j]);
            let (a_pos, b_pos) = (a.position(), b.position());
            if a_pos.distance_to(b_pos) > 2.0 * MAX_BULLET_SPEED {
                continue;
            }
            if !segments_intersect(a_pos, a.next_position(), b_pos, b.next_position()) {
                continue;
            }

            events.push_private(
                a.owner_id,
                Event::BulletHitBullet {
                    bullet: a.clone(),
                    hit_bullet: b.clone(),
                },
            );
            events.push_private(
                b.owner_id,
                Event::BulletHitBullet {
                    bullet: b.clone(),
                    hit_bullet: a.clone(),
                },
            );
            events.push_observer(Event::BulletHitBullet {
                bullet: a.clone(),
                hit_bullet: b.clone(),
            });

            removed[i] = true;
            removed[j] = true;
            break;
        }
    }

    let mut flags = removed.into_iter();
    bullets.retain(|_| !flags.next().unwrap_or(false));
}

/// Applies bullet hits on bots. Returns true if any bullet hit a bot.
pub fn handle_bullet_hits(
    bullets: &mut Vec<BulletState>,
    bots: &mut [SimBot],
    scores: &mut ScoreTracker,
    events: &mut TurnEvents,
) -> bool {
    let mut any_hit = false;

    bullets.retain(|bullet| {
        let from = bullet.position();
        let to = bullet.next_position();

        let Some(victim_index) = bots.iter().position(|bot| {
            bot.is_alive()
                && bot.id() != bullet.owner_id
                && segment_intersects_circle(from, to, bot.state.position(), BOT_RADIUS)
        }) else {
            return true;
        };

        let damage = calc_bullet_damage(bullet.power);
        let victim = &mut bots[victim_index];
        let killed = victim.take_damage(damage);
        let victim_id = victim.id();
        let victim_energy = victim.state.energy;

        if let Some(owner) = bots.iter_mut().find(|b| b.id() == bullet.owner_id) {
            owner.add_energy(calc_bullet_hit_bonus(bullet.power));
        }
        scores.register_bullet_hit(bullet.owner_id, victim_id, damage, killed);

        events.emit(
            &[bullet.owner_id, victim_id],
            Event::BulletHitBot {
                bullet: bullet.clone(),
                victim_id,
                damage,
                victim_energy,
            },
        );
        any_hit = true;
        false
    });

    any_hit
}
