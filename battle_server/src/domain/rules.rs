// Fixed game rules shared by every subsystem of the simulation.
// Keep this separate from runtime/server configuration (timeouts, ports, channel sizes).

/// Bounding circle radius of a bot in arena units.
pub const BOT_RADIUS: f64 = 18.0;
pub const BOT_DIAMETER: f64 = BOT_RADIUS * 2.0;

pub const MAX_FORWARD_SPEED: f64 = 8.0;
pub const MAX_BACKWARD_SPEED: f64 = -8.0;
pub const MAX_SPEED: f64 = MAX_FORWARD_SPEED;

/// Speed gained per tick while the speed magnitude grows.
pub const ACCELERATION: f64 = 1.0;
/// Speed change per tick while the speed magnitude shrinks.
pub const DECELERATION: f64 = -2.0;

/// Degrees per tick, before the speed penalty is applied.
pub const MAX_TURN_RATE: f64 = 10.0;
pub const TURN_RATE_SPEED_PENALTY: f64 = 0.75;
pub const MAX_GUN_TURN_RATE: f64 = 20.0;
pub const MAX_RADAR_TURN_RATE: f64 = 45.0;

pub const MIN_FIREPOWER: f64 = 0.1;
pub const MAX_FIREPOWER: f64 = 3.0;

pub const RAM_DAMAGE: f64 = 0.6;
pub const INACTIVITY_ZAP: f64 = 0.1;
pub const RADAR_RADIUS: f64 = 1200.0;

pub const START_ENERGY: f64 = 100.0;
pub const START_GUN_HEAT: f64 = 3.0;

/// Side length of a placement grid cell used when seeding bot positions.
pub const PLACEMENT_CELL_SIZE: f64 = 50.0;

// Score weights.
pub const SCORE_PER_SURVIVAL: f64 = 50.0;
pub const BONUS_PER_LAST_SURVIVOR: f64 = 10.0;
pub const SCORE_PER_BULLET_DAMAGE: f64 = 1.0;
pub const BONUS_PER_BULLET_KILL: f64 = 0.2;
pub const SCORE_PER_RAM_DAMAGE: f64 = 2.0;
pub const BONUS_PER_RAM_KILL: f64 = 0.3;

pub const MAX_BULLET_SPEED: f64 = 20.0 - 3.0 * MIN_FIREPOWER;

pub fn calc_bullet_speed(firepower: f64) -> f64 {
    20.0 - 3.0 * firepower
}

pub fn calc_bullet_damage(firepower: f64) -> f64 {
    let mut damage = 4.0 * firepower;
    if firepower > 1.0 {
        damage += 2.0 * (firepower - 1.0);
    }
    damage
}

/// Energy returned to the firer when its bullet hits a bot.
pub fn calc_bullet_hit_bonus(firepower: f64) -> f64 {
    3.0 * firepower
}

pub fn calc_gun_heat(firepower: f64) -> f64 {
    1.0 + firepower / 5.0
}

pub fn calc_wall_damage(speed: f64) -> f64 {
    (speed.abs() / 2.0 - 1.0).max(0.0)
}

/// Body turn rate limit for the given speed; faster bots turn slower.
pub fn calc_max_turn_rate(speed: f64) -> f64 {
    (MAX_TURN_RATE - TURN_RATE_SPEED_PENALTY * speed.abs()).max(0.0)
}
