// Domain-level simulation records and immutable turn/round/game snapshots.

use super::events::{Event, TurnEvents};
use super::intent::BotIntent;
use super::math::Point;
use super::physics::MotionPlan;
use super::rules::{BOT_RADIUS, calc_bullet_speed};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::sync::Arc;

pub type BotId = u32;
pub type BulletId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Arena {
    pub width: f64,
    pub height: f64,
}

impl Arena {
    /// True when a bot centred at `p` lies fully inside the arena.
    pub fn contains_bot(&self, p: Point) -> bool {
        p.x >= BOT_RADIUS
            && p.x <= self.width - BOT_RADIUS
            && p.y >= BOT_RADIUS
            && p.y <= self.height - BOT_RADIUS
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BotColors {
    pub body: Option<String>,
    pub turret: Option<String>,
    pub radar: Option<String>,
    pub bullet: Option<String>,
    pub scan: Option<String>,
}

impl BotColors {
    fn apply(&mut self, intent: &BotIntent) {
        self.body.clone_from(&intent.body_color);
        self.turret.clone_from(&intent.turret_color);
        self.radar.clone_from(&intent.radar_color);
        self.bullet.clone_from(&intent.bullet_color);
        self.scan.clone_from(&intent.scan_color);
    }
}

/// Snapshot of one bot at the end of a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotState {
    pub id: BotId,
    pub energy: f64,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub gun_direction: f64,
    pub radar_direction: f64,
    /// Net radar rotation applied this turn; defines the scan sector.
    pub radar_sweep: f64,
    pub speed: f64,
    pub turn_rate: f64,
    pub gun_turn_rate: f64,
    pub gun_heat: f64,
    pub is_disabled: bool,
    pub colors: BotColors,
}

impl BotState {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_position(&mut self, p: Point) {
        self.x = p.x;
        self.y = p.y;
    }
}

/// Bullet in flight. Position is derived from origin, direction, power and age.
#[derive(Debug, Clone, PartialEq)]
pub struct BulletState {
    pub bullet_id: BulletId,
    pub owner_id: BotId,
    pub power: f64,
    pub origin: Point,
    pub direction: f64,
    pub age: u32,
    pub color: Option<String>,
}

impl BulletState {
    pub fn speed(&self) -> f64 {
        calc_bullet_speed(self.power)
    }

    pub fn position_at(&self, age: u32) -> Point {
        self.origin
            .translated(self.direction, self.speed() * f64::from(age))
    }

    pub fn position(&self) -> Point {
        self.position_at(self.age)
    }

    pub fn next_position(&self) -> Point {
        self.position_at(self.age + 1)
    }
}

impl Serialize for BulletState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let position = self.position();
        let mut s = serializer.serialize_struct("BulletState", 8)?;
        s.serialize_field("bullet_id", &self.bullet_id)?;
        s.serialize_field("owner_id", &self.owner_id)?;
        s.serialize_field("power", &self.power)?;
        s.serialize_field("x", &position.x)?;
        s.serialize_field("y", &position.y)?;
        s.serialize_field("direction", &self.direction)?;
        s.serialize_field("speed", &self.speed())?;
        s.serialize_field("color", &self.color)?;
        s.end()
    }
}

/// Engine-owned bot record (never sent to clients directly).
#[derive(Debug, Clone)]
pub struct SimBot {
    pub state: BotState,
    pub previous_position: Point,
    // Movement-only state.
    pub intent: BotIntent,
    pub plan: MotionPlan,
    // Combat state.
    pub dead: bool,
    pub death_announced: bool,
}

impl SimBot {
    pub fn new(id: BotId, position: Point, direction: f64, energy: f64, gun_heat: f64) -> Self {
        Self {
            state: BotState {
                id,
                energy,
                x: position.x,
                y: position.y,
                direction,
                gun_direction: direction,
                radar_direction: direction,
                radar_sweep: 0.0,
                speed: 0.0,
                turn_rate: 0.0,
                gun_turn_rate: 0.0,
                gun_heat,
                is_disabled: false,
                colors: BotColors::default(),
            },
            previous_position: position,
            intent: BotIntent::zeroed(),
            plan: MotionPlan::default(),
            dead: false,
            death_announced: false,
        }
    }

    pub fn id(&self) -> BotId {
        self.state.id
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    /// Alive but out of energy: cannot move, turn or fire.
    pub fn is_disabled(&self) -> bool {
        !self.dead && self.state.energy <= 0.0
    }

    /// Applies damage and returns true if it killed the bot.
    ///
    /// Energy never goes negative: damage past zero kills and clamps, landing exactly
    /// on zero only disables.
    pub fn take_damage(&mut self, damage: f64) -> bool {
        if self.dead {
            return false;
        }
        let energy = self.state.energy - damage;
        if energy < 0.0 {
            self.state.energy = 0.0;
            self.dead = true;
            true
        } else {
            self.state.energy = energy;
            false
        }
    }

    pub fn add_energy(&mut self, amount: f64) {
        if !self.dead {
            self.state.energy += amount;
        }
    }

    pub fn snapshot(&self) -> BotState {
        let mut state = self.state.clone();
        state.is_disabled = self.is_disabled();
        state.colors.apply(&self.intent);
        state
    }
}

/// Immutable result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub round_number: u32,
    pub turn_number: u32,
    pub bots: Vec<BotState>,
    pub bullets: Vec<BulletState>,
    pub events: TurnEvents,
}

/// Per-bot outbound view of a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotTurnView {
    pub round_number: u32,
    pub turn_number: u32,
    pub bot: BotState,
    pub bullets: Vec<BulletState>,
    pub events: Vec<Event>,
}

/// Observer outbound view of a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObserverTurnView {
    pub round_number: u32,
    pub turn_number: u32,
    pub bots: Vec<BotState>,
    pub bullets: Vec<BulletState>,
    pub events: Vec<Event>,
}

impl Turn {
    pub fn bot(&self, bot_id: BotId) -> Option<&BotState> {
        self.bots.iter().find(|b| b.id == bot_id)
    }

    /// View for one bot, or `None` if the bot is not part of this turn.
    pub fn bot_view(&self, bot_id: BotId) -> Option<BotTurnView> {
        let bot = self.bot(bot_id)?.clone();
        Some(BotTurnView {
            round_number: self.round_number,
            turn_number: self.turn_number,
            bot,
            bullets: self
                .bullets
                .iter()
                .filter(|b| b.owner_id == bot_id)
                .cloned()
                .collect(),
            events: self.events.for_bot(bot_id),
        })
    }

    pub fn observer_view(&self) -> ObserverTurnView {
        ObserverTurnView {
            round_number: self.round_number,
            turn_number: self.turn_number,
            bots: self.bots.clone(),
            bullets: self.bullets.clone(),
            events: self.events.observer().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub round_number: u32,
    pub turns: Vec<Arc<Turn>>,
    pub ended: bool,
}

/// Read-only history of a game. Turns are shared, so cloning is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub arena: Arena,
    pub rounds: Vec<Round>,
    pub ended: bool,
}

impl GameState {
    pub fn new(arena: Arena) -> Self {
        Self {
            arena,
            rounds: Vec::new(),
            ended: false,
        }
    }
}
