// Score accumulation per round and across the whole game.

use super::rules::{
    BONUS_PER_BULLET_KILL, BONUS_PER_LAST_SURVIVOR, BONUS_PER_RAM_KILL, SCORE_PER_BULLET_DAMAGE,
    SCORE_PER_RAM_DAMAGE, SCORE_PER_SURVIVAL,
};
use super::state::BotId;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Score {
    pub bot_id: BotId,
    pub total: f64,
    pub survival: f64,
    pub last_survivor_bonus: f64,
    pub bullet_damage: f64,
    pub bullet_kill_bonus: f64,
    pub ram_damage: f64,
    pub ram_kill_bonus: f64,
    pub first_places: u32,
    pub second_places: u32,
    pub third_places: u32,
}

impl Score {
    fn recompute_total(&mut self) {
        self.total = self.survival
            + self.last_survivor_bonus
            + self.bullet_damage
            + self.bullet_kill_bonus
            + self.ram_damage
            + self.ram_kill_bonus;
    }

    /// Adds every component and placement counter of `other`.
    pub fn accumulate(&mut self, other: &Score) {
        self.bot_id = other.bot_id;
        self.survival += other.survival;
        self.last_survivor_bonus += other.last_survivor_bonus;
        self.bullet_damage += other.bullet_damage;
        self.bullet_kill_bonus += other.bullet_kill_bonus;
        self.ram_damage += other.ram_damage;
        self.ram_kill_bonus += other.ram_kill_bonus;
        self.first_places += other.first_places;
        self.second_places += other.second_places;
        self.third_places += other.third_places;
        self.recompute_total();
    }
}

/// Score with its placement in a ranking (1-based).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotResult {
    pub rank: u32,
    #[serde(flatten)]
    pub score: Score,
}

#[derive(Debug, Clone, Default)]
struct BotRecord {
    survival_count: u32,
    last_survivor_count: u32,
    bullet_damage: BTreeMap<BotId, f64>,
    ram_damage: BTreeMap<BotId, f64>,
    bullet_kills: BTreeSet<BotId>,
    ram_kills: BTreeSet<BotId>,
}

impl BotRecord {
    fn damage_dealt_to(&self, victim_id: BotId) -> f64 {
        self.bullet_damage.get(&victim_id).copied().unwrap_or(0.0)
            + self.ram_damage.get(&victim_id).copied().unwrap_or(0.0)
    }
}

/// Per-round score bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ScoreTracker {
    records: BTreeMap<BotId, BotRecord>,
    dead: BTreeSet<BotId>,
}

impl ScoreTracker {
    pub fn new(bot_ids: impl IntoIterator<Item = BotId>) -> Self {
        Self {
            records: bot_ids
                .into_iter()
                .map(|id| (id, BotRecord::default()))
                .collect(),
            dead: BTreeSet::new(),
        }
    }

    pub fn register_bullet_hit(
        &mut self,
        shooter_id: BotId,
        victim_id: BotId,
        damage: f64,
        killed: bool,
    ) {
        let record = self.records.entry(shooter_id).or_default();
        *record.bullet_damage.entry(victim_id).or_insert(0.0) += damage;
        if killed {
            record.bullet_kills.insert(victim_id);
        }
    }

    pub fn register_ram_hit(&mut self, rammer_id: BotId, victim_id: BotId, damage: f64, killed: bool) {
        let record = self.records.entry(rammer_id).or_default();
        *record.ram_damage.entry(victim_id).or_insert(0.0) += damage;
        if killed {
            record.ram_kills.insert(victim_id);
        }
    }

    /// Records bots that died this turn. Every bot still alive survives each of them;
    /// a sole survivor also collects the last-survivor bonus once.
    pub fn register_deaths(&mut self, dead_ids: &[BotId]) {
        if dead_ids.is_empty() {
            return;
        }
        self.dead.extend(dead_ids.iter().copied());

        let dead = &self.dead;
        let alive: Vec<BotId> = self
            .records
            .keys()
            .copied()
            .filter(|id| !dead.contains(id))
            .collect();

        for id in &alive {
            if let Some(record) = self.records.get_mut(id) {
                record.survival_count += dead_ids.len() as u32;
            }
        }

        if let [survivor] = alive.as_slice() {
            let opponents_dead = self.dead.len() as u32;
            if let Some(record) = self.records.get_mut(survivor) {
                record.last_survivor_count = opponents_dead;
            }
        }
    }

    pub fn get_score(&self, bot_id: BotId) -> Score {
        let Some(record) = self.records.get(&bot_id) else {
            return Score {
                bot_id,
                ..Score::default()
            };
        };

        let bullet_damage: f64 = record.bullet_damage.values().sum();
        let ram_damage: f64 = record.ram_damage.values().sum();
        let bullet_kill_damage: f64 = record
            .bullet_kills
            .iter()
            .map(|victim| record.damage_dealt_to(*victim))
            .sum();
        let ram_kill_damage: f64 = record
            .ram_kills
            .iter()
            .map(|victim| record.damage_dealt_to(*victim))
            .sum();

        let mut score = Score {
            bot_id,
            survival: f64::from(record.survival_count) * SCORE_PER_SURVIVAL,
            last_survivor_bonus: f64::from(record.last_survivor_count) * BONUS_PER_LAST_SURVIVOR,
            bullet_damage: bullet_damage * SCORE_PER_BULLET_DAMAGE,
            bullet_kill_bonus: bullet_kill_damage * BONUS_PER_BULLET_KILL,
            ram_damage: ram_damage * SCORE_PER_RAM_DAMAGE,
            ram_kill_bonus: ram_kill_damage * BONUS_PER_RAM_KILL,
            ..Score::default()
        };
        score.recompute_total();
        score
    }

    /// Round ranking by total score; the top three get one placement each.
    pub fn rankings(&self) -> Vec<BotResult> {
        let mut scores: Vec<Score> = self.records.keys().map(|id| self.get_score(*id)).collect();
        scores.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(Ordering::Equal)
                .then(a.bot_id.cmp(&b.bot_id))
        });

        scores
            .into_iter()
            .enumerate()
            .map(|(index, mut score)| {
                match index {
                    0 => score.first_places = 1,
                    1 => score.second_places = 1,
                    2 => score.third_places = 1,
                    _ => {}
                }
                BotResult {
                    rank: index as u32 + 1,
                    score,
                }
            })
            .collect()
    }
}

/// Sums round results into game totals.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedScores {
    totals: BTreeMap<BotId, Score>,
}

impl AccumulatedScores {
    pub fn add_round(&mut self, results: &[BotResult]) {
        for result in results {
            self.totals
                .entry(result.score.bot_id)
                .or_default()
                .accumulate(&result.score);
        }
    }

    /// Final ranking: total, then first places, then bot id.
    pub fn rankings(&self) -> Vec<BotResult> {
        let mut scores: Vec<Score> = self.totals.values().cloned().collect();
        scores.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(Ordering::Equal)
                .then(b.first_places.cmp(&a.first_places))
                .then(a.bot_id.cmp(&b.bot_id))
        });
        scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| BotResult {
                rank: index as u32 + 1,
                score,
            })
            .collect()
    }
}
