// Partial bot commands and their field-by-field merge.

use serde::Deserialize;

/// Movement and firing command for the upcoming tick.
///
/// Every field is optional: a present field overwrites the stored value on merge and an
/// absent field keeps it. `move_by` and the `turn_*_by` fields are one-shot continuous
/// motion commands consumed by the engine when merged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BotIntent {
    pub target_speed: Option<f64>,
    pub turn_rate: Option<f64>,
    pub gun_turn_rate: Option<f64>,
    pub radar_turn_rate: Option<f64>,
    pub firepower: Option<f64>,
    pub adjust_gun_for_body_turn: Option<bool>,
    pub adjust_radar_for_gun_turn: Option<bool>,

    pub move_by: Option<f64>,
    pub turn_by: Option<f64>,
    pub turn_gun_by: Option<f64>,
    pub turn_radar_by: Option<f64>,

    pub body_color: Option<String>,
    pub turret_color: Option<String>,
    pub radar_color: Option<String>,
    pub bullet_color: Option<String>,
    pub scan_color: Option<String>,
}

impl BotIntent {
    /// The safe default used on timeouts, disconnects and for disabled bots.
    pub fn zeroed() -> Self {
        Self {
            target_speed: Some(0.0),
            turn_rate: Some(0.0),
            gun_turn_rate: Some(0.0),
            radar_turn_rate: Some(0.0),
            firepower: Some(0.0),
            ..Self::default()
        }
    }

    /// Overwrites every field that is present in `update`.
    pub fn merge(&mut self, update: BotIntent) {
        fn apply<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        apply(&mut self.target_speed, update.target_speed);
        apply(&mut self.turn_rate, update.turn_rate);
        apply(&mut self.gun_turn_rate, update.gun_turn_rate);
        apply(&mut self.radar_turn_rate, update.radar_turn_rate);
        apply(&mut self.firepower, update.firepower);
        apply(
            &mut self.adjust_gun_for_body_turn,
            update.adjust_gun_for_body_turn,
        );
        apply(
            &mut self.adjust_radar_for_gun_turn,
            update.adjust_radar_for_gun_turn,
        );
        apply(&mut self.move_by, update.move_by);
        apply(&mut self.turn_by, update.turn_by);
        apply(&mut self.turn_gun_by, update.turn_gun_by);
        apply(&mut self.turn_radar_by, update.turn_radar_by);
        apply(&mut self.body_color, update.body_color);
        apply(&mut self.turret_color, update.turret_color);
        apply(&mut self.radar_color, update.radar_color);
        apply(&mut self.bullet_color, update.bullet_color);
        apply(&mut self.scan_color, update.scan_color);
    }

    /// Forces every motion and firing field to zero, keeping cosmetics.
    pub fn zero_motion(&mut self) {
        let colors = (
            self.body_color.take(),
            self.turret_color.take(),
            self.radar_color.take(),
            self.bullet_color.take(),
            self.scan_color.take(),
        );
        *self = Self::zeroed();
        self.body_color = colors.0;
        self.turret_color = colors.1;
        self.radar_color = colors.2;
        self.bullet_color = colors.3;
        self.scan_color = colors.4;
    }

    /// False when any numeric field is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        [
            self.target_speed,
            self.turn_rate,
            self.gun_turn_rate,
            self.radar_turn_rate,
            self.firepower,
            self.move_by,
            self.turn_by,
            self.turn_gun_by,
            self.turn_radar_by,
        ]
        .into_iter()
        .flatten()
        .all(f64::is_finite)
    }
}
