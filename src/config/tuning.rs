//! Gameplay tunables, loaded from an optional JSON file

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::Deserialize;

use crate::game::block::BlockTuning;
use crate::game::combat::CombatTuning;
use crate::game::elimination::CreditTuning;
use crate::game::input::InputTuning;
use crate::game::motion::MotionTuning;
use crate::game::physics::{ArenaFloor, BodyShape};
use crate::game::resources::ResourceTuning;

use super::ConfigError;

/// Position and facing (radians around +Y)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Placement {
    pub position: Vec3,
    #[serde(default)]
    pub yaw: f32,
}

impl Placement {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self { position, yaw }
    }
}

/// A hittable arena object with no motion of its own
#[derive(Debug, Clone, Deserialize)]
pub struct PropSpawn {
    pub placement: Placement,
    #[serde(default = "default_prop_mass")]
    pub mass: f32,
}

fn default_prop_mass() -> f32 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArenaTuning {
    pub floor: ArenaFloor,
    /// Fighters whose base drops below this are knocked out
    pub knockout_height: f32,
    pub spawn_points: Vec<Placement>,
    pub spectator_point: Placement,
    pub fighter_mass: f32,
    pub fighter_shape: BodyShape,
    pub props: Vec<PropSpawn>,
}

impl Default for ArenaTuning {
    fn default() -> Self {
        use std::f32::consts::{FRAC_PI_2, PI};

        Self {
            floor: ArenaFloor::default(),
            knockout_height: -5.0,
            spawn_points: vec![
                Placement::new(Vec3::new(0.0, 0.0, -6.0), 0.0),
                Placement::new(Vec3::new(0.0, 0.0, 6.0), PI),
                Placement::new(Vec3::new(-6.0, 0.0, 0.0), FRAC_PI_2),
                Placement::new(Vec3::new(6.0, 0.0, 0.0), -FRAC_PI_2),
            ],
            spectator_point: Placement::new(Vec3::new(0.0, 12.0, -18.0), 0.0),
            fighter_mass: 1.0,
            fighter_shape: BodyShape::default(),
            props: Vec::new(),
        }
    }
}

impl ArenaTuning {
    pub fn spawn_point(&self, index: usize) -> Placement {
        if self.spawn_points.is_empty() {
            return Placement::new(self.floor.center, 0.0);
        }
        self.spawn_points[index % self.spawn_points.len()]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundTuning {
    pub round_duration_seconds: f32,
    pub round_end_delay_seconds: f32,
    pub min_players_to_start: usize,
}

impl Default for RoundTuning {
    fn default() -> Self {
        Self {
            round_duration_seconds: 60.0,
            round_end_delay_seconds: 5.0,
            min_players_to_start: 2,
        }
    }
}

/// Every static tunable, grouped by the component that reads it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub motion: MotionTuning,
    pub combat: CombatTuning,
    pub resources: ResourceTuning,
    pub block: BlockTuning,
    pub input: InputTuning,
    pub credit: CreditTuning,
    pub arena: ArenaTuning,
    pub round: RoundTuning,
}

impl Tuning {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::InvalidTuning)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::TuningUnreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let tuning = Tuning::from_json(
            r#"{"motion":{"move_speed":8.0},"combat":{"knockback":{"kick":{"forward":10.0,"up":2.0}}}}"#,
        )
        .unwrap();
        assert_eq!(tuning.motion.move_speed, 8.0);
        assert_eq!(tuning.motion.dash_impulse, 8.0);
        assert_eq!(tuning.combat.knockback.kick.forward, 10.0);
        assert_eq!(tuning.combat.knockback.punch.forward, 3.5);
        assert_eq!(tuning.resources.punches_to_full_power, 3);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            Tuning::from_json("{ not json"),
            Err(ConfigError::InvalidTuning(_))
        ));
    }

    #[test]
    fn spawn_points_wrap_around() {
        let arena = ArenaTuning::default();
        assert_eq!(arena.spawn_point(5).position, arena.spawn_point(1).position);
    }
}
