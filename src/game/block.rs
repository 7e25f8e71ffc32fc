//! Blocking: heavier and slower while the gated block hold is active

use serde::Deserialize;

use super::command::CommandBuffer;
use super::motion::MotionSimulator;
use super::physics::RigidBody;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockTuning {
    /// Mass multiplier while blocking; movement speed is divided by it
    pub block_mult: f32,
}

impl Default for BlockTuning {
    fn default() -> Self {
        Self { block_mult: 3.0 }
    }
}

#[derive(Debug, Clone)]
pub struct BlockController {
    tuning: BlockTuning,
    base_mass: f32,
    blocking: bool,
}

impl BlockController {
    pub fn new(tuning: BlockTuning, base_mass: f32) -> Self {
        Self {
            tuning,
            base_mass,
            blocking: false,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Apply or lift the block for this tick. Returns whether the fighter is
    /// blocking, which is what drives the stamina drain.
    pub fn apply(
        &mut self,
        block_held: bool,
        in_kick: bool,
        body: &mut RigidBody,
        motion: &mut MotionSimulator,
        commands: &mut CommandBuffer,
    ) -> bool {
        let mult = self.tuning.block_mult.max(0.01);
        self.blocking = block_held && !in_kick;

        let speed_mult = if self.blocking {
            body.mass = self.base_mass * mult;
            1.0 / mult
        } else {
            body.mass = self.base_mass;
            1.0
        };

        motion.set_move_speed_multiplier(speed_mult);
        commands.set_run_speed_mult(speed_mult);
        self.blocking
    }

    /// Drop the block and restore the base mass
    pub fn release(&mut self, body: &mut RigidBody) {
        self.blocking = false;
        body.mass = self.base_mass;
    }
}
