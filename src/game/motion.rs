//! Fixed-tick fighter motion: yaw, ground/air movement, dash, ground-stick
//! and hitstun control lock

use glam::{Quat, Vec3};
use serde::Deserialize;

use crate::util::time::SimTime;

use super::command::GatedCommand;
use super::physics::{GroundProbe, PhysicsSystem, RigidBody, DIRECTION_EPSILON_SQ};
use super::resources::ResourceEconomy;

/// Movement constants per fighter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionTuning {
    pub move_speed: f32,
    pub ground_acceleration: f32,
    pub air_acceleration: f32,
    /// Deceleration toward zero while airborne with no input (0 = off)
    pub air_brake: f32,
    /// Degrees of yaw per unit of look delta
    pub yaw_sensitivity: f32,
    pub max_yaw_speed_deg: f32,
    pub dash_impulse: f32,
    pub dash_up_impulse: f32,
    pub dash_cooldown: f32,
    /// Vertical velocity enforced while grounded
    pub ground_stick_velocity: f32,
    pub disable_ground_stick_after_dash: f32,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            move_speed: 6.0,
            ground_acceleration: 40.0,
            air_acceleration: 20.0,
            air_brake: 0.0,
            yaw_sensitivity: 0.42,
            max_yaw_speed_deg: 720.0,
            dash_impulse: 8.0,
            dash_up_impulse: 2.0,
            dash_cooldown: 0.35,
            ground_stick_velocity: -2.0,
            disable_ground_stick_after_dash: 0.08,
        }
    }
}

/// Simulator-owned motion bookkeeping; velocity lives on the body
#[derive(Debug, Clone)]
pub struct MotionState {
    pub grounded: bool,
    pub next_dash_allowed_at: SimTime,
    pub ground_stick_disabled_until: SimTime,
    /// Hitstun expiry
    pub control_locked_until: SimTime,
    pub speed_multiplier: f32,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            grounded: false,
            next_dash_allowed_at: SimTime::NEG_INFINITY,
            ground_stick_disabled_until: SimTime::NEG_INFINITY,
            control_locked_until: SimTime::NEG_INFINITY,
            speed_multiplier: 1.0,
        }
    }
}

/// What the movement part of a step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    /// Simulator disabled (eliminated)
    Inactive,
    /// In hitstun: only yaw and ground-stick applied
    Locked,
    Dashed,
    Moved,
    /// Dash was pressed but the economy refused it; moved normally instead
    DashDenied,
}

#[derive(Debug, Clone)]
pub struct MotionSimulator {
    tuning: MotionTuning,
    state: MotionState,
    active: bool,
}

impl MotionSimulator {
    pub fn new(tuning: MotionTuning) -> Self {
        Self {
            tuning,
            state: MotionState::default(),
            active: true,
        }
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn tuning(&self) -> &MotionTuning {
        &self.tuning
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_move_speed_multiplier(&mut self, mult: f32) {
        self.state.speed_multiplier = mult.max(0.01);
    }

    pub fn is_control_locked(&self, now: SimTime) -> bool {
        now < self.state.control_locked_until
    }

    /// Re-arm with fresh timers (round restore)
    pub fn reset(&mut self) {
        self.state = MotionState::default();
        self.active = true;
    }

    /// One fixed tick. The economy, when present, is the final authority on
    /// whether a dash executes.
    pub fn step(
        &mut self,
        body: &mut RigidBody,
        cmd: &GatedCommand,
        economy: Option<&mut ResourceEconomy>,
        ground: &impl GroundProbe,
        now: SimTime,
        dt: f32,
    ) -> MotionOutcome {
        if !self.active {
            return MotionOutcome::Inactive;
        }

        self.apply_yaw(body, cmd.look_x, dt);

        let grounded = ground.is_grounded(body);
        self.state.grounded = grounded;
        self.apply_ground_stick(body, grounded, now);

        if self.is_control_locked(now) {
            return MotionOutcome::Locked;
        }

        let world_dir = self.world_move_direction(body, cmd);

        if cmd.dash_pressed && now >= self.state.next_dash_allowed_at {
            let paid = match economy {
                Some(economy) => economy.try_spend_dash(),
                None => true,
            };
            if paid {
                self.dash(body, world_dir, now);
                return MotionOutcome::Dashed;
            }
            self.apply_movement(body, world_dir, grounded, dt);
            return MotionOutcome::DashDenied;
        }

        self.apply_movement(body, world_dir, grounded, dt);
        MotionOutcome::Moved
    }

    /// Knockback entrypoint for other fighters. Never shortens a pending lock.
    pub fn apply_external_impulse(
        &mut self,
        body: &mut RigidBody,
        impulse: Vec3,
        lock_control_seconds: f32,
        now: SimTime,
    ) {
        body.add_impulse(impulse);

        let until = now + f64::from(lock_control_seconds.max(0.0));
        if until > self.state.control_locked_until {
            self.state.control_locked_until = until;
        }
    }

    fn apply_yaw(&self, body: &mut RigidBody, look_x: f32, dt: f32) {
        let max_delta = self.tuning.max_yaw_speed_deg * dt;
        let yaw_delta = (look_x * self.tuning.yaw_sensitivity).clamp(-max_delta, max_delta);

        if yaw_delta.abs() > 0.0001 {
            body.rotation = (body.rotation * Quat::from_rotation_y(yaw_delta.to_radians())).normalize();
        }
    }

    fn apply_ground_stick(&self, body: &mut RigidBody, grounded: bool, now: SimTime) {
        if !grounded || now < self.state.ground_stick_disabled_until {
            return;
        }
        if body.velocity.y > self.tuning.ground_stick_velocity {
            body.velocity.y = self.tuning.ground_stick_velocity;
        }
    }

    fn world_move_direction(&self, body: &RigidBody, cmd: &GatedCommand) -> Vec3 {
        let local = cmd.move_dir.clamp_length_max(1.0);
        let mut dir = body.right() * local.x + body.forward() * local.y;
        dir.y = 0.0;
        dir
    }

    fn dash(&mut self, body: &mut RigidBody, world_dir: Vec3, now: SimTime) {
        self.state.next_dash_allowed_at = now + f64::from(self.tuning.dash_cooldown);
        self.state.ground_stick_disabled_until =
            now + f64::from(self.tuning.disable_ground_stick_after_dash);

        let mut dash_dir = if world_dir.length_squared() > DIRECTION_EPSILON_SQ {
            world_dir
        } else {
            body.forward()
        };
        dash_dir.y = 0.0;
        let dash_dir = dash_dir.normalize_or_zero();

        // Crisp direction change: drop horizontal momentum, keep vertical
        body.velocity = Vec3::new(0.0, body.velocity.y, 0.0);
        body.add_impulse(dash_dir * self.tuning.dash_impulse + Vec3::Y * self.tuning.dash_up_impulse);
    }

    fn apply_movement(&self, body: &mut RigidBody, world_dir: Vec3, grounded: bool, dt: f32) {
        let horizontal = body.horizontal_velocity();
        let target = world_dir * (self.tuning.move_speed * self.state.speed_multiplier);
        let has_input = world_dir.length_squared() > DIRECTION_EPSILON_SQ;

        let new_horizontal = if grounded {
            PhysicsSystem::move_towards(horizontal, target, self.tuning.ground_acceleration * dt)
        } else if has_input {
            PhysicsSystem::move_towards(horizontal, target, self.tuning.air_acceleration * dt)
        } else if self.tuning.air_brake > 0.0 {
            PhysicsSystem::move_towards(horizontal, Vec3::ZERO, self.tuning.air_brake * dt)
        } else {
            return;
        };

        body.velocity = Vec3::new(new_horizontal.x, body.velocity.y, new_horizontal.z);
    }
}
