//! A fighter and a prop: the per-entity components wired together

use uuid::Uuid;

use crate::config::tuning::{Placement, PropSpawn};
use crate::config::Tuning;
use crate::util::time::SimTime;
use crate::ws::protocol::{FighterSnapshot, PlayerInfo, PropSnapshot};

use super::block::BlockController;
use super::combat::{CombatResolver, EntityKind, Hit, HitTarget};
use super::command::{Command, CommandBuffer};
use super::elimination::EliminationState;
use super::motion::{MotionOutcome, MotionSimulator};
use super::physics::{ArenaFloor, RigidBody};
use super::resources::ResourceEconomy;

pub const MAX_DISPLAY_NAME_LEN: usize = 16;

/// Trimmed, truncated, or `Player <short id>` when blank
pub fn sanitize_display_name(requested: Option<&str>, user_id: Uuid) -> String {
    let trimmed = requested.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        let id = user_id.simple().to_string();
        return format!("Player {}", &id[..4]);
    }
    trimmed.chars().take(MAX_DISPLAY_NAME_LEN).collect()
}

/// What a fighter's own control phase did this tick
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlReport {
    pub dashed: bool,
    pub kick_started: bool,
}

/// Server-side player entity
#[derive(Debug, Clone)]
pub struct Fighter {
    pub user_id: Uuid,
    pub display_name: String,
    pub knockouts: u32,
    pub body: RigidBody,
    pub commands: CommandBuffer,
    /// Absent means abilities are never gated
    pub economy: Option<ResourceEconomy>,
    pub motion: MotionSimulator,
    pub combat: CombatResolver,
    pub block: BlockController,
    pub elimination: EliminationState,
}

impl Fighter {
    pub fn spawn(user_id: Uuid, display_name: String, at: Placement, tuning: &Tuning) -> Self {
        let arena = &tuning.arena;
        Self {
            user_id,
            display_name,
            knockouts: 0,
            body: RigidBody::new(at.position, at.yaw, arena.fighter_mass, arena.fighter_shape),
            commands: CommandBuffer::new(),
            economy: Some(ResourceEconomy::new(tuning.resources.clone())),
            motion: MotionSimulator::new(tuning.motion.clone()),
            combat: CombatResolver::new(user_id, tuning.combat.clone()),
            block: BlockController::new(tuning.block.clone(), arena.fighter_mass),
            elimination: EliminationState::new(tuning.credit.clone()),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.elimination.is_eliminated()
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            knockouts: self.knockouts,
        }
    }

    /// Inbox write; callable any time between ticks
    pub fn submit_command(&mut self, command: Command) {
        if !self.is_active() {
            return;
        }
        self.commands.submit(command, self.economy.as_ref());
    }

    /// Re-gate, block, move, and advance the kick window
    pub fn control(&mut self, floor: &ArenaFloor, now: SimTime, dt: f32) -> ControlReport {
        if !self.is_active() {
            return ControlReport::default();
        }

        self.commands.regate(self.economy.as_ref());
        let cmd = *self.commands.gated();

        self.block.apply(
            cmd.block_held,
            self.combat.in_kick_state(now),
            &mut self.body,
            &mut self.motion,
            &mut self.commands,
        );

        let outcome = self
            .motion
            .step(&mut self.body, &cmd, self.economy.as_mut(), floor, now, dt);
        if outcome == MotionOutcome::DashDenied {
            self.commands.defer_dash();
        }
        let kick_started = self.combat.update(&cmd, self.economy.as_mut(), now);

        ControlReport {
            dashed: outcome == MotionOutcome::Dashed,
            kick_started,
        }
    }

    pub fn hit_target(&self) -> HitTarget {
        HitTarget {
            id: self.user_id,
            kind: EntityKind::Fighter,
            center_of_mass: self.body.center_of_mass(),
        }
    }

    /// Strike `target` if it is inside this fighter's hit volume
    pub fn try_strike(&mut self, target: &HitTarget, target_body: &RigidBody, now: SimTime) -> Option<Hit> {
        if !self.is_active() || !self.combat.overlaps(&self.body, target_body) {
            return None;
        }
        let punch_held = self.commands.gated().punch_held;
        self.combat
            .on_overlap(&self.body, punch_held, target, self.economy.as_mut(), now)
    }

    /// Knockback with hitstun, and credit for the attacker
    pub fn apply_hit(&mut self, hit: &Hit, now: SimTime) {
        if !self.is_active() {
            return;
        }
        self.elimination.record_attacker(hit.attacker_id, now);
        if self.motion.is_active() {
            self.motion
                .apply_external_impulse(&mut self.body, hit.impulse, hit.hitstun_seconds, now);
        } else {
            self.body.add_impulse(hit.impulse);
        }
    }

    /// Decay, and drain while blocking
    pub fn update_resources(&mut self, dt: f32) {
        if !self.is_active() {
            return;
        }
        if let Some(economy) = self.economy.as_mut() {
            economy.tick(dt);
            if self.block.is_blocking() {
                economy.drain_for_blocking(dt);
            }
        }
    }

    pub fn end_tick(&mut self) {
        self.commands.consume_one_frame_buttons();
    }

    pub fn is_below(&self, height: f32) -> bool {
        self.body.position.y < height
    }

    /// Freeze at the spectator point and switch off motion and combat.
    /// Returns false if already eliminated.
    pub fn eliminate_to_spectator(&mut self, spectator: Placement) -> bool {
        if !self.elimination.eliminate() {
            return false;
        }
        self.block.release(&mut self.body);
        self.body.freeze_at(spectator.position, spectator.yaw);
        self.motion.set_active(false);
        self.combat.set_active(false);
        self.commands.clear();
        true
    }

    /// Back into play at `spawn` with fresh resources and no credit
    pub fn restore_for_round(&mut self, spawn: Placement) {
        self.elimination.restore();
        self.block.release(&mut self.body);
        self.body.respawn_at(spawn.position, spawn.yaw);
        self.motion.reset();
        self.combat.reset();
        self.commands.clear();
        if let Some(economy) = self.economy.as_mut() {
            economy.reset();
        }
    }

    /// Transform plus any animation values changed since the last call
    pub fn snapshot(&mut self) -> FighterSnapshot {
        FighterSnapshot {
            user_id: self.user_id,
            x: self.body.position.x,
            y: self.body.position.y,
            z: self.body.position.z,
            yaw: self.body.yaw(),
            active: self.is_active(),
            animation: self.commands.animation_mut().take_changes(),
        }
    }

    /// Make the next snapshot and resource update carry everything
    pub fn mark_all_dirty(&mut self) {
        self.commands.animation_mut().mark_dirty();
        if let Some(economy) = self.economy.as_mut() {
            economy.mark_dirty();
        }
    }
}

/// Hittable arena object: a body with no motion simulator, so knockback is a
/// raw impulse with no hitstun and no credit
#[derive(Debug, Clone)]
pub struct Prop {
    pub id: Uuid,
    pub body: RigidBody,
    home: Placement,
}

impl Prop {
    pub fn spawn(spawn: &PropSpawn, tuning: &Tuning) -> Self {
        let at = spawn.placement;
        Self {
            id: Uuid::new_v4(),
            body: RigidBody::new(at.position, at.yaw, spawn.mass, tuning.arena.fighter_shape),
            home: at,
        }
    }

    pub fn hit_target(&self) -> HitTarget {
        HitTarget {
            id: self.id,
            kind: EntityKind::Prop,
            center_of_mass: self.body.center_of_mass(),
        }
    }

    pub fn apply_hit(&mut self, hit: &Hit) {
        self.body.add_impulse(hit.impulse);
    }

    pub fn reset(&mut self) {
        self.body.respawn_at(self.home.position, self.home.yaw);
    }

    pub fn snapshot(&self) -> PropSnapshot {
        PropSnapshot {
            id: self.id,
            x: self.body.position.x,
            y: self.body.position.y,
            z: self.body.position.z,
            yaw: self.body.yaw(),
        }
    }
}
