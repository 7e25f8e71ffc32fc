//! Melee combat: kick hit windows, per-target punch cooldowns and
//! momentum-scaled knockback

use std::collections::{HashMap, HashSet};

use glam::Vec3;
use serde::Deserialize;
use uuid::Uuid;

use crate::util::time::SimTime;
use crate::ws::protocol::Strike;

use super::command::GatedCommand;
use super::physics::{PhysicsSystem, RigidBody, DIRECTION_EPSILON_SQ};
use super::resources::ResourceEconomy;

/// Base impulse of one strike type
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StrikeImpulse {
    pub forward: f32,
    pub up: f32,
}

/// Knockback base impulses and momentum scaling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnockbackTuning {
    pub punch: StrikeImpulse,
    pub kick: StrikeImpulse,
    pub speed_to_multiplier: f32,
    pub multiplier_min: f32,
    pub multiplier_max: f32,
    pub forward_weight: f32,
    pub up_weight: f32,
}

impl Default for KnockbackTuning {
    fn default() -> Self {
        Self {
            punch: StrikeImpulse { forward: 3.5, up: 0.75 },
            kick: StrikeImpulse { forward: 8.0, up: 1.8 },
            speed_to_multiplier: 0.08,
            multiplier_min: 0.35,
            multiplier_max: 1.8,
            forward_weight: 1.0,
            up_weight: 0.8,
        }
    }
}

impl KnockbackTuning {
    fn base(&self, strike: Strike) -> StrikeImpulse {
        match strike {
            Strike::Punch => self.punch,
            Strike::Kick => self.kick,
        }
    }
}

/// Which entity kinds a fighter's strikes can connect with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HittableFilter {
    Any,
    FightersOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Fighter,
    Prop,
}

impl HittableFilter {
    pub fn accepts(self, kind: EntityKind) -> bool {
        match self {
            HittableFilter::Any => true,
            HittableFilter::FightersOnly => kind == EntityKind::Fighter,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CombatTuning {
    pub knockback: KnockbackTuning,
    pub punch_cooldown_per_target: f32,
    pub kick_windup_seconds: f32,
    pub kick_active_window_seconds: f32,
    pub hitstun_seconds: f32,
    /// Distance of the strike volume in front of the center of mass
    pub hit_reach: f32,
    pub hit_radius: f32,
    /// Reject kick hits unless the server-side kick animation is playing
    pub require_kick_state_for_hit: bool,
    pub kick_animation_seconds: f32,
    /// Close the kick window on its first landing
    pub kick_single_target: bool,
    pub cooldown_prune_threshold: usize,
    pub hittable: HittableFilter,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            knockback: KnockbackTuning::default(),
            punch_cooldown_per_target: 0.2,
            kick_windup_seconds: 0.2,
            kick_active_window_seconds: 0.12,
            hitstun_seconds: 0.12,
            hit_reach: 0.9,
            hit_radius: 0.45,
            require_kick_state_for_hit: false,
            kick_animation_seconds: 0.5,
            kick_single_target: true,
            cooldown_prune_threshold: 64,
            hittable: HittableFilter::Any,
        }
    }
}

/// Kick timing: idle until a swing, live within [opens_at, closes_at]
#[derive(Debug, Clone, Copy)]
pub struct HitWindow {
    pub pending: bool,
    pub opens_at: SimTime,
    pub closes_at: SimTime,
}

impl Default for HitWindow {
    fn default() -> Self {
        Self {
            pending: false,
            opens_at: 0.0,
            closes_at: 0.0,
        }
    }
}

impl HitWindow {
    pub fn open(&mut self, now: SimTime, windup: f32, active: f32) {
        self.pending = true;
        self.opens_at = now + f64::from(windup.max(0.0));
        self.closes_at = self.opens_at + f64::from(active.max(0.0));
    }

    pub fn is_live(&self, now: SimTime) -> bool {
        self.pending && self.opens_at <= now && now <= self.closes_at
    }

    /// Drop a swing that never landed
    pub fn expire(&mut self, now: SimTime) {
        if self.pending && now > self.closes_at {
            self.pending = false;
        }
    }

    pub fn close(&mut self) {
        self.pending = false;
    }
}

/// Next time each target may be punched again
#[derive(Debug, Clone, Default)]
pub struct HitCooldownTable {
    next_allowed: HashMap<Uuid, SimTime>,
}

impl HitCooldownTable {
    pub fn is_ready(&self, target: Uuid, now: SimTime) -> bool {
        self.next_allowed.get(&target).map_or(true, |next| now >= *next)
    }

    pub fn start(&mut self, target: Uuid, until: SimTime) {
        self.next_allowed.insert(target, until);
    }

    /// Remove elapsed entries once the table has grown past `threshold`
    pub fn prune(&mut self, now: SimTime, threshold: usize) {
        if self.next_allowed.len() <= threshold {
            return;
        }
        self.next_allowed.retain(|_, next| *next > now);
    }

    pub fn len(&self) -> usize {
        self.next_allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next_allowed.is_empty()
    }

    pub fn clear(&mut self) {
        self.next_allowed.clear();
    }
}

/// What a strike can see of its target
#[derive(Debug, Clone, Copy)]
pub struct HitTarget {
    pub id: Uuid,
    pub kind: EntityKind,
    pub center_of_mass: Vec3,
}

/// A resolved strike waiting to be applied to its target
#[derive(Debug, Clone)]
pub struct Hit {
    pub attacker_id: Uuid,
    pub target_id: Uuid,
    pub target_kind: EntityKind,
    pub strike: Strike,
    pub impulse: Vec3,
    pub hitstun_seconds: f32,
}

/// Push direction and momentum-scaled magnitude of a strike
pub fn compute_knockback(
    tuning: &KnockbackTuning,
    strike: Strike,
    attacker: &RigidBody,
    target_center: Vec3,
) -> Vec3 {
    let base = tuning.base(strike);
    let facing = attacker.forward();

    let mut push = target_center - attacker.center_of_mass();
    push.y = 0.0;
    if push.length_squared() < DIRECTION_EPSILON_SQ {
        push = Vec3::new(facing.x, 0.0, facing.z);
    }
    let push = push.normalize_or_zero();

    let forward_speed = attacker.horizontal_velocity().dot(facing);
    let mult = (1.0 + forward_speed * tuning.speed_to_multiplier)
        .clamp(tuning.multiplier_min, tuning.multiplier_max.max(tuning.multiplier_min));

    let forward_scale = lerp(1.0, mult, tuning.forward_weight.clamp(0.0, 1.0));
    let up_scale = lerp(1.0, mult, tuning.up_weight.clamp(0.0, 1.0));

    push * (base.forward * forward_scale) + Vec3::Y * (base.up * up_scale)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Per-fighter hit resolution
#[derive(Debug, Clone)]
pub struct CombatResolver {
    tuning: CombatTuning,
    owner_id: Uuid,
    window: HitWindow,
    kick_hits: HashSet<Uuid>,
    punch_cooldowns: HitCooldownTable,
    kick_state_until: SimTime,
    active: bool,
}

impl CombatResolver {
    pub fn new(owner_id: Uuid, tuning: CombatTuning) -> Self {
        Self {
            tuning,
            owner_id,
            window: HitWindow::default(),
            kick_hits: HashSet::new(),
            punch_cooldowns: HitCooldownTable::default(),
            kick_state_until: SimTime::NEG_INFINITY,
            active: true,
        }
    }

    pub fn tuning(&self) -> &CombatTuning {
        &self.tuning
    }

    pub fn window(&self) -> &HitWindow {
        &self.window
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Forget swings, cooldowns and kick state (round restore)
    pub fn reset(&mut self) {
        self.window = HitWindow::default();
        self.kick_hits.clear();
        self.punch_cooldowns.clear();
        self.kick_state_until = SimTime::NEG_INFINITY;
        self.active = true;
    }

    /// Start a swing on a delivered kick edge and expire a missed one.
    /// Returns true if a swing started this tick.
    pub fn update(
        &mut self,
        cmd: &GatedCommand,
        economy: Option<&mut ResourceEconomy>,
        now: SimTime,
    ) -> bool {
        if !self.active {
            return false;
        }

        let mut started = false;
        if cmd.kick_pressed {
            let paid = match economy {
                Some(economy) => economy.try_consume_kick_power(),
                None => true,
            };
            if paid {
                self.window.open(
                    now,
                    self.tuning.kick_windup_seconds,
                    self.tuning.kick_active_window_seconds,
                );
                self.kick_hits.clear();
                self.kick_state_until = now + f64::from(self.tuning.kick_animation_seconds);
                started = true;
            }
        }

        self.window.expire(now);
        started
    }

    /// Server-side stand-in for the attacker's kick animation
    pub fn in_kick_state(&self, now: SimTime) -> bool {
        now < self.kick_state_until
    }

    /// Sphere in front of the attacker that strikes connect through
    pub fn hit_volume(&self, attacker: &RigidBody) -> (Vec3, f32) {
        let mut forward = attacker.forward();
        forward.y = 0.0;
        let center = attacker.center_of_mass() + forward.normalize_or_zero() * self.tuning.hit_reach;
        (center, self.tuning.hit_radius)
    }

    pub fn overlaps(&self, attacker: &RigidBody, target: &RigidBody) -> bool {
        let (center, radius) = self.hit_volume(attacker);
        PhysicsSystem::sphere_overlaps_body(center, radius, target)
    }

    /// Resolve one overlapping target. Kicks take priority over punches;
    /// only punches feed the economy.
    pub fn on_overlap(
        &mut self,
        attacker: &RigidBody,
        punch_held: bool,
        target: &HitTarget,
        economy: Option<&mut ResourceEconomy>,
        now: SimTime,
    ) -> Option<Hit> {
        if !self.active || target.id == self.owner_id || !self.tuning.hittable.accepts(target.kind) {
            return None;
        }

        let kick_ready = self.window.is_live(now)
            && (!self.tuning.require_kick_state_for_hit || self.in_kick_state(now));

        if kick_ready {
            if !self.kick_hits.insert(target.id) {
                return None;
            }
            if self.tuning.kick_single_target {
                self.window.close();
            }
            return Some(self.resolve(attacker, target, Strike::Kick));
        }

        if !punch_held || !self.punch_cooldowns.is_ready(target.id, now) {
            return None;
        }

        self.punch_cooldowns.start(
            target.id,
            now + f64::from(self.tuning.punch_cooldown_per_target),
        );
        self.punch_cooldowns
            .prune(now, self.tuning.cooldown_prune_threshold);

        if let Some(economy) = economy {
            economy.on_punch_landed();
        }

        Some(self.resolve(attacker, target, Strike::Punch))
    }

    fn resolve(&self, attacker: &RigidBody, target: &HitTarget, strike: Strike) -> Hit {
        Hit {
            attacker_id: self.owner_id,
            target_id: target.id,
            target_kind: target.kind,
            strike,
            impulse: compute_knockback(&self.tuning.knockback, strike, attacker, target.center_of_mass),
            hitstun_seconds: self.tuning.hitstun_seconds,
        }
    }
}
