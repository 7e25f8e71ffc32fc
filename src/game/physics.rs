//! Rigid-body collaborator: upright capsule bodies, impulse application,
//! gravity integration against the arena floor and overlap queries

use glam::{EulerRot, Quat, Vec3};
use serde::Deserialize;

pub const GRAVITY: f32 = -9.81;

/// Squared length under which a direction is treated as zero
pub const DIRECTION_EPSILON_SQ: f32 = 0.0001;

/// Upright capsule dimensions
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BodyShape {
    pub radius: f32,
    pub height: f32,
}

impl Default for BodyShape {
    fn default() -> Self {
        Self {
            radius: 0.4,
            height: 1.8,
        }
    }
}

/// Minimal rigid body; `position` is the base of the capsule
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub mass: f32,
    /// Kinematic bodies ignore impulses and gravity
    pub kinematic: bool,
    pub shape: BodyShape,
}

impl RigidBody {
    pub fn new(position: Vec3, yaw: f32, mass: f32, shape: BodyShape) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            rotation: Quat::from_rotation_y(yaw),
            mass: mass.max(0.01),
            kinematic: false,
            shape,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn yaw(&self) -> f32 {
        self.rotation.to_euler(EulerRot::YXZ).0
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.position + Vec3::Y * (self.shape.height * 0.5)
    }

    pub fn horizontal_velocity(&self) -> Vec3 {
        Vec3::new(self.velocity.x, 0.0, self.velocity.z)
    }

    /// Instant velocity change of `impulse / mass`
    pub fn add_impulse(&mut self, impulse: Vec3) {
        if self.kinematic {
            return;
        }
        self.velocity += impulse / self.mass;
    }

    /// Teleport, zero velocity and stop simulating
    pub fn freeze_at(&mut self, position: Vec3, yaw: f32) {
        self.position = position;
        self.rotation = Quat::from_rotation_y(yaw);
        self.velocity = Vec3::ZERO;
        self.kinematic = true;
    }

    /// Teleport and resume simulating
    pub fn respawn_at(&mut self, position: Vec3, yaw: f32) {
        self.position = position;
        self.rotation = Quat::from_rotation_y(yaw);
        self.velocity = Vec3::ZERO;
        self.kinematic = false;
    }
}

/// Downward proximity test from just above a body's base
pub trait GroundProbe {
    fn is_grounded(&self, body: &RigidBody) -> bool;
}

/// Circular arena platform
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArenaFloor {
    pub center: Vec3,
    pub radius: f32,
    /// Height of the walkable surface
    pub top_y: f32,
    pub probe_radius: f32,
    pub probe_distance: f32,
}

impl Default for ArenaFloor {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 12.0,
            top_y: 0.0,
            probe_radius: 0.25,
            probe_distance: 0.28,
        }
    }
}

/// Probe origin offset above the body base
const PROBE_LIFT: f32 = 0.05;

impl ArenaFloor {
    pub fn is_over_floor(&self, position: Vec3) -> bool {
        let dx = position.x - self.center.x;
        let dz = position.z - self.center.z;
        dx * dx + dz * dz <= self.radius * self.radius
    }
}

impl GroundProbe for ArenaFloor {
    fn is_grounded(&self, body: &RigidBody) -> bool {
        let origin = body.position + Vec3::Y * PROBE_LIFT;
        let dx = origin.x - self.center.x;
        let dz = origin.z - self.center.z;
        let reach = self.radius + self.probe_radius;
        if dx * dx + dz * dz > reach * reach {
            return false;
        }
        // Sphere swept downward: the surface must lie within the sweep.
        let gap = origin.y - self.top_y;
        gap >= -self.probe_radius && gap <= self.probe_radius + self.probe_distance
    }
}

/// Physics system for integrating bodies and answering overlap queries
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Gravity, position integration and floor contact
    pub fn integrate(body: &mut RigidBody, floor: &ArenaFloor, dt: f32) {
        if body.kinematic {
            return;
        }

        let previous_y = body.position.y;
        body.velocity.y += GRAVITY * dt;
        body.position += body.velocity * dt;

        // Only land on the platform from above; once below the lip a body
        // keeps falling.
        if floor.is_over_floor(body.position)
            && body.position.y < floor.top_y
            && previous_y >= floor.top_y - floor.probe_radius
        {
            body.position.y = floor.top_y;
            if body.velocity.y < 0.0 {
                body.velocity.y = 0.0;
            }
        }
    }

    /// Check overlap between two upright capsules
    pub fn check_body_collision(a: &RigidBody, b: &RigidBody) -> bool {
        let dx = b.position.x - a.position.x;
        let dz = b.position.z - a.position.z;
        let combined = a.shape.radius + b.shape.radius;
        let vertical = a.position.y < b.position.y + b.shape.height
            && b.position.y < a.position.y + a.shape.height;
        vertical && dx * dx + dz * dz <= combined * combined
    }

    /// Push two overlapping bodies apart horizontally, half each
    pub fn resolve_body_collision(a: &mut RigidBody, b: &mut RigidBody) {
        let dx = b.position.x - a.position.x;
        let dz = b.position.z - a.position.z;
        let dist = (dx * dx + dz * dz).sqrt();
        let combined = a.shape.radius + b.shape.radius;

        if dist < 0.001 {
            // Same spot, push apart along X
            a.position.x -= a.shape.radius;
            b.position.x += b.shape.radius;
            return;
        }

        let overlap = combined - dist;
        if overlap <= 0.0 {
            return;
        }

        let nx = dx / dist;
        let nz = dz / dist;
        let push = overlap / 2.0 + 0.01;

        if !a.kinematic {
            a.position.x -= nx * push;
            a.position.z -= nz * push;
        }
        if !b.kinematic {
            b.position.x += nx * push;
            b.position.z += nz * push;
        }
    }

    /// Sphere against upright capsule
    pub fn sphere_overlaps_body(center: Vec3, radius: f32, body: &RigidBody) -> bool {
        let r = body.shape.radius;
        let bottom = body.position + Vec3::Y * r;
        let top = body.position + Vec3::Y * (body.shape.height - r).max(r);
        let closest = closest_point_on_segment(center, bottom, top);
        let reach = radius + r;
        center.distance_squared(closest) <= reach * reach
    }

    /// Move `current` toward `target` by at most `max_delta`
    pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
        let delta = target - current;
        let dist = delta.length();
        if dist <= max_delta || dist < f32::EPSILON {
            target
        } else {
            current + delta / dist * max_delta
        }
    }
}

fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_at(position: Vec3) -> RigidBody {
        RigidBody::new(position, 0.0, 1.0, BodyShape::default())
    }

    #[test]
    fn impulse_is_scaled_by_mass() {
        let mut body = RigidBody::new(Vec3::ZERO, 0.0, 2.0, BodyShape::default());
        body.add_impulse(Vec3::new(4.0, 2.0, 0.0));
        assert_eq!(body.velocity, Vec3::new(2.0, 1.0, 0.0));

        body.kinematic = true;
        body.add_impulse(Vec3::X * 10.0);
        assert_eq!(body.velocity, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn body_rests_on_floor_and_falls_off_edge() {
        let floor = ArenaFloor::default();
        let mut body = body_at(Vec3::ZERO);
        for _ in 0..10 {
            PhysicsSystem::integrate(&mut body, &floor, 0.02);
        }
        assert_eq!(body.position.y, 0.0);
        assert!(floor.is_grounded(&body));

        let mut off = body_at(Vec3::new(20.0, 0.0, 0.0));
        for _ in 0..10 {
            PhysicsSystem::integrate(&mut off, &floor, 0.02);
        }
        assert!(off.position.y < 0.0);
        assert!(!floor.is_grounded(&off));
    }

    #[test]
    fn airborne_body_is_not_grounded() {
        let floor = ArenaFloor::default();
        let body = body_at(Vec3::new(0.0, 1.0, 0.0));
        assert!(!floor.is_grounded(&body));
    }

    #[test]
    fn yaw_rotates_forward_toward_right() {
        let body = RigidBody::new(Vec3::ZERO, std::f32::consts::FRAC_PI_2, 1.0, BodyShape::default());
        assert!((body.forward() - Vec3::X).length() < 1e-5);
        assert!((body.yaw() - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn overlapping_bodies_are_pushed_apart() {
        let mut a = body_at(Vec3::ZERO);
        let mut b = body_at(Vec3::new(0.5, 0.0, 0.0));
        assert!(PhysicsSystem::check_body_collision(&a, &b));
        PhysicsSystem::resolve_body_collision(&mut a, &mut b);
        assert!(!PhysicsSystem::check_body_collision(&a, &b));
    }

    #[test]
    fn sphere_hits_capsule_side() {
        let body = body_at(Vec3::ZERO);
        assert!(PhysicsSystem::sphere_overlaps_body(Vec3::new(0.7, 1.0, 0.0), 0.35, &body));
        assert!(!PhysicsSystem::sphere_overlaps_body(Vec3::new(1.0, 1.0, 0.0), 0.35, &body));
    }

    #[test]
    fn move_towards_does_not_overshoot() {
        let v = PhysicsSystem::move_towards(Vec3::ZERO, Vec3::X * 6.0, 0.8);
        assert!((v.x - 0.8).abs() < 1e-6);
        let v = PhysicsSystem::move_towards(Vec3::X * 5.5, Vec3::X * 6.0, 0.8);
        assert_eq!(v, Vec3::X * 6.0);
    }
}
