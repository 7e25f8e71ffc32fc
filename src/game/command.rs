//! Server-side command inbox: edge latching, resource gating and the
//! animation scalars derived from raw input

use glam::Vec2;

use crate::ws::protocol::ClientMsg;

use super::replicated::ReplicatedAnimationState;
use super::resources::ResourceEconomy;

/// Largest look delta accepted from a client in a single command
pub const MAX_LOOK_DELTA: f32 = 1000.0;

/// Per-frame input snapshot as produced by the owning client
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Command {
    /// Strafe (x) and forward (y), each in [-1, 1]
    pub move_dir: Vec2,
    /// Horizontal look delta
    pub look_x: f32,
    pub punch_held: bool,
    pub block_held: bool,
    pub dash_pressed: bool,
    pub kick_pressed: bool,
}

impl Command {
    /// Build from the wire message fields
    pub fn from_wire(
        move_x: f32,
        move_y: f32,
        look_x: f32,
        punch: bool,
        block: bool,
        dash: bool,
        kick: bool,
    ) -> Self {
        Self {
            move_dir: Vec2::new(move_x, move_y),
            look_x,
            punch_held: punch,
            block_held: block,
            dash_pressed: dash,
            kick_pressed: kick,
        }
    }

    /// Force untrusted values into their valid ranges
    pub fn sanitized(self) -> Self {
        fn finite_or_zero(v: f32) -> f32 {
            if v.is_finite() {
                v
            } else {
                0.0
            }
        }

        Self {
            move_dir: Vec2::new(
                finite_or_zero(self.move_dir.x).clamp(-1.0, 1.0),
                finite_or_zero(self.move_dir.y).clamp(-1.0, 1.0),
            ),
            look_x: finite_or_zero(self.look_x).clamp(-MAX_LOOK_DELTA, MAX_LOOK_DELTA),
            ..self
        }
    }
}

impl From<Command> for ClientMsg {
    fn from(cmd: Command) -> Self {
        ClientMsg::Command {
            move_x: cmd.move_dir.x,
            move_y: cmd.move_dir.y,
            look_x: cmd.look_x,
            punch: cmd.punch_held,
            block: cmd.block_held,
            dash: cmd.dash_pressed,
            kick: cmd.kick_pressed,
        }
    }
}

/// Command after resource gating, with one-shot flags latched until consumed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GatedCommand {
    pub move_dir: Vec2,
    pub look_x: f32,
    pub punch_held: bool,
    pub block_held: bool,
    pub dash_pressed: bool,
    pub kick_pressed: bool,
}

/// Authoritative per-fighter inbox. Continuous fields are last-write-wins;
/// dash and kick are OR-latched so a command that arrives between ticks is
/// never lost, only deferred.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    raw: Command,
    gated: GatedCommand,
    dash_queued: bool,
    kick_queued: bool,
    animation: ReplicatedAnimationState,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a client command. A missing economy means no gating.
    pub fn submit(&mut self, raw: Command, economy: Option<&ResourceEconomy>) {
        let raw = raw.sanitized();

        if raw.dash_pressed {
            self.dash_queued = true;
        }
        if raw.kick_pressed {
            self.kick_queued = true;
        }

        self.raw = raw;
        self.regate(economy);

        // Raw holds, not gated ones: observers see attempted input.
        self.animation.run_forward.set(raw.move_dir.y.clamp(-1.0, 1.0));
        self.animation.run_left.set((-raw.move_dir.x).clamp(-1.0, 1.0));
        self.animation.punching.set(raw.punch_held);
        self.animation.blocking.set(raw.block_held);
    }

    /// Recompose the gated command against current resources. Called at the
    /// start of every tick so a queued action fires on the first tick it
    /// becomes affordable.
    pub fn regate(&mut self, economy: Option<&ResourceEconomy>) {
        let allow_block = economy.map_or(true, ResourceEconomy::has_stamina_for_block);
        let allow_dash = economy.map_or(true, ResourceEconomy::has_stamina_for_dash);
        let allow_kick = economy.map_or(true, ResourceEconomy::has_full_power);

        self.gated = GatedCommand {
            move_dir: self.raw.move_dir,
            look_x: self.raw.look_x,
            punch_held: self.raw.punch_held,
            block_held: self.raw.block_held && allow_block,
            dash_pressed: self.dash_queued && allow_dash,
            kick_pressed: self.kick_queued && allow_kick,
        };
    }

    pub fn gated(&self) -> &GatedCommand {
        &self.gated
    }

    pub fn raw(&self) -> &Command {
        &self.raw
    }

    pub fn dash_queued(&self) -> bool {
        self.dash_queued
    }

    pub fn kick_queued(&self) -> bool {
        self.kick_queued
    }

    /// The economy refused a gated dash: withdraw it from this tick so the
    /// latch survives consumption and retries once affordable
    pub fn defer_dash(&mut self) {
        self.gated.dash_pressed = false;
    }

    /// Called once per tick after motion and combat have read the gated
    /// command. Clears every latch that was delivered this tick; a latch the
    /// gate denied stays queued.
    pub fn consume_one_frame_buttons(&mut self) {
        if self.gated.dash_pressed {
            self.dash_queued = false;
        }
        if self.gated.kick_pressed {
            self.kick_queued = false;
            self.animation.bump_kick_seq();
        }

        self.gated.dash_pressed = false;
        self.gated.kick_pressed = false;
    }

    pub fn set_run_speed_mult(&mut self, mult: f32) {
        self.animation.run_speed_mult.set(mult);
    }

    pub fn animation(&self) -> &ReplicatedAnimationState {
        &self.animation
    }

    pub fn animation_mut(&mut self) -> &mut ReplicatedAnimationState {
        &mut self.animation
    }

    /// Drop all pending input (respawn, elimination)
    pub fn clear(&mut self) {
        self.raw = Command::default();
        self.gated = GatedCommand::default();
        self.dash_queued = false;
        self.kick_queued = false;
        self.animation.run_forward.set(0.0);
        self.animation.run_left.set(0.0);
        self.animation.punching.set(false);
        self.animation.blocking.set(false);
    }
}
