//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to join an arena
    JoinArena {
        /// Preferred display name, trimmed and truncated server-side
        display_name: Option<String>,
    },

    /// Per-frame input snapshot
    Command {
        /// Smoothed strafe input (-1.0 = left, 1.0 = right)
        move_x: f32,
        /// Smoothed forward input (-1.0 = back, 1.0 = forward)
        move_y: f32,
        /// Horizontal look delta accumulated since the previous command
        look_x: f32,
        punch: bool,
        block: bool,
        /// Dash pressed since the previous command
        dash: bool,
        /// Kick pressed since the previous command
        kick: bool,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current arena
    LeaveArena,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { user_id: Uuid, server_time: u64 },

    /// Confirmation of arena join
    ArenaJoined {
        arena_id: Uuid,
        /// All players in the arena at join time
        players: Vec<PlayerInfo>,
        phase: RoundPhase,
    },

    /// Player joined the arena
    PlayerJoined { player: PlayerInfo },

    /// Player left the arena
    PlayerLeft { user_id: Uuid, reason: String },

    /// Arena state snapshot (sent at regular intervals)
    Snapshot {
        /// Server tick number
        tick: u64,
        fighters: Vec<FighterSnapshot>,
        props: Vec<PropSnapshot>,
        /// Events that occurred since last snapshot
        events: Vec<GameEvent>,
    },

    /// Normalized resource bars, sent only to the owning player
    Resources { stamina: f32, power: f32 },

    /// Round phase changed
    RoundState {
        phase: RoundPhase,
        /// Seconds left in the current round (0 outside of a round)
        time_remaining: f32,
        players: Vec<PlayerInfo>,
    },

    /// The receiving player was knocked out and is now spectating
    EnterSpectator { x: f32, y: f32, z: f32, yaw: f32 },

    /// The receiving player is back in play
    ExitSpectator,

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Round lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    WaitingForPlayers,
    InRound,
    RoundEnd,
}

/// Player info for lobby/join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub user_id: Uuid,
    pub display_name: String,
    pub knockouts: u32,
}

/// Animation-driving values; the only per-fighter state observers see
/// besides the transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationRep {
    /// Forward run blend (-1..1)
    pub run_forward: f32,
    /// Lateral run blend (-1..1), positive is left
    pub run_left: f32,
    pub punching: bool,
    pub blocking: bool,
    /// Incremented once per kick swing; observers trigger on change
    pub kick_seq: u32,
    pub run_speed_mult: f32,
}

/// Fighter state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FighterSnapshot {
    pub user_id: Uuid,
    /// Base position
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Facing in radians around +Y
    pub yaw: f32,
    /// False while spectating
    pub active: bool,
    /// Present only when any animation value changed since the last snapshot
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub animation: Option<AnimationRep>,
}

/// Hittable prop state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropSnapshot {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

/// Melee attack kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strike {
    Punch,
    Kick,
}

/// Game events (hits, knockouts, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Dash executed
    Dash { user_id: Uuid },

    /// Kick swing started (power consumed)
    KickStarted { user_id: Uuid },

    /// Hit registered and knockback applied
    Hit {
        attacker_id: Uuid,
        target_id: Uuid,
        strike: Strike,
        impulse: [f32; 3],
    },

    /// Fighter left the arena bounds
    Knockout {
        victim_id: Uuid,
        /// Last attacker if the hit is still within the credit window
        credited_attacker_id: Option<Uuid>,
    },
}

/// Who receives an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    Owner(Uuid),
}

impl Audience {
    pub fn includes(&self, user_id: Uuid) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Owner(owner) => *owner == user_id,
        }
    }
}

/// A server message tagged with its audience
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn everyone(msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Everyone,
            msg,
        }
    }

    pub fn owner(user_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Owner(user_id),
            msg,
        }
    }
}
