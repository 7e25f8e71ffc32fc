//! Game simulation modules

pub mod arena;
pub mod block;
pub mod combat;
pub mod command;
pub mod elimination;
pub mod fighter;
pub mod input;
pub mod motion;
pub mod physics;
pub mod replicated;
pub mod resources;
pub mod snapshot;

pub use arena::{Arena, ArenaHandle, ArenaRegistry, ArenaState};
pub use command::{Command, CommandBuffer, GatedCommand};
pub use fighter::{Fighter, Prop};
pub use input::{CommandSink, InputReplicator, SendError};
pub use resources::ResourceEconomy;

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Player message received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub user_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}
