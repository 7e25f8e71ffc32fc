//! Knockout Arena - authoritative simulation core for a melee knockback arena
//!
//! Fighters move, dash, block, punch and kick on a floating platform; the
//! server owns every body, resolves hits, credits knockouts and runs rounds.
//! Clients only send commands and render the snapshots they receive.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
