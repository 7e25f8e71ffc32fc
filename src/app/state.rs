//! Application state shared across routes

use std::sync::Arc;

use crate::config::{Config, Tuning};
use crate::game::ArenaRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tuning: Arc<Tuning>,
    pub arenas: Arc<ArenaRegistry>,
}

impl AppState {
    pub fn new(config: Config, tuning: Tuning) -> Self {
        let config = Arc::new(config);
        let tuning = Arc::new(tuning);

        let arenas = Arc::new(ArenaRegistry::new(
            tuning.clone(),
            config.max_players_per_arena,
            config.max_arenas,
        ));

        Self {
            config,
            tuning,
            arenas,
        }
    }
}
