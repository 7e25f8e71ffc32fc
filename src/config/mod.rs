//! Configuration module - environment variable parsing and gameplay tuning

pub mod tuning;

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

pub use tuning::Tuning;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Optional JSON file overriding gameplay tunables
    pub tuning_path: Option<String>,
    /// Overrides the round tuning's minimum when set
    pub min_players: Option<usize>,
    pub max_players_per_arena: usize,
    pub max_arenas: usize,
    /// Comma-separated allowed origins for CORS; unset allows any
    pub client_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            tuning_path: env::var("TUNING_PATH").ok().filter(|p| !p.trim().is_empty()),

            min_players: optional_var("MIN_PLAYERS")?,
            max_players_per_arena: optional_var("MAX_PLAYERS_PER_ARENA")?.unwrap_or(8),
            max_arenas: optional_var("MAX_ARENAS")?.unwrap_or(64),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|o| !o.trim().is_empty()),
        })
    }

    /// Built-in tuning, or the file at `TUNING_PATH`, with env overrides applied
    pub fn load_tuning(&self) -> Result<Tuning, ConfigError> {
        let mut tuning = match &self.tuning_path {
            Some(path) => Tuning::load(path)?,
            None => Tuning::default(),
        };
        if let Some(min_players) = self.min_players {
            tuning.round.min_players_to_start = min_players.max(1);
        }
        Ok(tuning)
    }
}

fn optional_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Cannot read tuning file {path}: {source}")]
    TuningUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid tuning JSON: {0}")]
    InvalidTuning(#[from] serde_json::Error),
}
