//! Time utilities for the fixed-step simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Simulation timestamp in seconds since the owning arena started ticking
pub type SimTime = f64;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 50; // fixed physics step of 20ms
pub const SNAPSHOT_TPS: u32 = 25;

/// Fixed delta time for physics (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Monotonic simulation clock, advanced once per tick by the arena loop
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    tick: u64,
    now: SimTime,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one fixed step and return the new time
    pub fn advance(&mut self, dt: f32) -> SimTime {
        self.tick += 1;
        self.now += f64::from(dt);
        self.now
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_by_fixed_steps() {
        let mut clock = SimClock::new();
        for _ in 0..SIMULATION_TPS {
            clock.advance(tick_delta());
        }
        assert_eq!(clock.tick(), SIMULATION_TPS as u64);
        assert!((clock.now() - 1.0).abs() < 1e-5);
    }
}
