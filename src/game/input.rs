//! Client-side input replication: smooths movement and forwards one command
//! per frame to the server

use glam::Vec2;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::ws::protocol::ClientMsg;

use super::command::Command;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputTuning {
    /// Exponential smoothing rate for the move vector (per second)
    pub move_smoothing: f32,
}

impl Default for InputTuning {
    fn default() -> Self {
        Self {
            move_smoothing: 18.0,
        }
    }
}

/// Failure to hand a command to the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error("Outbound queue is full")]
    QueueFull,
}

/// Where a replicator's commands go
pub trait CommandSink {
    fn send_command(&mut self, command: Command) -> Result<(), SendError>;
}

impl CommandSink for mpsc::Sender<ClientMsg> {
    fn send_command(&mut self, command: Command) -> Result<(), SendError> {
        self.try_send(command.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::NotConnected,
        })
    }
}

/// Per-fighter input forwarder. Only does anything for the locally
/// controlled fighter.
#[derive(Debug, Clone)]
pub struct InputReplicator {
    tuning: InputTuning,
    locally_controlled: bool,
    enabled: bool,
    move_raw: Vec2,
    move_smoothed: Vec2,
    look_x: f32,
    punch_held: bool,
    block_held: bool,
    dash_pressed: bool,
    kick_pressed: bool,
}

impl InputReplicator {
    pub fn new(tuning: InputTuning, locally_controlled: bool) -> Self {
        Self {
            tuning,
            locally_controlled,
            enabled: true,
            move_raw: Vec2::ZERO,
            move_smoothed: Vec2::ZERO,
            look_x: 0.0,
            punch_held: false,
            block_held: false,
            dash_pressed: false,
            kick_pressed: false,
        }
    }

    pub fn is_locally_controlled(&self) -> bool {
        self.locally_controlled
    }

    /// Disabled while spectating
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.move_raw = Vec2::ZERO;
            self.move_smoothed = Vec2::ZERO;
            self.look_x = 0.0;
            self.punch_held = false;
            self.block_held = false;
            self.dash_pressed = false;
            self.kick_pressed = false;
        }
    }

    pub fn on_move(&mut self, raw: Vec2) {
        self.move_raw = raw;
    }

    pub fn on_look(&mut self, delta_x: f32) {
        self.look_x += delta_x;
    }

    pub fn on_punch(&mut self, held: bool) {
        self.punch_held = held;
    }

    pub fn on_block(&mut self, held: bool) {
        self.block_held = held;
    }

    pub fn on_dash(&mut self) {
        self.dash_pressed = true;
    }

    pub fn on_kick(&mut self) {
        self.kick_pressed = true;
    }

    pub fn smoothed_move(&self) -> Vec2 {
        self.move_smoothed
    }

    /// Advance smoothing and send this frame's command. Edges and the look
    /// delta are cleared only once the sink accepts the command.
    pub fn frame(&mut self, dt: f32, sink: &mut impl CommandSink) -> Option<Command> {
        if !self.locally_controlled || !self.enabled {
            return None;
        }

        let t = 1.0 - (-self.tuning.move_smoothing * dt.max(0.0)).exp();
        self.move_smoothed += (self.move_raw - self.move_smoothed) * t;

        let command = Command {
            move_dir: self.move_smoothed,
            look_x: self.look_x,
            punch_held: self.punch_held,
            block_held: self.block_held,
            dash_pressed: self.dash_pressed,
            kick_pressed: self.kick_pressed,
        };

        match sink.send_command(command) {
            Ok(()) => {
                self.dash_pressed = false;
                self.kick_pressed = false;
                self.look_x = 0.0;
                Some(command)
            }
            Err(e) => {
                debug!(error = %e, "Command not sent");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Command>,
        offline: bool,
    }

    impl CommandSink for Recorder {
        fn send_command(&mut self, command: Command) -> Result<(), SendError> {
            if self.offline {
                return Err(SendError::NotConnected);
            }
            self.sent.push(command);
            Ok(())
        }
    }

    #[test]
    fn smoothing_approaches_raw_exponentially() {
        let mut input = InputReplicator::new(InputTuning::default(), true);
        let mut sink = Recorder::default();
        input.on_move(Vec2::new(0.0, 1.0));

        let cmd = input.frame(0.02, &mut sink).unwrap();
        let expected = 1.0 - (-18.0f32 * 0.02).exp();
        assert!((cmd.move_dir.y - expected).abs() < 1e-6);

        for _ in 0..100 {
            input.frame(0.02, &mut sink);
        }
        assert!((input.smoothed_move().y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn edges_and_look_are_sent_once() {
        let mut input = InputReplicator::new(InputTuning::default(), true);
        let mut sink = Recorder::default();
        input.on_dash();
        input.on_look(3.0);
        input.on_look(2.0);
        input.on_punch(true);

        let first = input.frame(0.016, &mut sink).unwrap();
        assert!(first.dash_pressed);
        assert_eq!(first.look_x, 5.0);

        let second = input.frame(0.016, &mut sink).unwrap();
        assert!(!second.dash_pressed);
        assert_eq!(second.look_x, 0.0);
        assert!(second.punch_held);
    }

    #[test]
    fn failed_send_keeps_edges() {
        let mut input = InputReplicator::new(InputTuning::default(), true);
        let mut sink = Recorder {
            offline: true,
            ..Recorder::default()
        };
        input.on_kick();
        assert!(input.frame(0.016, &mut sink).is_none());

        sink.offline = false;
        assert!(input.frame(0.016, &mut sink).unwrap().kick_pressed);
    }

    #[test]
    fn remote_fighters_produce_nothing() {
        let mut input = InputReplicator::new(InputTuning::default(), false);
        let mut sink = Recorder::default();
        input.on_kick();
        assert!(input.frame(0.016, &mut sink).is_none());
        assert!(sink.sent.is_empty());
    }

    #[tokio::test]
    async fn channel_sink_carries_wire_commands() {
        let (mut tx, mut rx) = mpsc::channel(4);
        let mut input = InputReplicator::new(InputTuning::default(), true);
        input.on_block(true);
        input.frame(0.016, &mut tx);

        match rx.recv().await {
            Some(ClientMsg::Command { block, dash, .. }) => {
                assert!(block);
                assert!(!dash);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        drop(rx);
        assert!(matches!(
            tx.send_command(Command::default()),
            Err(SendError::NotConnected)
        ));
    }
}
