//! Snapshot building: transforms every snapshot, animation values only when
//! they changed, resource bars only to their owner

use crate::ws::protocol::{GameEvent, Outbound, ServerMsg};

use super::fighter::{Fighter, Prop};

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    /// Events waiting for the next snapshot
    pending_events: Vec<GameEvent>,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            pending_events: Vec::new(),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Hold events produced on ticks that don't send a snapshot
    pub fn queue_events(&mut self, events: Vec<GameEvent>) {
        self.pending_events.extend(events);
    }

    /// Build a snapshot message, draining queued events
    pub fn build<'a>(
        &mut self,
        tick: u64,
        fighters: impl Iterator<Item = &'a mut Fighter>,
        props: &[Prop],
    ) -> ServerMsg {
        ServerMsg::Snapshot {
            tick,
            fighters: fighters.map(Fighter::snapshot).collect(),
            props: props.iter().map(Prop::snapshot).collect(),
            events: std::mem::take(&mut self.pending_events),
        }
    }

    /// Owner-addressed resource bars for every fighter whose bars changed
    pub fn resource_updates<'a>(fighters: impl Iterator<Item = &'a mut Fighter>) -> Vec<Outbound> {
        fighters
            .filter_map(|fighter| {
                let user_id = fighter.user_id;
                let (stamina, power) = fighter.economy.as_mut()?.take_changes()?;
                Some(Outbound::owner(user_id, ServerMsg::Resources { stamina, power }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tuning::Placement;
    use crate::config::Tuning;
    use crate::ws::protocol::Audience;
    use glam::Vec3;
    use uuid::Uuid;

    fn fighter() -> Fighter {
        Fighter::spawn(
            Uuid::new_v4(),
            "Tester".into(),
            Placement::new(Vec3::ZERO, 0.0),
            &Tuning::default(),
        )
    }

    #[test]
    fn interval_and_force() {
        let mut builder = SnapshotBuilder::new(2);
        assert!(!builder.should_send());
        assert!(builder.should_send());
        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn animation_rides_only_on_change() {
        let mut builder = SnapshotBuilder::new(1);
        let mut fighters = vec![fighter()];

        let first = builder.build(1, fighters.iter_mut(), &[]);
        let second = builder.build(2, fighters.iter_mut(), &[]);

        match (first, second) {
            (
                ServerMsg::Snapshot { fighters: a, .. },
                ServerMsg::Snapshot { fighters: b, .. },
            ) => {
                assert!(a[0].animation.is_some());
                assert!(b[0].animation.is_none());
            }
            _ => panic!("expected snapshots"),
        }
    }

    #[test]
    fn queued_events_are_sent_once() {
        let mut builder = SnapshotBuilder::new(1);
        builder.queue_events(vec![GameEvent::Dash {
            user_id: Uuid::nil(),
        }]);
        let mut fighters: Vec<Fighter> = Vec::new();

        match builder.build(1, fighters.iter_mut(), &[]) {
            ServerMsg::Snapshot { events, .. } => assert_eq!(events.len(), 1),
            _ => panic!("expected snapshot"),
        }
        match builder.build(2, fighters.iter_mut(), &[]) {
            ServerMsg::Snapshot { events, .. } => assert!(events.is_empty()),
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn resources_go_to_owner_only() {
        let mut fighters = vec![fighter()];
        let owner = fighters[0].user_id;

        let updates = SnapshotBuilder::resource_updates(fighters.iter_mut());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].audience, Audience::Owner(owner));

        assert!(SnapshotBuilder::resource_updates(fighters.iter_mut()).is_empty());
    }
}
