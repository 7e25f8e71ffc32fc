//! Publish-on-write values replicated to remote observers

use crate::ws::protocol::AnimationRep;

/// A server-owned value that remembers whether it changed since the last
/// time it was published
#[derive(Debug, Clone)]
pub struct Replicated<T> {
    value: T,
    dirty: bool,
}

impl<T: Clone + PartialEq> Replicated<T> {
    /// New values start dirty so the first publish carries them
    pub fn new(value: T) -> Self {
        Self { value, dirty: true }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Write a value; only an actual change marks it for publishing
    pub fn set(&mut self, value: T) {
        if self.value != value {
            self.value = value;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns the value if it changed since the last call
    pub fn take_dirty(&mut self) -> Option<T> {
        if self.dirty {
            self.dirty = false;
            Some(self.value.clone())
        } else {
            None
        }
    }
}

/// Lossy projection of a fighter's command and motion used by observers to
/// animate it
#[derive(Debug, Clone)]
pub struct ReplicatedAnimationState {
    pub run_forward: Replicated<f32>,
    pub run_left: Replicated<f32>,
    pub punching: Replicated<bool>,
    pub blocking: Replicated<bool>,
    pub kick_seq: Replicated<u32>,
    pub run_speed_mult: Replicated<f32>,
}

impl ReplicatedAnimationState {
    pub fn new() -> Self {
        Self {
            run_forward: Replicated::new(0.0),
            run_left: Replicated::new(0.0),
            punching: Replicated::new(false),
            blocking: Replicated::new(false),
            kick_seq: Replicated::new(0),
            run_speed_mult: Replicated::new(1.0),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.run_forward.is_dirty()
            || self.run_left.is_dirty()
            || self.punching.is_dirty()
            || self.blocking.is_dirty()
            || self.kick_seq.is_dirty()
            || self.run_speed_mult.is_dirty()
    }

    /// Force the next publish to carry every field (late joiners)
    pub fn mark_dirty(&mut self) {
        self.run_forward.mark_dirty();
        self.run_left.mark_dirty();
        self.punching.mark_dirty();
        self.blocking.mark_dirty();
        self.kick_seq.mark_dirty();
        self.run_speed_mult.mark_dirty();
    }

    pub fn bump_kick_seq(&mut self) {
        let next = self.kick_seq.get().wrapping_add(1);
        self.kick_seq.set(next);
    }

    pub fn rep(&self) -> AnimationRep {
        AnimationRep {
            run_forward: *self.run_forward.get(),
            run_left: *self.run_left.get(),
            punching: *self.punching.get(),
            blocking: *self.blocking.get(),
            kick_seq: *self.kick_seq.get(),
            run_speed_mult: *self.run_speed_mult.get(),
        }
    }

    /// Full representation if anything changed since the last call
    pub fn take_changes(&mut self) -> Option<AnimationRep> {
        if !self.is_dirty() {
            return None;
        }
        let rep = self.rep();
        self.run_forward.take_dirty();
        self.run_left.take_dirty();
        self.punching.take_dirty();
        self.blocking.take_dirty();
        self.kick_seq.take_dirty();
        self.run_speed_mult.take_dirty();
        Some(rep)
    }
}

impl Default for ReplicatedAnimationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writing_the_same_value_does_not_republish() {
        let mut v = Replicated::new(1.0f32);
        assert_eq!(v.take_dirty(), Some(1.0));
        v.set(1.0);
        assert_eq!(v.take_dirty(), None);
        v.set(0.5);
        assert_eq!(v.take_dirty(), Some(0.5));
    }

    #[test]
    fn animation_changes_are_published_once() {
        let mut anim = ReplicatedAnimationState::new();
        assert!(anim.take_changes().is_some());
        assert!(anim.take_changes().is_none());

        anim.bump_kick_seq();
        let rep = anim.take_changes().expect("kick seq changed");
        assert_eq!(rep.kick_seq, 1);
        assert!(anim.take_changes().is_none());
    }
}
