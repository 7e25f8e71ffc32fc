//! Knockout attribution and the eliminated/spectating flag

use serde::Deserialize;
use uuid::Uuid;

use crate::util::time::SimTime;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreditTuning {
    /// How long a hit keeps its attacker eligible for the knockout
    pub last_attacker_valid_seconds: f32,
}

impl Default for CreditTuning {
    fn default() -> Self {
        Self {
            last_attacker_valid_seconds: 6.0,
        }
    }
}

/// Last attacker and when they hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackerCredit {
    pub attacker_id: Uuid,
    pub hit_at: SimTime,
}

#[derive(Debug, Clone)]
pub struct EliminationState {
    tuning: CreditTuning,
    credit: Option<AttackerCredit>,
    eliminated: bool,
}

impl EliminationState {
    pub fn new(tuning: CreditTuning) -> Self {
        Self {
            tuning,
            credit: None,
            eliminated: false,
        }
    }

    pub fn is_eliminated(&self) -> bool {
        self.eliminated
    }

    /// Overwrites any earlier credit
    pub fn record_attacker(&mut self, attacker_id: Uuid, now: SimTime) {
        self.credit = Some(AttackerCredit {
            attacker_id,
            hit_at: now,
        });
    }

    pub fn credit(&self) -> Option<AttackerCredit> {
        self.credit
    }

    pub fn credited_attacker_or_none(&self, now: SimTime) -> Option<Uuid> {
        let credit = self.credit?;
        if now - credit.hit_at > f64::from(self.tuning.last_attacker_valid_seconds) {
            return None;
        }
        Some(credit.attacker_id)
    }

    /// Returns false if already eliminated
    pub fn eliminate(&mut self) -> bool {
        if self.eliminated {
            return false;
        }
        self.eliminated = true;
        true
    }

    pub fn restore(&mut self) {
        self.eliminated = false;
        self.credit = None;
    }
}
