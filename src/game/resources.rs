//! Stamina and power economy gating dash, block and kick

use serde::Deserialize;

use super::replicated::Replicated;

/// Economy constants per fighter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceTuning {
    pub max_stamina: f32,
    /// Always-on decay
    pub stamina_decay_per_second: f32,
    /// Passive regeneration, zero disables it
    pub stamina_regen_per_second: f32,
    /// Extra drain while blocking
    pub block_drain_per_second: f32,
    pub dash_stamina_cost: f32,
    pub stamina_min_to_allow_block: f32,
    pub stamina_min_to_allow_dash: f32,
    /// Landed punches needed to unlock a kick
    pub punches_to_full_power: u32,
}

impl Default for ResourceTuning {
    fn default() -> Self {
        Self {
            max_stamina: 100.0,
            stamina_decay_per_second: 2.0,
            stamina_regen_per_second: 0.0,
            block_drain_per_second: 12.0,
            dash_stamina_cost: 25.0,
            stamina_min_to_allow_block: 1.0,
            stamina_min_to_allow_dash: 25.0,
            punches_to_full_power: 3,
        }
    }
}

/// Per-fighter stamina and power pools. None of the operations fail; they
/// clamp or report denial through their return value.
#[derive(Debug, Clone)]
pub struct ResourceEconomy {
    tuning: ResourceTuning,
    stamina: f32,
    punches_landed: u32,
    stamina01: Replicated<f32>,
    power01: Replicated<f32>,
}

impl ResourceEconomy {
    pub fn new(tuning: ResourceTuning) -> Self {
        let mut economy = Self {
            stamina: tuning.max_stamina.max(0.0),
            punches_landed: 0,
            stamina01: Replicated::new(1.0),
            power01: Replicated::new(0.0),
            tuning,
        };
        economy.push_net();
        economy
    }

    pub fn stamina(&self) -> f32 {
        self.stamina
    }

    pub fn max_stamina(&self) -> f32 {
        self.tuning.max_stamina
    }

    /// Landed punches since the last kick
    pub fn power(&self) -> u32 {
        self.punches_landed
    }

    pub fn has_stamina_for_block(&self) -> bool {
        self.stamina >= self.tuning.stamina_min_to_allow_block
    }

    pub fn has_stamina_for_dash(&self) -> bool {
        self.stamina >= self.tuning.stamina_min_to_allow_dash
    }

    pub fn has_full_power(&self) -> bool {
        self.punches_landed >= self.tuning.punches_to_full_power
    }

    /// Passive decay and regen, once per server tick
    pub fn tick(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let delta = (self.tuning.stamina_regen_per_second.max(0.0)
            - self.tuning.stamina_decay_per_second.max(0.0))
            * dt;
        if delta != 0.0 {
            self.stamina = (self.stamina + delta).clamp(0.0, self.tuning.max_stamina.max(0.0));
            self.push_net();
        }
    }

    pub fn drain_for_blocking(&mut self, dt: f32) {
        if dt <= 0.0 || self.tuning.block_drain_per_second <= 0.0 {
            return;
        }
        self.stamina = (self.stamina - self.tuning.block_drain_per_second * dt).max(0.0);
        self.push_net();
    }

    /// Single authority on whether a dash may execute; deducts on success
    pub fn try_spend_dash(&mut self) -> bool {
        if self.stamina < self.tuning.dash_stamina_cost
            || self.stamina < self.tuning.stamina_min_to_allow_dash
        {
            return false;
        }
        self.stamina = (self.stamina - self.tuning.dash_stamina_cost).max(0.0);
        self.push_net();
        true
    }

    pub fn on_punch_landed(&mut self) {
        self.punches_landed = (self.punches_landed + 1).min(self.tuning.punches_to_full_power);
        self.push_net();
    }

    /// Resets power to zero if it was full
    pub fn try_consume_kick_power(&mut self) -> bool {
        if !self.has_full_power() {
            return false;
        }
        self.punches_landed = 0;
        self.push_net();
        true
    }

    /// Back to full stamina and empty power (respawn)
    pub fn reset(&mut self) {
        self.stamina = self.tuning.max_stamina.max(0.0);
        self.punches_landed = 0;
        self.push_net();
    }

    pub fn stamina01(&self) -> f32 {
        *self.stamina01.get()
    }

    pub fn power01(&self) -> f32 {
        *self.power01.get()
    }

    /// Normalized (stamina, power) if either changed since the last call
    pub fn take_changes(&mut self) -> Option<(f32, f32)> {
        if !self.stamina01.is_dirty() && !self.power01.is_dirty() {
            return None;
        }
        self.stamina01.take_dirty();
        self.power01.take_dirty();
        Some((self.stamina01(), self.power01()))
    }

    pub fn mark_dirty(&mut self) {
        self.stamina01.mark_dirty();
        self.power01.mark_dirty();
    }

    fn push_net(&mut self) {
        let stamina01 = if self.tuning.max_stamina <= 0.0 {
            0.0
        } else {
            (self.stamina / self.tuning.max_stamina).clamp(0.0, 1.0)
        };
        let power01 = if self.tuning.punches_to_full_power == 0 {
            0.0
        } else {
            (self.punches_landed as f32 / self.tuning.punches_to_full_power as f32).clamp(0.0, 1.0)
        };
        self.stamina01.set(stamina01);
        self.power01.set(power01);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn economy_with_stamina(stamina: f32) -> ResourceEconomy {
        let mut economy = ResourceEconomy::new(ResourceTuning::default());
        economy.stamina = stamina;
        economy.push_net();
        economy
    }

    #[test]
    fn dash_denied_below_threshold_leaves_stamina() {
        for stamina in [0.0, 1.0, 12.5, 24.99] {
            let mut economy = economy_with_stamina(stamina);
            assert!(!economy.try_spend_dash());
            assert_eq!(economy.stamina(), stamina);
        }
    }

    #[test]
    fn dash_spends_exact_cost_once() {
        let mut economy = economy_with_stamina(40.0);
        assert!(economy.try_spend_dash());
        assert!((economy.stamina() - 15.0).abs() < 1e-5);
        assert!(!economy.try_spend_dash());
        assert!((economy.stamina() - 15.0).abs() < 1e-5);
    }

    #[test]
    fn dash_threshold_above_cost_is_respected() {
        let tuning = ResourceTuning {
            dash_stamina_cost: 10.0,
            stamina_min_to_allow_dash: 30.0,
            ..ResourceTuning::default()
        };
        let mut economy = ResourceEconomy::new(tuning);
        economy.stamina = 20.0;
        assert!(!economy.try_spend_dash());
        assert_eq!(economy.stamina(), 20.0);
    }

    #[test]
    fn three_punches_fill_power_and_kick_resets_it() {
        let mut economy = ResourceEconomy::new(ResourceTuning::default());
        assert!(!economy.try_consume_kick_power());

        for _ in 0..3 {
            economy.on_punch_landed();
        }
        economy.on_punch_landed();
        assert_eq!(economy.power(), 3);
        assert_eq!(economy.power01(), 1.0);

        assert!(economy.try_consume_kick_power());
        assert_eq!(economy.power(), 0);
        assert!(!economy.try_consume_kick_power());
    }

    #[test]
    fn decay_floors_at_zero() {
        let mut economy = economy_with_stamina(1.0);
        economy.tick(10.0);
        assert_eq!(economy.stamina(), 0.0);
        assert_eq!(economy.stamina01(), 0.0);
    }

    #[test]
    fn regen_caps_at_max() {
        let tuning = ResourceTuning {
            stamina_decay_per_second: 0.0,
            stamina_regen_per_second: 50.0,
            ..ResourceTuning::default()
        };
        let mut economy = ResourceEconomy::new(tuning);
        economy.stamina = 90.0;
        economy.tick(1.0);
        assert_eq!(economy.stamina(), 100.0);
    }

    #[test]
    fn block_drain_is_rate_times_dt() {
        let mut economy = ResourceEconomy::new(ResourceTuning::default());
        economy.drain_for_blocking(0.5);
        assert!((economy.stamina() - 94.0).abs() < 1e-4);
        assert!(economy.has_stamina_for_block());
    }

    #[test]
    fn replicated_bars_are_normalized() {
        let mut economy = economy_with_stamina(50.0);
        economy.on_punch_landed();
        let (stamina, power) = economy.take_changes().expect("changed");
        assert!((stamina - 0.5).abs() < 1e-6);
        assert!((power - 1.0 / 3.0).abs() < 1e-6);
        assert!(economy.take_changes().is_none());
    }
}
