//! Reinforcement of decayed relationships
//!
//! Each affirmation adds a diminishing bonus: the i-th reinforcement is
//! worth `bonus * fade^i`. The reinforced value is capped at the recorded
//! original, so reinforcement slows decay but never inflates confidence.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Reinforcement settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReinforcementConfig {
    pub enabled: bool,
    pub bonus: f64,
    pub fade: f64,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bonus: 0.1,
            fade: 0.95,
        }
    }
}

impl ReinforcementConfig {
    /// Reinforcement switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.bonus) {
            return Err(Error::InvalidInput(format!(
                "reinforcement bonus must be within [0, 1], got {}",
                self.bonus
            )));
        }
        if !(0.0..=1.0).contains(&self.fade) {
            return Err(Error::InvalidInput(format!(
                "reinforcement fade must be within [0, 1], got {}",
                self.fade
            )));
        }
        Ok(())
    }
}

/// Totals over every reinforced relationship
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReinforcementStats {
    pub reinforced_relationships: usize,
    pub total_reinforcements: u64,
    pub average_reinforcements: f64,
    /// Sum of the uncapped bonus each relationship has earned
    pub total_reinforcement_bonus: f64,
}

/// Per-relationship affirmation counts
#[derive(Debug, Default)]
pub struct ReinforcementLedger {
    config: ReinforcementConfig,
    counts: Mutex<HashMap<String, u32>>,
}

impl ReinforcementLedger {
    pub fn new(config: ReinforcementConfig) -> Self {
        Self {
            config,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ReinforcementConfig {
        &self.config
    }

    /// Record one affirmation and return the new count (0 when disabled)
    pub fn reinforce(&self, relationship_id: &str) -> u32 {
        if !self.config.enabled {
            return 0;
        }
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(relationship_id.to_string()).or_insert(0);
        *count += 1;
        debug!(relationship_id = %relationship_id, count = *count, "Reinforced relationship");
        *count
    }

    pub fn count(&self, relationship_id: &str) -> u32 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(relationship_id).copied().unwrap_or(0)
    }

    /// Forget every affirmation of a relationship
    pub fn clear(&self, relationship_id: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.remove(relationship_id);
    }

    /// Total bonus earned by `count` affirmations
    ///
    /// Closed form of the geometric series `bonus * fade^i` for `i < count`.
    pub fn boost_for(&self, count: u32) -> f64 {
        let ReinforcementConfig { bonus, fade, .. } = self.config;
        if count == 0 {
            return 0.0;
        }
        let n = f64::from(count);
        if (1.0 - fade).abs() < f64::EPSILON {
            return bonus * n;
        }
        bonus * (1.0 - fade.powf(n)) / (1.0 - fade)
    }

    /// Aggregate affirmation counts
    pub fn stats(&self) -> ReinforcementStats {
        let counts: Vec<u32> = {
            let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
            counts.values().copied().filter(|count| *count > 0).collect()
        };
        let total: u64 = counts.iter().map(|count| u64::from(*count)).sum();
        let average = if counts.is_empty() {
            0.0
        } else {
            total as f64 / counts.len() as f64
        };
        ReinforcementStats {
            reinforced_relationships: counts.len(),
            total_reinforcements: total,
            average_reinforcements: average,
            total_reinforcement_bonus: counts.iter().map(|count| self.boost_for(*count)).sum(),
        }
    }

    /// Apply a relationship's reinforcement to its decayed confidence
    pub fn apply(&self, relationship_id: &str, original: f64, decayed: f64) -> f64 {
        if !self.config.enabled {
            return decayed;
        }
        let count = self.count(relationship_id);
        if count == 0 {
            return decayed;
        }
        (decayed + self.boost_for(count)).min(original)
    }
}
