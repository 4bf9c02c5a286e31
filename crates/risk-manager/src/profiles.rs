//! In-memory risk profile store
//!
//! Implements [`RiskProfileSource`] over a map that can be edited at
//! runtime. Edits take effect on the next evaluation.

use aegis_core::{RiskProfile, StrategyId};
use aegis_ports::RiskProfileSource;
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<StrategyId, RiskProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: HashMap<StrategyId, RiskProfile>) -> Self {
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    /// Insert or replace a strategy's profile
    pub fn upsert(&self, strategy_id: impl Into<StrategyId>, profile: RiskProfile) {
        let strategy_id = strategy_id.into();
        info!("[RISK] profile updated for {}: {:?}", strategy_id, profile);
        self.profiles.write().insert(strategy_id, profile);
    }

    /// Flip the active flag; returns false if the strategy is unknown
    pub fn set_active(&self, strategy_id: &str, active: bool) -> bool {
        match self.profiles.write().get_mut(strategy_id) {
            Some(profile) => {
                profile.active = active;
                info!(
                    "[RISK] strategy {} {}",
                    strategy_id,
                    if active { "activated" } else { "deactivated" }
                );
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, strategy_id: &str) -> Option<RiskProfile> {
        self.profiles.write().remove(strategy_id)
    }

    pub fn strategies(&self) -> Vec<StrategyId> {
        self.profiles.read().keys().cloned().collect()
    }
}

impl RiskProfileSource for InMemoryProfileStore {
    fn profile(&self, strategy_id: &str) -> Option<RiskProfile> {
        self.profiles.read().get(strategy_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_runtime_updates_visible() {
        let store = InMemoryProfileStore::new();
        assert!(store.profile("s1").is_none());

        store.upsert("s1", RiskProfile::default());
        assert!(store.profile("s1").unwrap().active);

        assert!(store.set_active("s1", false));
        assert!(!store.profile("s1").unwrap().active);
        assert!(!store.set_active("unknown", false));

        store.upsert("s1", RiskProfile::default().with_max_position_size(dec!(3)));
        assert_eq!(store.profile("s1").unwrap().max_position_size, dec!(3));

        assert!(store.remove("s1").is_some());
        assert!(store.profile("s1").is_none());
    }
}
