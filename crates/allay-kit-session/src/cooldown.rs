//! Per-owner action cooldowns. Never persisted.

use std::collections::HashMap;
use std::time::Duration;

use allay_kit_store::{now_millis, OwnerId};
use dashmap::DashMap;

use crate::lifecycle::{SessionEffect, TransientRegistry};

/// owner → action → time of last use (Unix millis).
pub struct CooldownRegistry {
    label: String,
    last_used: DashMap<OwnerId, HashMap<String, i64>>,
}

impl CooldownRegistry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_used: DashMap::new(),
        }
    }

    /// Start `action`'s cooldown unless it is still running, in which case
    /// the remaining wait is returned.
    pub fn try_start(&self, owner: OwnerId, action: &str, cooldown: Duration) -> Result<(), Duration> {
        self.try_start_at(owner, action, cooldown, now_millis())
    }

    pub fn try_start_at(
        &self,
        owner: OwnerId,
        action: &str,
        cooldown: Duration,
        now_millis: i64,
    ) -> Result<(), Duration> {
        let mut actions = self.last_used.entry(owner).or_default();
        if let Some(remaining) = remaining(actions.get(action).copied(), cooldown, now_millis) {
            return Err(remaining);
        }
        actions.insert(action.to_string(), now_millis);
        Ok(())
    }

    pub fn remaining_at(
        &self,
        owner: OwnerId,
        action: &str,
        cooldown: Duration,
        now_millis: i64,
    ) -> Option<Duration> {
        let last = self.last_used.get(&owner)?.get(action).copied();
        remaining(last, cooldown, now_millis)
    }

    pub fn is_tracking(&self, owner: OwnerId) -> bool {
        self.last_used.contains_key(&owner)
    }

    /// Forget everything about `owner`. Returns whether anything was held.
    pub fn purge(&self, owner: OwnerId) -> bool {
        self.last_used.remove(&owner).is_some()
    }
}

fn remaining(last: Option<i64>, cooldown: Duration, now_millis: i64) -> Option<Duration> {
    let last = last?;
    let ends = last.saturating_add(cooldown.as_millis() as i64);
    (now_millis < ends).then(|| Duration::from_millis((ends - now_millis) as u64))
}

impl TransientRegistry for CooldownRegistry {
    fn label(&self) -> &str {
        &self.label
    }

    fn end_session(&self, owner: OwnerId) -> Vec<SessionEffect> {
        self.purge(owner);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const P: OwnerId = Uuid::from_u128(1);

    #[test]
    fn second_use_within_cooldown_is_refused() {
        let reg = CooldownRegistry::new("home");
        let cd = Duration::from_secs(3);
        reg.try_start_at(P, "home", cd, 10_000).unwrap();
        assert_eq!(
            reg.try_start_at(P, "home", cd, 11_000),
            Err(Duration::from_millis(2_000))
        );
        assert!(reg.try_start_at(P, "home", cd, 13_000).is_ok());
    }

    #[test]
    fn actions_are_independent() {
        let reg = CooldownRegistry::new("misc");
        let cd = Duration::from_secs(10);
        reg.try_start_at(P, "home", cd, 0).unwrap();
        assert!(reg.try_start_at(P, "warp", cd, 1).is_ok());
        assert_eq!(reg.remaining_at(P, "warp", cd, 5_001), Some(Duration::from_millis(5_000)));
        assert_eq!(reg.remaining_at(P, "tpa", cd, 0), None);
    }

    #[test]
    fn session_end_purges() {
        let reg = CooldownRegistry::new("home");
        reg.try_start(P, "home", Duration::from_secs(60)).unwrap();
        assert!(reg.is_tracking(P));
        assert!(reg.end_session(P).is_empty());
        assert!(!reg.is_tracking(P));
        assert!(reg.try_start(P, "home", Duration::from_secs(60)).is_ok());
    }
}
