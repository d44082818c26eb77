//! Per-kind capacity, expiry and cooldown configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::entity::{NamedEntity, Scope};

/// Configuration for one kind of entity (homes, mail, bounties...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KindConfig {
    /// Maximum entities per owner scope. `None` = unbounded. Never applied to
    /// the global scope.
    #[serde(default)]
    pub max_per_owner: Option<usize>,
    #[serde(default)]
    pub expiry_seconds: Option<u64>,
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
}

impl KindConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_per_owner(mut self, max: usize) -> Self {
        self.max_per_owner = Some(max);
        self
    }

    pub fn with_expiry_seconds(mut self, secs: u64) -> Self {
        self.expiry_seconds = Some(secs);
        self
    }

    pub fn with_cooldown_seconds(mut self, secs: u64) -> Self {
        self.cooldown_seconds = Some(secs);
        self
    }

    /// Capacity limit that applies to `scope`.
    pub fn capacity_for(&self, scope: &Scope) -> Option<usize> {
        match scope {
            Scope::Global => None,
            Scope::Owner(_) => self.max_per_owner,
        }
    }

    pub fn expiry(&self) -> ExpiryPolicy {
        ExpiryPolicy {
            max_age_millis: self
                .expiry_seconds
                .map(|s| i64::try_from(s.saturating_mul(1000)).unwrap_or(i64::MAX)),
        }
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown_seconds.map(Duration::from_secs)
    }
}

/// Age limit for entities, measured from `created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryPolicy {
    max_age_millis: Option<i64>,
}

impl ExpiryPolicy {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_expired(&self, entity: &NamedEntity, now_millis: i64) -> bool {
        match self.max_age_millis {
            Some(max) => now_millis.saturating_sub(entity.created_at) > max,
            None => false,
        }
    }

    /// Move expired entities out of `entities`, returning them.
    pub fn split_expired(&self, entities: &mut Vec<NamedEntity>, now_millis: i64) -> Vec<NamedEntity> {
        let (live, expired) = std::mem::take(entities)
            .into_iter()
            .partition(|e| !self.is_expired(e, now_millis));
        *entities = live;
        expired
    }
}
