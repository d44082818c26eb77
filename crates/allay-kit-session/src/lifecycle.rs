//! Session begin/end handling for owners.

use std::sync::Arc;

use allay_kit_api::ItemStack;
use allay_kit_store::{EntityStore, OwnerId, StoreError};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info};

/// Something the host must do for a player after a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    Notify { recipient: OwnerId, message: String },
    Refund { recipient: OwnerId, items: Vec<ItemStack> },
}

/// Persistent per-owner state that may hold unsaved changes.
pub trait OwnerScoped: Send + Sync {
    fn label(&self) -> &str;
    /// Write the owner's buffered changes, if any.
    fn flush_owner(&self, owner: OwnerId) -> Result<bool, StoreError>;
    /// Make the owner's records resident. Returns how many there are.
    fn warm(&self, owner: OwnerId) -> usize;
}

impl OwnerScoped for EntityStore {
    fn label(&self) -> &str {
        EntityStore::label(self)
    }

    fn flush_owner(&self, owner: OwnerId) -> Result<bool, StoreError> {
        EntityStore::flush_owner(self, owner)
    }

    fn warm(&self, owner: OwnerId) -> usize {
        EntityStore::warm(self, owner)
    }
}

/// Transient per-owner state: cooldowns, pending requests, joint sessions.
pub trait TransientRegistry: Send + Sync {
    fn label(&self) -> &str;
    /// Drop everything held for `owner`, cancelling joint sessions and
    /// reporting what the other parties must be told or given back.
    fn end_session(&self, owner: OwnerId) -> Vec<SessionEffect>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Online,
    Offline,
}

/// What a session end did.
#[derive(Debug, Default)]
pub struct SessionEndReport {
    pub effects: Vec<SessionEffect>,
    /// Labels of stores whose flush failed.
    pub failed_flushes: Vec<String>,
    /// The owner was already offline (repeated delivery).
    pub repeated: bool,
}

/// Keeps owner-scoped state consistent across session boundaries.
///
/// Calls for one owner are serialized: an end runs to completion before a
/// following start for the same owner begins, and vice versa.
pub struct SessionLifecycleHook {
    stores: Vec<Arc<dyn OwnerScoped>>,
    registries: Vec<Arc<dyn TransientRegistry>>,
    presence: DashMap<OwnerId, Arc<Mutex<Presence>>>,
}

impl SessionLifecycleHook {
    pub fn new() -> Self {
        Self {
            stores: Vec::new(),
            registries: Vec::new(),
            presence: DashMap::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn OwnerScoped>) -> Self {
        self.stores.push(store);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn TransientRegistry>) -> Self {
        self.registries.push(registry);
        self
    }

    fn gate(&self, owner: OwnerId) -> Arc<Mutex<Presence>> {
        self.presence
            .entry(owner)
            .or_insert_with(|| Arc::new(Mutex::new(Presence::Offline)))
            .clone()
    }

    pub fn is_online(&self, owner: OwnerId) -> bool {
        self.presence
            .get(&owner)
            .map(|p| *p.lock() == Presence::Online)
            .unwrap_or(false)
    }

    /// Pre-warm the owner's stores. Returns the number of resident records.
    pub fn on_session_start(&self, owner: OwnerId) -> usize {
        let gate = self.gate(owner);
        let mut presence = gate.lock();
        let resident = self.stores.iter().map(|s| s.warm(owner)).sum();
        *presence = Presence::Online;
        debug!("Session start for {owner}: {resident} records resident");
        resident
    }

    /// Flush the owner's buffered writes, then purge transient state and
    /// cancel joint sessions. Flush failures are logged and never stop the
    /// cleanup. Safe to call repeatedly.
    pub fn on_session_end(&self, owner: OwnerId) -> SessionEndReport {
        let gate = self.gate(owner);
        let mut presence = gate.lock();
        let mut report = SessionEndReport {
            repeated: *presence == Presence::Offline,
            ..Default::default()
        };

        for store in &self.stores {
            match store.flush_owner(owner) {
                Ok(true) => info!("Flushed pending {} writes for {owner}", store.label()),
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to flush {} for {owner} on session end: {e}", store.label());
                    report.failed_flushes.push(store.label().to_string());
                }
            }
        }

        for registry in &self.registries {
            let effects = registry.end_session(owner);
            if !effects.is_empty() {
                debug!("{}: {} effects for {owner}", registry.label(), effects.len());
            }
            report.effects.extend(effects);
        }

        *presence = Presence::Offline;
        report
    }
}

impl Default for SessionLifecycleHook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::CooldownRegistry;
    use crate::trade::{TradeOffers, TradeRegistry};
    use allay_kit_store::{
        DocumentLayout, ExpiryPolicy, JsonDocument, KindConfig, Location, NamedEntity,
        PersistenceGateway, Scope, Snapshot, SnapshotSource,
    };
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    const U1: OwnerId = Uuid::from_u128(1);
    const U2: OwnerId = Uuid::from_u128(2);

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("allay_lifecycle_{}", rand::random::<u64>()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn homes(dir: &std::path::Path) -> Arc<EntityStore> {
        let gateway = Arc::new(JsonDocument::new(
            dir.join("homes.json"),
            DocumentLayout::ByOwner,
            ExpiryPolicy::never(),
        ));
        Arc::new(EntityStore::open(
            "home",
            KindConfig::unbounded().with_max_per_owner(5),
            gateway,
        ))
    }

    /// Store double whose flush always fails.
    struct BrokenStore;

    impl OwnerScoped for BrokenStore {
        fn label(&self) -> &str {
            "broken"
        }
        fn flush_owner(&self, _owner: OwnerId) -> Result<bool, StoreError> {
            Err(StoreError::Persistence {
                path: "broken.json".into(),
                source: std::io::Error::other("read-only filesystem"),
            })
        }
        fn warm(&self, _owner: OwnerId) -> usize {
            0
        }
    }

    #[test]
    fn home_scenario_survives_session_end_and_restart() {
        let dir = temp_dir();
        let store = homes(&dir);
        let hook = SessionLifecycleHook::new().with_store(store.clone());
        let scope = Scope::Owner(U1);

        hook.on_session_start(U1);
        let base = NamedEntity::new("base", Location::new(10.0, 64.0, 10.0, "overworld"));
        store.create(&scope, base).unwrap();
        let got = store.get(&scope, "base").unwrap();
        assert_eq!((got.location.x, got.location.y, got.location.z), (10.0, 64.0, 10.0));
        assert_eq!(got.location.dimension_id, "overworld");
        assert!(matches!(
            store.create(&scope, NamedEntity::new("BASE", Location::new(0.0, 0.0, 0.0, "overworld"))),
            Err(StoreError::AlreadyExists { .. })
        ));
        for name in ["farm", "mine", "tower", "portal"] {
            store
                .create(&scope, NamedEntity::new(name, Location::new(1.0, 2.0, 3.0, "overworld")))
                .unwrap();
        }
        assert!(matches!(
            store.create(&scope, NamedEntity::new("sixth", Location::new(0.0, 0.0, 0.0, "overworld"))),
            Err(StoreError::CapacityExceeded { limit: 5, .. })
        ));

        let report = hook.on_session_end(U1);
        assert!(report.failed_flushes.is_empty());
        assert!(!report.repeated);

        let gateway = JsonDocument::new(dir.join("homes.json"), DocumentLayout::ByOwner, ExpiryPolicy::never());
        let reloaded = gateway.load_all();
        assert_eq!(reloaded[&scope].len(), 5);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn flush_failure_does_not_block_cleanup() {
        let cooldowns = Arc::new(CooldownRegistry::new("home"));
        let trades = Arc::new(TradeRegistry::new("trade", Duration::from_secs(60)));
        let hook = SessionLifecycleHook::new()
            .with_store(Arc::new(BrokenStore))
            .with_registry(cooldowns.clone())
            .with_registry(trades.clone());

        cooldowns.try_start(U1, "home", Duration::from_secs(30)).unwrap();
        trades.open(U1, U2, TradeOffers::default()).unwrap();

        let report = hook.on_session_end(U1);
        assert_eq!(report.failed_flushes, vec!["broken".to_string()]);
        assert!(!cooldowns.is_tracking(U1));
        assert!(!trades.is_in_session(U2));
        assert!(report
            .effects
            .iter()
            .any(|e| matches!(e, SessionEffect::Notify { recipient, .. } if *recipient == U2)));
    }

    #[test]
    fn session_end_is_idempotent() {
        let dir = temp_dir();
        let store = homes(&dir);
        let cooldowns = Arc::new(CooldownRegistry::new("home"));
        let trades = Arc::new(TradeRegistry::new("trade", Duration::from_secs(60)));
        let hook = SessionLifecycleHook::new()
            .with_store(store.clone())
            .with_registry(cooldowns.clone())
            .with_registry(trades.clone());

        hook.on_session_start(U1);
        store
            .create(&Scope::Owner(U1), NamedEntity::new("base", Location::new(0.0, 0.0, 0.0, "overworld")))
            .unwrap();
        trades.open(U1, U2, TradeOffers::default()).unwrap();
        cooldowns.try_start(U1, "home", Duration::from_secs(30)).unwrap();

        let first = hook.on_session_end(U1);
        let after_first = (store.snapshot(), cooldowns.is_tracking(U1), trades.len());
        let second = hook.on_session_end(U1);
        let after_second = (store.snapshot(), cooldowns.is_tracking(U1), trades.len());

        assert_eq!(after_first, after_second);
        assert!(!first.effects.is_empty());
        assert!(second.effects.is_empty());
        assert!(second.repeated);
        assert!(!hook.is_online(U1));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn start_after_end_sees_flushed_state() {
        // A gateway that fails once, so the create leaves a dirty scope that
        // the session end has to flush.
        struct FailOnce {
            inner: JsonDocument,
            failed: AtomicBool,
        }
        impl PersistenceGateway for FailOnce {
            fn load_all(&self) -> Snapshot {
                self.inner.load_all()
            }
            fn save_all(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
                self.inner.save_all(snapshot)
            }
            fn persist(&self, scopes: &[Scope], source: &dyn SnapshotSource) -> Result<(), StoreError> {
                if !self.failed.swap(true, Ordering::SeqCst) {
                    return Err(StoreError::Persistence {
                        path: "homes.json".into(),
                        source: std::io::Error::other("transient"),
                    });
                }
                self.inner.persist(scopes, source)
            }
            fn describe(&self) -> String {
                self.inner.describe()
            }
        }

        let dir = temp_dir();
        let path = dir.join("homes.json");
        let gateway = Arc::new(FailOnce {
            inner: JsonDocument::new(&path, DocumentLayout::ByOwner, ExpiryPolicy::never()),
            failed: AtomicBool::new(false),
        });
        let store = Arc::new(EntityStore::open("home", KindConfig::unbounded(), gateway));
        let hook = SessionLifecycleHook::new().with_store(store.clone());

        hook.on_session_start(U1);
        store
            .create(&Scope::Owner(U1), NamedEntity::new("base", Location::new(0.0, 0.0, 0.0, "overworld")))
            .unwrap();
        assert!(!path.exists());

        hook.on_session_end(U1);
        assert!(path.exists());
        assert_eq!(hook.on_session_start(U1), 1);
        assert!(hook.is_online(U1));
        fs::remove_dir_all(&dir).ok();
    }
}
