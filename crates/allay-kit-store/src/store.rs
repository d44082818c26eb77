//! The in-memory entity store: scope → name → entity.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::entity::{name_key, now_millis, NamedEntity, OwnerId, Scope};
use crate::error::StoreError;
use crate::gateway::{PersistenceGateway, Snapshot, SnapshotSource};
use crate::kind::KindConfig;

type ScopeEntries = HashMap<String, NamedEntity>;

/// Concurrent keyed store for one kind of entity.
///
/// Every successful mutation is applied in memory first and then written
/// through the gateway. A failed write is logged, the scope is marked dirty,
/// and the in-memory state stays authoritative until a later write succeeds.
pub struct EntityStore {
    label: String,
    kind: KindConfig,
    entries: DashMap<Scope, ScopeEntries>,
    gateway: Arc<dyn PersistenceGateway>,
    dirty: DashSet<Scope>,
    /// Expired entities that left the map outside a sweep (displaced by a
    /// create, or dropped on load), reported by the next sweep.
    retired: Mutex<Vec<(Scope, NamedEntity)>>,
}

impl EntityStore {
    /// Build a store and load its persisted state.
    pub fn open(
        label: impl Into<String>,
        kind: KindConfig,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let store = Self {
            label: label.into(),
            kind,
            entries: DashMap::new(),
            gateway,
            dirty: DashSet::new(),
            retired: Mutex::new(Vec::new()),
        };
        let snapshot = store.gateway.load_all();
        for (scope, entities) in snapshot {
            store.insert_loaded(scope, entities);
        }
        store.retire_dropped();
        store
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &KindConfig {
        &self.kind
    }

    fn insert_loaded(&self, scope: Scope, entities: Vec<NamedEntity>) {
        let mut map = self.entries.entry(scope.clone()).or_default();
        for entity in entities {
            let key = entity.key();
            if map.contains_key(&key) {
                warn!(
                    "{}: duplicate entry '{}' in {scope} ignored on load",
                    self.label, entity.name
                );
                continue;
            }
            map.insert(key, entity);
        }
    }

    /// Add a new entity. Fails on a case-insensitive name collision or when
    /// the scope is at capacity; never overwrites or evicts live entities.
    /// Expired entities neither collide nor count, and stay for the sweep.
    pub fn create(&self, scope: &Scope, entity: NamedEntity) -> Result<(), StoreError> {
        let key = entity.key();
        if key.is_empty() {
            return Err(StoreError::InvalidName(entity.name));
        }
        {
            let now = now_millis();
            let expiry = self.kind.expiry();
            let mut map = self.entries.entry(scope.clone()).or_default();
            if let Some(existing) = map.get(&key) {
                if !expiry.is_expired(existing, now) {
                    return Err(StoreError::AlreadyExists {
                        scope: scope.clone(),
                        name: existing.name.clone(),
                    });
                }
            }
            if let Some(limit) = self.kind.capacity_for(scope) {
                let live = map.values().filter(|e| !expiry.is_expired(e, now)).count();
                if live >= limit {
                    return Err(StoreError::CapacityExceeded {
                        scope: scope.clone(),
                        limit,
                    });
                }
            }
            debug!("{}: created '{}' in {scope}", self.label, entity.name);
            if let Some(displaced) = map.insert(key, entity) {
                self.retired.lock().push((scope.clone(), displaced));
            }
        }
        self.persist(std::slice::from_ref(scope), "create");
        Ok(())
    }

    /// Replace an existing entity, keeping its original creation time.
    /// Returns the previous value.
    pub fn update(&self, scope: &Scope, mut entity: NamedEntity) -> Result<NamedEntity, StoreError> {
        let key = entity.key();
        let previous = {
            let not_found = || StoreError::NotFound {
                scope: scope.clone(),
                name: entity.name.clone(),
            };
            let mut map = self.entries.get_mut(scope).ok_or_else(not_found)?;
            let slot = map.get_mut(&key).ok_or_else(not_found)?;
            if self.kind.expiry().is_expired(slot, now_millis()) {
                return Err(not_found());
            }
            entity.created_at = slot.created_at;
            std::mem::replace(slot, entity)
        };
        self.persist(std::slice::from_ref(scope), "update");
        Ok(previous)
    }

    /// Case-insensitive lookup. Expired entities are invisible.
    pub fn get(&self, scope: &Scope, name: &str) -> Option<NamedEntity> {
        let map = self.entries.get(scope)?;
        let entity = map.get(&name_key(name))?;
        if self.kind.expiry().is_expired(entity, now_millis()) {
            return None;
        }
        Some(entity.clone())
    }

    /// Remove a live entity, returning it. Expired entities are left for
    /// the sweep and reported as missing.
    pub fn delete(&self, scope: &Scope, name: &str) -> Result<NamedEntity, StoreError> {
        let key = name_key(name);
        let expiry = self.kind.expiry();
        let removed = self.entries.get_mut(scope).and_then(|mut map| {
            let live = map
                .get(&key)
                .is_some_and(|e| !expiry.is_expired(e, now_millis()));
            if live {
                map.remove(&key)
            } else {
                None
            }
        });
        let Some(removed) = removed else {
            return Err(StoreError::NotFound {
                scope: scope.clone(),
                name: name.to_string(),
            });
        };
        debug!("{}: deleted '{}' from {scope}", self.label, removed.name);
        self.persist(std::slice::from_ref(scope), "delete");
        self.drop_if_settled(scope);
        Ok(removed)
    }

    /// Live entities in `scope`, ordered by case-folded name.
    pub fn list(&self, scope: &Scope) -> Vec<NamedEntity> {
        let now = now_millis();
        let expiry = self.kind.expiry();
        let mut list: Vec<NamedEntity> = match self.entries.get(scope) {
            Some(map) => map
                .values()
                .filter(|e| !expiry.is_expired(e, now))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        list.sort_by_key(NamedEntity::key);
        list
    }

    pub fn count(&self, scope: &Scope) -> usize {
        let now = now_millis();
        let expiry = self.kind.expiry();
        self.entries
            .get(scope)
            .map(|map| map.values().filter(|e| !expiry.is_expired(e, now)).count())
            .unwrap_or(0)
    }

    /// Scopes that currently hold entities.
    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        scopes.sort();
        scopes
    }

    /// Remove every entity expired at `now_millis` and persist the touched
    /// scopes. Returns what was removed, including expired entities that a
    /// create displaced or a load dropped since the last sweep.
    pub fn sweep_expired(&self, now_millis: i64) -> Vec<(Scope, NamedEntity)> {
        let expiry = self.kind.expiry();
        let mut removed = std::mem::take(&mut *self.retired.lock());
        // Dropped-on-load entities are still in the file until this write.
        let mut touched: Vec<Scope> = removed.iter().map(|(scope, _)| scope.clone()).collect();
        for mut entry in self.entries.iter_mut() {
            let scope = entry.key().clone();
            let expired_keys: Vec<String> = entry
                .iter()
                .filter(|(_, e)| expiry.is_expired(e, now_millis))
                .map(|(k, _)| k.clone())
                .collect();
            if expired_keys.is_empty() {
                continue;
            }
            for key in expired_keys {
                if let Some(entity) = entry.remove(&key) {
                    removed.push((scope.clone(), entity));
                }
            }
            touched.push(scope);
        }
        touched.sort();
        touched.dedup();
        if !touched.is_empty() {
            self.persist(&touched, "sweep");
            for scope in &touched {
                self.drop_if_settled(scope);
            }
        }
        if !removed.is_empty() {
            info!("{}: swept {} expired entries", self.label, removed.len());
        }
        removed
    }

    /// Write the owner's scope if an earlier write for it failed.
    /// Returns whether a write was attempted.
    pub fn flush_owner(&self, owner: OwnerId) -> Result<bool, StoreError> {
        let scope = Scope::Owner(owner);
        if !self.dirty.contains(&scope) {
            return Ok(false);
        }
        self.gateway
            .persist(std::slice::from_ref(&scope), self)
            .map(|()| {
                self.dirty.remove(&scope);
                true
            })
    }

    /// Write the full state.
    pub fn flush_all(&self) -> Result<(), StoreError> {
        self.gateway.save_all(&self.snapshot())?;
        self.dirty.clear();
        Ok(())
    }

    /// Whether any scope has changes that failed to reach disk.
    pub fn has_pending_writes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Load an owner's scope from disk if it is not resident yet.
    /// Returns the number of resident entries afterwards.
    pub fn warm(&self, owner: OwnerId) -> usize {
        let scope = Scope::Owner(owner);
        // A dirty scope is newer in memory than on disk, even when empty.
        if !self.entries.contains_key(&scope) && !self.dirty.contains(&scope) {
            if let Some(entities) = self.gateway.load_scope(&scope) {
                if !entities.is_empty() {
                    self.insert_loaded(scope.clone(), entities);
                }
            }
            self.retire_dropped();
        }
        self.count(&scope)
    }

    /// Queue entities the gateway dropped as expired on load, so the next
    /// sweep reports them like any other expiry.
    fn retire_dropped(&self) {
        let dropped = self.gateway.take_expired();
        if !dropped.is_empty() {
            self.retired.lock().extend(dropped);
        }
    }

    /// Forget an emptied scope once its removal has reached disk.
    fn drop_if_settled(&self, scope: &Scope) {
        if !self.dirty.contains(scope) {
            self.entries.remove_if(scope, |_, map| map.is_empty());
        }
    }

    fn persist(&self, scopes: &[Scope], operation: &str) {
        match self.gateway.persist(scopes, self) {
            Ok(()) => {
                for scope in scopes {
                    self.dirty.remove(scope);
                }
            }
            Err(e) => {
                error!(
                    "{}: failed to persist {operation} for {:?} to {}: {e}",
                    self.label,
                    scopes.iter().map(Scope::to_string).collect::<Vec<_>>(),
                    self.gateway.describe()
                );
                for scope in scopes {
                    self.dirty.insert(scope.clone());
                }
            }
        }
    }
}

impl SnapshotSource for EntityStore {
    fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for entry in self.entries.iter() {
            if entry.is_empty() {
                continue;
            }
            let mut list: Vec<NamedEntity> = entry.values().cloned().collect();
            list.sort_by_key(NamedEntity::key);
            snapshot.insert(entry.key().clone(), list);
        }
        snapshot
    }

    fn scope_snapshot(&self, scope: &Scope) -> Vec<NamedEntity> {
        let mut list: Vec<NamedEntity> = self
            .entries
            .get(scope)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by_key(NamedEntity::key);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentLayout, JsonDocument};
    use crate::entity::Location;
    use crate::kind::ExpiryPolicy;
    use crate::sharded::ShardedJsonFiles;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("allay_store_{}", rand::random::<u64>()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn home(name: &str, x: f64) -> NamedEntity {
        NamedEntity::new(name, Location::new(x, 64.0, 10.0, "overworld"))
    }

    fn homes_store(dir: &std::path::Path) -> EntityStore {
        let gateway = Arc::new(JsonDocument::new(
            dir.join("homes.json"),
            DocumentLayout::ByOwner,
            ExpiryPolicy::never(),
        ));
        EntityStore::open("homes", KindConfig::unbounded().with_max_per_owner(5), gateway)
    }

    /// Gateway whose writes fail while `failing` is set. `on_disk` is what
    /// a scope reload returns.
    #[derive(Default)]
    struct FlakyGateway {
        failing: AtomicBool,
        writes: AtomicUsize,
        on_disk: parking_lot::Mutex<Vec<NamedEntity>>,
    }

    impl PersistenceGateway for FlakyGateway {
        fn load_all(&self) -> Snapshot {
            Snapshot::new()
        }
        fn load_scope(&self, _scope: &Scope) -> Option<Vec<NamedEntity>> {
            Some(self.on_disk.lock().clone())
        }
        fn save_all(&self, _snapshot: &Snapshot) -> Result<(), StoreError> {
            self.persist(&[], &NoSource)
        }
        fn persist(&self, _scopes: &[Scope], _source: &dyn SnapshotSource) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Persistence {
                    path: "flaky.json".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    struct NoSource;

    impl SnapshotSource for NoSource {
        fn snapshot(&self) -> Snapshot {
            Snapshot::new()
        }
        fn scope_snapshot(&self, _scope: &Scope) -> Vec<NamedEntity> {
            Vec::new()
        }
    }

    #[test]
    fn create_then_get_roundtrip() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        let scope = Scope::Owner(Uuid::from_u128(1));
        let entity = home("base", 10.0).with_description("my base");
        store.create(&scope, entity.clone()).unwrap();
        assert_eq!(store.get(&scope, "base"), Some(entity.clone()));
        assert_eq!(store.get(&scope, "BASE"), Some(entity));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_name_rejected_case_insensitively() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        let scope = Scope::Owner(Uuid::from_u128(1));
        store.create(&scope, home("Base", 10.0)).unwrap();
        let err = store.create(&scope, home("bAsE", 99.0)).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.get(&scope, "base").unwrap().location.x, 10.0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn names_are_scoped() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        store.create(&Scope::Owner(Uuid::from_u128(1)), home("base", 1.0)).unwrap();
        store.create(&Scope::Owner(Uuid::from_u128(2)), home("base", 2.0)).unwrap();
        assert_eq!(store.scopes().len(), 2);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_name_rejected() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        let err = store.create(&Scope::Global, home("  ", 0.0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn capacity_enforced_then_freed_by_delete() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        let scope = Scope::Owner(Uuid::from_u128(1));
        for i in 0..5 {
            store.create(&scope, home(&format!("h{i}"), i as f64)).unwrap();
        }
        let err = store.create(&scope, home("h5", 5.0)).unwrap_err();
        assert!(matches!(err, StoreError::CapacityExceeded { limit: 5, .. }));
        assert_eq!(store.count(&scope), 5);

        store.delete(&scope, "h0").unwrap();
        store.create(&scope, home("h5", 5.0)).unwrap();
        assert_eq!(store.count(&scope), 5);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn global_scope_is_unbounded() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        for i in 0..20 {
            store.create(&Scope::Global, home(&format!("w{i}"), 0.0)).unwrap();
        }
        assert_eq!(store.count(&Scope::Global), 20);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn delete_then_get_misses() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        let scope = Scope::Owner(Uuid::from_u128(1));
        store.create(&scope, home("base", 1.0)).unwrap();
        let removed = store.delete(&scope, "BASE").unwrap();
        assert_eq!(removed.name, "base");
        assert!(store.get(&scope, "base").is_none());
        assert!(matches!(
            store.delete(&scope, "base"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.scopes().is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn update_keeps_creation_time() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        let scope = Scope::Owner(Uuid::from_u128(1));
        store.create(&scope, home("base", 1.0).with_created_at(1234)).unwrap();
        let previous = store.update(&scope, home("Base", 2.0)).unwrap();
        assert_eq!(previous.location.x, 1.0);
        let now = store.get(&scope, "base").unwrap();
        assert_eq!(now.location.x, 2.0);
        assert_eq!(now.created_at, 1234);
        assert!(matches!(
            store.update(&scope, home("other", 0.0)),
            Err(StoreError::NotFound { .. })
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn list_is_sorted_snapshot() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        let scope = Scope::Owner(Uuid::from_u128(1));
        for name in ["mine", "Base", "farm"] {
            store.create(&scope, home(name, 0.0)).unwrap();
        }
        let names: Vec<String> = store.list(&scope).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Base", "farm", "mine"]);
        assert!(store.list(&Scope::Owner(Uuid::from_u128(9))).is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mutations_survive_reopen() {
        let dir = temp_dir();
        let scope = Scope::Owner(Uuid::from_u128(1));
        {
            let store = homes_store(&dir);
            store.create(&scope, home("base", 10.0)).unwrap();
            store.create(&scope, home("farm", 20.0)).unwrap();
            store.delete(&scope, "farm").unwrap();
        }
        let store = homes_store(&dir);
        assert_eq!(store.count(&scope), 1);
        assert_eq!(store.get(&scope, "base").unwrap().location.x, 10.0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn expired_entities_invisible_until_swept() {
        let dir = temp_dir();
        let gateway = Arc::new(ShardedJsonFiles::new(dir.join("mail"), ExpiryPolicy::never()));
        let kind = KindConfig::unbounded()
            .with_max_per_owner(2)
            .with_expiry_seconds(60);
        let store = EntityStore::open("mail", kind, gateway);
        let scope = Scope::Owner(Uuid::from_u128(1));
        store
            .create(&scope, home("old", 0.0).with_created_at(now_millis() - 120_000))
            .unwrap();
        // A later create in the same scope must not discard the stale record.
        store.create(&scope, home("new", 0.0)).unwrap();

        assert!(store.get(&scope, "old").is_none());
        assert_eq!(store.list(&scope).len(), 1);
        assert_eq!(store.count(&scope), 1);
        assert!(matches!(
            store.delete(&scope, "old"),
            Err(StoreError::NotFound { .. })
        ));

        let swept = store.sweep_expired(now_millis());
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].0, scope);
        assert_eq!(swept[0].1.name, "old");
        assert!(store.sweep_expired(now_millis()).is_empty());
        assert_eq!(store.scope_snapshot(&scope).len(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn create_over_expired_name_reports_it_to_the_sweep() {
        let gateway = Arc::new(FlakyGateway::default());
        let store = EntityStore::open(
            "bounties",
            KindConfig::unbounded().with_expiry_seconds(60),
            gateway,
        );
        let scope = Scope::Owner(Uuid::from_u128(1));
        store
            .create(&scope, home("Steve", 1.0).with_created_at(0))
            .unwrap();
        store.create(&scope, home("steve", 2.0)).unwrap();
        assert_eq!(store.get(&scope, "steve").unwrap().location.x, 2.0);

        let swept = store.sweep_expired(now_millis());
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].1.location.x, 1.0);
        assert_eq!(store.count(&scope), 1);
    }

    #[test]
    fn entries_expired_on_load_are_swept_once() {
        let dir = temp_dir();
        let kind = KindConfig::unbounded().with_expiry_seconds(60);
        let open = || {
            let gateway = Arc::new(JsonDocument::new(
                dir.join("bounties.json"),
                DocumentLayout::ByOwner,
                kind.expiry(),
            ));
            EntityStore::open("bounties", kind.clone(), gateway)
        };
        let scope = Scope::Owner(Uuid::from_u128(4));
        open()
            .create(&scope, home("stale", 0.0).with_created_at(0))
            .unwrap();

        let reopened = open();
        assert_eq!(reopened.count(&scope), 0);
        let swept = reopened.sweep_expired(now_millis());
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].1.name, "stale");

        assert!(open().sweep_expired(now_millis()).is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn expired_entries_do_not_count_toward_capacity() {
        let gateway = Arc::new(FlakyGateway::default());
        let kind = KindConfig::unbounded()
            .with_max_per_owner(1)
            .with_expiry_seconds(60);
        let store = EntityStore::open("bounties", kind, gateway);
        let scope = Scope::Owner(Uuid::from_u128(1));
        store
            .create(&scope, home("stale", 0.0).with_created_at(0))
            .unwrap();
        store.create(&scope, home("fresh", 0.0)).unwrap();
        assert_eq!(store.count(&scope), 1);
        assert_eq!(store.sweep_expired(now_millis()).len(), 1);
    }

    #[test]
    fn failed_write_keeps_memory_and_marks_dirty() {
        let gateway = Arc::new(FlakyGateway::default());
        let store = EntityStore::open("homes", KindConfig::unbounded(), gateway.clone());
        let owner = Uuid::from_u128(1);
        let scope = Scope::Owner(owner);

        gateway.failing.store(true, Ordering::SeqCst);
        store.create(&scope, home("base", 1.0)).unwrap();
        assert!(store.get(&scope, "base").is_some());
        assert!(store.has_pending_writes());
        assert!(store.flush_owner(owner).is_err());

        gateway.failing.store(false, Ordering::SeqCst);
        assert!(store.flush_owner(owner).unwrap());
        assert!(!store.has_pending_writes());
        // Nothing buffered: no write.
        assert!(!store.flush_owner(owner).unwrap());
    }

    #[test]
    fn failed_delete_of_last_entry_survives_warm() {
        let gateway = Arc::new(FlakyGateway::default());
        let store = EntityStore::open("mail", KindConfig::unbounded(), gateway.clone());
        let owner = Uuid::from_u128(3);
        let scope = Scope::Owner(owner);
        store.create(&scope, home("m1", 0.0)).unwrap();
        gateway.on_disk.lock().push(home("m1", 0.0));

        gateway.failing.store(true, Ordering::SeqCst);
        store.delete(&scope, "m1").unwrap();
        assert!(store.has_pending_writes());

        // The stale file still holds m1; memory wins.
        assert_eq!(store.warm(owner), 0);
        assert!(store.get(&scope, "m1").is_none());

        gateway.failing.store(false, Ordering::SeqCst);
        assert!(store.flush_owner(owner).unwrap());
        assert!(store.get(&scope, "m1").is_none());
    }

    #[test]
    fn warm_loads_shard_written_externally() {
        let dir = temp_dir();
        let owner = Uuid::from_u128(7);
        let gateway = Arc::new(ShardedJsonFiles::new(dir.join("mail"), ExpiryPolicy::never()));
        let store = EntityStore::open("mail", KindConfig::unbounded(), gateway.clone());
        assert_eq!(store.warm(owner), 0);

        let mut snap = Snapshot::new();
        snap.insert(Scope::Owner(owner), vec![home("m1", 0.0), home("m2", 0.0)]);
        gateway.save_all(&snap).unwrap();

        assert_eq!(store.warm(owner), 2);
        // Already resident: no reload, no duplicates.
        assert_eq!(store.warm(owner), 2);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn concurrent_creates_respect_capacity() {
        let dir = temp_dir();
        let store = Arc::new(homes_store(&dir));
        let scope = Scope::Owner(Uuid::from_u128(1));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let scope = scope.clone();
                std::thread::spawn(move || store.create(&scope, home(&format!("h{i}"), 0.0)).is_ok())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 5);
        drop(store);

        // The last write must hold the final state.
        let reopened = homes_store(&dir);
        assert_eq!(reopened.count(&scope), 5);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn flush_all_then_reload_is_identical() {
        let dir = temp_dir();
        let store = homes_store(&dir);
        for owner in 1..=3u128 {
            let scope = Scope::Owner(Uuid::from_u128(owner));
            store.create(&scope, home("base", owner as f64)).unwrap();
        }
        store.flush_all().unwrap();
        let before = store.snapshot();
        let reopened = homes_store(&dir);
        assert_eq!(reopened.snapshot(), before);
        fs::remove_dir_all(&dir).ok();
    }
}
