//! One JSON file per owner (mail). Writes for different owners never
//! contend on the same lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entity::{now_millis, NamedEntity, OwnerId, Scope};
use crate::error::StoreError;
use crate::gateway::{
    read_document, remove_document, write_document, PersistenceGateway, Snapshot, SnapshotSource,
};
use crate::kind::ExpiryPolicy;

/// A directory of `<ownerId>.json` files, each holding `[ {...}, ... ]`.
pub struct ShardedJsonFiles {
    dir: PathBuf,
    expiry: ExpiryPolicy,
    locks: DashMap<OwnerId, Arc<Mutex<()>>>,
    expired: Mutex<Vec<(Scope, NamedEntity)>>,
}

impl ShardedJsonFiles {
    pub fn new(dir: impl Into<PathBuf>, expiry: ExpiryPolicy) -> Self {
        Self {
            dir: dir.into(),
            expiry,
            locks: DashMap::new(),
            expired: Mutex::new(Vec::new()),
        }
    }

    pub fn shard_path(&self, owner: &OwnerId) -> PathBuf {
        self.dir.join(format!("{owner}.json"))
    }

    fn lock_for(&self, owner: OwnerId) -> Arc<Mutex<()>> {
        self.locks.entry(owner).or_default().clone()
    }

    fn read_shard(&self, owner: &OwnerId, now: i64) -> Vec<NamedEntity> {
        let mut entities: Vec<NamedEntity> =
            read_document(&self.shard_path(owner)).unwrap_or_default();
        let expired = self.expiry.split_expired(&mut entities, now);
        if !expired.is_empty() {
            debug!("Dropped {} expired entries for {owner}", expired.len());
            let scope = Scope::Owner(*owner);
            self.expired
                .lock()
                .extend(expired.into_iter().map(|e| (scope.clone(), e)));
        }
        entities
    }

    fn write_shard(&self, owner: &OwnerId, entities: &[NamedEntity]) -> Result<(), StoreError> {
        let path = self.shard_path(owner);
        if entities.is_empty() {
            remove_document(&path)
        } else {
            write_document(&path, entities)
        }
    }

    /// Owners with a shard file on disk.
    fn owners_on_disk(&self) -> Vec<OwnerId> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to list {}: {e}", self.dir.display());
                return Vec::new();
            }
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| owner_from_path(&entry.path()))
            .collect()
    }
}

fn owner_from_path(path: &Path) -> Option<OwnerId> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    match Uuid::parse_str(stem) {
        Ok(id) => Some(id),
        Err(_) => {
            debug!("Ignoring non-owner file {}", path.display());
            None
        }
    }
}

impl PersistenceGateway for ShardedJsonFiles {
    fn load_all(&self) -> Snapshot {
        let now = now_millis();
        let mut snapshot = Snapshot::new();
        for owner in self.owners_on_disk() {
            let entities = self.read_shard(&owner, now);
            if !entities.is_empty() {
                snapshot.insert(Scope::Owner(owner), entities);
            }
        }
        let total: usize = snapshot.values().map(Vec::len).sum();
        info!(
            "Loaded {total} entries for {} owners from {}",
            snapshot.len(),
            self.describe()
        );
        snapshot
    }

    fn load_scope(&self, scope: &Scope) -> Option<Vec<NamedEntity>> {
        let owner = scope.owner()?;
        let lock = self.lock_for(owner);
        let _guard = lock.lock();
        Some(self.read_shard(&owner, now_millis()))
    }

    fn save_all(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut first_error = None;
        for (scope, entities) in snapshot {
            let Some(owner) = scope.owner() else {
                debug!("{}: skipping global scope", self.describe());
                continue;
            };
            let lock = self.lock_for(owner);
            let _guard = lock.lock();
            if let Err(e) = self.write_shard(&owner, entities) {
                warn!("Failed to save shard for {owner}: {e}");
                first_error.get_or_insert(e);
            }
        }
        // Owners absent from the snapshot no longer have entries.
        for owner in self.owners_on_disk() {
            if snapshot.contains_key(&Scope::Owner(owner)) {
                continue;
            }
            let lock = self.lock_for(owner);
            let _guard = lock.lock();
            if let Err(e) = remove_document(&self.shard_path(&owner)) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn persist(&self, scopes: &[Scope], source: &dyn SnapshotSource) -> Result<(), StoreError> {
        let mut first_error = None;
        for scope in scopes {
            let Some(owner) = scope.owner() else {
                continue;
            };
            let lock = self.lock_for(owner);
            let _guard = lock.lock();
            let entities = source.scope_snapshot(scope);
            if let Err(e) = self.write_shard(&owner, &entities) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn take_expired(&self) -> Vec<(Scope, NamedEntity)> {
        std::mem::take(&mut *self.expired.lock())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Location;
    use crate::kind::KindConfig;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("allay_sharded_{}", rand::random::<u64>()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn mail(name: &str) -> NamedEntity {
        NamedEntity::new(name, Location::new(0.0, 64.0, 0.0, "overworld")).with_creator("Alex")
    }

    #[test]
    fn missing_directory_loads_empty() {
        let dir = temp_dir();
        let gw = ShardedJsonFiles::new(dir.join("mail"), ExpiryPolicy::never());
        assert!(gw.load_all().is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn one_file_per_owner_as_array() {
        let dir = temp_dir();
        let gw = ShardedJsonFiles::new(dir.join("mail"), ExpiryPolicy::never());
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let mut snap = Snapshot::new();
        snap.insert(Scope::Owner(a), vec![mail("m1"), mail("m2")]);
        snap.insert(Scope::Owner(b), vec![mail("m3")]);
        gw.save_all(&snap).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(gw.shard_path(&a)).unwrap()).unwrap();
        assert_eq!(raw.as_array().unwrap().len(), 2);
        assert_eq!(gw.load_all(), snap);
        assert_eq!(gw.load_scope(&Scope::Owner(b)).unwrap().len(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn save_all_removes_stale_shards() {
        let dir = temp_dir();
        let gw = ShardedJsonFiles::new(&dir, ExpiryPolicy::never());
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let mut snap = Snapshot::new();
        snap.insert(Scope::Owner(a), vec![mail("m1")]);
        snap.insert(Scope::Owner(b), vec![mail("m2")]);
        gw.save_all(&snap).unwrap();

        snap.remove(&Scope::Owner(b));
        gw.save_all(&snap).unwrap();
        assert!(gw.shard_path(&a).exists());
        assert!(!gw.shard_path(&b).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn corrupt_shard_only_loses_that_owner() {
        let dir = temp_dir();
        let gw = ShardedJsonFiles::new(&dir, ExpiryPolicy::never());
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let mut snap = Snapshot::new();
        snap.insert(Scope::Owner(a), vec![mail("m1")]);
        gw.save_all(&snap).unwrap();
        fs::write(gw.shard_path(&b), "[{").unwrap();
        fs::write(dir.join("readme.txt"), "ignored").unwrap();

        let loaded = gw.load_all();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&Scope::Owner(a)));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn expired_mail_filtered_on_load() {
        let dir = temp_dir();
        let expiry = KindConfig::unbounded().with_expiry_seconds(30 * 24 * 3600).expiry();
        let gw = ShardedJsonFiles::new(&dir, expiry);
        let owner = Uuid::from_u128(5);
        let old = mail("old").with_created_at(now_millis() - 31 * 24 * 3600 * 1000);
        write_document(&gw.shard_path(&owner), &vec![old, mail("new")]).unwrap();

        let loaded = gw.load_all();
        assert_eq!(loaded[&Scope::Owner(owner)].len(), 1);
        assert_eq!(loaded[&Scope::Owner(owner)][0].name, "new");
        let dropped = gw.take_expired();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].1.name, "old");
        fs::remove_dir_all(&dir).ok();
    }
}
