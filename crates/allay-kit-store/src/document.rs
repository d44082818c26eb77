//! Single-file JSON document gateway (warps, homes, bounties).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::entity::{now_millis, NamedEntity, OwnerId, Scope};
use crate::error::StoreError;
use crate::gateway::{read_document, write_document, PersistenceGateway, Snapshot, SnapshotSource};
use crate::kind::ExpiryPolicy;

/// How scopes are laid out inside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLayout {
    /// `{ "<name>": {...} }`, holding the global scope only.
    Flat,
    /// `{ "<ownerId>": { "<name>": {...} } }`, holding owner scopes only.
    ByOwner,
}

type FlatDoc = BTreeMap<String, NamedEntity>;
type ByOwnerDoc = BTreeMap<OwnerId, BTreeMap<String, NamedEntity>>;

/// One JSON file holding a whole store.
pub struct JsonDocument {
    path: PathBuf,
    layout: DocumentLayout,
    expiry: ExpiryPolicy,
    write_lock: Mutex<()>,
    expired: Mutex<Vec<(Scope, NamedEntity)>>,
}

impl JsonDocument {
    pub fn new(path: impl Into<PathBuf>, layout: DocumentLayout, expiry: ExpiryPolicy) -> Self {
        Self {
            path: path.into(),
            layout,
            expiry,
            write_lock: Mutex::new(()),
            expired: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        match self.layout {
            DocumentLayout::Flat => {
                let doc: FlatDoc = snapshot
                    .get(&Scope::Global)
                    .into_iter()
                    .flatten()
                    .map(|e| (e.name.clone(), e.clone()))
                    .collect();
                write_document(&self.path, &doc)
            }
            DocumentLayout::ByOwner => {
                let mut doc = ByOwnerDoc::new();
                for (scope, entities) in snapshot {
                    let Some(owner) = scope.owner() else {
                        debug!("{}: skipping global scope in per-owner document", self.describe());
                        continue;
                    };
                    if entities.is_empty() {
                        continue;
                    }
                    doc.insert(
                        owner,
                        entities.iter().map(|e| (e.name.clone(), e.clone())).collect(),
                    );
                }
                write_document(&self.path, &doc)
            }
        }
    }
}

impl PersistenceGateway for JsonDocument {
    fn load_all(&self) -> Snapshot {
        let now = now_millis();
        let mut snapshot = Snapshot::new();
        let mut expired = Vec::new();
        match self.layout {
            DocumentLayout::Flat => {
                if let Some(doc) = read_document::<FlatDoc>(&self.path) {
                    let mut entities: Vec<NamedEntity> = doc.into_values().collect();
                    for entity in self.expiry.split_expired(&mut entities, now) {
                        expired.push((Scope::Global, entity));
                    }
                    if !entities.is_empty() {
                        snapshot.insert(Scope::Global, entities);
                    }
                }
            }
            DocumentLayout::ByOwner => {
                if let Some(doc) = read_document::<ByOwnerDoc>(&self.path) {
                    for (owner, by_name) in doc {
                        let mut entities: Vec<NamedEntity> = by_name.into_values().collect();
                        for entity in self.expiry.split_expired(&mut entities, now) {
                            expired.push((Scope::Owner(owner), entity));
                        }
                        if !entities.is_empty() {
                            snapshot.insert(Scope::Owner(owner), entities);
                        }
                    }
                }
            }
        }
        let total: usize = snapshot.values().map(Vec::len).sum();
        info!("Loaded {total} entries from {}", self.describe());
        if !expired.is_empty() {
            debug!("Dropped {} expired entries from {}", expired.len(), self.describe());
            self.expired.lock().extend(expired);
        }
        snapshot
    }

    fn take_expired(&self) -> Vec<(Scope, NamedEntity)> {
        std::mem::take(&mut *self.expired.lock())
    }

    fn save_all(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.write_snapshot(snapshot)
    }

    fn persist(&self, scopes: &[Scope], source: &dyn SnapshotSource) -> Result<(), StoreError> {
        if scopes.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        let snapshot = source.snapshot();
        if self.layout == DocumentLayout::Flat && scopes.iter().any(|s| *s != Scope::Global) {
            warn!("{}: flat document cannot store owner scopes", self.describe());
        }
        self.write_snapshot(&snapshot)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
