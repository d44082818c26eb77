//! Keyed entity storage with JSON persistence for server plugins.
//!
//! An [`EntityStore`] maps a [`Scope`] (global, or one player) to
//! case-insensitively named [`NamedEntity`] records and writes every change
//! through a [`PersistenceGateway`]. Two gateways are provided: a single
//! [`JsonDocument`] and a directory of per-owner [`ShardedJsonFiles`].

pub mod document;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod kind;
pub mod liveness;
pub mod sharded;
pub mod store;

pub use document::{DocumentLayout, JsonDocument};
pub use entity::{name_key, now_millis, Location, NamedEntity, OwnerId, Scope};
pub use error::StoreError;
pub use gateway::{PersistenceGateway, Snapshot, SnapshotSource};
pub use kind::{ExpiryPolicy, KindConfig};
pub use liveness::LivenessFlag;
pub use sharded::ShardedJsonFiles;
pub use store::EntityStore;
