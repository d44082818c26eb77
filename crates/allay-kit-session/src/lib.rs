//! Owner session lifecycle, transient registries and joint sessions.
//!
//! Everything here is in-memory only. The [`SessionLifecycleHook`] ties
//! persistent stores and transient registries together at session
//! boundaries.

pub mod cooldown;
pub mod error;
pub mod joint;
pub mod lifecycle;
pub mod registry;
pub mod teleport;
pub mod trade;

pub use cooldown::CooldownRegistry;
pub use error::SessionError;
pub use joint::{JointSession, JointState, SessionId};
pub use lifecycle::{OwnerScoped, SessionEffect, SessionEndReport, SessionLifecycleHook, TransientRegistry};
pub use registry::{Closed, Completed, JointRegistry, Terms};
pub use teleport::{TeleportDirection, TeleportGrant, TeleportRequests};
pub use trade::{TradeOffers, TradeProgress, TradeRegistry};
