//! Built-in plugins and the services they share.

pub mod bounty;
pub mod homes;
pub mod mail;
pub mod teleport;
pub mod trade;
pub mod warps;

use std::sync::Arc;
use std::time::Duration;

use allay_kit_api::{CommandResult, ItemRegistry, Plugin, PluginLocation, ServerApi, Uuid};
use allay_kit_session::{
    CooldownRegistry, SessionError, SessionLifecycleHook, TeleportRequests, TradeRegistry,
};
use allay_kit_store::{
    DocumentLayout, EntityStore, JsonDocument, Location, ShardedJsonFiles, StoreError,
};
use tracing::{error, info};

use crate::config::ServerConfig;

/// Stores, registries and the lifecycle hook, built once at startup and
/// handed to the plugins that use them.
pub struct Services {
    pub items: Arc<ItemRegistry>,
    pub homes: Arc<EntityStore>,
    pub warps: Arc<EntityStore>,
    pub mail: Arc<EntityStore>,
    pub bounties: Arc<EntityStore>,
    pub cooldowns: Arc<CooldownRegistry>,
    pub trades: Arc<TradeRegistry>,
    pub teleports: Arc<TeleportRequests>,
    pub hook: Arc<SessionLifecycleHook>,
}

impl Services {
    pub fn open(config: &ServerConfig) -> Self {
        let dir = &config.storage.data_dir;

        let homes = Arc::new(EntityStore::open(
            "homes",
            config.homes.clone(),
            Arc::new(JsonDocument::new(
                dir.join("homes.json"),
                DocumentLayout::ByOwner,
                config.homes.expiry(),
            )),
        ));
        let warps = Arc::new(EntityStore::open(
            "warps",
            config.warps.clone(),
            Arc::new(JsonDocument::new(
                dir.join("warps.json"),
                DocumentLayout::Flat,
                config.warps.expiry(),
            )),
        ));
        let mail = Arc::new(EntityStore::open(
            "mail",
            config.mail.clone(),
            Arc::new(ShardedJsonFiles::new(dir.join("mail"), config.mail.expiry())),
        ));
        let bounties = Arc::new(bounty::open_store(
            &dir.join("bounties.json"),
            config.bounties.clone(),
        ));

        let cooldowns = Arc::new(CooldownRegistry::new("cooldowns"));
        let trades = Arc::new(TradeRegistry::new(
            "trade",
            Duration::from_secs(config.trade.request_timeout_seconds),
        ));
        let teleports = Arc::new(TeleportRequests::new(
            "teleport request",
            Duration::from_secs(config.teleport.request_timeout_seconds),
        ));

        let hook = SessionLifecycleHook::new()
            .with_store(homes.clone())
            .with_store(mail.clone())
            .with_store(bounties.clone())
            .with_registry(cooldowns.clone())
            .with_registry(trades.clone())
            .with_registry(teleports.clone());

        Self {
            items: Arc::new(ItemRegistry::new()),
            homes,
            warps,
            mail,
            bounties,
            cooldowns,
            trades,
            teleports,
            hook: Arc::new(hook),
        }
    }

    /// Write every store in full. Used at shutdown.
    pub fn flush_all(&self) {
        for store in [&self.homes, &self.warps, &self.mail, &self.bounties] {
            match store.flush_all() {
                Ok(()) => info!("Saved {}", store.label()),
                Err(e) => error!("Failed to save {}: {e}", store.label()),
            }
        }
    }
}

pub fn build_plugins(services: &Services, config: &ServerConfig) -> Vec<Box<dyn Plugin>> {
    let sweep = config.scheduler.sweep_interval_ticks.max(1);
    let teleport_cooldown = config.teleport.cooldown_seconds.map(Duration::from_secs);
    vec![
        Box::new(homes::HomesPlugin::new(
            services.homes.clone(),
            services.cooldowns.clone(),
        )),
        Box::new(warps::WarpsPlugin::new(services.warps.clone())),
        Box::new(mail::MailPlugin::new(
            services.mail.clone(),
            services.items.clone(),
            sweep,
        )),
        Box::new(bounty::BountyPlugin::new(
            services.bounties.clone(),
            services.items.clone(),
            sweep,
        )),
        Box::new(trade::TradePlugin::new(
            services.trades.clone(),
            services.items.clone(),
        )),
        Box::new(teleport::TeleportPlugin::new(
            services.teleports.clone(),
            services.cooldowns.clone(),
            teleport_cooldown,
        )),
    ]
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Ticks between checks for stale two-party requests (one second).
pub(crate) const REQUEST_CHECK_TICKS: u64 = 20;

pub(crate) fn to_store_location(loc: &PluginLocation) -> Location {
    Location::new(loc.x, loc.y, loc.z, loc.dimension.clone()).with_rotation(loc.yaw, loc.pitch)
}

pub(crate) fn to_plugin_location(loc: &Location) -> PluginLocation {
    PluginLocation {
        x: loc.x,
        y: loc.y,
        z: loc.z,
        yaw: loc.yaw,
        pitch: loc.pitch,
        dimension: loc.dimension_id.clone(),
    }
}

pub(crate) fn store_failure(e: &StoreError, kind: &str) -> CommandResult {
    CommandResult::err(e.user_message(kind))
}

/// A player's name for messages, falling back to the short uuid.
pub(crate) fn display_name(api: &dyn ServerApi, owner: Uuid) -> String {
    api.player_by_uuid(owner)
        .map(|p| p.name)
        .unwrap_or_else(|| owner.simple().to_string()[..8].to_string())
}

pub(crate) fn session_failure(e: &SessionError, api: &dyn ServerApi, kind: &str) -> CommandResult {
    let text = match e {
        SessionError::NoSuchSession(_) => format!("You have no pending {kind}."),
        SessionError::NotAParty(_) => format!("You are not part of this {kind}."),
        SessionError::AlreadyInSession(owner) => {
            format!("{} already has a pending {kind}.", display_name(api, *owner))
        }
        SessionError::SelfTarget => format!("You cannot {kind} with yourself."),
        SessionError::InvalidTransition { action, .. } => {
            format!("You cannot {action} this {kind} right now.")
        }
        SessionError::NotInvited => format!("Only the invited player can accept this {kind}."),
    };
    CommandResult::err(text)
}

pub(crate) fn format_wait(wait: Duration) -> String {
    format!("{:.0}s", wait.as_secs_f64().ceil())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_convert_both_ways() {
        let mut loc = PluginLocation::new(1.5, 64.0, -2.25, "nether");
        loc.yaw = 90.0;
        let stored = to_store_location(&loc);
        assert_eq!(stored.dimension_id, "nether");
        assert_eq!(stored.yaw, 90.0);
        assert_eq!(to_plugin_location(&stored), loc);
    }

    #[test]
    fn wait_rounds_up() {
        assert_eq!(format_wait(Duration::from_millis(2100)), "3s");
        assert_eq!(format_wait(Duration::from_secs(5)), "5s");
    }

    #[test]
    fn services_wire_hook_and_flush() {
        let dir = testing::temp_dir("services");
        let mut config = ServerConfig::default();
        config.storage.data_dir = dir.clone();
        let services = Services::open(&config);
        let plugins = build_plugins(&services, &config);
        assert_eq!(plugins.len(), 6);
        services.flush_all();
        assert!(dir.join("warps.json").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
