//! Plugin API: events, the plugin trait, and the server API handed to plugins.
//!
//! The host engine is an external message source: everything a plugin learns
//! arrives as a [`PluginEvent`] or a command invocation, and everything a
//! plugin wants done goes back through [`ServerApi`].

pub mod items;

pub use items::{ItemError, ItemInfo, ItemRegistry, ItemStack};
pub use uuid::Uuid;

// ─── Types ───────────────────────────────────────────────────────────────────

/// A position in a named dimension, with facing.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginLocation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    /// Dimension identifier, e.g. `"overworld"`.
    pub dimension: String,
}

impl PluginLocation {
    pub fn new(x: f64, y: f64, z: f64, dimension: impl Into<String>) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            dimension: dimension.into(),
        }
    }
}

/// Information about an online player, passed to plugins in events.
#[derive(Debug, Clone)]
pub struct PluginPlayer {
    pub name: String,
    pub uuid: Uuid,
    pub location: PluginLocation,
}

/// Log level for plugin logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// All events that plugins can listen to.
#[derive(Debug, Clone)]
pub enum PluginEvent {
    PlayerJoin {
        player: PluginPlayer,
    },
    PlayerQuit {
        player: PluginPlayer,
    },
    PlayerDeath {
        player: PluginPlayer,
        killer: Option<PluginPlayer>,
    },
    ServerStarted,
    ServerStopping,
}

impl PluginEvent {
    /// The player this event is about, if any.
    pub fn player(&self) -> Option<&PluginPlayer> {
        match self {
            PluginEvent::PlayerJoin { player }
            | PluginEvent::PlayerQuit { player }
            | PluginEvent::PlayerDeath { player, .. } => Some(player),
            PluginEvent::ServerStarted | PluginEvent::ServerStopping => None,
        }
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Result returned by a plugin command handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command executed successfully.
    pub success: bool,
    /// Messages to send back to the command sender.
    pub messages: Vec<String>,
}

impl CommandResult {
    /// Create a successful result with a single message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            messages: vec![message.into()],
        }
    }

    /// Create a failed result with a single message.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            messages: vec![message.into()],
        }
    }

    /// Create a successful result from several lines.
    pub fn lines(messages: Vec<String>) -> Self {
        Self {
            success: true,
            messages,
        }
    }
}

// ─── Plugin trait ────────────────────────────────────────────────────────────

/// Metadata about a plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

/// The Plugin trait, implemented by every built-in plugin.
pub trait Plugin: Send {
    /// Return plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Called when the plugin is loaded. Use `api` to register commands, schedule tasks.
    fn on_enable(&mut self, api: &mut dyn ServerApi);

    /// Called when the plugin is unloaded.
    fn on_disable(&mut self) {}

    /// Called for every dispatched event.
    fn on_event(&mut self, event: &PluginEvent, api: &mut dyn ServerApi) {
        let _ = (event, api);
    }

    /// Called when a scheduled task fires.
    fn on_task(&mut self, task_id: u32, api: &mut dyn ServerApi) {
        let _ = (task_id, api);
    }

    /// Called when a plugin-registered command is executed.
    fn on_command(
        &mut self,
        command: &str,
        args: &[String],
        sender: &PluginPlayer,
        api: &mut dyn ServerApi,
    ) -> CommandResult {
        let _ = (args, sender, api);
        CommandResult::err(format!("Unhandled command: {command}"))
    }

    /// Return a default config as JSON. If `Some`, the plugin gets a config file.
    fn default_config(&self) -> Option<serde_json::Value> {
        None
    }

    /// Called with the loaded config (`<data_dir>/config/<name>/config.json`).
    fn load_config(&mut self, _config: serde_json::Value) {}
}

// ─── Server API ──────────────────────────────────────────────────────────────

/// Read/write access to host state, passed to plugins during callbacks.
///
/// Read methods return data immediately. Write methods are deferred (applied
/// after the plugin callback returns).
pub trait ServerApi {
    // --- Players ---
    fn online_players(&self) -> Vec<PluginPlayer>;
    fn get_player(&self, name: &str) -> Option<PluginPlayer>;
    fn player_by_uuid(&self, uuid: Uuid) -> Option<PluginPlayer>;
    /// UUID of any player the server has seen, online or not.
    fn resolve_player(&self, name: &str) -> Option<Uuid>;
    fn send_message(&mut self, player_name: &str, message: &str);
    /// Message a player by identity. Held by the host while they are offline.
    fn message_owner(&mut self, owner: Uuid, message: &str);
    fn broadcast_message(&mut self, message: &str);
    fn teleport_player(&mut self, player_name: &str, location: &PluginLocation);

    // --- Inventory ---
    fn item_count(&self, player_name: &str, identifier: &str) -> u32;
    fn give_item(&mut self, player_name: &str, item: ItemStack);
    fn take_item(&mut self, player_name: &str, item: ItemStack);
    /// Give an item to a player by identity, online or not.
    fn give_item_to(&mut self, owner: Uuid, item: ItemStack);

    // --- World ---
    fn is_known_dimension(&self, dimension: &str) -> bool;

    // --- Server ---
    fn get_tick(&self) -> u64;
    fn log(&self, level: LogLevel, message: &str);

    // --- Scheduler ---
    fn schedule_delayed(&mut self, plugin_name: &str, delay_ticks: u64, task_id: u32);
    fn schedule_repeating(
        &mut self,
        plugin_name: &str,
        delay_ticks: u64,
        interval_ticks: u64,
        task_id: u32,
    );
    fn cancel_task(&mut self, plugin_name: &str, task_id: u32);

    // --- Commands ---
    fn register_command(&mut self, name: &str, description: &str, plugin_name: &str);
}

// ─── Tests ───────────────────────────────────────────────────────────────────
