//! Plugin manager: loads, enables, and dispatches events to plugins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use allay_kit_api::{
    CommandResult, ItemStack, LogLevel, Plugin, PluginEvent, PluginLocation, PluginPlayer,
    ServerApi, Uuid,
};
use allay_kit_session::{SessionEffect, SessionLifecycleHook};
use tracing::{debug, error, info, warn};

// ─── Types ───────────────────────────────────────────────────────────────────

/// A scheduled task owned by a plugin.
#[derive(Debug)]
pub struct ScheduledTask {
    pub plugin_name: String,
    pub task_id: u32,
    pub remaining_ticks: u64,
    /// `None` = one-shot, `Some(n)` = repeating every `n` ticks.
    pub interval: Option<u64>,
}

/// Host state snapshot for plugin API reads (built before dispatch).
#[derive(Debug, Default)]
pub struct HostSnapshot {
    pub players: Vec<PluginPlayer>,
    /// Every player the host has seen: lowercase name → uuid.
    pub known_players: HashMap<String, Uuid>,
    /// Online player name → item identifier → count.
    pub inventories: HashMap<String, HashMap<String, u32>>,
    pub dimensions: Vec<String>,
    pub current_tick: u64,
}

/// Deferred side-effect requested by a plugin during a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    SendMessage {
        player_name: String,
        message: String,
    },
    /// Message addressed by identity; held by the host until the owner is online.
    MessageOwner {
        owner: Uuid,
        message: String,
    },
    BroadcastMessage {
        message: String,
    },
    TeleportPlayer {
        player_name: String,
        location: PluginLocation,
    },
    GiveItem {
        player_name: String,
        item: ItemStack,
    },
    /// Item grant addressed by identity, for owners that may be offline.
    GiveItemTo {
        owner: Uuid,
        item: ItemStack,
    },
    TakeItem {
        player_name: String,
        item: ItemStack,
    },
    RegisterCommand {
        name: String,
        description: String,
        plugin_name: String,
    },
    ScheduleTask {
        plugin_name: String,
        task_id: u32,
        delay_ticks: u64,
        interval: Option<u64>,
    },
    CancelTask {
        plugin_name: String,
        task_id: u32,
    },
}

impl PendingAction {
    /// Actions handled by the plugin manager itself rather than the host.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            PendingAction::RegisterCommand { .. }
                | PendingAction::ScheduleTask { .. }
                | PendingAction::CancelTask { .. }
        )
    }
}

fn log_plugin(level: LogLevel, message: &str) {
    match level {
        LogLevel::Info => info!("[plugin] {message}"),
        LogLevel::Warn => warn!("[plugin] {message}"),
        LogLevel::Error => error!("[plugin] {message}"),
        LogLevel::Debug => debug!("[plugin] {message}"),
    }
}

// ─── ServerApiImpl ───────────────────────────────────────────────────────────

/// Implements `ServerApi` using a snapshot for reads and accumulating PendingActions for writes.
struct ServerApiImpl<'a> {
    snapshot: &'a HostSnapshot,
    actions: Vec<PendingAction>,
}

impl<'a> ServerApiImpl<'a> {
    fn new(snapshot: &'a HostSnapshot) -> Self {
        Self {
            snapshot,
            actions: Vec::new(),
        }
    }

    fn take_actions(self) -> Vec<PendingAction> {
        self.actions
    }
}

impl ServerApi for ServerApiImpl<'_> {
    fn online_players(&self) -> Vec<PluginPlayer> {
        self.snapshot.players.clone()
    }

    fn get_player(&self, name: &str) -> Option<PluginPlayer> {
        self.snapshot
            .players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn player_by_uuid(&self, uuid: Uuid) -> Option<PluginPlayer> {
        self.snapshot
            .players
            .iter()
            .find(|p| p.uuid == uuid)
            .cloned()
    }

    fn resolve_player(&self, name: &str) -> Option<Uuid> {
        self.snapshot
            .known_players
            .get(&name.to_lowercase())
            .copied()
    }

    fn send_message(&mut self, player_name: &str, message: &str) {
        self.actions.push(PendingAction::SendMessage {
            player_name: player_name.to_string(),
            message: message.to_string(),
        });
    }

    fn message_owner(&mut self, owner: Uuid, message: &str) {
        self.actions.push(PendingAction::MessageOwner {
            owner,
            message: message.to_string(),
        });
    }

    fn broadcast_message(&mut self, message: &str) {
        self.actions.push(PendingAction::BroadcastMessage {
            message: message.to_string(),
        });
    }

    fn teleport_player(&mut self, player_name: &str, location: &PluginLocation) {
        self.actions.push(PendingAction::TeleportPlayer {
            player_name: player_name.to_string(),
            location: location.clone(),
        });
    }

    fn item_count(&self, player_name: &str, identifier: &str) -> u32 {
        self.snapshot
            .inventories
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(player_name))
            .and_then(|(_, items)| items.get(identifier).copied())
            .unwrap_or(0)
    }

    fn give_item(&mut self, player_name: &str, item: ItemStack) {
        self.actions.push(PendingAction::GiveItem {
            player_name: player_name.to_string(),
            item,
        });
    }

    fn take_item(&mut self, player_name: &str, item: ItemStack) {
        self.actions.push(PendingAction::TakeItem {
            player_name: player_name.to_string(),
            item,
        });
    }

    fn give_item_to(&mut self, owner: Uuid, item: ItemStack) {
        self.actions.push(PendingAction::GiveItemTo { owner, item });
    }

    fn is_known_dimension(&self, dimension: &str) -> bool {
        self.snapshot.dimensions.iter().any(|d| d == dimension)
    }

    fn get_tick(&self) -> u64 {
        self.snapshot.current_tick
    }

    fn log(&self, level: LogLevel, message: &str) {
        log_plugin(level, message);
    }

    fn schedule_delayed(&mut self, plugin_name: &str, delay_ticks: u64, task_id: u32) {
        self.actions.push(PendingAction::ScheduleTask {
            plugin_name: plugin_name.to_string(),
            task_id,
            delay_ticks,
            interval: None,
        });
    }

    fn schedule_repeating(
        &mut self,
        plugin_name: &str,
        delay_ticks: u64,
        interval_ticks: u64,
        task_id: u32,
    ) {
        self.actions.push(PendingAction::ScheduleTask {
            plugin_name: plugin_name.to_string(),
            task_id,
            delay_ticks,
            interval: Some(interval_ticks),
        });
    }

    fn cancel_task(&mut self, plugin_name: &str, task_id: u32) {
        self.actions.push(PendingAction::CancelTask {
            plugin_name: plugin_name.to_string(),
            task_id,
        });
    }

    fn register_command(&mut self, name: &str, description: &str, plugin_name: &str) {
        self.actions.push(PendingAction::RegisterCommand {
            name: name.to_string(),
            description: description.to_string(),
            plugin_name: plugin_name.to_string(),
        });
    }
}

// ─── PluginManager ───────────────────────────────────────────────────────────

/// Manages all loaded plugins, their scheduled tasks, and command registrations.
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
    tasks: Vec<ScheduledTask>,
    /// Commands registered by plugins: command_name → (plugin_name, description).
    pub plugin_commands: HashMap<String, (String, String)>,
    hook: Arc<SessionLifecycleHook>,
    config_dir: PathBuf,
}

impl PluginManager {
    pub fn new(hook: Arc<SessionLifecycleHook>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins: Vec::new(),
            tasks: Vec::new(),
            plugin_commands: HashMap::new(),
            hook,
            config_dir: config_dir.into(),
        }
    }

    /// Register a plugin (call before enable_all).
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        info!("Registered plugin: {}", plugin.info().name);
        self.plugins.push(plugin);
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Enable all registered plugins.
    pub fn enable_all(&mut self, snapshot: &HostSnapshot) -> Vec<PendingAction> {
        let mut all_actions = Vec::new();
        for plugin in &mut self.plugins {
            let mut api = ServerApiImpl::new(snapshot);
            plugin.on_enable(&mut api);
            all_actions.extend(api.take_actions());
        }
        self.apply_internal_actions(all_actions)
    }

    /// Disable all registered plugins and drop their tasks.
    pub fn disable_all(&mut self) {
        for plugin in &mut self.plugins {
            plugin.on_disable();
        }
        self.tasks.clear();
    }

    /// Dispatch an event to all plugins. Returns the actions left for the host.
    pub fn dispatch(&mut self, event: &PluginEvent, snapshot: &HostSnapshot) -> Vec<PendingAction> {
        let mut all_actions = Vec::new();
        for plugin in &mut self.plugins {
            let mut api = ServerApiImpl::new(snapshot);
            plugin.on_event(event, &mut api);
            all_actions.extend(api.take_actions());
        }
        self.apply_internal_actions(all_actions)
    }

    /// A player's session begins: warm their stores, then tell the plugins.
    pub fn handle_join(&mut self, player: &PluginPlayer, snapshot: &HostSnapshot) -> Vec<PendingAction> {
        let resident = self.hook.on_session_start(player.uuid);
        debug!("{} joined with {resident} stored records", player.name);
        self.dispatch(
            &PluginEvent::PlayerJoin {
                player: player.clone(),
            },
            snapshot,
        )
    }

    /// A player's session ends: tell the plugins, then flush and clean up.
    /// Notices and refunds for other parties become host actions.
    pub fn handle_quit(&mut self, player: &PluginPlayer, snapshot: &HostSnapshot) -> Vec<PendingAction> {
        let mut actions = self.dispatch(
            &PluginEvent::PlayerQuit {
                player: player.clone(),
            },
            snapshot,
        );
        let report = self.hook.on_session_end(player.uuid);
        if report.repeated {
            debug!("Repeated session end for {}", player.name);
        }
        if !report.failed_flushes.is_empty() {
            warn!(
                "Unsaved data for {} in: {}",
                player.name,
                report.failed_flushes.join(", ")
            );
        }
        for effect in report.effects {
            match effect {
                SessionEffect::Notify { recipient, message } => {
                    actions.push(PendingAction::MessageOwner {
                        owner: recipient,
                        message,
                    });
                }
                SessionEffect::Refund { recipient, items } => {
                    actions.extend(items.into_iter().map(|item| PendingAction::GiveItemTo {
                        owner: recipient,
                        item,
                    }));
                }
            }
        }
        actions
    }

    /// Tick the scheduler. Returns pending actions from fired tasks.
    pub fn tick_scheduler(&mut self, snapshot: &HostSnapshot) -> Vec<PendingAction> {
        let mut all_actions = Vec::new();
        let mut fired: Vec<(String, u32)> = Vec::new();

        for task in &mut self.tasks {
            if task.remaining_ticks > 0 {
                task.remaining_ticks -= 1;
            }
            if task.remaining_ticks == 0 {
                fired.push((task.plugin_name.clone(), task.task_id));
                if let Some(interval) = task.interval {
                    task.remaining_ticks = interval;
                }
            }
        }

        // One-shot tasks that fired are done
        self.tasks
            .retain(|t| t.remaining_ticks > 0 || t.interval.is_some());

        for (plugin_name, task_id) in fired {
            if let Some(plugin) = self
                .plugins
                .iter_mut()
                .find(|p| p.info().name == plugin_name)
            {
                let mut api = ServerApiImpl::new(snapshot);
                plugin.on_task(task_id, &mut api);
                all_actions.extend(api.take_actions());
            }
        }

        self.apply_internal_actions(all_actions)
    }

    /// Handle a plugin-registered command. `None` if no plugin owns it.
    pub fn handle_command(
        &mut self,
        command: &str,
        args: &[String],
        sender: &PluginPlayer,
        snapshot: &HostSnapshot,
    ) -> Option<(CommandResult, Vec<PendingAction>)> {
        let (plugin_name, _) = self.plugin_commands.get(command)?.clone();
        let plugin = self
            .plugins
            .iter_mut()
            .find(|p| p.info().name == plugin_name)?;
        let mut api = ServerApiImpl::new(snapshot);
        let result = plugin.on_command(command, args, sender, &mut api);
        let actions = api.take_actions();
        Some((result, self.apply_internal_actions(actions)))
    }

    /// Sorted `(command, description)` pairs for help output.
    pub fn command_help(&self) -> Vec<(String, String)> {
        let mut help: Vec<_> = self
            .plugin_commands
            .iter()
            .map(|(name, (_, description))| (name.clone(), description.clone()))
            .collect();
        help.sort();
        help
    }

    /// Load configs for all plugins from `<config_dir>/<plugin>/config.json`,
    /// writing the default when none exists.
    pub fn load_configs(&mut self) {
        for plugin in &mut self.plugins {
            let info = plugin.info();
            if let Some(default_config) = plugin.default_config() {
                let plugin_dir = self.config_dir.join(&info.name);
                let config_path = plugin_dir.join("config.json");

                let config = if config_path.exists() {
                    match std::fs::read_to_string(&config_path) {
                        Ok(data) => match serde_json::from_str(&data) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!("Failed to parse config for {}: {e}", info.name);
                                default_config.clone()
                            }
                        },
                        Err(e) => {
                            warn!("Failed to read config for {}: {e}", info.name);
                            default_config.clone()
                        }
                    }
                } else {
                    std::fs::create_dir_all(&plugin_dir).ok();
                    if let Ok(json) = serde_json::to_string_pretty(&default_config) {
                        if let Err(e) = std::fs::write(&config_path, json) {
                            warn!("Failed to write default config for {}: {e}", info.name);
                        }
                    }
                    default_config
                };

                plugin.load_config(config);
            }
        }
    }

    /// Apply RegisterCommand / ScheduleTask / CancelTask immediately and
    /// return everything else for the host.
    fn apply_internal_actions(&mut self, actions: Vec<PendingAction>) -> Vec<PendingAction> {
        let (internal, external): (Vec<_>, Vec<_>) =
            actions.into_iter().partition(PendingAction::is_internal);
        for action in internal {
            match action {
                PendingAction::RegisterCommand {
                    name,
                    description,
                    plugin_name,
                } => {
                    if let Some((owner, _)) = self.plugin_commands.get(&name) {
                        if *owner != plugin_name {
                            warn!("Command /{name} of {plugin_name} shadows {owner}'s");
                        }
                    }
                    self.plugin_commands.insert(name, (plugin_name, description));
                }
                PendingAction::ScheduleTask {
                    plugin_name,
                    task_id,
                    delay_ticks,
                    interval,
                } => {
                    self.tasks.push(ScheduledTask {
                        plugin_name,
                        task_id,
                        remaining_ticks: delay_ticks,
                        interval,
                    });
                }
                PendingAction::CancelTask {
                    plugin_name,
                    task_id,
                } => {
                    self.tasks
                        .retain(|t| !(t.plugin_name == plugin_name && t.task_id == task_id));
                }
                _ => {}
            }
        }
        external
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
