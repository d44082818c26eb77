//! Simulated host: player roster, positions and inventories.
//!
//! Stands in for the game engine. It owns the state plugins read through
//! [`HostSnapshot`] and applies the [`PendingAction`]s they emit.

use std::collections::HashMap;

use allay_kit_api::{ItemStack, PluginLocation, PluginPlayer, Uuid};
use tracing::{debug, warn};

use crate::plugin_manager::{HostSnapshot, PendingAction};

/// Stable identity for a player name, the same across restarts.
pub fn offline_uuid(name: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("OfflinePlayer:{}", name.to_lowercase()).as_bytes(),
    )
}

#[derive(Debug)]
struct PlayerState {
    name: String,
    uuid: Uuid,
    online: bool,
    location: PluginLocation,
    inventory: HashMap<String, u32>,
    /// Messages addressed while offline, shown on the next join.
    held_messages: Vec<String>,
}

impl PlayerState {
    fn as_plugin_player(&self) -> PluginPlayer {
        PluginPlayer {
            name: self.name.clone(),
            uuid: self.uuid,
            location: self.location.clone(),
        }
    }
}

/// One line of output for the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Chat { to: String, message: String },
    Broadcast(String),
    Notice(String),
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Chat { to, message } => write!(f, "[-> {to}] {message}"),
            Delivery::Broadcast(message) => write!(f, "[broadcast] {message}"),
            Delivery::Notice(message) => write!(f, "* {message}"),
        }
    }
}

pub struct Host {
    players: HashMap<Uuid, PlayerState>,
    dimensions: Vec<String>,
    spawn: PluginLocation,
    tick: u64,
}

impl Host {
    pub fn new(dimensions: Vec<String>, spawn: [f64; 3]) -> Self {
        let dimension = dimensions
            .first()
            .cloned()
            .unwrap_or_else(|| "overworld".to_string());
        Self {
            players: HashMap::new(),
            dimensions,
            spawn: PluginLocation::new(spawn[0], spawn[1], spawn[2], dimension),
            tick: 0,
        }
    }

    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn find(&self, name: &str) -> Option<&PlayerState> {
        self.players.get(&offline_uuid(name))
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut PlayerState> {
        self.players.get_mut(&offline_uuid(name))
    }

    pub fn online_player(&self, name: &str) -> Option<PluginPlayer> {
        self.find(name)
            .filter(|p| p.online)
            .map(PlayerState::as_plugin_player)
    }

    pub fn online_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .players
            .values()
            .filter(|p| p.online)
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Bring a player online. `None` if they already are. Returns the
    /// player and any messages held while they were away.
    pub fn join(&mut self, name: &str) -> Option<(PluginPlayer, Vec<Delivery>)> {
        let uuid = offline_uuid(name);
        let spawn = self.spawn.clone();
        let state = self.players.entry(uuid).or_insert_with(|| PlayerState {
            name: name.to_string(),
            uuid,
            online: false,
            location: spawn,
            inventory: HashMap::new(),
            held_messages: Vec::new(),
        });
        if state.online {
            return None;
        }
        state.online = true;
        let held = std::mem::take(&mut state.held_messages)
            .into_iter()
            .map(|message| Delivery::Chat {
                to: state.name.clone(),
                message,
            })
            .collect();
        Some((state.as_plugin_player(), held))
    }

    /// Take a player offline. `None` if they were not online.
    pub fn quit(&mut self, name: &str) -> Option<PluginPlayer> {
        let state = self.find_mut(name).filter(|p| p.online)?;
        state.online = false;
        Some(state.as_plugin_player())
    }

    pub fn move_player(&mut self, name: &str, location: PluginLocation) -> bool {
        if !self.dimensions.contains(&location.dimension) {
            return false;
        }
        match self.find_mut(name).filter(|p| p.online) {
            Some(state) => {
                state.location = location;
                true
            }
            None => false,
        }
    }

    pub fn location_of(&self, name: &str) -> Option<PluginLocation> {
        self.find(name).map(|p| p.location.clone())
    }

    pub fn item_count(&self, name: &str, identifier: &str) -> u32 {
        self.find(name)
            .and_then(|p| p.inventory.get(identifier).copied())
            .unwrap_or(0)
    }

    pub fn give(&mut self, name: &str, item: ItemStack) -> bool {
        match self.find_mut(name) {
            Some(state) => {
                *state.inventory.entry(item.identifier).or_default() += item.count;
                true
            }
            None => false,
        }
    }

    pub fn inventory_of(&self, name: &str) -> Vec<ItemStack> {
        let mut items: Vec<_> = self
            .find(name)
            .map(|p| {
                p.inventory
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(|(id, count)| ItemStack::new(id.clone(), *count))
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        items
    }

    pub fn snapshot(&self) -> HostSnapshot {
        let online = || self.players.values().filter(|p| p.online);
        HostSnapshot {
            players: online().map(PlayerState::as_plugin_player).collect(),
            known_players: self
                .players
                .values()
                .map(|p| (p.name.to_lowercase(), p.uuid))
                .collect(),
            inventories: online()
                .map(|p| (p.name.clone(), p.inventory.clone()))
                .collect(),
            dimensions: self.dimensions.clone(),
            current_tick: self.tick,
        }
    }

    /// Apply plugin actions and return what the console should show.
    pub fn apply(&mut self, actions: Vec<PendingAction>) -> Vec<Delivery> {
        let mut out = Vec::new();
        for action in actions {
            match action {
                PendingAction::SendMessage {
                    player_name,
                    message,
                } => match self.find(&player_name).filter(|p| p.online) {
                    Some(p) => out.push(Delivery::Chat {
                        to: p.name.clone(),
                        message,
                    }),
                    None => debug!("Dropped message for offline {player_name}"),
                },
                PendingAction::MessageOwner { owner, message } => {
                    match self.players.get_mut(&owner) {
                        Some(p) if p.online => out.push(Delivery::Chat {
                            to: p.name.clone(),
                            message,
                        }),
                        Some(p) => p.held_messages.push(message),
                        None => warn!("Message for unknown player {owner} dropped"),
                    }
                }
                PendingAction::BroadcastMessage { message } => {
                    out.push(Delivery::Broadcast(message));
                }
                PendingAction::TeleportPlayer {
                    player_name,
                    location,
                } => {
                    let target = format!(
                        "{:.1} {:.1} {:.1} in {}",
                        location.x, location.y, location.z, location.dimension
                    );
                    if self.move_player(&player_name, location) {
                        out.push(Delivery::Notice(format!("{player_name} teleported to {target}")));
                    } else {
                        warn!("Teleport of {player_name} to {target} failed");
                    }
                }
                PendingAction::GiveItem { player_name, item } => {
                    let label = item.to_string();
                    if self.give(&player_name, item) {
                        out.push(Delivery::Notice(format!("{player_name} received {label}")));
                    } else {
                        warn!("Cannot give {label} to unknown player {player_name}");
                    }
                }
                PendingAction::GiveItemTo { owner, item } => match self.players.get_mut(&owner) {
                    Some(p) => {
                        out.push(Delivery::Notice(format!("{} received {item}", p.name)));
                        *p.inventory.entry(item.identifier).or_default() += item.count;
                    }
                    None => warn!("Cannot give {item} to unknown player {owner}"),
                },
                PendingAction::TakeItem { player_name, item } => {
                    match self.find_mut(&player_name) {
                        Some(p) => {
                            let held = p.inventory.entry(item.identifier.clone()).or_default();
                            if *held < item.count {
                                warn!(
                                    "{player_name} holds only {held} of {}, {} requested",
                                    item.identifier, item.count
                                );
                            }
                            *held = held.saturating_sub(item.count);
                        }
                        None => warn!("Cannot take {item} from unknown player {player_name}"),
                    }
                }
                // Handled by the plugin manager.
                PendingAction::RegisterCommand { .. }
                | PendingAction::ScheduleTask { .. }
                | PendingAction::CancelTask { .. } => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Host {
        Host::new(
            vec!["overworld".into(), "nether".into(), "the_end".into()],
            [0.5, 64.0, 0.5],
        )
    }

    #[test]
    fn offline_uuid_is_stable_and_case_insensitive() {
        assert_eq!(offline_uuid("Steve"), offline_uuid("steve"));
        assert_ne!(offline_uuid("Steve"), offline_uuid("Alex"));
    }

    #[test]
    fn join_twice_is_refused() {
        let mut host = host();
        assert!(host.join("Steve").is_some());
        assert!(host.join("steve").is_none());
        assert_eq!(host.online_names(), vec!["Steve".to_string()]);
        assert!(host.quit("Steve").is_some());
        assert!(host.quit("Steve").is_none());
    }

    #[test]
    fn held_messages_arrive_on_join() {
        let mut host = host();
        host.join("Alex");
        host.quit("Alex");
        let out = host.apply(vec![PendingAction::MessageOwner {
            owner: offline_uuid("Alex"),
            message: "Your trade was cancelled".into(),
        }]);
        assert!(out.is_empty());
        let (_, held) = host.join("Alex").unwrap();
        assert_eq!(held.len(), 1);
    }

    #[test]
    fn items_move_in_and_out() {
        let mut host = host();
        host.join("Steve");
        host.apply(vec![PendingAction::GiveItem {
            player_name: "Steve".into(),
            item: ItemStack::new("minecraft:emerald", 10),
        }]);
        host.apply(vec![PendingAction::TakeItem {
            player_name: "Steve".into(),
            item: ItemStack::new("minecraft:emerald", 4),
        }]);
        assert_eq!(host.item_count("Steve", "minecraft:emerald"), 6);

        host.quit("Steve");
        host.apply(vec![PendingAction::GiveItemTo {
            owner: offline_uuid("Steve"),
            item: ItemStack::new("minecraft:emerald", 1),
        }]);
        assert_eq!(host.item_count("Steve", "minecraft:emerald"), 7);
        // Offline inventories are not visible to plugins.
        assert!(host.snapshot().inventories.is_empty());
    }

    #[test]
    fn teleport_rejects_unknown_dimension() {
        let mut host = host();
        host.join("Steve");
        host.apply(vec![PendingAction::TeleportPlayer {
            player_name: "Steve".into(),
            location: PluginLocation::new(1.0, 2.0, 3.0, "aether"),
        }]);
        assert_eq!(host.location_of("Steve").unwrap().dimension, "overworld");

        host.apply(vec![PendingAction::TeleportPlayer {
            player_name: "Steve".into(),
            location: PluginLocation::new(1.0, 2.0, 3.0, "nether"),
        }]);
        assert_eq!(host.location_of("Steve").unwrap().dimension, "nether");
    }

    #[test]
    fn snapshot_lists_known_players() {
        let mut host = host();
        host.join("Steve");
        host.join("Alex");
        host.quit("Alex");
        let snapshot = host.snapshot();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.known_players.len(), 2);
        assert_eq!(snapshot.known_players["alex"], offline_uuid("Alex"));
    }
}
