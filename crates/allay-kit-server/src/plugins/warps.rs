//! `/warp`: server-wide named teleport points.

use std::sync::Arc;

use allay_kit_api::{CommandResult, Plugin, PluginInfo, PluginPlayer, ServerApi};
use allay_kit_store::{EntityStore, NamedEntity, Scope, StoreError};

use super::{store_failure, to_plugin_location, to_store_location};

const PLUGIN: &str = "Warps";

pub struct WarpsPlugin {
    warps: Arc<EntityStore>,
}

impl WarpsPlugin {
    pub fn new(warps: Arc<EntityStore>) -> Self {
        Self { warps }
    }

    fn here(sender: &PluginPlayer, name: &str, api: &dyn ServerApi) -> Result<NamedEntity, StoreError> {
        if !api.is_known_dimension(&sender.location.dimension) {
            return Err(StoreError::InvalidTarget(format!(
                "unknown dimension {}",
                sender.location.dimension
            )));
        }
        Ok(NamedEntity::new(name, to_store_location(&sender.location)).with_creator(&sender.name))
    }

    fn set(&self, sender: &PluginPlayer, name: &str, description: &[String], api: &dyn ServerApi) -> CommandResult {
        let created = Self::here(sender, name, api).and_then(|mut warp| {
            if !description.is_empty() {
                warp = warp.with_description(description.join(" "));
            }
            self.warps.create(&Scope::Global, warp)
        });
        match created {
            Ok(()) => CommandResult::ok(format!("Warp '{name}' created.")),
            Err(e) => store_failure(&e, "warp"),
        }
    }

    /// Move an existing warp to the sender's position.
    fn relocate(&self, sender: &PluginPlayer, name: &str, api: &dyn ServerApi) -> CommandResult {
        let moved = Self::here(sender, name, api).and_then(|mut warp| {
            if let Some(existing) = self.warps.get(&Scope::Global, name) {
                warp.name = existing.name;
                warp.description = existing.description;
            }
            self.warps.update(&Scope::Global, warp)
        });
        match moved {
            Ok(previous) => CommandResult::ok(format!("Warp '{}' moved.", previous.name)),
            Err(e) => store_failure(&e, "warp"),
        }
    }

    fn delete(&self, name: &str) -> CommandResult {
        match self.warps.delete(&Scope::Global, name) {
            Ok(removed) => CommandResult::ok(format!("Warp '{}' deleted.", removed.name)),
            Err(e) => store_failure(&e, "warp"),
        }
    }

    fn list(&self) -> CommandResult {
        let warps = self.warps.list(&Scope::Global);
        if warps.is_empty() {
            return CommandResult::ok("No warps have been set.");
        }
        let mut lines = vec![format!("Warps ({}):", warps.len())];
        lines.extend(warps.iter().map(|w| match &w.description {
            Some(text) => format!("  {} - {text}", w.name),
            None => format!("  {}", w.name),
        }));
        CommandResult::lines(lines)
    }

    fn teleport(&self, sender: &PluginPlayer, name: &str, api: &mut dyn ServerApi) -> CommandResult {
        let Some(warp) = self.warps.get(&Scope::Global, name) else {
            return store_failure(
                &StoreError::NotFound {
                    scope: Scope::Global,
                    name: name.to_string(),
                },
                "warp",
            );
        };
        if !api.is_known_dimension(&warp.location.dimension_id) {
            return store_failure(
                &StoreError::InvalidTarget(format!("dimension {} is gone", warp.location.dimension_id)),
                "warp",
            );
        }
        api.teleport_player(&sender.name, &to_plugin_location(&warp.location));
        CommandResult::ok(format!("Warped to '{}'.", warp.name))
    }
}

impl Plugin for WarpsPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Server-wide named teleport points".into(),
            author: "allay-kit".into(),
        }
    }

    fn on_enable(&mut self, api: &mut dyn ServerApi) {
        api.register_command(
            "warp",
            "/warp <name> | set <name> [description] | move|delete <name> | list",
            PLUGIN,
        );
    }

    fn on_command(
        &mut self,
        _command: &str,
        args: &[String],
        sender: &PluginPlayer,
        api: &mut dyn ServerApi,
    ) -> CommandResult {
        let arg = |i: usize| args.get(i).map(String::as_str);
        match (arg(0), arg(1)) {
            (Some("set"), Some(name)) => self.set(sender, name, &args[2..], api),
            (Some("move"), Some(name)) => self.relocate(sender, name, api),
            (Some("delete" | "del" | "remove"), Some(name)) => self.delete(name),
            (Some("set" | "move" | "delete" | "del" | "remove"), None) => {
                CommandResult::err("Usage: /warp set|move|delete <name>")
            }
            (Some("list") | None, _) => self.list(),
            (Some(name), _) => self.teleport(sender, name, api),
        }
    }
}
