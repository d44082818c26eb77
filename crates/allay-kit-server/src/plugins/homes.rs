//! `/home`: personal named teleport points.

use std::sync::Arc;

use allay_kit_api::{CommandResult, Plugin, PluginInfo, PluginPlayer, ServerApi};
use allay_kit_session::CooldownRegistry;
use allay_kit_store::{EntityStore, NamedEntity, Scope, StoreError};

use super::{format_wait, store_failure, to_plugin_location, to_store_location};

const PLUGIN: &str = "Homes";
const DEFAULT_HOME: &str = "home";
/// Subcommand words; a home with one of these names could never be reached.
const RESERVED: [&str; 5] = ["set", "delete", "del", "remove", "list"];

pub struct HomesPlugin {
    homes: Arc<EntityStore>,
    cooldowns: Arc<CooldownRegistry>,
}

impl HomesPlugin {
    pub fn new(homes: Arc<EntityStore>, cooldowns: Arc<CooldownRegistry>) -> Self {
        Self { homes, cooldowns }
    }

    fn set(&self, sender: &PluginPlayer, name: &str, api: &dyn ServerApi) -> CommandResult {
        if RESERVED.iter().any(|word| word.eq_ignore_ascii_case(name)) {
            return CommandResult::err(format!("'{name}' is a command word; pick another name."));
        }
        if !api.is_known_dimension(&sender.location.dimension) {
            return store_failure(
                &StoreError::InvalidTarget(format!("unknown dimension {}", sender.location.dimension)),
                "home",
            );
        }
        let home = NamedEntity::new(name, to_store_location(&sender.location)).with_creator(&sender.name);
        match self.homes.create(&Scope::Owner(sender.uuid), home) {
            Ok(()) => CommandResult::ok(format!("Home '{name}' set.")),
            Err(e) => store_failure(&e, "home"),
        }
    }

    fn delete(&self, sender: &PluginPlayer, name: &str) -> CommandResult {
        match self.homes.delete(&Scope::Owner(sender.uuid), name) {
            Ok(removed) => CommandResult::ok(format!("Home '{}' deleted.", removed.name)),
            Err(e) => store_failure(&e, "home"),
        }
    }

    fn list(&self, sender: &PluginPlayer) -> CommandResult {
        let homes = self.homes.list(&Scope::Owner(sender.uuid));
        if homes.is_empty() {
            return CommandResult::ok("You have no homes. Use /home set <name>.");
        }
        let names: Vec<_> = homes.iter().map(|h| h.name.as_str()).collect();
        let limit = self
            .homes
            .kind()
            .max_per_owner
            .map(|max| format!("/{max}"))
            .unwrap_or_default();
        CommandResult::ok(format!("Homes ({}{limit}): {}", homes.len(), names.join(", ")))
    }

    fn teleport(&self, sender: &PluginPlayer, name: &str, api: &mut dyn ServerApi) -> CommandResult {
        let scope = Scope::Owner(sender.uuid);
        let Some(home) = self.homes.get(&scope, name) else {
            return store_failure(
                &StoreError::NotFound {
                    scope,
                    name: name.to_string(),
                },
                "home",
            );
        };
        if !api.is_known_dimension(&home.location.dimension_id) {
            return store_failure(
                &StoreError::InvalidTarget(format!("dimension {} is gone", home.location.dimension_id)),
                "home",
            );
        }
        if let Some(cooldown) = self.homes.kind().cooldown() {
            if let Err(wait) = self.cooldowns.try_start(sender.uuid, "home", cooldown) {
                return CommandResult::err(format!(
                    "You must wait {} before teleporting home again.",
                    format_wait(wait)
                ));
            }
        }
        api.teleport_player(&sender.name, &to_plugin_location(&home.location));
        CommandResult::ok(format!("Teleported to home '{}'.", home.name))
    }
}

impl Plugin for HomesPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Personal named teleport points".into(),
            author: "allay-kit".into(),
        }
    }

    fn on_enable(&mut self, api: &mut dyn ServerApi) {
        api.register_command("home", "/home [name] | set|delete <name> | list", PLUGIN);
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
            (Some("set"), Some(name)) => self.set(sender, name, api),
            (Some("delete" | "del" | "remove"), Some(name)) => self.delete(sender, name),
            (Some("set" | "delete" | "del" | "remove"), None) => {
                CommandResult::err("Usage: /home set|delete <name>")
            }
            (Some("list"), _) => self.list(sender),
            (Some(name), _) => self.teleport(sender, name, api),
            (None, _) => self.teleport(sender, DEFAULT_HOME, api),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{player, temp_dir, MockApi};
    use super::*;
    use allay_kit_api::PluginLocation;
    use allay_kit_store::{DocumentLayout, JsonDocument, KindConfig};

    fn plugin(dir: &std::path::Path) -> HomesPlugin {
        let kind = KindConfig::unbounded()
            .with_max_per_owner(5)
            .with_cooldown_seconds(3);
        let store = EntityStore::open(
            "homes",
            kind.clone(),
            Arc::new(JsonDocument::new(
                dir.join("homes.json"),
                DocumentLayout::ByOwner,
                kind.expiry(),
            )),
        );
        HomesPlugin::new(Arc::new(store), Arc::new(CooldownRegistry::new("cooldowns")))
    }

    fn run(p: &mut HomesPlugin, api: &mut MockApi, sender: &PluginPlayer, line: &str) -> CommandResult {
        let args: Vec<String> = line.split_whitespace().map(String::from).collect();
        p.on_command("home", &args, sender, api)
    }

    #[test]
    fn set_list_and_teleport() {
        let dir = temp_dir("homes");
        let mut p = plugin(&dir);
        let mut api = MockApi::with_players(&["Steve"]);
        let steve = player("Steve");

        assert!(run(&mut p, &mut api, &steve, "set Base").success);
        let list = run(&mut p, &mut api, &steve, "list");
        assert_eq!(list.messages, vec!["Homes (1/5): Base".to_string()]);

        let result = run(&mut p, &mut api, &steve, "base");
        assert!(result.success);
        let teleports = api.teleports();
        assert_eq!(teleports.len(), 1);
        assert_eq!(teleports[0].1, PluginLocation::new(10.5, 70.0, -4.5, "overworld"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_and_capacity_are_reported() {
        let dir = temp_dir("homes_cap");
        let mut p = plugin(&dir);
        let mut api = MockApi::with_players(&["Steve"]);
        let steve = player("Steve");

        for i in 0..5 {
            assert!(run(&mut p, &mut api, &steve, &format!("set h{i}")).success);
        }
        let dup = run(&mut p, &mut api, &steve, "set H0");
        assert!(!dup.success);
        assert!(dup.messages[0].contains("already exists"));

        let full = run(&mut p, &mut api, &steve, "set sixth");
        assert!(!full.success);
        assert!(full.messages[0].contains("limit of 5"));

        // Other owners are unaffected.
        let alex = player("Alex");
        assert!(run(&mut p, &mut api, &alex, "set h0").success);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn teleport_cooldown_applies() {
        let dir = temp_dir("homes_cd");
        let mut p = plugin(&dir);
        let mut api = MockApi::with_players(&["Steve"]);
        let steve = player("Steve");

        run(&mut p, &mut api, &steve, "set home");
        assert!(run(&mut p, &mut api, &steve, "").success);
        let again = run(&mut p, &mut api, &steve, "");
        assert!(!again.success);
        assert!(again.messages[0].contains("wait"));
        assert_eq!(api.teleports().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_home_and_dimension() {
        let dir = temp_dir("homes_missing");
        let mut p = plugin(&dir);
        let mut api = MockApi::with_players(&["Steve"]);
        let mut steve = player("Steve");

        let missing = run(&mut p, &mut api, &steve, "nowhere");
        assert_eq!(missing.messages, vec!["No home named 'nowhere'.".to_string()]);

        steve.location.dimension = "aether".into();
        let invalid = run(&mut p, &mut api, &steve, "set sky");
        assert!(!invalid.success);
        assert!(invalid.messages[0].contains("unavailable"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn delete_frees_slot() {
        let dir = temp_dir("homes_del");
        let mut p = plugin(&dir);
        let mut api = MockApi::with_players(&["Steve"]);
        let steve = player("Steve");

        run(&mut p, &mut api, &steve, "set mine");
        let deleted = run(&mut p, &mut api, &steve, "delete MINE");
        assert_eq!(deleted.messages, vec!["Home 'mine' deleted.".to_string()]);
        assert!(!run(&mut p, &mut api, &steve, "delete mine").success);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn command_words_cannot_be_home_names() {
        let dir = temp_dir("homes_reserved");
        let mut p = plugin(&dir);
        let mut api = MockApi::with_players(&["Steve"]);
        let steve = player("Steve");

        for line in ["set list", "set SET", "set delete"] {
            let refused = run(&mut p, &mut api, &steve, line);
            assert!(!refused.success, "{line}");
        }
        assert_eq!(p.homes.count(&Scope::Owner(steve.uuid)), 0);
        assert!(run(&mut p, &mut api, &steve, "set listing").success);

        std::fs::remove_dir_all(&dir).ok();
    }
}
