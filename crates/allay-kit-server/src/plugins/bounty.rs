//! `/bounty`: rewards posted on a player, paid to whoever kills them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use allay_kit_api::{
    CommandResult, ItemRegistry, ItemStack, LogLevel, Plugin, PluginEvent, PluginInfo,
    PluginPlayer, ServerApi, Uuid,
};
use allay_kit_store::{
    now_millis, DocumentLayout, EntityStore, JsonDocument, KindConfig, LivenessFlag, NamedEntity,
    Scope, StoreError,
};
use serde_json::{json, Value};
use tracing::warn;

use super::{store_failure, to_store_location};

const PLUGIN: &str = "Bounty";
const SWEEP_TASK: u32 = 1;
const DEFAULT_REWARD: &str = "minecraft:emerald";

/// Bounties live in the target's scope, one per issuer, named after the issuer.
struct Bounty {
    issuer: Option<Uuid>,
    issuer_name: String,
    target_name: String,
    reward: ItemStack,
}

impl Bounty {
    fn from_entity(entity: &NamedEntity) -> Option<Self> {
        let reward = serde_json::from_value(entity.metadata.get("reward")?.clone()).ok()?;
        Some(Self {
            issuer: entity
                .metadata
                .get("issuer")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
            issuer_name: entity.name.clone(),
            target_name: entity
                .metadata
                .get("target")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string(),
            reward,
        })
    }
}

fn total_by_item(rewards: impl IntoIterator<Item = ItemStack>) -> Vec<ItemStack> {
    let mut totals: BTreeMap<String, u32> = BTreeMap::new();
    for item in rewards {
        *totals.entry(item.identifier).or_default() += item.count;
    }
    totals
        .into_iter()
        .map(|(identifier, count)| ItemStack::new(identifier, count))
        .collect()
}

fn describe(items: &[ItemStack]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Open the bounty store. Bounties that lapsed while the server was down are
/// dropped on load and refunded by the sweep on startup.
pub fn open_store(path: &Path, kind: KindConfig) -> EntityStore {
    let expiry = kind.expiry();
    EntityStore::open(
        "bounties",
        kind,
        Arc::new(JsonDocument::new(path, DocumentLayout::ByOwner, expiry)),
    )
}

pub struct BountyPlugin {
    bounties: Arc<EntityStore>,
    items: Arc<ItemRegistry>,
    reward_item: String,
    sweep_interval: u64,
    alive: LivenessFlag,
}

impl BountyPlugin {
    pub fn new(bounties: Arc<EntityStore>, items: Arc<ItemRegistry>, sweep_interval: u64) -> Self {
        Self {
            bounties,
            items,
            reward_item: DEFAULT_REWARD.to_string(),
            sweep_interval,
            alive: LivenessFlag::new(),
        }
    }

    fn place(&self, sender: &PluginPlayer, args: &[String], api: &mut dyn ServerApi) -> CommandResult {
        let (Some(target_name), Some(amount)) = (args.first(), args.get(1)) else {
            return CommandResult::err("Usage: /bounty place <player> <amount>");
        };
        let Some(target) = api.resolve_player(target_name) else {
            return CommandResult::err(format!("Unknown player: {target_name}"));
        };
        if target == sender.uuid {
            return CommandResult::err("You cannot place a bounty on yourself.");
        }
        let Ok(amount) = amount.parse::<u32>() else {
            return CommandResult::err(format!("Invalid amount: {amount}"));
        };
        let reward = match self.items.create(&self.reward_item, amount) {
            Ok(item) => item,
            Err(e) => return CommandResult::err(format!("Cannot post that bounty: {e}.")),
        };
        let held = api.item_count(&sender.name, &reward.identifier);
        if held < reward.count {
            return CommandResult::err(format!("You only have {held} of {}.", reward.identifier));
        }

        let bounty = NamedEntity::new(&sender.name, to_store_location(&sender.location))
            .with_creator(&sender.name)
            .with_description(format!("Bounty on {target_name}"))
            .with_metadata("issuer", sender.uuid.to_string())
            .with_metadata("target", target_name.as_str())
            .with_metadata(
                "reward",
                json!({ "identifier": reward.identifier, "count": reward.count }),
            );
        match self.bounties.create(&Scope::Owner(target), bounty) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                return CommandResult::err(format!(
                    "You already have a bounty on {target_name}. Remove it first."
                ));
            }
            Err(StoreError::CapacityExceeded { limit, .. }) => {
                return CommandResult::err(format!(
                    "{target_name} already carries the maximum of {limit} bounties."
                ));
            }
            Err(e) => return store_failure(&e, "bounty"),
        }
        api.take_item(&sender.name, reward.clone());
        api.broadcast_message(&format!(
            "{} placed a bounty of {reward} on {target_name}!",
            sender.name
        ));
        CommandResult::ok(format!("Bounty of {reward} placed on {target_name}."))
    }

    fn list(&self, target: Option<&str>, api: &dyn ServerApi) -> CommandResult {
        if let Some(name) = target {
            let Some(uuid) = api.resolve_player(name) else {
                return CommandResult::err(format!("Unknown player: {name}"));
            };
            let bounties: Vec<_> = self
                .bounties
                .list(&Scope::Owner(uuid))
                .iter()
                .filter_map(Bounty::from_entity)
                .collect();
            if bounties.is_empty() {
                return CommandResult::ok(format!("There are no bounties on {name}."));
            }
            let mut lines = vec![format!("Bounties on {name}:")];
            lines.extend(
                bounties
                    .iter()
                    .map(|b| format!("  {} - {}", b.issuer_name, b.reward)),
            );
            return CommandResult::lines(lines);
        }

        let mut lines = Vec::new();
        for scope in self.bounties.scopes() {
            let bounties: Vec<_> = self
                .bounties
                .list(&scope)
                .iter()
                .filter_map(Bounty::from_entity)
                .collect();
            let Some(first) = bounties.first() else {
                continue;
            };
            let target_name = first.target_name.clone();
            let count = bounties.len();
            let totals = total_by_item(bounties.into_iter().map(|b| b.reward));
            lines.push(format!("  {target_name}: {} ({count} bounties)", describe(&totals)));
        }
        if lines.is_empty() {
            return CommandResult::ok("There are no open bounties.");
        }
        lines.insert(0, "Open bounties:".to_string());
        CommandResult::lines(lines)
    }

    fn remove(&self, sender: &PluginPlayer, target_name: &str, api: &mut dyn ServerApi) -> CommandResult {
        let Some(target) = api.resolve_player(target_name) else {
            return CommandResult::err(format!("Unknown player: {target_name}"));
        };
        match self.bounties.delete(&Scope::Owner(target), &sender.name) {
            Ok(removed) => {
                if let Some(bounty) = Bounty::from_entity(&removed) {
                    api.give_item(&sender.name, bounty.reward.clone());
                    CommandResult::ok(format!(
                        "Bounty on {target_name} removed; {} refunded.",
                        bounty.reward
                    ))
                } else {
                    CommandResult::ok(format!("Bounty on {target_name} removed."))
                }
            }
            Err(StoreError::NotFound { .. }) => {
                CommandResult::err(format!("You have no bounty on {target_name}."))
            }
            Err(e) => store_failure(&e, "bounty"),
        }
    }

    /// Pay out every bounty on `victim` to `killer`.
    fn claim(&self, victim: &PluginPlayer, killer: &PluginPlayer, api: &mut dyn ServerApi) {
        let scope = Scope::Owner(victim.uuid);
        let claimed: Vec<Bounty> = self
            .bounties
            .list(&scope)
            .into_iter()
            .filter_map(|entity| {
                // Another death event may have claimed it first.
                let removed = self.bounties.delete(&scope, &entity.name).ok()?;
                Bounty::from_entity(&removed)
            })
            .collect();
        if claimed.is_empty() {
            return;
        }
        let totals = total_by_item(claimed.into_iter().map(|b| b.reward));
        for item in &totals {
            api.give_item(&killer.name, item.clone());
        }
        api.broadcast_message(&format!(
            "{} claimed the bounty on {}: {}",
            killer.name,
            victim.name,
            describe(&totals)
        ));
    }

    /// Refund the issuers of expired bounties.
    fn sweep(&self, api: &mut dyn ServerApi) {
        let swept = self.bounties.sweep_expired(now_millis());
        if swept.is_empty() {
            return;
        }
        let mut refunded = 0;
        for (_, entity) in &swept {
            let Some(bounty) = Bounty::from_entity(entity) else {
                continue;
            };
            let Some(issuer) = bounty.issuer else {
                continue;
            };
            api.message_owner(
                issuer,
                &format!(
                    "Your bounty on {} expired; {} refunded.",
                    bounty.target_name, bounty.reward
                ),
            );
            api.give_item_to(issuer, bounty.reward);
            refunded += 1;
        }
        api.log(
            LogLevel::Info,
            &format!("Expired {} bounties, refunded {refunded}", swept.len()),
        );
    }
}

impl Plugin for BountyPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Player bounties paid on kill".into(),
            author: "allay-kit".into(),
        }
    }

    fn on_enable(&mut self, api: &mut dyn ServerApi) {
        api.register_command(
            "bounty",
            "/bounty place <player> <amount> | list [player] | remove <player>",
            PLUGIN,
        );
        api.schedule_repeating(PLUGIN, self.sweep_interval, self.sweep_interval, SWEEP_TASK);
    }

    fn on_disable(&mut self) {
        self.alive.kill();
    }

    fn on_event(&mut self, event: &PluginEvent, api: &mut dyn ServerApi) {
        match event {
            PluginEvent::PlayerDeath {
                player,
                killer: Some(killer),
            } if killer.uuid != player.uuid => self.claim(player, killer, api),
            PluginEvent::ServerStarted => self.sweep(api),
            _ => {}
        }
    }

    fn on_task(&mut self, task_id: u32, api: &mut dyn ServerApi) {
        if task_id == SWEEP_TASK && self.alive.is_alive() {
            self.sweep(api);
        }
    }

    fn on_command(
        &mut self,
        _command: &str,
        args: &[String],
        sender: &PluginPlayer,
        api: &mut dyn ServerApi,
    ) -> CommandResult {
        let rest = args.get(1..).unwrap_or(&[]);
        match args.first().map(String::as_str) {
            Some("place" | "set") => self.place(sender, rest, api),
            Some("list") | None => self.list(rest.first().map(String::as_str), api),
            Some("remove" | "cancel") => match rest.first() {
                Some(target) => self.remove(sender, target, api),
                None => CommandResult::err("Usage: /bounty remove <player>"),
            },
            Some(other) => CommandResult::err(format!("Unknown bounty action: {other}")),
        }
    }

    fn default_config(&self) -> Option<Value> {
        Some(json!({ "reward_item": DEFAULT_REWARD }))
    }

    fn load_config(&mut self, config: Value) {
        let Some(item) = config.get("reward_item").and_then(Value::as_str) else {
            return;
        };
        match self.items.get_by_name(item) {
            Some(info) => self.reward_item = info.name.clone(),
            None => warn!("Unknown bounty reward item {item}, keeping {}", self.reward_item),
        }
    }
}
