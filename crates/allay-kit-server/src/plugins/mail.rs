//! `/mail`: offline messages and item gifts, one mailbox file per player.

use std::sync::Arc;

use allay_kit_api::{
    CommandResult, ItemRegistry, ItemStack, LogLevel, Plugin, PluginEvent, PluginInfo,
    PluginPlayer, ServerApi, Uuid,
};
use allay_kit_store::{now_millis, EntityStore, LivenessFlag, NamedEntity, Scope, StoreError};
use serde_json::{json, Value};
use tracing::warn;

use super::{store_failure, to_store_location};

const PLUGIN: &str = "Mail";
const SWEEP_TASK: u32 = 1;

const READ: &str = "read";
const ITEM: &str = "item";
const FROM: &str = "from";

fn attached_item(mail: &NamedEntity) -> Option<ItemStack> {
    mail.metadata
        .get(ITEM)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn is_unread(mail: &NamedEntity) -> bool {
    !mail.metadata.get(READ).and_then(Value::as_bool).unwrap_or(false)
}

fn new_mail_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub struct MailPlugin {
    mail: Arc<EntityStore>,
    items: Arc<ItemRegistry>,
    sweep_interval: u64,
    notify_on_join: bool,
    alive: LivenessFlag,
}

impl MailPlugin {
    pub fn new(mail: Arc<EntityStore>, items: Arc<ItemRegistry>, sweep_interval: u64) -> Self {
        Self {
            mail,
            items,
            sweep_interval,
            notify_on_join: true,
            alive: LivenessFlag::new(),
        }
    }

    fn deliver(
        &self,
        sender: &PluginPlayer,
        recipient_name: &str,
        text: String,
        item: Option<&ItemStack>,
        api: &mut dyn ServerApi,
    ) -> Result<String, CommandResult> {
        let Some(recipient) = api.resolve_player(recipient_name) else {
            return Err(CommandResult::err(format!("Unknown player: {recipient_name}")));
        };
        if recipient == sender.uuid {
            return Err(CommandResult::err("You cannot send mail to yourself."));
        }
        let id = new_mail_id();
        let mut mail = NamedEntity::new(&id, to_store_location(&sender.location))
            .with_creator(&sender.name)
            .with_description(text)
            .with_metadata(FROM, sender.uuid.to_string())
            .with_metadata(READ, false);
        if let Some(item) = item {
            mail = mail.with_metadata(
                ITEM,
                json!({ "identifier": item.identifier, "count": item.count }),
            );
        }
        match self.mail.create(&Scope::Owner(recipient), mail) {
            Ok(()) => {}
            Err(StoreError::CapacityExceeded { limit, .. }) => {
                return Err(CommandResult::err(format!(
                    "{recipient_name}'s mailbox is full ({limit} messages)."
                )));
            }
            Err(e) => return Err(store_failure(&e, "mail")),
        }
        if let Some(online) = api.player_by_uuid(recipient) {
            api.send_message(
                &online.name,
                &format!("You have new mail from {}. Use /mail read.", sender.name),
            );
        }
        Ok(id)
    }

    fn send(&self, sender: &PluginPlayer, args: &[String], api: &mut dyn ServerApi) -> CommandResult {
        let (Some(recipient), true) = (args.first(), args.len() > 1) else {
            return CommandResult::err("Usage: /mail send <player> <message>");
        };
        match self.deliver(sender, recipient, args[1..].join(" "), None, api) {
            Ok(_) => CommandResult::ok(format!("Mail sent to {recipient}.")),
            Err(result) => result,
        }
    }

    fn gift(&self, sender: &PluginPlayer, args: &[String], api: &mut dyn ServerApi) -> CommandResult {
        let usage = || CommandResult::err("Usage: /mail gift <player> <item> <count> [message]");
        let (Some(recipient), Some(item_name), Some(count)) = (args.first(), args.get(1), args.get(2))
        else {
            return usage();
        };
        let Ok(count) = count.parse::<u32>() else {
            return usage();
        };
        let item = match self.items.create(item_name, count) {
            Ok(item) => item,
            Err(e) => return CommandResult::err(format!("Cannot send that: {e}.")),
        };
        let held = api.item_count(&sender.name, &item.identifier);
        if held < item.count {
            return CommandResult::err(format!("You only have {held} of {}.", item.identifier));
        }
        let text = if args.len() > 3 {
            args[3..].join(" ")
        } else {
            format!("A gift of {item}")
        };
        match self.deliver(sender, recipient, text, Some(&item), api) {
            Ok(_) => {
                api.take_item(&sender.name, item.clone());
                CommandResult::ok(format!("Sent {item} to {recipient}."))
            }
            Err(result) => result,
        }
    }

    fn read(&self, sender: &PluginPlayer) -> CommandResult {
        let scope = Scope::Owner(sender.uuid);
        let mut inbox = self.mail.list(&scope);
        if inbox.is_empty() {
            return CommandResult::ok("Your mailbox is empty.");
        }
        inbox.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

        let mut lines = vec![format!("Mailbox ({}):", inbox.len())];
        for mail in inbox {
            let mut line = format!(
                "[{}]{} from {}: {}",
                mail.name,
                if is_unread(&mail) { " (new)" } else { "" },
                mail.creator.as_deref().unwrap_or("?"),
                mail.description.as_deref().unwrap_or(""),
            );
            if let Some(item) = attached_item(&mail) {
                line.push_str(&format!(" [+{item}, /mail claim {}]", mail.name));
            }
            lines.push(line);
            if is_unread(&mail) {
                let id = mail.name.clone();
                let mut seen = mail;
                seen.metadata.insert(READ.into(), Value::Bool(true));
                match self.mail.update(&scope, seen) {
                    Ok(_) => {}
                    // Deleted or expired since the listing.
                    Err(StoreError::NotFound { .. }) => {}
                    Err(e) => warn!("Failed to mark mail {id} read: {e}"),
                }
            }
        }
        CommandResult::lines(lines)
    }

    fn claim(&self, sender: &PluginPlayer, id: &str, api: &mut dyn ServerApi) -> CommandResult {
        let scope = Scope::Owner(sender.uuid);
        let Some(mut mail) = self.mail.get(&scope, id) else {
            return store_failure(
                &StoreError::NotFound {
                    scope,
                    name: id.to_string(),
                },
                "mail",
            );
        };
        let Some(item) = attached_item(&mail) else {
            return CommandResult::err("That mail has no item to claim.");
        };
        mail.metadata.remove(ITEM);
        mail.metadata.insert(READ.into(), Value::Bool(true));
        if let Err(e) = self.mail.update(&scope, mail) {
            return store_failure(&e, "mail");
        }
        api.give_item(&sender.name, item.clone());
        CommandResult::ok(format!("Claimed {item}."))
    }

    fn delete(&self, sender: &PluginPlayer, id: &str) -> CommandResult {
        let scope = Scope::Owner(sender.uuid);
        if let Some(mail) = self.mail.get(&scope, id) {
            if attached_item(&mail).is_some() {
                return CommandResult::err(format!("Claim the item in mail {} first.", mail.name));
            }
        }
        match self.mail.delete(&scope, id) {
            Ok(removed) => CommandResult::ok(format!("Deleted mail {}.", removed.name)),
            Err(e) => store_failure(&e, "mail"),
        }
    }

    fn clear(&self, sender: &PluginPlayer) -> CommandResult {
        let scope = Scope::Owner(sender.uuid);
        let (with_items, plain): (Vec<_>, Vec<_>) = self
            .mail
            .list(&scope)
            .into_iter()
            .partition(|m| attached_item(m).is_some());
        let cleared = plain
            .iter()
            .filter(|m| self.mail.delete(&scope, &m.name).is_ok())
            .count();
        let mut text = format!("Cleared {cleared} messages.");
        if !with_items.is_empty() {
            text.push_str(&format!(" Kept {} with unclaimed items.", with_items.len()));
        }
        CommandResult::ok(text)
    }
}

impl Plugin for MailPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Offline messages and item gifts".into(),
            author: "allay-kit".into(),
        }
    }

    fn on_enable(&mut self, api: &mut dyn ServerApi) {
        api.register_command(
            "mail",
            "/mail send <player> <message> | gift <player> <item> <count> [message] | read | claim|delete <id> | clear",
            PLUGIN,
        );
        api.schedule_repeating(PLUGIN, self.sweep_interval, self.sweep_interval, SWEEP_TASK);
    }

    fn on_disable(&mut self) {
        self.alive.kill();
    }

    fn on_event(&mut self, event: &PluginEvent, api: &mut dyn ServerApi) {
        let PluginEvent::PlayerJoin { player } = event else {
            return;
        };
        if !self.notify_on_join {
            return;
        }
        let unread = self
            .mail
            .list(&Scope::Owner(player.uuid))
            .iter()
            .filter(|m| is_unread(m))
            .count();
        if unread > 0 {
            api.send_message(
                &player.name,
                &format!("You have {unread} unread message(s). Use /mail read."),
            );
        }
    }

    fn on_task(&mut self, task_id: u32, api: &mut dyn ServerApi) {
        if task_id != SWEEP_TASK || !self.alive.is_alive() {
            return;
        }
        let swept = self.mail.sweep_expired(now_millis());
        if swept.is_empty() {
            return;
        }
        let lost_items = swept
            .iter()
            .filter(|(_, mail)| attached_item(mail).is_some())
            .count();
        api.log(
            LogLevel::Info,
            &format!(
                "Removed {} expired mail ({lost_items} with unclaimed items)",
                swept.len()
            ),
        );
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
            Some("send") => self.send(sender, rest, api),
            Some("gift") => self.gift(sender, rest, api),
            Some("read") | None => self.read(sender),
            Some("claim") => match rest.first() {
                Some(id) => self.claim(sender, id, api),
                None => CommandResult::err("Usage: /mail claim <id>"),
            },
            Some("delete" | "del") => match rest.first() {
                Some(id) => self.delete(sender, id),
                None => CommandResult::err("Usage: /mail delete <id>"),
            },
            Some("clear") => self.clear(sender),
            Some(other) => CommandResult::err(format!("Unknown mail action: {other}")),
        }
    }

    fn default_config(&self) -> Option<Value> {
        Some(json!({ "notify_on_join": true }))
    }

    fn load_config(&mut self, config: Value) {
        if let Some(v) = config.get("notify_on_join").and_then(Value::as_bool) {
            self.notify_on_join = v;
        }
    }
}
