//! `/tpa`, `/tpahere`, `/tpaccept`, `/tpdeny`, `/tpcancel`.

use std::sync::Arc;
use std::time::Duration;

use allay_kit_api::{CommandResult, Plugin, PluginInfo, PluginPlayer, ServerApi};
use allay_kit_session::{CooldownRegistry, TeleportDirection, TeleportRequests};
use allay_kit_store::now_millis;

use super::{format_wait, session_failure, REQUEST_CHECK_TICKS};

const PLUGIN: &str = "TeleportRequests";
const KIND: &str = "teleport request";
const EXPIRE_TASK: u32 = 1;
const COOLDOWN_ACTION: &str = "tpa";

pub struct TeleportPlugin {
    requests: Arc<TeleportRequests>,
    cooldowns: Arc<CooldownRegistry>,
    cooldown: Option<Duration>,
}

impl TeleportPlugin {
    pub fn new(
        requests: Arc<TeleportRequests>,
        cooldowns: Arc<CooldownRegistry>,
        cooldown: Option<Duration>,
    ) -> Self {
        Self {
            requests,
            cooldowns,
            cooldown,
        }
    }

    fn ask(
        &self,
        sender: &PluginPlayer,
        target: Option<&String>,
        direction: TeleportDirection,
        api: &mut dyn ServerApi,
    ) -> CommandResult {
        let Some(target_name) = target else {
            return CommandResult::err("Usage: /tpa <player>");
        };
        let Some(target) = api.get_player(target_name) else {
            return CommandResult::err(format!("{target_name} is not online."));
        };
        if target.uuid == sender.uuid {
            return CommandResult::err("You cannot teleport to yourself.");
        }
        if let Some(cooldown) = self.cooldown {
            if let Some(wait) =
                self.cooldowns
                    .remaining_at(sender.uuid, COOLDOWN_ACTION, cooldown, now_millis())
            {
                return CommandResult::err(format!(
                    "You must wait {} before sending another request.",
                    format_wait(wait)
                ));
            }
        }
        if let Err(e) = self.requests.open(sender.uuid, target.uuid, direction) {
            return session_failure(&e, api, KIND);
        }
        if let Some(cooldown) = self.cooldown {
            // Checked above; a lost race only means a second request went out.
            let _ = self.cooldowns.try_start(sender.uuid, COOLDOWN_ACTION, cooldown);
        }

        let prompt = match direction {
            TeleportDirection::ToTarget => format!("{} wants to teleport to you.", sender.name),
            TeleportDirection::ToRequester => {
                format!("{} wants you to teleport to them.", sender.name)
            }
        };
        api.send_message(
            &target.name,
            &format!("{prompt} Use /tpaccept or /tpdeny."),
        );
        CommandResult::ok(format!("Request sent to {}.", target.name))
    }

    fn accept(&self, sender: &PluginPlayer, api: &mut dyn ServerApi) -> CommandResult {
        let grant = match self.requests.accept_request(sender.uuid) {
            Ok(grant) => grant,
            Err(e) => return session_failure(&e, api, KIND),
        };
        let (Some(traveller), Some(destination)) = (
            api.player_by_uuid(grant.traveller),
            api.player_by_uuid(grant.destination),
        ) else {
            return CommandResult::err("The other player is no longer online.");
        };
        api.teleport_player(&traveller.name, &destination.location);
        let requester = if traveller.uuid == sender.uuid {
            &destination
        } else {
            &traveller
        };
        api.send_message(
            &requester.name,
            &format!("{} accepted your teleport request.", sender.name),
        );
        CommandResult::ok(format!(
            "Teleporting {} to {}.",
            traveller.name, destination.name
        ))
    }

    /// Close the sender's request. `as_target` picks which side may do so.
    fn close(&self, sender: &PluginPlayer, as_target: bool, api: &mut dyn ServerApi) -> CommandResult {
        let is_target = self
            .requests
            .with_session(sender.uuid, |s| s.partner() == sender.uuid);
        match is_target {
            Ok(is_target) if is_target != as_target => {
                return CommandResult::err(if as_target {
                    "Use /tpcancel to withdraw your own request."
                } else {
                    "Use /tpdeny to refuse a request sent to you."
                });
            }
            Ok(_) => {}
            Err(e) => return session_failure(&e, api, KIND),
        }
        match self.requests.cancel(sender.uuid) {
            Ok(closed) => {
                let verb = if as_target { "denied" } else { "withdrew" };
                api.message_owner(
                    closed.other(sender.uuid),
                    &format!("{} {verb} the teleport request.", sender.name),
                );
                CommandResult::ok(format!("Request {}.", if as_target { "denied" } else { "cancelled" }))
            }
            Err(e) => session_failure(&e, api, KIND),
        }
    }
}

impl Plugin for TeleportPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Player-to-player teleport requests".into(),
            author: "allay-kit".into(),
        }
    }

    fn on_enable(&mut self, api: &mut dyn ServerApi) {
        api.register_command("tpa", "/tpa <player>: ask to teleport to a player", PLUGIN);
        api.register_command("tpahere", "/tpahere <player>: ask a player to come to you", PLUGIN);
        api.register_command("tpaccept", "Accept a teleport request", PLUGIN);
        api.register_command("tpdeny", "Deny a teleport request", PLUGIN);
        api.register_command("tpcancel", "Withdraw your teleport request", PLUGIN);
        api.schedule_repeating(PLUGIN, REQUEST_CHECK_TICKS, REQUEST_CHECK_TICKS, EXPIRE_TASK);
    }

    fn on_task(&mut self, task_id: u32, api: &mut dyn ServerApi) {
        if task_id != EXPIRE_TASK {
            return;
        }
        for closed in self.requests.expire_stale() {
            for owner in [closed.initiator, closed.partner] {
                api.message_owner(owner, "The teleport request expired.");
            }
        }
    }

    fn on_command(
        &mut self,
        command: &str,
        args: &[String],
        sender: &PluginPlayer,
        api: &mut dyn ServerApi,
    ) -> CommandResult {
        match command {
            "tpa" => self.ask(sender, args.first(), TeleportDirection::ToTarget, api),
            "tpahere" => self.ask(sender, args.first(), TeleportDirection::ToRequester, api),
            "tpaccept" => self.accept(sender, api),
            "tpdeny" => self.close(sender, true, api),
            "tpcancel" => self.close(sender, false, api),
            other => CommandResult::err(format!("Unhandled command: {other}")),
        }
    }
}
