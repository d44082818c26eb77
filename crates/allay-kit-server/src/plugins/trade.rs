//! `/trade`: two-player item exchange with escrow.
//!
//! Offered items leave the offerer's inventory at once and are held by the
//! trade until it completes (swapped) or closes (refunded).

use std::sync::Arc;

use allay_kit_api::{
    CommandResult, ItemRegistry, ItemStack, Plugin, PluginInfo, PluginPlayer, ServerApi, Uuid,
};
use allay_kit_session::{Closed, JointState, TradeOffers, TradeProgress, TradeRegistry};
use allay_kit_store::LivenessFlag;

use super::{display_name, session_failure, REQUEST_CHECK_TICKS};

const PLUGIN: &str = "Trade";
const EXPIRE_TASK: u32 = 1;

fn describe(items: &[ItemStack]) -> String {
    if items.is_empty() {
        return "nothing".to_string();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn refund(closed: Closed, api: &mut dyn ServerApi) {
    for (owner, items) in closed.refunds {
        for item in items {
            api.give_item_to(owner, item);
        }
    }
}

pub struct TradePlugin {
    trades: Arc<TradeRegistry>,
    items: Arc<ItemRegistry>,
    alive: LivenessFlag,
}

impl TradePlugin {
    pub fn new(trades: Arc<TradeRegistry>, items: Arc<ItemRegistry>) -> Self {
        Self {
            trades,
            items,
            alive: LivenessFlag::new(),
        }
    }

    fn partner_of(&self, owner: Uuid) -> Option<Uuid> {
        self.trades.with_session(owner, |s| s.other(owner)).ok().flatten()
    }

    fn request(&self, sender: &PluginPlayer, target: Option<&String>, api: &mut dyn ServerApi) -> CommandResult {
        let Some(target_name) = target else {
            return CommandResult::err("Usage: /trade request <player>");
        };
        let Some(target) = api.get_player(target_name) else {
            return CommandResult::err(format!("{target_name} is not online."));
        };
        if let Err(e) = self.trades.open(sender.uuid, target.uuid, TradeOffers::default()) {
            return session_failure(&e, api, "trade");
        }
        api.send_message(
            &target.name,
            &format!(
                "{} wants to trade with you. Use /trade accept or /trade cancel.",
                sender.name
            ),
        );
        CommandResult::ok(format!("Trade request sent to {}.", target.name))
    }

    fn accept(&self, sender: &PluginPlayer, api: &mut dyn ServerApi) -> CommandResult {
        if let Err(e) = self.trades.accept(sender.uuid) {
            return session_failure(&e, api, "trade");
        }
        if let Some(partner) = self.partner_of(sender.uuid) {
            api.message_owner(
                partner,
                &format!("{} accepted your trade. Add items with /trade add.", sender.name),
            );
        }
        CommandResult::ok("Trade accepted. Add items with /trade add <item> <count>.")
    }

    fn add(&self, sender: &PluginPlayer, args: &[String], api: &mut dyn ServerApi) -> CommandResult {
        let (Some(item_name), Some(count)) = (args.first(), args.get(1)) else {
            return CommandResult::err("Usage: /trade add <item> <count>");
        };
        let Ok(count) = count.parse::<u32>() else {
            return CommandResult::err(format!("Invalid count: {count}"));
        };
        let item = match self.items.create(item_name, count) {
            Ok(item) => item,
            Err(e) => return CommandResult::err(format!("Cannot offer that: {e}.")),
        };
        let held = api.item_count(&sender.name, &item.identifier);
        if held < item.count {
            return CommandResult::err(format!("You only have {held} of {}.", item.identifier));
        }
        if let Err(e) = self.trades.offer(sender.uuid, item.clone()) {
            return session_failure(&e, api, "trade");
        }
        api.take_item(&sender.name, item.clone());
        if let Some(partner) = self.partner_of(sender.uuid) {
            api.message_owner(
                partner,
                &format!("{} offered {item}. Confirmations were reset.", sender.name),
            );
        }
        CommandResult::ok(format!("Offered {item}."))
    }

    fn confirm(&self, sender: &PluginPlayer, api: &mut dyn ServerApi) -> CommandResult {
        let partner = self.partner_of(sender.uuid);
        match self.trades.confirm_trade(sender.uuid) {
            Ok(TradeProgress::Waiting) => {
                if let Some(partner) = partner {
                    api.message_owner(
                        partner,
                        &format!("{} confirmed the trade. Use /trade confirm to finish.", sender.name),
                    );
                }
                CommandResult::ok("Confirmed. Waiting for the other player.")
            }
            Ok(TradeProgress::Completed(deliveries)) => {
                for (owner, items) in deliveries {
                    let received = describe(&items);
                    for item in items {
                        api.give_item_to(owner, item);
                    }
                    if owner != sender.uuid {
                        api.message_owner(owner, &format!("Trade complete. You received {received}."));
                    }
                }
                CommandResult::ok("Trade complete.")
            }
            Err(e) => session_failure(&e, api, "trade"),
        }
    }

    fn cancel(&self, sender: &PluginPlayer, api: &mut dyn ServerApi) -> CommandResult {
        match self.trades.cancel(sender.uuid) {
            Ok(closed) => {
                api.message_owner(
                    closed.other(sender.uuid),
                    &format!("{} cancelled the trade.", sender.name),
                );
                refund(closed, api);
                CommandResult::ok("Trade cancelled.")
            }
            Err(e) => session_failure(&e, api, "trade"),
        }
    }

    fn status(&self, sender: &PluginPlayer, api: &dyn ServerApi) -> CommandResult {
        let view = self.trades.with_session(sender.uuid, |s| {
            let mine_first = s.initiator() == sender.uuid;
            let (mine, theirs) = if mine_first {
                (&s.terms().initiator, &s.terms().partner)
            } else {
                (&s.terms().partner, &s.terms().initiator)
            };
            let partner = s.other(sender.uuid).unwrap_or(sender.uuid);
            (
                s.state(),
                partner,
                describe(mine),
                describe(theirs),
                s.is_confirmed_by(sender.uuid),
                s.is_confirmed_by(partner),
            )
        });
        let Ok((state, partner, mine, theirs, me_ok, them_ok)) = view else {
            return CommandResult::err("You are not trading.");
        };
        let tick = |confirmed: bool| if confirmed { " (confirmed)" } else { "" };
        let partner_name = display_name(api, partner);
        let state = match state {
            JointState::Requested => "waiting for acceptance",
            JointState::Accepted => "open",
            JointState::BothConfirmed => "confirmed",
            _ => "closing",
        };
        CommandResult::lines(vec![
            format!("Trade with {partner_name}: {state}"),
            format!("  You offer: {mine}{}", tick(me_ok)),
            format!("  {partner_name} offers: {theirs}{}", tick(them_ok)),
        ])
    }
}

impl Plugin for TradePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Two-player item trades".into(),
            author: "allay-kit".into(),
        }
    }

    fn on_enable(&mut self, api: &mut dyn ServerApi) {
        api.register_command(
            "trade",
            "/trade request <player> | accept | add <item> <count> | confirm | cancel | status",
            PLUGIN,
        );
        api.schedule_repeating(PLUGIN, REQUEST_CHECK_TICKS, REQUEST_CHECK_TICKS, EXPIRE_TASK);
    }

    fn on_disable(&mut self) {
        self.alive.kill();
    }

    fn on_task(&mut self, task_id: u32, api: &mut dyn ServerApi) {
        if task_id != EXPIRE_TASK || !self.alive.is_alive() {
            return;
        }
        for closed in self.trades.expire_stale() {
            for owner in [closed.initiator, closed.partner] {
                api.message_owner(owner, "Your trade expired.");
            }
            refund(closed, api);
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
            Some("request" | "with") => self.request(sender, rest.first(), api),
            Some("accept") => self.accept(sender, api),
            Some("add" | "offer") => self.add(sender, rest, api),
            Some("confirm") => self.confirm(sender, api),
            Some("cancel" | "deny") => self.cancel(sender, api),
            Some("status") | None => self.status(sender, api),
            Some(other) => CommandResult::err(format!("Unknown trade action: {other}")),
        }
    }
}
