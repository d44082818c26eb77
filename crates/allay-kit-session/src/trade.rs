//! Two-player item trades.

use allay_kit_api::ItemStack;
use allay_kit_store::OwnerId;

use crate::error::SessionError;
use crate::joint::JointState;
use crate::registry::{JointRegistry, Terms};

/// Items each side has put up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeOffers {
    pub initiator: Vec<ItemStack>,
    pub partner: Vec<ItemStack>,
}

impl Terms for TradeOffers {
    fn refunds(self, initiator: OwnerId, partner: OwnerId) -> Vec<(OwnerId, Vec<ItemStack>)> {
        [(initiator, self.initiator), (partner, self.partner)]
            .into_iter()
            .filter(|(_, items)| !items.is_empty())
            .collect()
    }
}

pub type TradeRegistry = JointRegistry<TradeOffers>;

/// Outcome of a confirmation.
#[derive(Debug, PartialEq, Eq)]
pub enum TradeProgress {
    /// Waiting for the other side.
    Waiting,
    /// Both sides confirmed; deliver these items.
    Completed(Vec<(OwnerId, Vec<ItemStack>)>),
}

fn add_item(items: &mut Vec<ItemStack>, item: ItemStack) {
    match items.iter_mut().find(|i| i.identifier == item.identifier) {
        Some(existing) => existing.count += item.count,
        None => items.push(item),
    }
}

impl JointRegistry<TradeOffers> {
    /// Put an item up for trade. Clears both confirmations.
    pub fn offer(&self, by: OwnerId, item: ItemStack) -> Result<(), SessionError> {
        self.with_session(by, |session| {
            let is_initiator = by == session.initiator();
            let offers = session.amend(by)?;
            if is_initiator {
                add_item(&mut offers.initiator, item);
            } else {
                add_item(&mut offers.partner, item);
            }
            Ok(())
        })?
    }

    pub fn offers(&self, owner: OwnerId) -> Option<TradeOffers> {
        self.with_session(owner, |s| s.terms().clone()).ok()
    }

    /// Confirm the current offers. The second confirmation completes the
    /// trade: each side receives what the other put up.
    pub fn confirm_trade(&self, by: OwnerId) -> Result<TradeProgress, SessionError> {
        if self.confirm(by)? != JointState::BothConfirmed {
            return Ok(TradeProgress::Waiting);
        }
        let done = self.complete(by)?;
        Ok(TradeProgress::Completed(vec![
            (done.partner, done.terms.initiator),
            (done.initiator, done.terms.partner),
        ]))
    }
}
