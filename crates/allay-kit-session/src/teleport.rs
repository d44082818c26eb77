//! Teleport requests (`/tpa`, `/tpahere`).

use allay_kit_store::OwnerId;

use crate::error::SessionError;
use crate::registry::{JointRegistry, Terms};

/// Who moves when the request is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeleportDirection {
    /// The requester goes to the target.
    #[default]
    ToTarget,
    /// The target is brought to the requester.
    ToRequester,
}

impl Terms for TeleportDirection {}

pub type TeleportRequests = JointRegistry<TeleportDirection>;

/// An accepted request: move `traveller` to `destination`'s position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleportGrant {
    pub traveller: OwnerId,
    pub destination: OwnerId,
}

impl JointRegistry<TeleportDirection> {
    /// The target accepts. Asking counts as the requester's confirmation and
    /// accepting as the target's, so the request completes at once.
    pub fn accept_request(&self, target: OwnerId) -> Result<TeleportGrant, SessionError> {
        self.with_session(target, |s| {
            s.accept(target)?;
            s.confirm(s.initiator())?;
            s.confirm(target)
        })??;
        let done = self.complete(target)?;
        Ok(match done.terms {
            TeleportDirection::ToTarget => TeleportGrant {
                traveller: done.initiator,
                destination: done.partner,
            },
            TeleportDirection::ToRequester => TeleportGrant {
                traveller: done.partner,
                destination: done.initiator,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::JointState;
    use std::time::Duration;
    use uuid::Uuid;

    const REQ: OwnerId = Uuid::from_u128(1);
    const TGT: OwnerId = Uuid::from_u128(2);

    fn requests() -> TeleportRequests {
        TeleportRequests::new("teleport request", Duration::from_secs(60))
    }

    #[test]
    fn tpa_moves_requester() {
        let reg = requests();
        reg.open(REQ, TGT, TeleportDirection::ToTarget).unwrap();
        assert_eq!(
            reg.accept_request(TGT).unwrap(),
            TeleportGrant {
                traveller: REQ,
                destination: TGT
            }
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn tpahere_moves_target() {
        let reg = requests();
        reg.open(REQ, TGT, TeleportDirection::ToRequester).unwrap();
        let grant = reg.accept_request(TGT).unwrap();
        assert_eq!(grant.traveller, TGT);
    }

    #[test]
    fn requester_cannot_accept_own_request() {
        let reg = requests();
        reg.open(REQ, TGT, TeleportDirection::ToTarget).unwrap();
        assert_eq!(reg.accept_request(REQ), Err(SessionError::NotInvited));
        assert_eq!(reg.state_of(TGT), Some(JointState::Requested));
    }

    #[test]
    fn deny_cancels() {
        let reg = requests();
        reg.open(REQ, TGT, TeleportDirection::ToTarget).unwrap();
        let closed = reg.cancel(TGT).unwrap();
        assert_eq!(closed.state, JointState::Cancelled);
        assert!(closed.refunds.is_empty());
        assert!(reg.accept_request(TGT).is_err());
    }

    #[test]
    fn stale_request_expires() {
        let reg = requests();
        reg.open_at(REQ, TGT, TeleportDirection::ToTarget, 0).unwrap();
        assert_eq!(reg.expire_stale_at(60_001).len(), 1);
        assert_eq!(
            reg.accept_request(TGT),
            Err(SessionError::NoSuchSession(TGT))
        );
    }
}
