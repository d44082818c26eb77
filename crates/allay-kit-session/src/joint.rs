//! Two-party session state machine (trades, teleport requests).
//!
//! ```text
//! Requested ──accept──▶ Accepted ──both confirm──▶ BothConfirmed ──complete──▶ Completed
//!     │                    │                             │
//!     ├──cancel / end──────┴──────────cancel / end───────┴──▶ Cancelled
//!     └──timeout───────────┴──▶ Expired
//! ```

use std::time::Duration;

use allay_kit_store::OwnerId;

use crate::error::SessionError;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointState {
    Requested,
    Accepted,
    BothConfirmed,
    Completed,
    Cancelled,
    Expired,
}

impl JointState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JointState::Completed | JointState::Cancelled | JointState::Expired
        )
    }
}

/// One joint session between an initiator and a partner, carrying the
/// terms `T` both sides agree on.
#[derive(Debug)]
pub struct JointSession<T> {
    id: SessionId,
    initiator: OwnerId,
    partner: OwnerId,
    state: JointState,
    confirmed: [bool; 2],
    opened_at: i64,
    terms: T,
}

impl<T: Default> JointSession<T> {
    pub fn new(id: SessionId, initiator: OwnerId, partner: OwnerId, opened_at: i64, terms: T) -> Self {
        Self {
            id,
            initiator,
            partner,
            state: JointState::Requested,
            confirmed: [false; 2],
            opened_at,
            terms,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn initiator(&self) -> OwnerId {
        self.initiator
    }

    pub fn partner(&self) -> OwnerId {
        self.partner
    }

    pub fn state(&self) -> JointState {
        self.state
    }

    pub fn terms(&self) -> &T {
        &self.terms
    }

    /// The party opposite `owner`.
    pub fn other(&self, owner: OwnerId) -> Option<OwnerId> {
        if owner == self.initiator {
            Some(self.partner)
        } else if owner == self.partner {
            Some(self.initiator)
        } else {
            None
        }
    }

    fn side(&self, owner: OwnerId) -> Result<usize, SessionError> {
        if owner == self.initiator {
            Ok(0)
        } else if owner == self.partner {
            Ok(1)
        } else {
            Err(SessionError::NotAParty(owner))
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state,
            action,
        }
    }

    /// Requested → Accepted. Only the partner may accept.
    pub fn accept(&mut self, by: OwnerId) -> Result<(), SessionError> {
        self.side(by)?;
        if by != self.partner {
            return Err(SessionError::NotInvited);
        }
        if self.state != JointState::Requested {
            return Err(self.invalid("accept"));
        }
        self.state = JointState::Accepted;
        Ok(())
    }

    /// Record `by`'s confirmation. Accepted → BothConfirmed once both agree.
    pub fn confirm(&mut self, by: OwnerId) -> Result<JointState, SessionError> {
        let side = self.side(by)?;
        if self.state != JointState::Accepted {
            return Err(self.invalid("confirm"));
        }
        self.confirmed[side] = true;
        if self.confirmed == [true, true] {
            self.state = JointState::BothConfirmed;
        }
        Ok(self.state)
    }

    pub fn is_confirmed_by(&self, owner: OwnerId) -> bool {
        self.side(owner).map(|s| self.confirmed[s]).unwrap_or(false)
    }

    /// Change the terms. Only allowed while Accepted; clears both
    /// confirmations so nobody agrees to terms they have not seen.
    pub fn amend(&mut self, by: OwnerId) -> Result<&mut T, SessionError> {
        self.side(by)?;
        if self.state != JointState::Accepted {
            return Err(self.invalid("change the terms"));
        }
        self.confirmed = [false; 2];
        Ok(&mut self.terms)
    }

    /// Any non-terminal state → Cancelled. Returns the terms for refunding.
    pub fn cancel(&mut self) -> Result<T, SessionError> {
        if self.state.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        self.state = JointState::Cancelled;
        Ok(std::mem::take(&mut self.terms))
    }

    /// Requested/Accepted → Expired when older than `timeout`.
    /// BothConfirmed never expires.
    pub fn expire_if_stale(&mut self, now_millis: i64, timeout: Duration) -> Option<T> {
        if !matches!(self.state, JointState::Requested | JointState::Accepted) {
            return None;
        }
        let age = now_millis.saturating_sub(self.opened_at);
        if age <= timeout.as_millis() as i64 {
            return None;
        }
        self.state = JointState::Expired;
        Some(std::mem::take(&mut self.terms))
    }

    /// BothConfirmed → Completed, handing out the agreed terms.
    pub fn complete(&mut self) -> Result<T, SessionError> {
        if self.state != JointState::BothConfirmed {
            return Err(self.invalid("complete"));
        }
        self.state = JointState::Completed;
        Ok(std::mem::take(&mut self.terms))
    }
}
