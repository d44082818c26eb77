//! Concurrent registry of joint sessions, indexed by both parties.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use allay_kit_api::ItemStack;
use allay_kit_store::{now_millis, OwnerId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::SessionError;
use crate::joint::{JointSession, JointState, SessionId};
use crate::lifecycle::{SessionEffect, TransientRegistry};

/// What a joint session carries. Terms that hold items hand them back when
/// the session ends without completing.
pub trait Terms: Default + Send + 'static {
    fn refunds(self, initiator: OwnerId, partner: OwnerId) -> Vec<(OwnerId, Vec<ItemStack>)> {
        let _ = (initiator, partner);
        Vec::new()
    }
}

/// A session that ended without completing.
#[derive(Debug)]
pub struct Closed {
    pub id: SessionId,
    pub initiator: OwnerId,
    pub partner: OwnerId,
    pub state: JointState,
    /// Items to hand back, per owner.
    pub refunds: Vec<(OwnerId, Vec<ItemStack>)>,
}

impl Closed {
    pub fn other(&self, owner: OwnerId) -> OwnerId {
        if owner == self.initiator {
            self.partner
        } else {
            self.initiator
        }
    }
}

/// A completed session with its agreed terms.
#[derive(Debug)]
pub struct Completed<T> {
    pub id: SessionId,
    pub initiator: OwnerId,
    pub partner: OwnerId,
    pub terms: T,
}

type Shared<T> = Arc<Mutex<JointSession<T>>>;

/// All live sessions of one kind. Each owner is party to at most one.
pub struct JointRegistry<T> {
    label: String,
    timeout: Duration,
    next_id: AtomicU64,
    sessions: DashMap<SessionId, Shared<T>>,
    by_owner: DashMap<OwnerId, SessionId>,
}

impl<T: Terms> JointRegistry<T> {
    pub fn new(label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            timeout,
            next_id: AtomicU64::new(1),
            sessions: DashMap::new(),
            by_owner: DashMap::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a session in `Requested`.
    pub fn open(&self, initiator: OwnerId, partner: OwnerId, terms: T) -> Result<SessionId, SessionError> {
        self.open_at(initiator, partner, terms, now_millis())
    }

    pub fn open_at(
        &self,
        initiator: OwnerId,
        partner: OwnerId,
        terms: T,
        now_millis: i64,
    ) -> Result<SessionId, SessionError> {
        if initiator == partner {
            return Err(SessionError::SelfTarget);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(
            id,
            Arc::new(Mutex::new(JointSession::new(id, initiator, partner, now_millis, terms))),
        );
        if let Err(e) = self.claim(initiator, id).and_then(|()| {
            self.claim(partner, id).inspect_err(|_| {
                self.by_owner.remove_if(&initiator, |_, v| *v == id);
            })
        }) {
            self.sessions.remove(&id);
            return Err(e);
        }
        debug!("{}: opened session {id} between {initiator} and {partner}", self.label);
        Ok(id)
    }

    fn claim(&self, owner: OwnerId, id: SessionId) -> Result<(), SessionError> {
        match self.by_owner.entry(owner) {
            Entry::Occupied(_) => Err(SessionError::AlreadyInSession(owner)),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn lookup(&self, owner: OwnerId) -> Result<Shared<T>, SessionError> {
        let id = *self
            .by_owner
            .get(&owner)
            .ok_or(SessionError::NoSuchSession(owner))?;
        self.sessions
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(SessionError::NoSuchSession(owner))
    }

    fn remove(&self, id: SessionId, initiator: OwnerId, partner: OwnerId) {
        self.sessions.remove(&id);
        self.by_owner.remove_if(&initiator, |_, v| *v == id);
        self.by_owner.remove_if(&partner, |_, v| *v == id);
    }

    pub fn is_in_session(&self, owner: OwnerId) -> bool {
        self.by_owner.contains_key(&owner)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run `f` against `owner`'s session while holding its lock.
    pub fn with_session<R>(
        &self,
        owner: OwnerId,
        f: impl FnOnce(&mut JointSession<T>) -> R,
    ) -> Result<R, SessionError> {
        let shared = self.lookup(owner)?;
        let mut session = shared.lock();
        if session.state().is_terminal() {
            return Err(SessionError::NoSuchSession(owner));
        }
        Ok(f(&mut session))
    }

    pub fn state_of(&self, owner: OwnerId) -> Option<JointState> {
        self.with_session(owner, |s| s.state()).ok()
    }

    pub fn accept(&self, by: OwnerId) -> Result<(), SessionError> {
        self.with_session(by, |s| s.accept(by))?
    }

    pub fn confirm(&self, by: OwnerId) -> Result<JointState, SessionError> {
        self.with_session(by, |s| s.confirm(by))?
    }

    /// BothConfirmed → Completed. The terms are taken out of the session
    /// before the record leaves the registry.
    pub fn complete(&self, owner: OwnerId) -> Result<Completed<T>, SessionError> {
        let shared = self.lookup(owner)?;
        let completed = {
            let mut session = shared.lock();
            let terms = session.complete()?;
            Completed {
                id: session.id(),
                initiator: session.initiator(),
                partner: session.partner(),
                terms,
            }
        };
        self.remove(completed.id, completed.initiator, completed.partner);
        debug!("{}: session {} completed", self.label, completed.id);
        Ok(completed)
    }

    /// Cancel `owner`'s session from any live state.
    pub fn cancel(&self, owner: OwnerId) -> Result<Closed, SessionError> {
        let shared = self.lookup(owner)?;
        let closed = {
            let mut session = shared.lock();
            let terms = session.cancel()?;
            let (initiator, partner) = (session.initiator(), session.partner());
            Closed {
                id: session.id(),
                initiator,
                partner,
                state: JointState::Cancelled,
                refunds: terms.refunds(initiator, partner),
            }
        };
        self.remove(closed.id, closed.initiator, closed.partner);
        debug!("{}: session {} cancelled by {owner}", self.label, closed.id);
        Ok(closed)
    }

    /// Expire every session that outlived the timeout before reaching
    /// BothConfirmed.
    pub fn expire_stale(&self) -> Vec<Closed> {
        self.expire_stale_at(now_millis())
    }

    pub fn expire_stale_at(&self, now_millis: i64) -> Vec<Closed> {
        let candidates: Vec<Shared<T>> = self.sessions.iter().map(|s| s.value().clone()).collect();
        let mut expired = Vec::new();
        for shared in candidates {
            let closed = {
                let mut session = shared.lock();
                let Some(terms) = session.expire_if_stale(now_millis, self.timeout) else {
                    continue;
                };
                let (initiator, partner) = (session.initiator(), session.partner());
                Closed {
                    id: session.id(),
                    initiator,
                    partner,
                    state: JointState::Expired,
                    refunds: terms.refunds(initiator, partner),
                }
            };
            self.remove(closed.id, closed.initiator, closed.partner);
            expired.push(closed);
        }
        if !expired.is_empty() {
            debug!("{}: expired {} sessions", self.label, expired.len());
        }
        expired
    }
}

impl<T: Terms> TransientRegistry for JointRegistry<T> {
    fn label(&self) -> &str {
        &self.label
    }

    fn end_session(&self, owner: OwnerId) -> Vec<SessionEffect> {
        let Ok(closed) = self.cancel(owner) else {
            return Vec::new();
        };
        let mut effects = vec![SessionEffect::Notify {
            recipient: closed.other(owner),
            message: format!("Your {} was cancelled because the other player left.", self.label),
        }];
        effects.extend(
            closed
                .refunds
                .into_iter()
                .map(|(recipient, items)| SessionEffect::Refund { recipient, items }),
        );
        effects
    }
}
