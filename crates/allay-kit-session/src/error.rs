use allay_kit_store::OwnerId;
use thiserror::Error;

use crate::joint::JointState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0} has no active session")]
    NoSuchSession(OwnerId),

    #[error("{0} is not a party to this session")]
    NotAParty(OwnerId),

    #[error("{0} is already in a session")]
    AlreadyInSession(OwnerId),

    #[error("cannot open a session with yourself")]
    SelfTarget,

    #[error("cannot {action} while {from:?}")]
    InvalidTransition { from: JointState, action: &'static str },

    #[error("only the invited player can accept")]
    NotInvited,
}
