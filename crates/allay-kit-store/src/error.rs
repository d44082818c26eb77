use std::path::PathBuf;

use thiserror::Error;

use crate::entity::Scope;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entry named '{name}' in {scope}")]
    NotFound { scope: Scope, name: String },

    #[error("an entry named '{name}' already exists in {scope}")]
    AlreadyExists { scope: Scope, name: String },

    #[error("{scope} already holds the maximum of {limit} entries")]
    CapacityExceeded { scope: Scope, limit: usize },

    #[error("invalid entry name: '{0}'")]
    InvalidName(String),

    #[error("target no longer resolvable: {0}")]
    InvalidTarget(String),

    #[error("I/O error on {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Expected outcomes are reported to the player; everything else is a
    /// persistence fault that only gets logged.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            StoreError::Persistence { .. } | StoreError::Serialize { .. }
        )
    }

    /// Player-facing text for this error.
    pub fn user_message(&self, kind: &str) -> String {
        match self {
            StoreError::NotFound { name, .. } => format!("No {kind} named '{name}'."),
            StoreError::AlreadyExists { name, .. } => {
                format!("A {kind} named '{name}' already exists.")
            }
            StoreError::CapacityExceeded { limit, .. } => {
                format!("You have reached the limit of {limit} {kind}s.")
            }
            StoreError::InvalidName(name) => format!("'{name}' is not a valid {kind} name."),
            StoreError::InvalidTarget(what) => format!("That {kind} is unavailable: {what}."),
            StoreError::Persistence { .. } | StoreError::Serialize { .. } => {
                format!("The {kind} could not be saved. Please tell an operator.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_vs_fault() {
        let not_found = StoreError::NotFound {
            scope: Scope::Global,
            name: "spawn".into(),
        };
        assert!(not_found.is_expected());
        assert_eq!(not_found.user_message("warp"), "No warp named 'spawn'.");

        let io = StoreError::Persistence {
            path: "warps.json".into(),
            source: std::io::Error::other("disk full"),
        };
        assert!(!io.is_expected());
        assert!(io.to_string().contains("warps.json"));
    }

    #[test]
    fn capacity_message_mentions_limit() {
        let err = StoreError::CapacityExceeded {
            scope: Scope::Global,
            limit: 5,
        };
        assert_eq!(err.user_message("home"), "You have reached the limit of 5 homes.");
    }
}
