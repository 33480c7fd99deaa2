//! Error types for the session server

use shared::RejectReason;
use std::path::PathBuf;
use thiserror::Error;

/// Why a join request was refused. These are reported to the joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("session not found")]
    NotFound,
    #[error("session already has two players")]
    AlreadyFull,
    #[error("cannot join a session you created")]
    SelfJoin,
    #[error("connection is already playing in another session")]
    AlreadyInSession,
}

impl From<JoinError> for RejectReason {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::NotFound => RejectReason::NotFound,
            JoinError::AlreadyFull => RejectReason::AlreadyFull,
            JoinError::SelfJoin => RejectReason::SelfJoin,
            JoinError::AlreadyInSession => RejectReason::AlreadyInSession,
        }
    }
}

/// Failures of the persistence write-behind path. Logged, never propagated
/// into gameplay.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("persistence queue is full")]
    QueueFull,
    #[error("persistence worker has shut down")]
    Closed,
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid bind address {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_error_maps_to_reject_reason() {
        assert_eq!(RejectReason::from(JoinError::NotFound), RejectReason::NotFound);
        assert_eq!(
            RejectReason::from(JoinError::AlreadyFull),
            RejectReason::AlreadyFull
        );
        assert_eq!(RejectReason::from(JoinError::SelfJoin), RejectReason::SelfJoin);
        assert_eq!(
            RejectReason::from(JoinError::AlreadyInSession),
            RejectReason::AlreadyInSession
        );
    }

    #[test]
    fn test_io_error_message_names_path() {
        let err = PersistenceError::io(
            "/tmp/games.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/games.jsonl"));
    }
}
