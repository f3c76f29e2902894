// ⚠️ Error Taxonomy - every rejected operation carries a caller-visible reason
//
// Three kinds, nothing fatal:
//   Validation       → bad input, no state touched
//   NotFound         → unknown player / missing input file, no state touched
//   StoreUnavailable → persisted state could not be read, backed up or written;
//                      the prior state is still intact (see store.rs)

use serde::Serialize;
use std::error::Error as StdError;
use std::path::PathBuf;

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

// ============================================================================
// ERROR KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StoreUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation-error",
            ErrorKind::NotFound => "not-found",
            ErrorKind::StoreUnavailable => "store-unavailable",
        }
    }
}

// ============================================================================
// TRACKER ERROR
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("player '{0}' is already on the referral list")]
    DuplicateReferral(String),

    #[error("player '{0}' cannot refer themselves")]
    SelfReferral(String),

    #[error("hands played must be a non-negative whole number, got '{0}'")]
    InvalidHands(String),

    #[error("streak value must be a non-negative whole number, got '{0}'")]
    InvalidValue(String),

    #[error("reviving {username} to {requested} would lower the current {current} day streak")]
    StreakWouldDrop {
        username: String,
        current: u32,
        requested: u32,
    },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("{source_name} line {line}: {message}")]
    MalformedRow {
        source_name: String,
        line: u64,
        message: String,
    },

    #[error("snapshot '{0}' contains no player rows")]
    EmptySnapshot(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("player '{0}' not found")]
    PlayerNotFound(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("store unavailable: {context}: {}", error_chain(.source.as_ref()))]
    StoreUnavailable {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

/// Render an error and every cause beneath it, `outer: inner: root`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        let text = inner.to_string();
        if !rendered.ends_with(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        cause = inner.source();
    }
    rendered
}

impl TrackerError {
    /// Wrap a low-level I/O, CSV or SQLite failure at the store boundary.
    pub fn store<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        TrackerError::StoreUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::DuplicateReferral(_)
            | TrackerError::SelfReferral(_)
            | TrackerError::InvalidHands(_)
            | TrackerError::InvalidValue(_)
            | TrackerError::StreakWouldDrop { .. }
            | TrackerError::EmptyField { .. }
            | TrackerError::MalformedRow { .. }
            | TrackerError::EmptySnapshot(_)
            | TrackerError::InvalidConfig(_) => ErrorKind::Validation,
            TrackerError::PlayerNotFound(_) | TrackerError::FileNotFound(_) => ErrorKind::NotFound,
            TrackerError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
        }
    }

    /// Process exit code for the CLI surface.
    ///
    /// 2 = file not found, 3 = validation error, 4 = store unavailable,
    /// 1 = anything else (unknown player).
    pub fn exit_code(&self) -> u8 {
        match self {
            TrackerError::FileNotFound(_) => 2,
            TrackerError::PlayerNotFound(_) => 1,
            _ => match self.kind() {
                ErrorKind::Validation => 3,
                ErrorKind::StoreUnavailable => 4,
                ErrorKind::NotFound => 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_match_taxonomy() {
        assert_eq!(TrackerError::SelfReferral("p".into()).kind(), ErrorKind::Validation);
        assert_eq!(TrackerError::DuplicateReferral("p".into()).kind(), ErrorKind::Validation);
        assert_eq!(TrackerError::InvalidValue("-1".into()).kind(), ErrorKind::Validation);
        assert_eq!(TrackerError::PlayerNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            TrackerError::FileNotFound(PathBuf::from("daily.csv")).kind(),
            ErrorKind::NotFound
        );

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            TrackerError::store("write master", io).kind(),
            ErrorKind::StoreUnavailable
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(TrackerError::FileNotFound(PathBuf::from("x.csv")).exit_code(), 2);
        assert_eq!(TrackerError::InvalidHands("abc".into()).exit_code(), 3);
        assert_eq!(TrackerError::store("load", anyhow::anyhow!("boom")).exit_code(), 4);
        assert_eq!(TrackerError::PlayerNotFound("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_store_error_message_includes_source() {
        let err = TrackerError::store("read master_streak.csv", anyhow::anyhow!("disk gone"));
        assert_eq!(
            err.to_string(),
            "store unavailable: read master_streak.csv: disk gone"
        );
    }

    #[test]
    fn test_store_error_message_includes_every_cause() {
        let source = anyhow::anyhow!("record 2 (line: 3): invalid digit").context("parse row in master_streak.csv");
        let err = TrackerError::store("read master_streak.csv", source);
        assert_eq!(
            err.to_string(),
            "store unavailable: read master_streak.csv: parse row in master_streak.csv: record 2 (line: 3): invalid digit"
        );
    }
}
