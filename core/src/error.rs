use crate::{DocId, Revision};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("document {got} arrived after document {last}; ids must be strictly increasing")]
    OrderViolation { last: DocId, got: DocId },

    #[error("failed to write segment to {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus statistics are stale: index is at revision {expected}, statistics at {found}")]
    StaleStatistics { expected: Revision, found: Revision },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt segment file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::WriteFailure { path: path.into(), source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IndexError::Corrupt { path: path.into(), reason: reason.to_string() }
    }

    /// Errors that concern a single query and leave the index usable.
    pub fn is_query_error(&self) -> bool {
        matches!(self, IndexError::InvalidQuery(_) | IndexError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_ids() {
        let err = IndexError::OrderViolation { last: 4, got: 2 };
        let msg = err.to_string();
        assert!(msg.contains('4') && msg.contains('2'));
    }

    #[test]
    fn write_failure_keeps_source() {
        let err = IndexError::write_failure("/tmp/x", std::io::Error::other("disk full"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_query_error());
    }
}
