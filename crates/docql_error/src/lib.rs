//! Errors for building, sending, and decoding queries.
//!
//! Every fallible operation in the workspace returns [`DocQlError`]. The error
//! is `Clone` so a cursor can hand out the same terminal error every time it's
//! polled after a failure.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

pub type Result<T, E = DocQlError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocQlError {
    /// Malformed expression caught while constructing or compiling it.
    #[error("build error: {0}")]
    Build(String),

    /// Transport or handshake failure. The query should be considered not
    /// executed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the query.
    #[error("query error: {0}")]
    Query(QueryFailure),

    /// The response didn't have the shape the caller asked for.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Coarse classification of a [`DocQlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Build,
    Connection,
    Query,
    Decode,
}

impl DocQlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Build(_) => ErrorKind::Build,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Query(_) => ErrorKind::Query,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Returns the server failure if this is a query error.
    pub fn as_query_failure(&self) -> Option<&QueryFailure> {
        match self {
            Self::Query(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<io::Error> for DocQlError {
    fn from(err: io::Error) -> Self {
        DocQlError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for DocQlError {
    fn from(err: serde_json::Error) -> Self {
        DocQlError::Decode(err.to_string())
    }
}

/// Error reported by the server for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub class: ServerErrorClass,
    pub message: String,
    /// Path to the failing term, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backtrace: Vec<String>,
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.class, self.message)?;
        if !self.backtrace.is_empty() {
            write!(f, " (at {})", self.backtrace.join(" > "))?;
        }
        Ok(())
    }
}

/// Which stage on the server produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerErrorClass {
    /// The server could not understand the request (client bug).
    Client,
    /// The term was well formed but failed to compile (unknown table, arity).
    Compile,
    /// Evaluation failed (type mismatch, missing field).
    Runtime,
}

impl fmt::Display for ServerErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Compile => write!(f, "compile"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

/// Create a [`DocQlError::Build`] from a format string.
#[macro_export]
macro_rules! build_err {
    ($($arg:tt)*) => {
        $crate::DocQlError::Build(std::format!($($arg)*))
    };
}

/// Create a [`DocQlError::Decode`] from a format string.
#[macro_export]
macro_rules! decode_err {
    ($($arg:tt)*) => {
        $crate::DocQlError::Decode(std::format!($($arg)*))
    };
}

/// Create a [`DocQlError::Connection`] from a format string.
#[macro_export]
macro_rules! connection_err {
    ($($arg:tt)*) => {
        $crate::DocQlError::Connection(std::format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_connection_errors() {
        let err: DocQlError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert_eq!(ErrorKind::Connection, err.kind());
    }

    #[test]
    fn json_errors_are_decode_errors() {
        let err: DocQlError = serde_json::from_str::<u64>("nope").unwrap_err().into();
        assert_eq!(ErrorKind::Decode, err.kind());
    }

    #[test]
    fn query_failure_display_includes_backtrace() {
        let err = DocQlError::Query(QueryFailure {
            class: ServerErrorClass::Runtime,
            message: "No attribute `num`".to_string(),
            backtrace: vec!["filter".to_string(), "get_field".to_string()],
        });
        assert_eq!(
            "query error: runtime error: No attribute `num` (at filter > get_field)",
            err.to_string()
        );
    }

    #[test]
    fn macros_build_variants() {
        assert_eq!(ErrorKind::Build, build_err!("bad {}", 1).kind());
        assert_eq!(ErrorKind::Decode, decode_err!("bad {}", 2).kind());
        assert_eq!(ErrorKind::Connection, connection_err!("bad").kind());
    }
}
