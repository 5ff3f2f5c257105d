use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::term::Term;

/// A request sent to the server.
///
/// The token matches responses to requests on a multiplexed connection.
/// Continuation and stop requests reuse the token of the query they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub token: u64,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Start executing a compiled term.
    Start {
        term: Term,
        /// Query-wide options (default database, durability, ...).
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        options: BTreeMap<String, Term>,
    },
    /// Fetch the next batch of a partially returned sequence.
    Continue { continuation: String },
    /// Stop a partially returned sequence, releasing server resources.
    Stop,
}

impl RequestEnvelope {
    pub fn start(token: u64, term: Term, options: BTreeMap<String, Term>) -> Self {
        RequestEnvelope {
            token,
            request: Request::Start { term, options },
        }
    }

    pub fn continue_with(token: u64, continuation: impl Into<String>) -> Self {
        RequestEnvelope {
            token,
            request: Request::Continue {
                continuation: continuation.into(),
            },
        }
    }

    pub fn stop(token: u64) -> Self {
        RequestEnvelope {
            token,
            request: Request::Stop,
        }
    }

    /// Short name of the request kind for logging.
    pub fn kind(&self) -> &'static str {
        match &self.request {
            Request::Start { .. } => "start",
            Request::Continue { .. } => "continue",
            Request::Stop => "stop",
        }
    }
}
