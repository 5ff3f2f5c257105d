//! A scripted connection for exercising sessions and cursors without a
//! server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use docql_error::{DocQlError, Result, connection_err};
use docql_proto::{RequestEnvelope, Response, ResponsePayload};
use parking_lot::Mutex;

use crate::session::Connection;

#[derive(Debug)]
enum Reply {
    /// Wrapped in a response carrying the request's token.
    Payload(ResponsePayload),
    /// Sent back verbatim.
    Raw(Bytes),
    Fail(DocQlError),
    /// Never answered.
    Hang,
}

/// Replies to requests in order with the replies pushed so far, recording
/// every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RequestEnvelope>>,
    closed: AtomicBool,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_payload(&self, payload: ResponsePayload) {
        self.replies.lock().push_back(Reply::Payload(payload));
    }

    pub fn push_raw(&self, raw: impl Into<Bytes>) {
        self.replies.lock().push_back(Reply::Raw(raw.into()));
    }

    pub fn push_failure(&self, err: DocQlError) {
        self.replies.lock().push_back(Reply::Fail(err));
    }

    pub fn push_hang(&self) {
        self.replies.lock().push_back(Reply::Hang);
    }

    pub fn requests(&self) -> Vec<RequestEnvelope> {
        self.requests.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for ScriptedConnection {
    async fn send(&self, request: RequestEnvelope) -> Result<Bytes> {
        let token = request.token;
        self.requests.lock().push(request);

        let reply = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| connection_err!("no scripted reply for token {token}"))?;

        match reply {
            Reply::Payload(payload) => {
                let resp = Response { token, payload };
                Ok(Bytes::from(serde_json::to_vec(&resp)?))
            }
            Reply::Raw(raw) => Ok(raw),
            Reply::Fail(err) => Err(err),
            Reply::Hang => futures::future::pending().await,
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
