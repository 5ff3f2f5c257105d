use std::collections::HashMap;

use bytes::Bytes;
use docql_error::{DocQlError, Result, connection_err};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, trace, warn};

/// Requests waiting on a response, keyed by token.
///
/// The reader task completes entries as frames arrive, in whatever order the
/// server sends them.
#[derive(Debug, Default)]
pub struct PendingRequests {
    state: Mutex<PendingState>,
}

#[derive(Debug, Default)]
struct PendingState {
    waiting: HashMap<u64, oneshot::Sender<Result<Bytes>>>,
    /// Set once the connection is gone. New registrations fail with this.
    closed: Option<DocQlError>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the response for `token`.
    ///
    /// A token may only have one outstanding request at a time. Dropping the
    /// returned registration before its response arrives frees the token.
    pub fn register(&self, token: u64) -> Result<Registration<'_>> {
        let mut state = self.state.lock();
        if let Some(err) = &state.closed {
            return Err(err.clone());
        }
        if state.waiting.contains_key(&token) {
            return Err(connection_err!(
                "Request with token {token} already in flight"
            ));
        }

        let (tx, rx) = oneshot::channel();
        state.waiting.insert(token, tx);
        Ok(Registration {
            pending: self,
            token,
            rx,
        })
    }

    /// Hand a response to whoever is waiting on `token`.
    pub fn complete(&self, token: u64, payload: Bytes) {
        let sender = self.state.lock().waiting.remove(&token);
        match sender {
            Some(tx) => {
                if tx.send(Ok(payload)).is_err() {
                    debug!(token, "receiver dropped before response arrived");
                }
            }
            None => warn!(token, "response for unknown token"),
        }
    }

    /// Forget about a request.
    pub fn remove(&self, token: u64) {
        self.state.lock().waiting.remove(&token);
    }

    /// Fail every waiting request and reject future registrations.
    pub fn fail_all(&self, err: DocQlError) {
        let waiting = {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(err.clone());
            }
            std::mem::take(&mut state.waiting)
        };

        if !waiting.is_empty() {
            debug!(count = waiting.len(), %err, "failing pending requests");
        }
        for (_, tx) in waiting {
            let _ = tx.send(Err(err.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A request waiting on its response.
#[derive(Debug)]
pub struct Registration<'a> {
    pending: &'a PendingRequests,
    token: u64,
    rx: oneshot::Receiver<Result<Bytes>>,
}

impl Registration<'_> {
    /// Wait for the response.
    pub async fn response(mut self) -> Result<Bytes> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(connection_err!(
                "Connection dropped before response for token {}",
                self.token
            )),
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        // Empty means the entry is still ours. Anything else means it was
        // already taken out of the map.
        if matches!(self.rx.try_recv(), Err(TryRecvError::Empty)) {
            trace!(token = self.token, "abandoning request");
            self.pending.remove(self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use docql_error::ErrorKind;
    use futures::FutureExt;

    use super::*;

    #[tokio::test]
    async fn complete_out_of_order() {
        let pending = PendingRequests::new();
        let a = pending.register(1).unwrap();
        let b = pending.register(2).unwrap();

        pending.complete(2, Bytes::from_static(b"two"));
        pending.complete(1, Bytes::from_static(b"one"));

        assert_eq!(Bytes::from_static(b"one"), a.response().await.unwrap());
        assert_eq!(Bytes::from_static(b"two"), b.response().await.unwrap());
        assert!(pending.is_empty());
    }

    #[test]
    fn duplicate_token_rejected() {
        let pending = PendingRequests::new();
        let _rx = pending.register(1).unwrap();
        let err = pending.register(1).unwrap_err();
        assert_eq!(ErrorKind::Connection, err.kind());
    }

    #[test]
    fn unknown_token_ignored() {
        logutil::init_test();
        let pending = PendingRequests::new();
        pending.complete(42, Bytes::new());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn fail_all_wakes_waiters_and_closes() {
        let pending = PendingRequests::new();
        let a = pending.register(1).unwrap();
        let b = pending.register(2).unwrap();

        pending.fail_all(connection_err!("connection reset"));

        for registration in [a, b] {
            let err = registration.response().await.unwrap_err();
            assert_eq!(ErrorKind::Connection, err.kind());
        }
        let err = pending.register(3).unwrap_err();
        assert_eq!(connection_err!("connection reset"), err);
    }

    #[test]
    fn remove_forgets_request() {
        let pending = PendingRequests::new();
        let _registration = pending.register(5).unwrap();
        pending.remove(5);
        assert!(pending.is_empty());
        pending.register(5).unwrap();
    }

    #[test]
    fn dropped_registration_frees_token() {
        logutil::init_test();
        let pending = PendingRequests::new();
        let registration = pending.register(5).unwrap();
        assert!(registration.response().now_or_never().is_none());
        assert!(pending.is_empty());

        // A late reply for the abandoned request goes nowhere.
        pending.complete(5, Bytes::from_static(b"late"));
        let _registration = pending.register(5).unwrap();
        assert_eq!(1, pending.len());
    }

    #[tokio::test]
    async fn answered_registration_leaves_newer_request() {
        let pending = PendingRequests::new();
        let first = pending.register(1).unwrap();
        pending.complete(1, Bytes::from_static(b"one"));
        let second = pending.register(1).unwrap();

        drop(first);
        assert_eq!(1, pending.len());
        pending.complete(1, Bytes::from_static(b"two"));
        assert_eq!(Bytes::from_static(b"two"), second.response().await.unwrap());
    }
}
