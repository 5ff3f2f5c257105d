use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use docql_error::{Result, connection_err};
use docql_proto::{Datum, RequestEnvelope};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::SessionConfig;

/// Transport used by a session.
///
/// A connection sends one request and resolves with the raw bytes of the
/// response carrying the same token. Implementations may multiplex many
/// outstanding requests.
pub trait Connection: Debug + Send + Sync + 'static {
    fn send(&self, request: RequestEnvelope) -> impl Future<Output = Result<Bytes>> + Send;

    /// Close the underlying transport. Outstanding requests fail.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug)]
struct SessionInner<C> {
    conn: C,
    config: RwLock<SessionConfig>,
    next_token: AtomicU64,
    closed: AtomicBool,
}

/// A logical session on top of a connection.
///
/// Cheap to clone. Clones share the connection, the configuration and the
/// token counter.
#[derive(Debug)]
pub struct Session<C> {
    inner: Arc<SessionInner<C>>,
}

impl<C> Clone for Session<C> {
    fn clone(&self) -> Self {
        Session {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connection> Session<C> {
    pub fn new(conn: C, config: SessionConfig) -> Self {
        Session {
            inner: Arc::new(SessionInner {
                conn,
                config: RwLock::new(config),
                next_token: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn connection(&self) -> &C {
        &self.inner.conn
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> SessionConfig {
        self.inner.config.read().clone()
    }

    pub fn default_database(&self) -> String {
        self.inner.config.read().default_database.clone()
    }

    /// Change the database used for tables referenced without one.
    pub fn use_database(&self, name: &str) -> Result<()> {
        self.set_setting("default_database", &Datum::from(name))
    }

    pub fn set_setting(&self, name: &str, value: &Datum) -> Result<()> {
        self.inner.config.write().set_from_datum(name, value)?;
        debug!(%name, %value, "updated session setting");
        Ok(())
    }

    pub fn get_setting(&self, name: &str) -> Result<Datum> {
        self.inner.config.read().get_as_datum(name)
    }

    /// Allocate a token for a new query.
    pub(crate) fn next_token(&self) -> u64 {
        self.inner.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) async fn send(&self, request: RequestEnvelope) -> Result<Bytes> {
        if self.is_closed() {
            return Err(connection_err!("session is closed"));
        }
        trace!(token = request.token, kind = request.kind(), "sending request");
        self.inner.conn.send(request).await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the session and its connection.
    ///
    /// Closing an already closed session is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("closing session");
        self.inner.conn.close().await
    }
}
