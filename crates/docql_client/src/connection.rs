use std::sync::Arc;

use bytes::Bytes;
use docql_core::Connection;
use docql_error::{Result, connection_err};
use docql_proto::RequestEnvelope;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace};

use crate::codec::{Frame, FrameCodec};
use crate::dispatch::PendingRequests;
use crate::handshake::handshake;
use crate::options::ConnectOptions;

/// A multiplexed TCP connection to a server.
///
/// Any number of requests may be outstanding at once. Writes are serialized
/// through a lock, responses are routed back to their callers by token from
/// a background reader task.
#[derive(Debug)]
pub struct TcpConnection {
    writer: tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, FrameCodec>>,
    pending: Arc<PendingRequests>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    address: String,
}

impl TcpConnection {
    /// Dial the server and complete the handshake.
    pub async fn connect(opts: &ConnectOptions) -> Result<Self> {
        let address = opts.address();
        debug!(?opts, "connecting");

        let mut stream = TcpStream::connect(&address)
            .await
            .map_err(|e| connection_err!("Failed to connect to {address}: {e}"))?;
        stream.set_nodelay(true)?;
        handshake(&mut stream, opts.auth_key.as_deref()).await?;

        let conn = Self::from_stream(stream, address);
        info!(address = %conn.address, "connected");
        Ok(conn)
    }

    /// Wrap a stream that has already completed the handshake.
    fn from_stream(stream: TcpStream, address: String) -> Self {
        let (read, write) = stream.into_split();
        let pending = Arc::new(PendingRequests::new());
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read, FrameCodec::default()),
            pending.clone(),
        ));

        TcpConnection {
            writer: tokio::sync::Mutex::new(FramedWrite::new(write, FrameCodec::default())),
            pending,
            reader: parking_lot::Mutex::new(Some(reader)),
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn write_frame(&self, frame: Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(frame).await
    }
}

/// Route incoming frames to their waiting requests until the stream ends.
async fn read_loop(
    mut frames: FramedRead<OwnedReadHalf, FrameCodec>,
    pending: Arc<PendingRequests>,
) {
    let err = loop {
        match frames.next().await {
            Some(Ok(frame)) => {
                trace!(token = frame.token, len = frame.payload.len(), "received frame");
                pending.complete(frame.token, frame.payload);
            }
            Some(Err(e)) => break e,
            None => break connection_err!("Connection closed by server"),
        }
    };
    debug!(%err, "reader stopped");
    pending.fail_all(err);
}

impl Connection for TcpConnection {
    async fn send(&self, request: RequestEnvelope) -> Result<Bytes> {
        let token = request.token;
        let payload = Bytes::from(serde_json::to_vec(&request)?);
        let registration = self.pending.register(token)?;

        trace!(token, kind = request.kind(), len = payload.len(), "writing request");
        self.write_frame(Frame { token, payload }).await?;
        registration.response().await
    }

    async fn close(&self) -> Result<()> {
        self.pending.fail_all(connection_err!("Connection closed"));
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }

        let mut writer = self.writer.lock().await;
        writer.get_mut().shutdown().await?;
        info!(address = %self.address, "connection closed");
        Ok(())
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}
