use bytes::{BufMut, BytesMut};
use docql_error::{Result, connection_err};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Protocol version magic sent first.
pub const VERSION_MAGIC: u32 = 0x723081e1;

/// Selects JSON encoded requests and responses.
pub const JSON_PROTOCOL_MAGIC: u32 = 0x7e6970c7;

/// Reply the server sends when it accepts the connection.
pub const SUCCESS: &str = "SUCCESS";

/// Longest reply accepted from the server.
const MAX_REPLY_LEN: usize = 4096;

/// Encode the client half of the handshake.
pub fn encode_handshake(auth_key: Option<&str>) -> Result<BytesMut> {
    let key = auth_key.unwrap_or("").as_bytes();
    let key_len = u32::try_from(key.len())
        .map_err(|_| connection_err!("Auth key too long"))?;

    let mut buf = BytesMut::with_capacity(12 + key.len());
    buf.put_u32_le(VERSION_MAGIC);
    buf.put_u32_le(key_len);
    buf.put_slice(key);
    buf.put_u32_le(JSON_PROTOCOL_MAGIC);
    Ok(buf)
}

/// Read a NUL terminated reply.
async fn read_reply<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut reply = Vec::new();
    loop {
        let b = stream
            .read_u8()
            .await
            .map_err(|e| connection_err!("Connection closed during handshake: {e}"))?;
        if b == 0 {
            break;
        }
        if reply.len() >= MAX_REPLY_LEN {
            return Err(connection_err!("Handshake reply too long"));
        }
        reply.push(b);
    }
    String::from_utf8(reply).map_err(|_| connection_err!("Handshake reply is not valid utf8"))
}

/// Perform the client side of the handshake.
///
/// Any reply other than `SUCCESS` fails with the server's message.
pub async fn handshake<S>(stream: &mut S, auth_key: Option<&str>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let buf = encode_handshake(auth_key)?;
    stream.write_all(&buf).await?;
    stream.flush().await?;

    let reply = read_reply(stream).await?;
    if reply != SUCCESS {
        return Err(connection_err!("Server rejected handshake: {reply}"));
    }
    debug!("handshake complete");
    Ok(())
}
