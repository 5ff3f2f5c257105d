use bytes::{Buf, BufMut, Bytes, BytesMut};
use docql_error::{DocQlError, connection_err};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Token plus payload length.
pub const HEADER_LEN: usize = 8 + 4;

/// Default upper bound on a single frame payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A single message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub token: u64,
    pub payload: Bytes,
}

/// Frames are a little endian `u64` token, a little endian `u32` payload
/// length, then the payload.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl FrameCodec {
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        FrameCodec { max_frame_len }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = DocQlError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.payload.len() > self.max_frame_len {
            return Err(connection_err!(
                "Frame of {} bytes exceeds maximum of {}",
                frame.payload.len(),
                self.max_frame_len
            ));
        }
        let len = u32::try_from(frame.payload.len())
            .map_err(|_| connection_err!("Frame too large: {}", frame.payload.len()))?;

        trace!(token = frame.token, len, "encoding frame");
        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_u64_le(frame.token);
        dst.put_u32_le(len);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = DocQlError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let token = header.get_u64_le();
        let len = header.get_u32_le() as usize;
        if len > self.max_frame_len {
            return Err(connection_err!(
                "Frame of {len} bytes exceeds maximum of {}",
                self.max_frame_len
            ));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        trace!(token, len, "decoded frame");
        Ok(Some(Frame { token, payload }))
    }
}
