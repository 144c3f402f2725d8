//! Length-delimited message framing.
//!
//! Wire format: 4-byte big-endian length prefix followed by payload. Each
//! payload is exactly one JSON message.
//!
//! Inbound and outbound frames have separate limits. Members only send
//! small requests, while an `access_refresh` list grows with the number of
//! members a gateway serves and a `bad_message` echo can be several times
//! the size of the frame it quotes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum inbound frame payload (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Maximum outbound frame payload (16 MiB).
pub const MAX_OUTBOUND_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Codec for controller frames.
///
/// Decoding through `FramedRead` is cancellation-safe, which lets the
/// connection driver poll for frames while a directory lookup is in flight.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame: usize,
}

impl FrameCodec {
    /// Codec for the controller side: decodes at most [`MAX_FRAME_SIZE`].
    pub fn new() -> Self {
        Self::with_max_frame(MAX_FRAME_SIZE)
    }

    /// Codec that decodes frames up to `max_frame` bytes.
    ///
    /// Members reading controller output use [`MAX_OUTBOUND_FRAME_SIZE`].
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let mut len_buf = [0u8; LEN_PREFIX];
        len_buf.copy_from_slice(&src[..LEN_PREFIX]);
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > self.max_frame {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame too large: {} bytes", len),
            ));
        }

        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        if item.len() > MAX_OUTBOUND_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame too large: {} bytes", item.len()),
            ));
        }

        dst.reserve(LEN_PREFIX + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
