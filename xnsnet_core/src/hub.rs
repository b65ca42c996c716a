//! Framing on the hub transport.
//!
//! Every packet travels as a big-endian length followed by the raw IDP bytes.
//! The length is two bytes unless the peer opened with the qemu handshake (a
//! 14-byte all-zero packet), after which both directions use four bytes.

use crate::error::CoreError;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, info};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

pub const QEMU_HANDSHAKE_LENGTH: usize = 14;
pub const MAX_HUB_FRAME: usize = u16::MAX as usize;

const DEFAULT_LENGTH_FIELD: usize = 2;
const QEMU_LENGTH_FIELD: usize = 4;

fn length_delimited(field_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(field_length)
        .max_frame_length(MAX_HUB_FRAME)
        .new_codec()
}

fn is_qemu_handshake(frame: &[u8]) -> bool {
    frame.len() == QEMU_HANDSHAKE_LENGTH && frame.iter().all(|byte| *byte == 0)
}

#[derive(Debug)]
pub struct HubCodec {
    inner: LengthDelimitedCodec,
    qemu_mode: bool,
}

impl HubCodec {
    pub fn new() -> Self {
        Self {
            inner: length_delimited(DEFAULT_LENGTH_FIELD),
            qemu_mode: false,
        }
    }

    /// A codec that already speaks 4-byte framing, for links where we sent
    /// the handshake ourselves.
    pub fn qemu() -> Self {
        let mut codec = Self::new();
        codec.enable_qemu_mode();
        codec
    }

    pub fn is_qemu_mode(&self) -> bool {
        self.qemu_mode
    }

    pub fn enable_qemu_mode(&mut self) {
        self.inner = length_delimited(QEMU_LENGTH_FIELD);
        self.qemu_mode = true;
    }

    /// The handshake as it goes on the wire, in the default framing.
    pub fn handshake_frame() -> Bytes {
        let mut frame = BytesMut::with_capacity(DEFAULT_LENGTH_FIELD + QEMU_HANDSHAKE_LENGTH);
        frame.put_u16(QEMU_HANDSHAKE_LENGTH as u16);
        frame.put_bytes(0, QEMU_HANDSHAKE_LENGTH);
        frame.freeze()
    }
}

impl Default for HubCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HubCodec {
    type Item = Bytes;
    type Error = CoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(frame) = self
                .inner
                .decode(src)
                .map_err(|e| CoreError::FramingError(e.to_string()))?
            else {
                return Ok(None);
            };
            if frame.is_empty() {
                debug!("Skipping empty hub frame");
                continue;
            }
            if !self.qemu_mode && is_qemu_handshake(&frame) {
                info!("Qemu handshake received; switching to 4-byte framing");
                self.enable_qemu_mode();
                continue;
            }
            return Ok(Some(frame.freeze()));
        }
    }
}

impl Encoder<Bytes> for HubCodec {
    type Error = CoreError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner
            .encode(item, dst)
            .map_err(|e| CoreError::FramingError(e.to_string()))
    }
}
