//! Big-endian, word-oriented Courier wire stream.
//!
//! Courier data is a sequence of 16-bit words. Byte quantities (STRING
//! characters) are packed two to a word: a single byte stays pending until a
//! second one completes the word. `reset_word_boundary` closes the current
//! word; the writer pads a pending byte with zero and the reader drops the
//! unread half of the word.

use crate::error::CourierError;
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: BytesMut,
    pending: Option<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        match self.pending.take() {
            Some(high) => {
                self.buffer.put_u8(high);
                self.buffer.put_u8(value);
            }
            None => self.pending = Some(value),
        }
    }

    pub fn write_u16(&mut self, value: u16) {
        self.reset_word_boundary();
        self.buffer.put_u16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_u16((value >> 16) as u16);
        self.write_u16(value as u16);
    }

    pub fn write_u48(&mut self, value: u64) {
        self.write_u16((value >> 32) as u16);
        self.write_u32(value as u32);
    }

    /// Appends already-encoded words, e.g. the arguments of a message.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.reset_word_boundary();
        self.buffer.put_slice(data);
    }

    pub fn reset_word_boundary(&mut self) {
        if let Some(high) = self.pending.take() {
            self.buffer.put_u8(high);
            self.buffer.put_u8(0);
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len() + usize::from(self.pending.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(mut self) -> Bytes {
        self.reset_word_boundary();
        self.buffer.freeze()
    }
}

#[derive(Debug, Clone)]
pub struct WireReader {
    data: Bytes,
    position: usize,
    pending: Option<u8>,
}

impl WireReader {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            position: 0,
            pending: None,
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    fn take(&mut self, count: usize) -> Result<&[u8], CourierError> {
        let end = self.position + count;
        if end > self.data.len() {
            return Err(CourierError::EndOfStream(format!(
                "needed {count} bytes at offset {}, {} available",
                self.position,
                self.data.len() - self.position
            )));
        }
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CourierError> {
        if let Some(low) = self.pending.take() {
            return Ok(low);
        }
        let word = self.take(2)?;
        let (high, low) = (word[0], word[1]);
        self.pending = Some(low);
        Ok(high)
    }

    pub fn read_u16(&mut self) -> Result<u16, CourierError> {
        self.reset_word_boundary();
        let word = self.take(2)?;
        Ok(u16::from_be_bytes([word[0], word[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, CourierError> {
        let high = self.read_u16()?;
        let low = self.read_u16()?;
        Ok((u32::from(high) << 16) | u32::from(low))
    }

    pub fn read_u48(&mut self) -> Result<u64, CourierError> {
        let high = self.read_u16()?;
        let low = self.read_u32()?;
        Ok((u64::from(high) << 32) | u64::from(low))
    }

    pub fn reset_word_boundary(&mut self) {
        self.pending = None;
    }

    /// Everything not read yet, starting at the next word.
    pub fn read_remaining(&mut self) -> Bytes {
        self.reset_word_boundary();
        let rest = self.data.slice(self.position..);
        self.position = self.data.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }
}
