//! Fixed-capacity packet storage with aliased, bounds-safe sub-views.
//!
//! A `PacketBuffer` is a cheap handle onto a shared arena that owns the raw
//! bytes together with the length bookkeeping of every view created from it.
//! `sub_view` never copies: a write through one view is visible through every
//! other view covering the same bytes, and changing the length of a view
//! carries the new length up to its parent, clamped at each level.
//!
//! Out-of-range access is not an error. Reads past `max_length` yield zero and
//! writes past it are dropped, so slightly malformed legacy traffic can be
//! inspected without special casing.

use bytes::Bytes;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Largest packet that travels on the wire, header included.
pub const MAX_PACKET_SIZE: usize = 576;

struct ViewState {
    parent: Option<usize>,
    /// Offset of this view relative to the parent's base.
    offset: usize,
    max_length: usize,
    length: usize,
}

struct Arena {
    bytes: Vec<u8>,
    views: Vec<ViewState>,
}

impl Arena {
    fn set_length(&mut self, view: usize, requested: usize) -> usize {
        let state = &mut self.views[view];
        let clamped = requested.min(state.max_length);
        state.length = clamped;

        let mut propagated = state.offset + clamped;
        let mut next = state.parent;
        while let Some(current) = next {
            let parent = &mut self.views[current];
            parent.length = propagated.min(parent.max_length);
            propagated = parent.offset + parent.length;
            next = parent.parent;
        }
        clamped
    }
}

#[derive(Clone)]
pub struct PacketBuffer {
    arena: Arc<Mutex<Arena>>,
    view: usize,
    /// Absolute offset of this view inside the arena.
    base: usize,
    max_length: usize,
}

impl PacketBuffer {
    pub fn new(capacity: usize) -> Self {
        let arena = Arena {
            bytes: vec![0; capacity],
            views: vec![ViewState {
                parent: None,
                offset: 0,
                max_length: capacity,
                length: 0,
            }],
        };
        Self {
            arena: Arc::new(Mutex::new(arena)),
            view: 0,
            base: 0,
            max_length: capacity,
        }
    }

    /// Creates a root buffer holding a copy of `data`; the capacity is at least
    /// [`MAX_PACKET_SIZE`] so that received packets can be rewritten in place.
    pub fn from_bytes(data: &[u8]) -> Self {
        let buffer = Self::new(data.len().max(MAX_PACKET_SIZE));
        buffer.copy_bytes_in(0, data, 0, data.len());
        buffer.set_length(data.len());
        buffer
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a view starting `base` bytes into this one that shares storage
    /// with it. A `base` beyond this view's `max_length` yields an empty view.
    pub fn sub_view(&self, base: usize, visible_length: usize) -> Self {
        let offset = base.min(self.max_length);
        let max_length = self.max_length - offset;
        let length = visible_length.min(max_length);

        let view = {
            let mut arena = self.arena();
            arena.views.push(ViewState {
                parent: Some(self.view),
                offset,
                max_length,
                length,
            });
            arena.views.len() - 1
        };

        Self {
            arena: self.arena.clone(),
            view,
            base: self.base + offset,
            max_length,
        }
    }

    pub fn capacity(&self) -> usize {
        self.arena().bytes.len()
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn length(&self) -> usize {
        self.arena().views[self.view].length
    }

    /// Sets the logically valid length, clamped to `[0, max_length]`, and
    /// returns the length actually set. Parents are resized to end where this
    /// view now ends.
    pub fn set_length(&self, length: usize) -> usize {
        self.arena().set_length(self.view, length)
    }

    fn read<const N: usize>(&self, at: usize) -> Option<[u8; N]> {
        let end = at.checked_add(N)?;
        if end > self.max_length {
            return None;
        }
        let start = self.base + at;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.arena().bytes[start..start + N]);
        Some(out)
    }

    fn write(&self, at: usize, data: &[u8]) {
        let Some(end) = at.checked_add(data.len()) else {
            return;
        };
        if end > self.max_length {
            return;
        }
        let start = self.base + at;
        self.arena().bytes[start..start + data.len()].copy_from_slice(data);
    }

    pub fn read_u8(&self, at: usize) -> u8 {
        self.read::<1>(at).map(|b| b[0]).unwrap_or(0)
    }

    pub fn read_u16(&self, at: usize) -> u16 {
        self.read::<2>(at).map(u16::from_be_bytes).unwrap_or(0)
    }

    pub fn read_u32(&self, at: usize) -> u32 {
        self.read::<4>(at).map(u32::from_be_bytes).unwrap_or(0)
    }

    pub fn read_u48(&self, at: usize) -> u64 {
        self.read::<6>(at)
            .map(|b| b.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
            .unwrap_or(0)
    }

    pub fn write_u8(&self, at: usize, value: u8) {
        self.write(at, &[value]);
    }

    pub fn write_u16(&self, at: usize, value: u16) {
        self.write(at, &value.to_be_bytes());
    }

    pub fn write_u32(&self, at: usize, value: u32) {
        self.write(at, &value.to_be_bytes());
    }

    pub fn write_u48(&self, at: usize, value: u64) {
        self.write(at, &value.to_be_bytes()[2..]);
    }

    /// Copies `len` bytes of `src` starting at `offset` into this view at `at`.
    /// Both ranges are clamped independently; returns the number of bytes copied.
    pub fn copy_bytes_in(&self, at: usize, src: &[u8], offset: usize, len: usize) -> usize {
        let offset = offset.min(src.len());
        let len = len.min(src.len() - offset);
        if at >= self.max_length {
            return 0;
        }
        let len = len.min(self.max_length - at);
        let start = self.base + at;
        self.arena().bytes[start..start + len].copy_from_slice(&src[offset..offset + len]);
        len
    }

    /// Copies up to `len` bytes from this view at `at` into `dst` at `offset`.
    pub fn copy_bytes_out(&self, at: usize, dst: &mut [u8], offset: usize, len: usize) -> usize {
        let offset = offset.min(dst.len());
        let len = len.min(dst.len() - offset);
        if at >= self.max_length {
            return 0;
        }
        let len = len.min(self.max_length - at);
        let start = self.base + at;
        dst[offset..offset + len].copy_from_slice(&self.arena().bytes[start..start + len]);
        len
    }

    /// Snapshot of the currently valid bytes of this view.
    pub fn to_bytes(&self) -> Bytes {
        let arena = self.arena();
        let length = arena.views[self.view].length;
        Bytes::copy_from_slice(&arena.bytes[self.base..self.base + length])
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

impl Debug for PacketBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("base", &self.base)
            .field("max_length", &self.max_length)
            .field("length", &self.length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_view_writes_are_visible_in_parent() {
        let parent = PacketBuffer::new(MAX_PACKET_SIZE);
        let child = parent.sub_view(30, 10);
        child.write_u16(4, 0xBEEF);
        assert_eq!(parent.read_u16(34), 0xBEEF);
        assert_eq!(parent.read_u8(34), 0xBE);

        parent.write_u32(30, 0x0102_0304);
        assert_eq!(child.read_u32(0), 0x0102_0304);
    }

    #[test]
    fn nested_views_share_storage() {
        let root = PacketBuffer::new(100);
        let outer = root.sub_view(10, 50);
        let inner = outer.sub_view(6, 20);
        inner.write_u48(0, 0x0000_AABB_CCDD_EEFF);
        assert_eq!(root.read_u48(16), 0x0000_AABB_CCDD_EEFF);
        assert_eq!(inner.base(), 16);
        assert_eq!(inner.max_length(), 84);
    }

    #[test]
    fn out_of_range_access_is_silent() {
        let buffer = PacketBuffer::new(8);
        buffer.write_u32(6, 0xFFFF_FFFF);
        assert_eq!(buffer.read_u16(6), 0);
        assert_eq!(buffer.read_u32(6), 0);
        assert_eq!(buffer.read_u8(8), 0);
        assert_eq!(buffer.read_u16(usize::MAX), 0);
        buffer.write_u8(7, 0x11);
        assert_eq!(buffer.read_u8(7), 0x11);
    }

    #[test]
    fn sub_view_beyond_max_is_empty() {
        let buffer = PacketBuffer::new(40);
        let view = buffer.sub_view(50, 10);
        assert_eq!(view.max_length(), 0);
        assert_eq!(view.length(), 0);
        assert_eq!(view.set_length(5), 0);
        view.write_u8(0, 1);
        assert_eq!(view.read_u8(0), 0);
    }

    #[test]
    fn set_length_clamps_and_propagates() {
        let root = PacketBuffer::new(64);
        let payload = root.sub_view(30, 0);
        assert_eq!(payload.set_length(20), 20);
        assert_eq!(root.length(), 50);
        assert_eq!(payload.set_length(100), 34);
        assert_eq!(root.length(), 64);
    }

    #[test]
    fn shrinking_a_view_never_grows_the_parent() {
        let root = PacketBuffer::new(MAX_PACKET_SIZE);
        let payload = root.sub_view(30, 0);
        payload.set_length(40);
        let before = root.length();
        payload.set_length(12);
        assert!(root.length() <= before);
        assert_eq!(root.length(), 42);
    }

    #[test]
    fn copies_clamp_both_ranges() {
        let buffer = PacketBuffer::new(10);
        let source = [1u8, 2, 3, 4, 5, 6];
        assert_eq!(buffer.copy_bytes_in(7, &source, 2, 10), 3);
        assert_eq!(buffer.read_u8(7), 3);
        assert_eq!(buffer.read_u8(9), 5);
        assert_eq!(buffer.copy_bytes_in(0, &source, 9, 2), 0);

        let mut out = [0u8; 4];
        assert_eq!(buffer.copy_bytes_out(8, &mut out, 1, 4), 2);
        assert_eq!(out, [0, 4, 5, 0]);
    }

    #[test]
    fn from_bytes_snapshot() {
        let buffer = PacketBuffer::from_bytes(&[0xAB, 0xCD, 0xEF]);
        assert_eq!(buffer.capacity(), MAX_PACKET_SIZE);
        assert_eq!(buffer.length(), 3);
        assert_eq!(buffer.to_vec(), vec![0xAB, 0xCD, 0xEF]);
        assert_eq!(buffer.sub_view(1, 2).to_vec(), vec![0xCD, 0xEF]);
    }
}
