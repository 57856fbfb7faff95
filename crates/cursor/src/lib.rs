//! # Cursor
//!
//! A bounds-checked bump allocator over a caller-owned byte region.
//!
//! Every layer of the note format is written through a [`Cursor`]: the
//! builder reserves the note header with it, appends tag records with it and
//! writes NUL-terminated strings with it. The cursor never owns memory and
//! never allocates outside the region it was given.
//!
//! ## Key properties
//! - **Atomic writes**: a push either writes all of its bytes and advances
//!   the position by exactly that length, or fails and leaves the position
//!   and every previously written byte untouched.
//! - **One bounds convention**: every push and allocation succeeds iff
//!   `position + len <= end`. A write that exactly fills the region is
//!   accepted.
//! - **Native byte order**: fixed-width integers are written in the host's
//!   byte order, matching the persisted note layout.
//!
//! ## Example
//! ```rust
//! use cursor::Cursor;
//!
//! let mut buf = [0u8; 8];
//! let mut c = Cursor::new(&mut buf);
//! c.push_c_str("abc").unwrap();
//! c.push_u16(7).unwrap();
//! assert_eq!(c.position(), 6);
//! assert!(c.push_u32(1).is_err());
//! assert_eq!(c.position(), 6);
//! ```

use std::fmt;

use byteorder::{ByteOrder, NativeEndian};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("cursor full: needed {needed} bytes, {remaining} remaining")]
    Full { needed: usize, remaining: usize },
    #[error("position {position} outside region of {capacity} bytes")]
    OutOfRange { position: usize, capacity: usize },
}

/// A write cursor over a borrowed byte region.
///
/// `start` is index 0 of the borrowed slice and `end` is its length, so the
/// cursor cannot even express an offset outside the region it was built on.
pub struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor positioned at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Re-opens a cursor over `buf` that has already written `position`
    /// bytes.
    ///
    /// Used by owners that keep the region and only remember how far they
    /// wrote, like the note builder with its two regions.
    pub fn with_position(buf: &'a mut [u8], position: usize) -> Result<Self, CursorError> {
        if position > buf.len() {
            return Err(CursorError::OutOfRange {
                position,
                capacity: buf.len(),
            });
        }
        Ok(Self { buf, pos: position })
    }

    /// Bytes written so far (`position - start`).
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total size of the region (`end - start`).
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes still available (`end - position`).
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// The unwritten tail of the region.
    ///
    /// Callers may fill a prefix of it in place and then commit it with
    /// [`advance`](Cursor::advance) instead of copying.
    pub fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }

    fn reserve(&self, len: usize) -> Result<(), CursorError> {
        match self.pos.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(()),
            _ => Err(CursorError::Full {
                needed: len,
                remaining: self.remaining(),
            }),
        }
    }

    pub fn push_byte(&mut self, c: u8) -> Result<(), CursorError> {
        self.reserve(1)?;
        self.buf[self.pos] = c;
        self.pos += 1;
        Ok(())
    }

    /// Copies `data` to the current position and advances past it.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), CursorError> {
        self.reserve(data.len())?;
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(())
    }

    /// Commits `len` bytes that were already written through
    /// [`remaining_mut`](Cursor::remaining_mut).
    pub fn advance(&mut self, len: usize) -> Result<(), CursorError> {
        self.reserve(len)?;
        self.pos += len;
        Ok(())
    }

    pub fn push_str(&mut self, s: &str) -> Result<(), CursorError> {
        self.push_bytes(s.as_bytes())
    }

    /// Pushes `s` followed by a NUL terminator. Both fit or nothing is written.
    pub fn push_c_str(&mut self, s: &str) -> Result<(), CursorError> {
        self.reserve(s.len().saturating_add(1))?;
        self.push_bytes(s.as_bytes())?;
        self.push_byte(0)
    }

    pub fn push_u16(&mut self, v: u16) -> Result<(), CursorError> {
        let mut bytes = [0u8; 2];
        NativeEndian::write_u16(&mut bytes, v);
        self.push_bytes(&bytes)
    }

    pub fn push_u32(&mut self, v: u32) -> Result<(), CursorError> {
        let mut bytes = [0u8; 4];
        NativeEndian::write_u32(&mut bytes, v);
        self.push_bytes(&bytes)
    }

    pub fn push_u64(&mut self, v: u64) -> Result<(), CursorError> {
        let mut bytes = [0u8; 8];
        NativeEndian::write_u64(&mut bytes, v);
        self.push_bytes(&bytes)
    }

    /// Bump-allocates `size` zeroed bytes and returns them.
    pub fn allocate(&mut self, size: usize) -> Result<&mut [u8], CursorError> {
        self.reserve(size)?;
        let start = self.pos;
        self.pos += size;
        let region = &mut self.buf[start..self.pos];
        region.fill(0);
        Ok(region)
    }

    /// Allocates `size` bytes and returns a cursor bounded to exactly that
    /// sub-region.
    pub fn slice(&mut self, size: usize) -> Result<Cursor<'_>, CursorError> {
        self.allocate(size).map(Cursor::new)
    }

    /// Number of whole `element_size` elements written so far.
    pub fn count(&self, element_size: usize) -> usize {
        self.pos.checked_div(element_size).unwrap_or(0)
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.pos)
            .field("capacity", &self.buf.len())
            .finish()
    }
}
