//! Packed strings: inline 32-byte ids or pointers into the string region.

use std::fmt;

use byteorder::{ByteOrder, NativeEndian};

use crate::format::{ID_SIZE, PACKED_STR_SIZE};

const FLAG_STR: u8 = 1;
const FLAG_ID: u8 = 2;
const PAYLOAD_OFFSET: usize = 4;

/// A decoded packed str slot.
///
/// The flag byte is part of the persisted format: `1` is a pointer to a
/// NUL-terminated string, `2` an inline id. Any other flag does not decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedStr<'a> {
    Id(&'a [u8; ID_SIZE]),
    Pointer(u32),
}

impl<'a> PackedStr<'a> {
    /// Decodes a slot. Returns `None` for short slots or unknown flags.
    pub fn from_slot(slot: &'a [u8]) -> Option<Self> {
        let slot = slot.get(..PACKED_STR_SIZE)?;
        match slot[0] {
            FLAG_STR => Some(PackedStr::Pointer(NativeEndian::read_u32(
                &slot[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 4],
            ))),
            FLAG_ID => <&[u8; ID_SIZE]>::try_from(&slot[PAYLOAD_OFFSET..])
                .ok()
                .map(PackedStr::Id),
            _ => None,
        }
    }

    pub fn to_slot(&self) -> [u8; PACKED_STR_SIZE] {
        let mut slot = [0u8; PACKED_STR_SIZE];
        match self {
            PackedStr::Id(id) => {
                slot[0] = FLAG_ID;
                slot[PAYLOAD_OFFSET..].copy_from_slice(&id[..]);
            }
            PackedStr::Pointer(offset) => {
                slot[0] = FLAG_STR;
                NativeEndian::write_u32(&mut slot[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 4], *offset);
            }
        }
        slot
    }
}

/// A resolved note string: either the inline id or the pointed-to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteStr<'a> {
    Str(&'a [u8]),
    Id(&'a [u8; ID_SIZE]),
}

impl<'a> NoteStr<'a> {
    pub fn is_id(&self) -> bool {
        matches!(self, NoteStr::Id(_))
    }

    pub fn as_id(&self) -> Option<&'a [u8; ID_SIZE]> {
        match *self {
            NoteStr::Id(id) => Some(id),
            NoteStr::Str(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            NoteStr::Str(s) => Some(s),
            NoteStr::Id(_) => None,
        }
    }

    /// The text, if this is a string and it is valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        self.as_bytes().and_then(|s| std::str::from_utf8(s).ok())
    }
}

/// Text is shown as-is, ids as lowercase hex.
impl fmt::Display for NoteStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteStr::Str(s) => f.write_str(&String::from_utf8_lossy(s)),
            NoteStr::Id(id) => f.write_str(&hex::encode(id)),
        }
    }
}

/// Decodes a tag element that is exactly 64 lowercase hex characters.
///
/// Ids render back as lowercase hex, so any other spelling stays a string.
pub(crate) fn decode_hex_id(text: &str) -> Option<[u8; ID_SIZE]> {
    let lower_hex = text
        .bytes()
        .all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f'));
    if text.len() != ID_SIZE * 2 || !lower_hex {
        return None;
    }
    let mut id = [0u8; ID_SIZE];
    hex::decode_to_slice(text, &mut id).ok()?;
    Some(id)
}
