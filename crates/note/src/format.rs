//! Note binary format constants and fixed-offset field helpers.

use byteorder::{ByteOrder, NativeEndian};

/// Current layout version, stored in the first header byte.
pub const NOTE_VERSION: u8 = 1;

pub const ID_SIZE: usize = 32;
pub const SIG_SIZE: usize = 64;

/// Size of one packed str slot: flag (u8) + reserved [3] + payload [32].
pub const PACKED_STR_SIZE: usize = 36;

/// Size of a tag record header: count (u16) + reserved (u16).
pub const TAG_HEADER_SIZE: usize = 4;

pub(crate) const VERSION_OFFSET: usize = 0;
pub(crate) const PADDING_OFFSET: usize = 1;
pub(crate) const PADDING_SIZE: usize = 3;
pub(crate) const STRINGS_OFFSET: usize = 4;
pub(crate) const ID_OFFSET: usize = 8;
pub(crate) const PUBKEY_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub(crate) const SIG_OFFSET: usize = PUBKEY_OFFSET + ID_SIZE;
pub(crate) const CREATED_AT_OFFSET: usize = SIG_OFFSET + SIG_SIZE;
pub(crate) const KIND_OFFSET: usize = CREATED_AT_OFFSET + 8;
pub(crate) const CONTENT_LEN_OFFSET: usize = KIND_OFFSET + 4;
pub(crate) const CONTENT_OFFSET: usize = CONTENT_LEN_OFFSET + 4;
pub(crate) const TAG_COUNT_OFFSET: usize = CONTENT_OFFSET + PACKED_STR_SIZE + 2;

/// Size of the fixed note header; the tag block starts here.
pub const HEADER_SIZE: usize = TAG_COUNT_OFFSET + 2;

pub(crate) type Header = [u8; HEADER_SIZE];

/// Fixed-size view of a header field.
pub(crate) fn field<const N: usize>(header: &Header, offset: usize) -> &[u8; N] {
    match header[offset..offset + N].try_into() {
        Ok(field) => field,
        Err(_) => unreachable!("header field {offset}+{N} outside {HEADER_SIZE}-byte header"),
    }
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    buf.get(offset..offset + 2).map(NativeEndian::read_u16)
}

pub(crate) fn write_u16(buf: &mut [u8], offset: usize, v: u16) {
    NativeEndian::write_u16(&mut buf[offset..offset + 2], v);
}

pub(crate) fn write_u32(buf: &mut [u8], offset: usize, v: u32) {
    NativeEndian::write_u32(&mut buf[offset..offset + 4], v);
}

pub(crate) fn write_u64(buf: &mut [u8], offset: usize, v: u64) {
    NativeEndian::write_u64(&mut buf[offset..offset + 8], v);
}
