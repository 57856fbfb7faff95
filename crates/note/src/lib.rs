//! # Note: packed binary events
//!
//! Zero-copy binary representation of signed protocol events.
//!
//! A note is built once inside a caller-owned arena (see [`NoteBuilder`] and
//! [`note_from_json`]) and is immutable afterwards. The same bytes can be
//! persisted and read back later without re-parsing: every field is found
//! through a fixed offset or an explicit count.
//!
//! ## Layout (v1)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ HEADER (192 bytes)                                           │
//! │                                                              │
//! │ version (u8) | padding [3] | strings_offset (u32)            │
//! │ id [32] | pubkey [32] | sig [64]                             │
//! │ created_at (u64) | kind (u32) | content_len (u32)            │
//! │ content (packed str, 36) | reserved (u16) | tag_count (u16)  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ TAGS                                                         │
//! │                                                              │
//! │ count (u16) | reserved (u16) | count × packed str (36)       │
//! │ ... repeated tag_count times ...                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ STRINGS (NUL-terminated, referenced by packed str offsets)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Integers are in **native** byte order: writer and reader of persisted
//! notes must agree on endianness.
//!
//! A packed str is either an inline 32-byte id or an offset into the string
//! region. Tag elements that are exactly 64 hex characters are stored as
//! inline ids; content is always stored as text.

mod builder;
mod error;
mod format;
mod id;
mod iter;
mod json;
mod packed;
mod ser;
mod view;

pub use builder::NoteBuilder;
pub use error::{BuilderError, IdError, JsonError, NoteError};
pub use format::{HEADER_SIZE, ID_SIZE, NOTE_VERSION, PACKED_STR_SIZE, SIG_SIZE, TAG_HEADER_SIZE};
pub use id::{calculate_id, canonical_json, compute_id, verify_id};
pub use iter::{Tag, TagElems, TagIter};
pub use json::{
    client_event_from_json, event_from_any, note_from_json, note_to_json, ws_event_from_json,
    ToClientEvent,
};
pub use packed::{NoteStr, PackedStr};
pub use view::Note;

/// Kind of the profile metadata event.
pub const KIND_PROFILE: u32 = 0;
