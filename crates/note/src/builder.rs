//! Incremental construction of a note inside a caller-owned arena.

use cursor::{Cursor, CursorError};

use crate::error::{BuilderError, IdError};
use crate::format::{
    read_u16, write_u16, write_u32, write_u64, Header, CONTENT_LEN_OFFSET, CONTENT_OFFSET,
    CREATED_AT_OFFSET, HEADER_SIZE, ID_OFFSET, ID_SIZE, KIND_OFFSET, NOTE_VERSION,
    PACKED_STR_SIZE, PADDING_OFFSET, PADDING_SIZE, PUBKEY_OFFSET, SIG_OFFSET, SIG_SIZE,
    STRINGS_OFFSET, TAG_COUNT_OFFSET, TAG_HEADER_SIZE, VERSION_OFFSET,
};
use crate::id::compute_id;
use crate::packed::{decode_hex_id, PackedStr};
use crate::view::Note;

/// Smallest arena a builder accepts: room for a header in each region.
const MIN_BUFFER: usize = HEADER_SIZE * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Building,
    Failed,
}

/// Builds one note inside a borrowed buffer.
///
/// The buffer is split in half: the note region (header followed by tag
/// records) grows from the start, the string region grows from the middle.
/// [`finalize`](NoteBuilder::finalize) moves the strings down so the note
/// ends up contiguous at the start of the buffer. Pointers are relative to
/// the string region, so the move needs no fix-ups.
///
/// Any failed operation poisons the builder; it must then be dropped.
pub struct NoteBuilder<'a> {
    buf: &'a mut [u8],
    note_len: usize,
    strings_start: usize,
    strings_len: usize,
    open_tag: Option<usize>,
    state: State,
}

impl<'a> NoteBuilder<'a> {
    /// Reserves the header in `buf` and starts with empty content and no
    /// tags.
    pub fn new(buf: &'a mut [u8]) -> Result<Self, BuilderError> {
        if buf.len() < MIN_BUFFER {
            return Err(BuilderError::BufferTooSmall { len: buf.len() });
        }
        let half = buf.len() / 2;
        let strings_offset = u32::try_from(half).map_err(|_| BuilderError::TooLong(half))?;

        let mut builder = Self {
            buf,
            note_len: 0,
            strings_start: half,
            strings_len: 0,
            open_tag: None,
            state: State::Building,
        };

        let note_len = {
            let mut note = builder.note_cursor()?;
            let header = note.allocate(HEADER_SIZE)?;
            header[VERSION_OFFSET] = NOTE_VERSION;
            write_u32(header, STRINGS_OFFSET, strings_offset);
            note.position()
        };
        builder.note_len = note_len;
        builder.set_content("")?;

        Ok(builder)
    }

    fn note_cursor(&mut self) -> Result<Cursor<'_>, CursorError> {
        Cursor::with_position(&mut self.buf[..self.strings_start], self.note_len)
    }

    fn strings_cursor(&mut self) -> Result<Cursor<'_>, CursorError> {
        Cursor::with_position(&mut self.buf[self.strings_start..], self.strings_len)
    }

    /// Appends to the note region, returning the offset written at.
    fn push_note(&mut self, bytes: &[u8]) -> Result<usize, BuilderError> {
        let at = self.note_len;
        let end = {
            let mut note = self.note_cursor()?;
            note.push_bytes(bytes)?;
            note.position()
        };
        self.note_len = end;
        Ok(at)
    }

    /// Appends a NUL-terminated string, returning its string-region offset.
    fn push_string(&mut self, text: &str) -> Result<u32, BuilderError> {
        let at = u32::try_from(self.strings_len).map_err(|_| BuilderError::TooLong(text.len()))?;
        let end = {
            let mut strings = self.strings_cursor()?;
            strings.push_c_str(text)?;
            strings.position()
        };
        self.strings_len = end;
        Ok(at)
    }

    fn guard<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, BuilderError>,
    ) -> Result<T, BuilderError> {
        if self.state == State::Failed {
            return Err(BuilderError::Poisoned);
        }
        match op(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// Writes `text` as the content. Earlier content bytes stay behind as
    /// unreachable slack.
    pub fn set_content(&mut self, text: &str) -> Result<(), BuilderError> {
        self.guard(|b| {
            let len = u32::try_from(text.len()).map_err(|_| BuilderError::TooLong(text.len()))?;
            let offset = b.push_string(text)?;
            b.buf[CONTENT_OFFSET..CONTENT_OFFSET + PACKED_STR_SIZE]
                .copy_from_slice(&PackedStr::Pointer(offset).to_slot());
            write_u32(b.buf, CONTENT_LEN_OFFSET, len);
            Ok(())
        })
    }

    /// Like the other fixed-size setters, does nothing once the builder has
    /// failed.
    pub fn set_id(&mut self, id: &[u8; ID_SIZE]) {
        if self.is_failed() {
            return;
        }
        self.buf[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(id);
    }

    pub fn set_pubkey(&mut self, pubkey: &[u8; ID_SIZE]) {
        if self.is_failed() {
            return;
        }
        self.buf[PUBKEY_OFFSET..PUBKEY_OFFSET + ID_SIZE].copy_from_slice(pubkey);
    }

    pub fn set_sig(&mut self, sig: &[u8; SIG_SIZE]) {
        if self.is_failed() {
            return;
        }
        self.buf[SIG_OFFSET..SIG_OFFSET + SIG_SIZE].copy_from_slice(sig);
    }

    pub fn set_kind(&mut self, kind: u32) {
        if self.is_failed() {
            return;
        }
        write_u32(self.buf, KIND_OFFSET, kind);
    }

    pub fn set_created_at(&mut self, created_at: u64) {
        if self.is_failed() {
            return;
        }
        write_u64(self.buf, CREATED_AT_OFFSET, created_at);
    }

    pub fn set_padding(&mut self, padding: &[u8; PADDING_SIZE]) {
        if self.is_failed() {
            return;
        }
        self.buf[PADDING_OFFSET..PADDING_OFFSET + PADDING_SIZE].copy_from_slice(padding);
    }

    /// Opens a new tag. The previously open tag, if any, is closed.
    pub fn new_tag(&mut self) -> Result<(), BuilderError> {
        self.guard(|b| {
            let count = read_u16(b.buf, TAG_COUNT_OFFSET).unwrap_or(0);
            let next = count.checked_add(1).ok_or(BuilderError::TooManyTags)?;
            let at = b.push_note(&[0u8; TAG_HEADER_SIZE])?;
            b.open_tag = Some(at);
            write_u16(b.buf, TAG_COUNT_OFFSET, next);
            Ok(())
        })
    }

    /// Appends an element to the open tag.
    ///
    /// Exactly 64 lowercase hex characters are stored as an inline 32-byte
    /// id, anything else as a NUL-terminated string. Elements containing a
    /// NUL byte are rejected.
    pub fn push_tag_str(&mut self, text: &str) -> Result<(), BuilderError> {
        self.guard(|b| {
            let tag = b.open_tag.ok_or(BuilderError::NoOpenTag)?;
            if let Some(at) = text.bytes().position(|c| c == 0) {
                return Err(BuilderError::EmbeddedNul(at));
            }
            let count = read_u16(b.buf, tag).unwrap_or(0);
            let next = count
                .checked_add(1)
                .ok_or(BuilderError::TooManyElements)?;

            let slot = match decode_hex_id(text) {
                Some(id) => PackedStr::Id(&id).to_slot(),
                None => PackedStr::Pointer(b.push_string(text)?).to_slot(),
            };
            b.push_note(&slot)?;
            write_u16(b.buf, tag, next);
            Ok(())
        })
    }

    /// The note as built so far, readable with the same accessors as a
    /// finalized note.
    pub fn note(&self) -> Note<'_> {
        let header: &Header = match self.buf[..HEADER_SIZE].try_into() {
            Ok(header) => header,
            Err(_) => unreachable!("builder buffer is at least {MIN_BUFFER} bytes"),
        };
        Note::from_parts(
            header,
            &self.buf[HEADER_SIZE..self.note_len],
            &self.buf[self.strings_start..self.strings_start + self.strings_len],
        )
    }

    /// Computes the content-addressed id from the current fields and stores
    /// it in the id field.
    pub fn calculate_id(&mut self) -> Result<[u8; ID_SIZE], IdError> {
        let id = compute_id(&self.note())?;
        self.set_id(&id);
        Ok(id)
    }

    /// Closes the open tag, packs the strings behind the tag block and
    /// returns the finished note with its size in bytes.
    pub fn finalize(self) -> Result<(Note<'a>, usize), BuilderError> {
        if self.state == State::Failed {
            return Err(BuilderError::Poisoned);
        }
        let NoteBuilder {
            buf,
            note_len,
            strings_start,
            strings_len,
            ..
        } = self;

        let strings_offset =
            u32::try_from(note_len).map_err(|_| BuilderError::TooLong(note_len))?;
        buf.copy_within(strings_start..strings_start + strings_len, note_len);
        write_u32(buf, STRINGS_OFFSET, strings_offset);

        let size = note_len + strings_len;
        let buf: &'a [u8] = buf;
        let note = Note::from_bytes(&buf[..size])?;
        Ok((note, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoteStr;

    const HEX_PK: &str = "5d9b81b2d4d5609c5565286fc3b511dc6b9a1b3d7d1174310c624d61d1f82bb9";

    #[test]
    fn basic_event() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();

        b.set_padding(&[3; PADDING_SIZE]);
        b.set_content(HEX_PK).unwrap();
        b.set_id(&[1; ID_SIZE]);
        b.set_pubkey(&[2; ID_SIZE]);
        b.set_sig(&[3; SIG_SIZE]);

        b.new_tag().unwrap();
        b.push_tag_str("p").unwrap();
        b.push_tag_str(HEX_PK).unwrap();

        b.new_tag().unwrap();
        b.push_tag_str("word").unwrap();
        b.push_tag_str("words").unwrap();
        b.push_tag_str("w").unwrap();

        let (note, size) = b.finalize().unwrap();
        assert_eq!(note.size(), size);

        // content is never packed as an id, even when it looks like one
        assert!(matches!(note.content_packed(), Some(PackedStr::Pointer(_))));
        assert_eq!(note.content_str(), Some(HEX_PK));
        assert_eq!(note.tag_count(), 2);
        assert_eq!(note.padding(), &[3; PADDING_SIZE]);
        assert_eq!(note.id(), &[1; ID_SIZE]);
        assert_eq!(note.pubkey(), &[2; ID_SIZE]);
        assert_eq!(note.sig(), &[3; SIG_SIZE]);

        let mut it = note.tags();
        let tag = it.next().unwrap();
        assert_eq!(tag.count(), 2);
        assert_eq!(tag.get(0), Some(NoteStr::Str(b"p")));
        let mut expected = [0u8; ID_SIZE];
        hex::decode_to_slice(HEX_PK, &mut expected).unwrap();
        assert_eq!(tag.get(1), Some(NoteStr::Id(&expected)));

        let tag = it.next().unwrap();
        assert_eq!(tag.count(), 3);
        assert_eq!(tag.get(0), Some(NoteStr::Str(b"word")));
        assert_eq!(tag.get(1), Some(NoteStr::Str(b"words")));
        assert_eq!(tag.get(2), Some(NoteStr::Str(b"w")));

        assert!(it.next().is_none());
    }

    #[test]
    fn finalized_note_is_contiguous_at_buffer_start() {
        let mut buf = vec![0u8; 4096];
        let size = {
            let mut b = NoteBuilder::new(&mut buf).unwrap();
            b.set_content("hello").unwrap();
            b.new_tag().unwrap();
            b.push_tag_str("t").unwrap();
            b.finalize().unwrap().1
        };
        assert_eq!(size, HEADER_SIZE + TAG_HEADER_SIZE + PACKED_STR_SIZE + 1 + 6 + 2);
        let note = Note::from_bytes(&buf[..size]).unwrap();
        assert_eq!(note.content_str(), Some("hello"));
    }

    #[test]
    fn strings_work_before_finalization() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        b.set_content("hello").unwrap();
        b.new_tag().unwrap();
        b.push_tag_str("word").unwrap();

        assert_eq!(b.note().content(), b"hello");
        let tag = b.note().tags().next().unwrap();
        assert_eq!(tag.get(0), Some(NoteStr::Str(b"word")));

        let (note, _) = b.finalize().unwrap();
        assert_eq!(note.content(), b"hello");
    }

    #[test]
    fn set_content_twice_keeps_last() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        b.set_content("first").unwrap();
        b.set_content("second").unwrap();
        let (note, _) = b.finalize().unwrap();
        assert_eq!(note.content_str(), Some("second"));
        assert_eq!(note.content_len(), 6);
    }

    #[test]
    fn fresh_builder_has_empty_content_and_no_tags() {
        let mut buf = [0u8; MIN_BUFFER];
        let b = NoteBuilder::new(&mut buf).unwrap();
        let (note, _) = b.finalize().unwrap();
        assert_eq!(note.content(), b"");
        assert_eq!(note.tag_count(), 0);
        assert_eq!(note.kind(), 0);
    }

    // -------------------- Failure handling --------------------

    #[test]
    fn buffer_too_small_is_rejected() {
        let mut buf = [0u8; MIN_BUFFER - 1];
        assert_eq!(
            NoteBuilder::new(&mut buf).err(),
            Some(BuilderError::BufferTooSmall {
                len: MIN_BUFFER - 1
            })
        );
    }

    #[test]
    fn push_without_open_tag_poisons() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        assert_eq!(b.push_tag_str("e"), Err(BuilderError::NoOpenTag));
        assert!(b.is_failed());
        assert_eq!(b.new_tag(), Err(BuilderError::Poisoned));
        assert_eq!(b.finalize().err(), Some(BuilderError::Poisoned));
    }

    #[test]
    fn nul_in_tag_element_is_rejected() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        b.new_tag().unwrap();
        assert_eq!(b.push_tag_str("a\0b"), Err(BuilderError::EmbeddedNul(1)));
        assert!(b.is_failed());
        assert_eq!(b.finalize().err(), Some(BuilderError::Poisoned));
    }

    #[test]
    fn nul_in_content_is_kept() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        b.set_content("a\0b").unwrap();
        let (note, _) = b.finalize().unwrap();
        assert_eq!(note.content(), b"a\0b");
    }

    #[test]
    fn setters_do_nothing_after_failure() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        b.set_kind(1);
        assert_eq!(b.push_tag_str("e"), Err(BuilderError::NoOpenTag));

        b.set_kind(7);
        b.set_created_at(99);
        b.set_id(&[1; ID_SIZE]);
        b.set_pubkey(&[2; ID_SIZE]);
        b.set_sig(&[3; SIG_SIZE]);
        b.set_padding(&[4; PADDING_SIZE]);

        let note = b.note();
        assert_eq!(note.kind(), 1);
        assert_eq!(note.created_at(), 0);
        assert_eq!(note.id(), &[0; ID_SIZE]);
        assert_eq!(note.pubkey(), &[0; ID_SIZE]);
        assert_eq!(note.sig(), &[0; SIG_SIZE]);
        assert_eq!(note.padding(), &[0; PADDING_SIZE]);
    }

    #[test]
    fn arena_exhaustion_fails_finalize() {
        // half of this buffer is exactly one header, so no tag fits
        let mut buf = [0u8; MIN_BUFFER];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        assert!(matches!(b.new_tag(), Err(BuilderError::Full(_))));
        assert_eq!(b.set_content("x"), Err(BuilderError::Poisoned));
        assert_eq!(b.finalize().err(), Some(BuilderError::Poisoned));
    }

    #[test]
    fn exhausted_string_region_fails() {
        let mut buf = [0u8; MIN_BUFFER];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        let long = "x".repeat(HEADER_SIZE);
        assert!(matches!(b.set_content(&long), Err(BuilderError::Full(_))));
        assert!(b.finalize().is_err());
    }

    #[test]
    fn calculate_id_writes_id_field() {
        let mut buf = [0u8; 1024];
        let mut b = NoteBuilder::new(&mut buf).unwrap();
        b.set_content("hi").unwrap();
        let id = b.calculate_id().unwrap();
        assert_eq!(b.note().id(), &id);
        let (note, _) = b.finalize().unwrap();
        assert_eq!(compute_id(&note).unwrap(), id);
    }
}
