use std::fmt;

use crate::error::NoteError;
use crate::format::{
    field, read_u16, write_u32, Header, CONTENT_LEN_OFFSET, CONTENT_OFFSET,
    CREATED_AT_OFFSET, HEADER_SIZE, ID_OFFSET, ID_SIZE, KIND_OFFSET, NOTE_VERSION,
    PACKED_STR_SIZE, PADDING_OFFSET, PADDING_SIZE, PUBKEY_OFFSET, SIG_OFFSET, SIG_SIZE,
    STRINGS_OFFSET, TAG_COUNT_OFFSET, VERSION_OFFSET,
};
use crate::iter::TagIter;
use crate::packed::{NoteStr, PackedStr};

use byteorder::{ByteOrder, NativeEndian};

/// A read-only view of a note.
///
/// The view is three borrowed regions: the fixed header, the tag block and
/// the string region. A finalized or persisted note has them back to back
/// in one buffer; a note still under construction has its string region
/// elsewhere in the builder's arena. Accessors behave the same either way.
#[derive(Clone, Copy)]
pub struct Note<'a> {
    header: &'a Header,
    tags: &'a [u8],
    strings: &'a [u8],
}

impl<'a> Note<'a> {
    /// Interprets `bytes` as one complete note.
    ///
    /// # Validation
    ///
    /// - `bytes` must hold at least the header.
    /// - The version byte must equal [`NOTE_VERSION`].
    /// - The strings offset must lie between the end of the header and the
    ///   end of `bytes`.
    ///
    /// Everything after the strings offset is the string region.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, NoteError> {
        let header: &'a Header = bytes
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or(NoteError::TooSmall { len: bytes.len() })?;

        if header[VERSION_OFFSET] != NOTE_VERSION {
            return Err(NoteError::Version(header[VERSION_OFFSET]));
        }

        let offset = NativeEndian::read_u32(&header[STRINGS_OFFSET..STRINGS_OFFSET + 4]) as usize;
        if offset < HEADER_SIZE || offset > bytes.len() {
            return Err(NoteError::StringsOffset {
                offset,
                len: bytes.len(),
            });
        }

        Ok(Self {
            header,
            tags: &bytes[HEADER_SIZE..offset],
            strings: &bytes[offset..],
        })
    }

    pub(crate) fn from_parts(header: &'a Header, tags: &'a [u8], strings: &'a [u8]) -> Self {
        Self {
            header,
            tags,
            strings,
        }
    }

    pub fn version(&self) -> u8 {
        self.header[VERSION_OFFSET]
    }

    /// The reserved padding bytes, preserved as written.
    pub fn padding(&self) -> &'a [u8] {
        &self.header[PADDING_OFFSET..PADDING_OFFSET + PADDING_SIZE]
    }

    pub fn id(&self) -> &'a [u8; ID_SIZE] {
        field(self.header, ID_OFFSET)
    }

    pub fn pubkey(&self) -> &'a [u8; ID_SIZE] {
        field(self.header, PUBKEY_OFFSET)
    }

    pub fn sig(&self) -> &'a [u8; SIG_SIZE] {
        field(self.header, SIG_OFFSET)
    }

    pub fn created_at(&self) -> u64 {
        NativeEndian::read_u64(field::<8>(self.header, CREATED_AT_OFFSET))
    }

    pub fn kind(&self) -> u32 {
        NativeEndian::read_u32(field::<4>(self.header, KIND_OFFSET))
    }

    /// Content length in bytes, excluding the NUL terminator.
    pub fn content_len(&self) -> u32 {
        NativeEndian::read_u32(field::<4>(self.header, CONTENT_LEN_OFFSET))
    }

    /// The packed descriptor of the content field.
    pub fn content_packed(&self) -> Option<PackedStr<'a>> {
        PackedStr::from_slot(&self.header[CONTENT_OFFSET..CONTENT_OFFSET + PACKED_STR_SIZE])
    }

    /// The content bytes. Empty when the descriptor does not point at text.
    pub fn content(&self) -> &'a [u8] {
        match self.content_packed() {
            Some(PackedStr::Pointer(offset)) => {
                let start = offset as usize;
                let end = start.saturating_add(self.content_len() as usize);
                self.strings.get(start..end).unwrap_or(&[])
            }
            _ => &[],
        }
    }

    pub fn content_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.content()).ok()
    }

    pub fn tag_count(&self) -> u16 {
        read_u16(self.header, TAG_COUNT_OFFSET).unwrap_or(0)
    }

    /// A fresh iterator positioned before the first tag.
    pub fn tags(&self) -> TagIter<'a> {
        TagIter::new(*self)
    }

    /// Resolves a packed str against this note's string region.
    ///
    /// Returns `None` if a pointer leaves the string region or its string is
    /// not NUL-terminated.
    pub fn str(&self, packed: PackedStr<'a>) -> Option<NoteStr<'a>> {
        match packed {
            PackedStr::Id(id) => Some(NoteStr::Id(id)),
            PackedStr::Pointer(offset) => {
                let rest = self.strings.get(offset as usize..)?;
                let nul = rest.iter().position(|&b| b == 0)?;
                Some(NoteStr::Str(&rest[..nul]))
            }
        }
    }

    /// Total size of the note in bytes.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.tags.len() + self.strings.len()
    }

    /// Copies the note into one contiguous buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(self.header);
        out.extend_from_slice(self.tags);
        out.extend_from_slice(self.strings);
        write_u32(&mut out, STRINGS_OFFSET, (HEADER_SIZE + self.tags.len()) as u32);
        out
    }

    pub(crate) fn tag_block(&self) -> &'a [u8] {
        self.tags
    }
}

impl fmt::Debug for Note<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Note")
            .field("id", &hex::encode(self.id()))
            .field("pubkey", &hex::encode(self.pubkey()))
            .field("created_at", &self.created_at())
            .field("kind", &self.kind())
            .field("content_len", &self.content_len())
            .field("tags", &self.tag_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoteBuilder;

    fn sample(buf: &mut [u8]) -> usize {
        let mut b = NoteBuilder::new(buf).unwrap();
        b.set_kind(1);
        b.set_created_at(1_689_836_342);
        b.set_content("hello").unwrap();
        b.new_tag().unwrap();
        b.push_tag_str("t").unwrap();
        b.push_tag_str("rust").unwrap();
        let (_, size) = b.finalize().unwrap();
        size
    }

    #[test]
    fn from_bytes_reads_finalized_note() {
        let mut buf = vec![0u8; 2048];
        let size = sample(&mut buf);

        let note = Note::from_bytes(&buf[..size]).unwrap();
        assert_eq!(note.version(), NOTE_VERSION);
        assert_eq!(note.kind(), 1);
        assert_eq!(note.created_at(), 1_689_836_342);
        assert_eq!(note.content(), b"hello");
        assert_eq!(note.content_len(), 5);
        assert_eq!(note.tag_count(), 1);
        assert_eq!(note.size(), size);
    }

    #[test]
    fn persisted_copy_reads_the_same() {
        let mut buf = vec![0u8; 2048];
        let size = sample(&mut buf);
        let original = Note::from_bytes(&buf[..size]).unwrap();

        let copy = original.to_vec();
        assert_eq!(copy, &buf[..size]);
        let reread = Note::from_bytes(&copy).unwrap();
        assert_eq!(reread.content_str(), Some("hello"));
        let tag = reread.tags().next().unwrap();
        assert_eq!(tag.get(1).and_then(|s| s.as_str()), Some("rust"));
    }

    #[test]
    fn from_bytes_rejects_short_and_wrong_version() {
        assert_eq!(
            Note::from_bytes(&[0u8; 10]).unwrap_err(),
            NoteError::TooSmall { len: 10 }
        );

        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[VERSION_OFFSET] = 9;
        assert_eq!(Note::from_bytes(&bytes).unwrap_err(), NoteError::Version(9));
    }

    #[test]
    fn from_bytes_rejects_strings_offset_outside_note() {
        let mut buf = vec![0u8; 2048];
        let size = sample(&mut buf);
        let mut bytes = buf[..size].to_vec();
        write_u32(&mut bytes, STRINGS_OFFSET, size as u32 + 1);
        assert!(matches!(
            Note::from_bytes(&bytes),
            Err(NoteError::StringsOffset { .. })
        ));
    }

    #[test]
    fn dangling_pointer_does_not_resolve() {
        let mut buf = vec![0u8; 2048];
        let size = sample(&mut buf);
        let note = Note::from_bytes(&buf[..size]).unwrap();
        assert_eq!(note.str(PackedStr::Pointer(u32::MAX)), None);
    }
}
