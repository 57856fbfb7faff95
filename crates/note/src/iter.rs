//! Zero-allocation traversal of a note's tag block.

use crate::format::{read_u16, PACKED_STR_SIZE, TAG_HEADER_SIZE};
use crate::packed::{NoteStr, PackedStr};
use crate::view::Note;

/// Walks the tags of a note in order.
///
/// The iterator holds the note view and a byte offset into the tag block.
/// It yields at most `tag_count` tags and then stays exhausted; a tag record
/// that would run past the tag block also ends the walk.
#[derive(Debug, Clone)]
pub struct TagIter<'a> {
    note: Note<'a>,
    offset: usize,
    index: u16,
}

impl<'a> TagIter<'a> {
    pub fn new(note: Note<'a>) -> Self {
        Self {
            note,
            offset: 0,
            index: 0,
        }
    }

    /// Rewinds to before the first tag.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.index = 0;
    }
}

impl<'a> Iterator for TagIter<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let total = self.note.tag_count();
        if self.index >= total {
            return None;
        }

        let block = self.note.tag_block();
        let tag = read_u16(block, self.offset).and_then(|count| {
            let start = self.offset + TAG_HEADER_SIZE;
            let end = start + count as usize * PACKED_STR_SIZE;
            block.get(start..end).map(|slots| (count, slots, end))
        });

        match tag {
            Some((count, slots, end)) => {
                self.offset = end;
                self.index += 1;
                Some(Tag {
                    note: self.note,
                    count,
                    slots,
                })
            }
            None => {
                self.index = total;
                None
            }
        }
    }
}

/// One tag: an ordered list of packed strs.
#[derive(Debug, Clone, Copy)]
pub struct Tag<'a> {
    note: Note<'a>,
    count: u16,
    slots: &'a [u8],
}

impl<'a> Tag<'a> {
    pub fn count(&self) -> u16 {
        self.count
    }

    /// The packed descriptor of element `i`, or `None` when `i >= count`.
    pub fn packed(&self, i: u16) -> Option<PackedStr<'a>> {
        if i >= self.count {
            return None;
        }
        let start = i as usize * PACKED_STR_SIZE;
        PackedStr::from_slot(self.slots.get(start..start + PACKED_STR_SIZE)?)
    }

    /// Element `i` resolved against the note, or `None` when `i >= count`.
    pub fn get(&self, i: u16) -> Option<NoteStr<'a>> {
        self.packed(i).and_then(|p| self.note.str(p))
    }

    pub fn iter(&self) -> TagElems<'a> {
        TagElems { tag: *self, next: 0 }
    }
}

impl<'a> IntoIterator for Tag<'a> {
    type Item = NoteStr<'a>;
    type IntoIter = TagElems<'a>;

    fn into_iter(self) -> TagElems<'a> {
        self.iter()
    }
}

/// Iterator over the elements of one tag.
#[derive(Debug, Clone)]
pub struct TagElems<'a> {
    tag: Tag<'a>,
    next: u16,
}

impl<'a> Iterator for TagElems<'a> {
    type Item = NoteStr<'a>;

    fn next(&mut self) -> Option<NoteStr<'a>> {
        let s = self.tag.get(self.next)?;
        self.next += 1;
        Some(s)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.tag.count.saturating_sub(self.next) as usize;
        (0, Some(left))
    }
}
