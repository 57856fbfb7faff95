//! `serde` views of a note, used for id commitments and JSON output.

use serde::ser::{Serialize, SerializeSeq, SerializeStruct, SerializeTuple, Serializer};

use crate::iter::Tag;
use crate::packed::NoteStr;
use crate::view::Note;

/// A tag element: text as-is (lossy for invalid UTF-8), ids as lowercase hex.
struct Elem<'a>(NoteStr<'a>);

impl Serialize for Elem<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct TagSeq<'a>(Tag<'a>);

impl Serialize for TagSeq<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.count() as usize))?;
        for elem in self.0 {
            seq.serialize_element(&Elem(elem))?;
        }
        seq.end()
    }
}

struct Tags<'a>(Note<'a>);

impl Serialize for Tags<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.tag_count() as usize))?;
        for tag in self.0.tags() {
            seq.serialize_element(&TagSeq(tag))?;
        }
        seq.end()
    }
}

struct Content<'a>(&'a [u8]);

impl Serialize for Content<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(self.0))
    }
}

struct Hex<'a>(&'a [u8]);

impl Serialize for Hex<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

/// The id commitment: `[0, pubkey, created_at, kind, tags, content]`.
pub(crate) struct Commitment<'a>(pub Note<'a>);

impl Serialize for Commitment<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let note = &self.0;
        let mut tup = serializer.serialize_tuple(6)?;
        tup.serialize_element(&0u8)?;
        tup.serialize_element(&Hex(note.pubkey()))?;
        tup.serialize_element(&note.created_at())?;
        tup.serialize_element(&note.kind())?;
        tup.serialize_element(&Tags(*note))?;
        tup.serialize_element(&Content(note.content()))?;
        tup.end()
    }
}

/// The event object as relays and clients exchange it.
pub(crate) struct Event<'a>(pub Note<'a>);

impl Serialize for Event<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let note = &self.0;
        let mut st = serializer.serialize_struct("Event", 7)?;
        st.serialize_field("id", &Hex(note.id()))?;
        st.serialize_field("pubkey", &Hex(note.pubkey()))?;
        st.serialize_field("created_at", &note.created_at())?;
        st.serialize_field("kind", &note.kind())?;
        st.serialize_field("tags", &Tags(*note))?;
        st.serialize_field("content", &Content(note.content()))?;
        st.serialize_field("sig", &Hex(note.sig()))?;
        st.end()
    }
}
