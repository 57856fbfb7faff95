use cursor::CursorError;
use thiserror::Error;

/// Errors reading a note from raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("note too small: {len} bytes")]
    TooSmall { len: usize },
    #[error("unsupported note version {0}")]
    Version(u8),
    #[error("strings offset {offset} outside note of {len} bytes")]
    StringsOffset { offset: usize, len: usize },
}

/// Errors building a note.
///
/// Any of these poisons the builder: later calls return
/// [`BuilderError::Poisoned`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("buffer of {len} bytes too small for a note")]
    BufferTooSmall { len: usize },
    #[error("arena exhausted: {0}")]
    Full(#[from] CursorError),
    #[error("no open tag")]
    NoOpenTag,
    #[error("too many tags")]
    TooManyTags,
    #[error("too many elements in tag")]
    TooManyElements,
    #[error("tag element contains a NUL byte at {0}")]
    EmbeddedNul(usize),
    #[error("string of {0} bytes does not fit the note format")]
    TooLong(usize),
    #[error("builder failed earlier and cannot be used")]
    Poisoned,
    #[error(transparent)]
    Note(#[from] NoteError),
}

/// Errors computing or checking a content-addressed id.
#[derive(Debug, Error)]
pub enum IdError {
    #[error("id mismatch: stored {stored}, computed {computed}")]
    Mismatch { stored: String, computed: String },
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Note(#[from] NoteError),
}

/// Errors parsing JSON events and relay messages.
#[derive(Debug, Error)]
pub enum JsonError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid hex in `{0}`")]
    Hex(&'static str),
    #[error("malformed message: {0}")]
    Envelope(&'static str),
    #[error("unknown message type `{0}`")]
    UnknownMessage(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}
