//! Parsing events from JSON and relay messages, and rendering notes back.
//!
//! Parsing borrows from the input wherever the JSON text has no escapes; the
//! only copy is the one into the note arena.

use std::borrow::Cow;

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::builder::NoteBuilder;
use crate::error::JsonError;
use crate::format::{ID_SIZE, SIG_SIZE};
use crate::ser::Event;
use crate::view::Note;

#[derive(Debug, Deserialize)]
struct RawEvent<'a> {
    #[serde(borrow)]
    id: Cow<'a, str>,
    #[serde(borrow)]
    pubkey: Cow<'a, str>,
    created_at: u64,
    kind: u32,
    #[serde(borrow, default)]
    tags: Vec<Vec<Cow<'a, str>>>,
    #[serde(borrow)]
    content: Cow<'a, str>,
    #[serde(borrow)]
    sig: Cow<'a, str>,
}

/// A message sent from a relay to a client.
#[derive(Debug)]
pub enum ToClientEvent<'b> {
    /// `["EVENT", <subid>, <event>]`
    Event {
        subid: String,
        note: Note<'b>,
        size: usize,
    },
    /// `["EOSE", <subid>]`
    Eose { subid: String },
    /// `["OK", <event id>, <accepted>, <message>]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice { message: String },
}

fn decode_hex<const N: usize>(field: &'static str, text: &str) -> Result<[u8; N], JsonError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(text, &mut out).map_err(|_| JsonError::Hex(field))?;
    Ok(out)
}

fn build_note<'b>(raw: &RawEvent<'_>, buf: &'b mut [u8]) -> Result<(Note<'b>, usize), JsonError> {
    let id = decode_hex::<ID_SIZE>("id", &raw.id)?;
    let pubkey = decode_hex::<ID_SIZE>("pubkey", &raw.pubkey)?;
    let sig = decode_hex::<SIG_SIZE>("sig", &raw.sig)?;

    let mut b = NoteBuilder::new(buf)?;
    b.set_id(&id);
    b.set_pubkey(&pubkey);
    b.set_sig(&sig);
    b.set_created_at(raw.created_at);
    b.set_kind(raw.kind);
    b.set_content(&raw.content)?;
    for tag in &raw.tags {
        b.new_tag()?;
        for elem in tag {
            b.push_tag_str(elem)?;
        }
    }
    Ok(b.finalize()?)
}

fn parse_note<'b>(json: &str, buf: &'b mut [u8]) -> Result<(Note<'b>, usize), JsonError> {
    let raw: RawEvent<'_> = serde_json::from_str(json)?;
    build_note(&raw, buf)
}

/// Parses a message array, returning its type tag and all parts.
fn envelope(json: &str) -> Result<(Cow<'_, str>, Vec<&RawValue>), JsonError> {
    let parts: Vec<&RawValue> = serde_json::from_str(json)?;
    let first = parts.first().ok_or(JsonError::Envelope("empty message"))?;
    let kind: Cow<'_, str> = serde_json::from_str(first.get())?;
    Ok((kind, parts))
}

fn string_at(parts: &[&RawValue], i: usize, what: &'static str) -> Result<String, JsonError> {
    let part = parts.get(i).ok_or(JsonError::Envelope(what))?;
    Ok(serde_json::from_str(part.get())?)
}

/// Parses a bare event object into `buf`.
///
/// `id`, `pubkey` and `sig` must be lowercase or uppercase hex of exactly
/// 32, 32 and 64 bytes. Unknown fields are ignored; a missing `tags` field
/// reads as no tags.
pub fn note_from_json<'b>(json: &str, buf: &'b mut [u8]) -> Result<(Note<'b>, usize), JsonError> {
    parse_note(json, buf)
}

/// Parses a relay-to-client message. Only `EVENT` messages use `buf`.
pub fn ws_event_from_json<'b>(json: &str, buf: &'b mut [u8]) -> Result<ToClientEvent<'b>, JsonError> {
    let (kind, parts) = envelope(json)?;
    match kind.as_ref() {
        "EVENT" => {
            if parts.len() != 3 {
                return Err(JsonError::Envelope("EVENT expects subscription id and event"));
            }
            let subid = string_at(&parts, 1, "subscription id")?;
            let (note, size) = parse_note(parts[2].get(), buf)?;
            Ok(ToClientEvent::Event { subid, note, size })
        }
        "EOSE" => Ok(ToClientEvent::Eose {
            subid: string_at(&parts, 1, "subscription id")?,
        }),
        "OK" => {
            let event_id = string_at(&parts, 1, "event id")?;
            let accepted = parts
                .get(2)
                .ok_or(JsonError::Envelope("accepted flag"))
                .and_then(|p| Ok(serde_json::from_str::<bool>(p.get())?))?;
            let message = string_at(&parts, 3, "message")?;
            Ok(ToClientEvent::Ok {
                event_id,
                accepted,
                message,
            })
        }
        "NOTICE" => Ok(ToClientEvent::Notice {
            message: string_at(&parts, 1, "message")?,
        }),
        other => Err(JsonError::UnknownMessage(other.to_owned())),
    }
}

/// Parses a client-to-relay `["EVENT", <event>]` message.
pub fn client_event_from_json<'b>(
    json: &str,
    buf: &'b mut [u8],
) -> Result<(Note<'b>, usize), JsonError> {
    let (kind, parts) = envelope(json)?;
    if kind != "EVENT" {
        return Err(JsonError::UnknownMessage(kind.into_owned()));
    }
    match parts.as_slice() {
        [_, event] => parse_note(event.get(), buf),
        _ => Err(JsonError::Envelope("EVENT expects one event")),
    }
}

/// Parses an event given as a bare object, a client `["EVENT", ev]` message
/// or a relay `["EVENT", subid, ev]` message.
pub fn event_from_any<'b>(json: &str, buf: &'b mut [u8]) -> Result<(Note<'b>, usize), JsonError> {
    let trimmed = json.trim_start();
    if trimmed.starts_with('{') {
        return parse_note(trimmed, buf);
    }

    let (kind, parts) = envelope(trimmed)?;
    if kind != "EVENT" {
        return Err(JsonError::UnknownMessage(kind.into_owned()));
    }
    match parts.as_slice() {
        [_, event] | [_, _, event] => parse_note(event.get(), buf),
        _ => Err(JsonError::Envelope("EVENT expects one event")),
    }
}

/// Renders `note` as a JSON event object.
pub fn note_to_json(note: &Note<'_>) -> Result<String, JsonError> {
    Ok(serde_json::to_string(&Event(*note))?)
}
