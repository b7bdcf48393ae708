// ── Event payload decoding ──
//
// Every unsolicited payload is hex text. After the category prefix has been
// stripped by the message builder, the remaining bytes have a fixed layout
// per category. Decoders here are stateless; change suppression and
// reassembly live with the state that needs them.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::definitions::EventCategory;
use crate::error::Error;
use crate::tables::{CallEvent, KeyEventKind, LampColour, LampMode, ToneState};

static CALL_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@@@([0-9]+)").expect("valid call-index regex"));

/// Call index used when the device id carries no `@@@<n>` suffix.
pub const DEFAULT_CALL_INDEX: &str = "1";

/// One decoded unsolicited payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Lamp(LampRecord),
    Call(CallRecord),
    Display(Fragment),
    Key(KeyRecord),
    Tone(ToneRecord),
    KeyModule(Fragment),
}

/// Raw lamp state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LampRecord {
    /// `(byte0 - 1) * 256 + byte1`.
    pub key: i32,
    pub mode: u8,
    pub colour: u8,
}

impl LampRecord {
    pub fn mode(&self) -> Option<LampMode> {
        LampMode::from_code(self.mode)
    }

    pub fn colour(&self) -> Option<LampColour> {
        LampColour::from_code(self.colour)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub device: String,
    pub index: String,
    pub event_code: u8,
}

impl CallRecord {
    pub fn event(&self) -> Option<CallEvent> {
        CallEvent::from_code(self.event_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyRecord {
    pub key: u8,
    pub event: KeyEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToneRecord {
    pub tone: u8,
    pub state: ToneState,
}

/// One piece of a multi-part display or key-module payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub current: u32,
    pub total: u32,
    /// Hex text of the content bytes, accumulated verbatim.
    pub content: String,
}

/// Decode a classified payload body.
///
/// Returns `Ok(None)` for payloads that are well-formed but carry nothing
/// to publish (unknown key event codes).
pub fn decode(category: EventCategory, body: &str) -> Result<Option<Decoded>, Error> {
    let bytes = hex::decode(body.trim())
        .map_err(|e| Error::decode(category.as_str(), format!("invalid hex: {e}")))?;

    let decoded = match category {
        EventCategory::Lamp => Some(Decoded::Lamp(lamp(&bytes)?)),
        EventCategory::Call => Some(Decoded::Call(call(&bytes)?)),
        EventCategory::Key => key(&bytes)?.map(Decoded::Key),
        EventCategory::Tone => Some(Decoded::Tone(tone(&bytes)?)),
        EventCategory::Display => Some(Decoded::Display(fragment(category, &bytes)?)),
        EventCategory::KeyModule => Some(Decoded::KeyModule(fragment(category, &bytes)?)),
    };
    Ok(decoded)
}

fn require(category: EventCategory, bytes: &[u8], len: usize) -> Result<(), Error> {
    if bytes.len() < len {
        debug!(
            category = category.as_str(),
            have = bytes.len(),
            need = len,
            "payload too short"
        );
        return Err(Error::decode(
            category.as_str(),
            format!("need {len} bytes, got {}", bytes.len()),
        ));
    }
    Ok(())
}

fn lamp(bytes: &[u8]) -> Result<LampRecord, Error> {
    require(EventCategory::Lamp, bytes, 4)?;
    Ok(LampRecord {
        key: (i32::from(bytes[0]) - 1) * 256 + i32::from(bytes[1]),
        mode: bytes[2],
        colour: bytes[3],
    })
}

fn call(bytes: &[u8]) -> Result<CallRecord, Error> {
    require(EventCategory::Call, bytes, 3)?;
    let mut device = String::from_utf8_lossy(&bytes[3..]).into_owned();

    let index = match CALL_INDEX.captures(&device) {
        Some(caps) => {
            let index = caps[1].to_owned();
            device = CALL_INDEX.replacen(&device, 1, "").into_owned();
            index
        }
        None => DEFAULT_CALL_INDEX.to_owned(),
    };

    Ok(CallRecord {
        device,
        index,
        event_code: bytes[1],
    })
}

fn key(bytes: &[u8]) -> Result<Option<KeyRecord>, Error> {
    require(EventCategory::Key, bytes, 3)?;
    Ok(KeyEventKind::from_code(bytes[2]).map(|event| KeyRecord {
        key: bytes[1],
        event,
    }))
}

fn tone(bytes: &[u8]) -> Result<ToneRecord, Error> {
    require(EventCategory::Tone, bytes, 2)?;
    Ok(ToneRecord {
        tone: bytes[0],
        state: ToneState::from_code(bytes[1]),
    })
}

/// Bytes 0-1 are a header, 2-3 the current index, 4-5 the total. The index
/// fields are read as the decimal number their hex digits spell.
fn fragment(category: EventCategory, bytes: &[u8]) -> Result<Fragment, Error> {
    require(category, bytes, 6)?;
    let counter = |slice: &[u8]| {
        hex::encode(slice)
            .parse::<u32>()
            .map_err(|e| Error::decode(category.as_str(), format!("bad sequence counter: {e}")))
    };
    Ok(Fragment {
        current: counter(&bytes[2..4])?,
        total: counter(&bytes[4..6])?,
        content: hex::encode(&bytes[6..]),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn lamp_payload_layout() {
        let decoded = decode(EventCategory::Lamp, "01020103").unwrap();
        let Some(Decoded::Lamp(lamp)) = decoded else {
            panic!("expected lamp, got {decoded:?}");
        };
        assert_eq!(lamp, LampRecord { key: 2, mode: 1, colour: 3 });
        assert_eq!(lamp.mode(), Some(LampMode::Flash));
        assert_eq!(lamp.colour(), Some(LampColour::White));

        let Some(Decoded::Lamp(first)) = decode(EventCategory::Lamp, "01010103").unwrap() else {
            panic!("expected lamp");
        };
        assert_eq!(first, LampRecord { key: 1, mode: 1, colour: 3 });
    }

    #[test]
    fn lamp_key_spans_two_bytes() {
        let Some(Decoded::Lamp(lamp)) = decode(EventCategory::Lamp, "02010002").unwrap() else {
            panic!("expected lamp");
        };
        assert_eq!(lamp.key, 257);
    }

    #[test]
    fn call_index_suffix_is_stripped() {
        let body = format!("0004ff{}", hex::encode("1000@@@2"));
        let Some(Decoded::Call(call)) = decode(EventCategory::Call, &body).unwrap() else {
            panic!("expected call");
        };
        assert_eq!(call.device, "1000");
        assert_eq!(call.index, "2");
        assert_eq!(call.event(), Some(CallEvent::Established));
    }

    #[test]
    fn call_without_suffix_uses_default_index() {
        let body = format!("0003ff{}", hex::encode("sip:1000"));
        let Some(Decoded::Call(call)) = decode(EventCategory::Call, &body).unwrap() else {
            panic!("expected call");
        };
        assert_eq!(call.device, "sip:1000");
        assert_eq!(call.index, DEFAULT_CALL_INDEX);
    }

    #[test]
    fn unknown_key_event_is_dropped() {
        assert_eq!(decode(EventCategory::Key, "002c03").unwrap(), None);
        assert_eq!(
            decode(EventCategory::Key, "002c04").unwrap(),
            Some(Decoded::Key(KeyRecord {
                key: 44,
                event: KeyEventKind::LongPush
            }))
        );
    }

    #[test]
    fn tone_state_is_binary() {
        assert_eq!(
            decode(EventCategory::Tone, "0502").unwrap(),
            Some(Decoded::Tone(ToneRecord {
                tone: 5,
                state: ToneState::On
            }))
        );
    }

    #[test]
    fn fragment_counters_read_as_decimal() {
        let Some(Decoded::Display(frag)) =
            decode(EventCategory::Display, "0000001000126869").unwrap()
        else {
            panic!("expected display fragment");
        };
        assert_eq!(frag.current, 10);
        assert_eq!(frag.total, 12);
        assert_eq!(frag.content, "6869");
    }

    #[test]
    fn short_payloads_are_decode_errors() {
        assert!(matches!(
            decode(EventCategory::Lamp, "0102"),
            Err(Error::Decode { category: "lamp", .. })
        ));
        assert!(decode(EventCategory::Display, "00000001").is_err());
        assert!(decode(EventCategory::Tone, "zz").is_err());
    }
}
