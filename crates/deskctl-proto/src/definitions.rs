// ── Protocol definitions ──
//
// The session engine never hard-codes message templates. Everything that
// touches the literal wire format goes through `MessageBuilder`, so a device
// firmware with a different envelope only needs a new implementation.
//
// `OperaDefinitions` is the implementation for the `<opera_message>` XML
// envelope the current device family speaks.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use strum::Display;

use crate::tables::{Hook, Key, KeyAction};

/// Version of the definitions shipped in this crate.
pub const DEFINITIONS_VERSION: u32 = 1;

/// Category of an unsolicited event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum EventCategory {
    Lamp,
    Call,
    Display,
    Key,
    Tone,
    KeyModule,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lamp => "lamp",
            Self::Call => "call",
            Self::Display => "display",
            Self::Key => "key",
            Self::Tone => "tone",
            Self::KeyModule => "key-module",
        }
    }
}

/// Requests understood by the device's instrumentation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiRequest<'a> {
    /// Register the system-test application with the admin credential.
    RegisterService { credential: &'a str },
    /// Take over control of the device.
    ControlMode,
    /// Subscribe to (or tear down) state indications.
    IndicateStates { subscribe: bool },
    KeepAlive,
    PushKey { key: Key, action: KeyAction },
    Hook(Hook),
    SpeechTransmit { start: bool },
    SpeechReceive { start: bool },
    GetCodec,
    GetSpeechResults,
}

/// Builds and inspects wire messages.
///
/// Implementations must be pure: no I/O, no interior state. The session
/// holds one behind an `Arc` and calls it from several tasks.
pub trait MessageBuilder: Send + Sync {
    /// Definitions version; checked against the engine's requirement when a
    /// session is created.
    fn version(&self) -> u32;

    /// Marker every message starts with.
    fn marker(&self) -> &str;

    /// Authentication request. Sent before any id-bearing exchange.
    fn auth_request(&self, credential: &str) -> String;

    fn is_auth_accepted(&self, reply: &str) -> bool;

    /// Correlation id carried by a reply, if any.
    fn request_id<'a>(&self, message: &'a str) -> Option<&'a str>;

    /// Payload segment of an unsolicited message.
    fn event_payload<'a>(&self, message: &'a str) -> Option<&'a str>;

    /// Classify a payload and strip its category prefix. Categories are
    /// tested in the order lamp, call, display, key, tone, key-module.
    fn classify<'a>(&self, payload: &'a str) -> Option<(EventCategory, &'a str)>;

    fn instrumentation(&self, req_id: &str, request: &TiRequest<'_>) -> String;

    fn ocms_get(&self, req_id: &str, item: &str) -> String;

    fn ocms_set(&self, req_id: &str, item: &str, value: &str) -> String;

    /// Extract a configuration value from an OCMS get reply.
    fn ocms_value(&self, reply: &str, item: &str) -> Option<String>;
}

// ── Opera envelope ───────────────────────────────────────────────────

const MARKER: &str = "<opera_message";

static REQUEST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"unique_req_id="([^"]+)"#).expect("valid request-id regex"));
static DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<data>([^<]+)").expect("valid data regex"));
static ITEM_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"itemValue>([^<]+)").expect("valid item-value regex"));

// Instrumentation opcodes (two hex digits each).
const TM_INIT_REQ: &str = "01";
const TM_CONNECTION_MODE_REQ: &str = "02";
const TM_INDICATE_STATES_REQ: &str = "03";
const TM_KEEP_ALIVE_REQ: &str = "04";
const TM_PUSHKEY_W_REQ: &str = "05";
const TM_SPEECH_TX_REQ: &str = "10";
const TM_SPEECH_RX_REQ: &str = "11";
const TM_GET_CODEC_REQ: &str = "12";
const TM_SPEECH_RESULTS_REQ: &str = "13";
const TM_APP_SYSTEMTEST: &str = "07";
const TM_INIT_NULL: &str = "00";
const TM_SUBSCRIPTIONS: &str = "3f";

// Unsolicited payload prefixes, in classification order.
const CATEGORY_PREFIXES: [(&str, EventCategory); 6] = [
    ("8101", EventCategory::Lamp),
    ("8102", EventCategory::Call),
    ("8103", EventCategory::Display),
    ("8104", EventCategory::Key),
    ("8105", EventCategory::Tone),
    ("8106", EventCategory::KeyModule),
];

/// Reference definitions for the `<opera_message>` envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperaDefinitions;

impl OperaDefinitions {
    pub fn new() -> Self {
        Self
    }

    fn envelope(req_id: &str, service: &str, body: &str) -> String {
        format!(
            r#"{MARKER} version="1.0" unique_req_id="{req_id}"><{service}>{body}</{service}></opera_message>"#
        )
    }

    /// `<opcode><app><null><args>` with arguments appended verbatim.
    fn ti_data(opcode: &str, args: &str) -> String {
        format!("{opcode}{TM_APP_SYSTEMTEST}{TM_INIT_NULL}{args}")
    }

    /// Length-prefixed hex blob: decimal byte count padded to two digits.
    fn length_prefixed(bytes: &[u8]) -> String {
        format!("{:02}{}", bytes.len(), hex::encode(bytes))
    }

    fn flag(start: bool) -> &'static str {
        if start { TM_INIT_REQ } else { TM_INIT_NULL }
    }
}

impl MessageBuilder for OperaDefinitions {
    fn version(&self) -> u32 {
        DEFINITIONS_VERSION
    }

    fn marker(&self) -> &str {
        MARKER
    }

    fn auth_request(&self, credential: &str) -> String {
        format!(
            r#"{MARKER} version="1.0"><authentication password="{}"/></opera_message>"#,
            escape_attr(credential)
        )
    }

    fn is_auth_accepted(&self, reply: &str) -> bool {
        reply.contains("Accepted")
    }

    fn request_id<'a>(&self, message: &'a str) -> Option<&'a str> {
        REQUEST_ID
            .captures(message)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn event_payload<'a>(&self, message: &'a str) -> Option<&'a str> {
        DATA.captures(message)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn classify<'a>(&self, payload: &'a str) -> Option<(EventCategory, &'a str)> {
        CATEGORY_PREFIXES.iter().find_map(|(prefix, category)| {
            payload.strip_prefix(*prefix).map(|rest| (*category, rest))
        })
    }

    fn instrumentation(&self, req_id: &str, request: &TiRequest<'_>) -> String {
        let data = match *request {
            TiRequest::RegisterService { credential } => {
                Self::ti_data(TM_INIT_REQ, &Self::length_prefixed(credential.as_bytes()))
            }
            TiRequest::ControlMode => Self::ti_data(
                TM_CONNECTION_MODE_REQ,
                &format!("{TM_INIT_REQ}{TM_INIT_NULL}"),
            ),
            TiRequest::IndicateStates { subscribe } => {
                let mask = if subscribe { TM_SUBSCRIPTIONS } else { TM_INIT_NULL };
                Self::ti_data(TM_INDICATE_STATES_REQ, &format!("{TM_INIT_REQ}{mask}"))
            }
            TiRequest::KeepAlive => Self::ti_data(TM_KEEP_ALIVE_REQ, TM_INIT_NULL),
            TiRequest::PushKey { key, action } => Self::ti_data(
                TM_PUSHKEY_W_REQ,
                &Self::length_prefixed(&[0x01, key.code(), action.code()]),
            ),
            TiRequest::Hook(hook) => Self::ti_data(
                TM_PUSHKEY_W_REQ,
                &Self::length_prefixed(&[0x01, Key::HookSwitch.code(), hook.code()]),
            ),
            TiRequest::SpeechTransmit { start } => {
                Self::ti_data(TM_SPEECH_TX_REQ, Self::flag(start))
            }
            TiRequest::SpeechReceive { start } => {
                Self::ti_data(TM_SPEECH_RX_REQ, Self::flag(start))
            }
            TiRequest::GetCodec => Self::ti_data(TM_GET_CODEC_REQ, TM_INIT_NULL),
            TiRequest::GetSpeechResults => Self::ti_data(TM_SPEECH_RESULTS_REQ, TM_INIT_NULL),
        };
        Self::envelope(req_id, "ti_request", &format!("<data>{data}</data>"))
    }

    fn ocms_get(&self, req_id: &str, item: &str) -> String {
        let body = format!(r#"<document><item name="{}"/></document>"#, escape_attr(item));
        Self::envelope(req_id, "ocms_get", &body)
    }

    fn ocms_set(&self, req_id: &str, item: &str, value: &str) -> String {
        let body = format!(
            r#"<document><item name="{}"><itemValue>{}</itemValue></item></document>"#,
            escape_attr(item),
            escape_text(value)
        );
        Self::envelope(req_id, "ocms_set", &body)
    }

    fn ocms_value(&self, reply: &str, item: &str) -> Option<String> {
        let needle = format!(r#"name="{item}""#);
        let start = reply.find(&needle)? + needle.len();
        let tail = &reply[start..];
        let section = &tail[..tail.rfind("document")?];
        ITEM_VALUE
            .captures(section)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
    }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c if c.is_control() => {
                let _ = write!(out, "&#{};", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn envelope_carries_request_id_and_payload() {
        let defs = OperaDefinitions::new();
        let msg = defs.instrumentation("7", &TiRequest::KeepAlive);

        assert!(msg.starts_with(MARKER));
        assert_eq!(defs.request_id(&msg), Some("7"));
        assert_eq!(defs.event_payload(&msg), Some("04070000"));
    }

    #[test]
    fn register_service_length_prefixes_credential() {
        let defs = OperaDefinitions::new();
        let msg = defs.instrumentation("1", &TiRequest::RegisterService { credential: "123456" });
        assert_eq!(defs.event_payload(&msg), Some("01070006313233343536"));
    }

    #[test]
    fn push_key_encodes_three_bytes() {
        let defs = OperaDefinitions::new();
        let msg = defs.instrumentation(
            "3",
            &TiRequest::PushKey {
                key: Key::NaviOk,
                action: KeyAction::Pressed,
            },
        );
        assert_eq!(defs.event_payload(&msg), Some("05070003012c01"));

        let hook = defs.instrumentation("4", &TiRequest::Hook(Hook::Off));
        assert_eq!(defs.event_payload(&hook), Some("05070003012d00"));
    }

    #[test]
    fn classification_strips_prefix_in_order() {
        let defs = OperaDefinitions::new();
        assert_eq!(
            defs.classify("810101020103"),
            Some((EventCategory::Lamp, "01020103"))
        );
        assert_eq!(
            defs.classify("8106aabb"),
            Some((EventCategory::KeyModule, "aabb"))
        );
        assert_eq!(defs.classify("9999"), None);
    }

    #[test]
    fn auth_reply_detection() {
        let defs = OperaDefinitions::new();
        assert!(defs.is_auth_accepted("<opera_message><status>Accepted</status></opera_message>"));
        assert!(!defs.is_auth_accepted("<opera_message><status>Rejected</status></opera_message>"));
        assert!(defs.auth_request("a\"b").contains("a&quot;b"));
        assert_eq!(defs.request_id(&defs.auth_request("x")), None);
    }

    #[test]
    fn ocms_value_reads_item_from_reply() {
        let defs = OperaDefinitions::new();
        let reply = r#"<opera_message unique_req_id="2"><ocms_get><document><item name="e164"><itemValue>1000</itemValue></item></document></ocms_get></opera_message>"#;
        assert_eq!(defs.ocms_value(reply, "e164"), Some("1000".to_owned()));
        assert_eq!(defs.ocms_value(reply, "software-version"), None);
    }

    #[test]
    fn ocms_set_embeds_value() {
        let defs = OperaDefinitions::new();
        let msg = defs.ocms_set("9", "e164", "1<2");
        assert!(msg.contains(r#"<item name="e164"><itemValue>1&lt;2</itemValue>"#));
        assert_eq!(defs.request_id(&msg), Some("9"));
    }
}
