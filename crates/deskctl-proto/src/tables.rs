// ── Codec tables ──
//
// Pure lookups shared by the decoder and the command surface: logical key
// codes, lamp/call/tone enumerations, device-type classification, and the
// multi-tap keypad tables used for text entry.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

// ── Keys ─────────────────────────────────────────────────────────────

/// Logical key ids understood by the instrumentation push-key request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum Key {
    #[strum(serialize = "0")]
    Digit0,
    #[strum(serialize = "1")]
    Digit1,
    #[strum(serialize = "2")]
    Digit2,
    #[strum(serialize = "3")]
    Digit3,
    #[strum(serialize = "4")]
    Digit4,
    #[strum(serialize = "5")]
    Digit5,
    #[strum(serialize = "6")]
    Digit6,
    #[strum(serialize = "7")]
    Digit7,
    #[strum(serialize = "8")]
    Digit8,
    #[strum(serialize = "9")]
    Digit9,
    #[strum(serialize = "*", serialize = "asterisk")]
    Asterisk,
    #[strum(serialize = "#", serialize = "hash")]
    Hash,
    Messages,
    Menu,
    Presence,
    Forward,
    Feature,
    Loudspeaker,
    Headset,
    Mute,
    Minus,
    Plus,
    Hold,
    NaviUp,
    NaviDown,
    NaviLeft,
    NaviRight,
    NaviOk,
    HookSwitch,
    Soft1,
    Soft2,
    Soft3,
    Soft4,
    Soft5,
    Soft6,
    LedAlert,
    SocketHeadset,
    ComboRestart,
    ComboReset,
    ComboAdmin,
}

impl Key {
    /// Wire code of the key.
    pub fn code(self) -> u8 {
        match self {
            Self::Digit0 => 0,
            Self::Digit1 => 1,
            Self::Digit2 => 2,
            Self::Digit3 => 3,
            Self::Digit4 => 4,
            Self::Digit5 => 5,
            Self::Digit6 => 6,
            Self::Digit7 => 7,
            Self::Digit8 => 8,
            Self::Digit9 => 9,
            Self::Asterisk => 10,
            Self::Hash => 11,
            Self::Messages => 23,
            Self::Menu => 24,
            Self::Presence => 26,
            Self::Forward => 31,
            Self::Feature => 32,
            Self::Loudspeaker => 33,
            Self::Headset => 34,
            Self::Mute => 35,
            Self::Minus => 36,
            Self::Plus => 37,
            Self::Hold => 39,
            Self::NaviUp => 40,
            Self::NaviDown => 41,
            Self::NaviLeft => 42,
            Self::NaviRight => 43,
            Self::NaviOk => 44,
            Self::HookSwitch => 45,
            Self::Soft1 => 48,
            Self::Soft2 => 49,
            Self::Soft3 => 50,
            Self::Soft4 => 51,
            Self::Soft5 => 52,
            Self::Soft6 => 53,
            Self::LedAlert => 65,
            Self::SocketHeadset => 67,
            Self::ComboRestart => 71,
            Self::ComboReset => 73,
            Self::ComboAdmin => 74,
        }
    }

    /// Keypad key for a dial-string character (`0`–`9`, `*`, `#`).
    pub fn from_dial_char(c: char) -> Option<Self> {
        Some(match c {
            '0' => Self::Digit0,
            '1' => Self::Digit1,
            '2' => Self::Digit2,
            '3' => Self::Digit3,
            '4' => Self::Digit4,
            '5' => Self::Digit5,
            '6' => Self::Digit6,
            '7' => Self::Digit7,
            '8' => Self::Digit8,
            '9' => Self::Digit9,
            '*' => Self::Asterisk,
            '#' => Self::Hash,
            _ => return None,
        })
    }
}

/// Action byte of a push-key request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Released,
    Pressed,
    Pushed,
    LongPush,
}

impl KeyAction {
    pub fn code(self) -> u8 {
        match self {
            Self::Released => 0,
            Self::Pressed => 1,
            Self::Pushed => 2,
            Self::LongPush => 4,
        }
    }
}

/// Hook-switch position. Sent through the push-key request on
/// [`Key::HookSwitch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Off,
    On,
}

impl Hook {
    pub fn code(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }
}

/// Key event kinds reported by the device. Other codes are not events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyEventKind {
    #[strum(serialize = "EVT_KEY_RELEASED")]
    #[serde(rename = "EVT_KEY_RELEASED")]
    Released,
    #[strum(serialize = "EVT_KEY_PRESSED")]
    #[serde(rename = "EVT_KEY_PRESSED")]
    Pressed,
    #[strum(serialize = "EVT_KEY_LONGPUSH")]
    #[serde(rename = "EVT_KEY_LONGPUSH")]
    LongPush,
}

impl KeyEventKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Released),
            1 => Some(Self::Pressed),
            4 => Some(Self::LongPush),
            _ => None,
        }
    }
}

// ── Lamps ────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LampMode {
    Steady,
    Flash,
    LampOff,
    Wink,
    Flutter,
}

impl LampMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Steady),
            1 => Some(Self::Flash),
            2 => Some(Self::LampOff),
            3 => Some(Self::Wink),
            4 => Some(Self::Flutter),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LampColour {
    NoColour,
    Green,
    Red,
    White,
    Yellow,
    Blue,
}

impl LampColour {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NoColour),
            1 => Some(Self::Green),
            2 => Some(Self::Red),
            3 => Some(Self::White),
            4 => Some(Self::Yellow),
            5 => Some(Self::Blue),
            _ => None,
        }
    }
}

// ── Calls ────────────────────────────────────────────────────────────

/// Call-progress event types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum CallEvent {
    ConnectionCleared,
    ServiceInitiated,
    Originated,
    Delivered,
    Established,
    Held,
    Retrieved,
    Conferenced,
    Transferred,
    Diverted,
    Failed,
    Queued,
}

impl CallEvent {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::ConnectionCleared),
            1 => Some(Self::ServiceInitiated),
            2 => Some(Self::Originated),
            3 => Some(Self::Delivered),
            4 => Some(Self::Established),
            5 => Some(Self::Held),
            6 => Some(Self::Retrieved),
            7 => Some(Self::Conferenced),
            8 => Some(Self::Transferred),
            9 => Some(Self::Diverted),
            10 => Some(Self::Failed),
            11 => Some(Self::Queued),
            _ => None,
        }
    }
}

// ── Tones ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ToneState {
    Off,
    On,
}

impl ToneState {
    pub fn from_code(code: u8) -> Self {
        if code == 0 { Self::Off } else { Self::On }
    }
}

// ── Device types ─────────────────────────────────────────────────────

/// Device model, ordered by generation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    #[default]
    None,
    Cp100,
    Cp110,
    Cp200,
    Cp205,
    Cp210,
    Cp400,
    Cp410,
    Cp600,
    Cp700,
    Cp710,
}

impl DeviceType {
    /// Classify the `related-device-type` configuration string.
    ///
    /// This is the only place device identity is string-matched; everything
    /// downstream branches on [`DeviceFamily`].
    pub fn classify(raw: &str) -> Self {
        const MODELS: [(&str, DeviceType); 10] = [
            ("CP100", DeviceType::Cp100),
            ("CP110", DeviceType::Cp110),
            ("CP200", DeviceType::Cp200),
            ("CP205", DeviceType::Cp205),
            ("CP210", DeviceType::Cp210),
            ("CP400", DeviceType::Cp400),
            ("CP410", DeviceType::Cp410),
            ("CP600", DeviceType::Cp600),
            ("CP700", DeviceType::Cp700),
            ("CP710", DeviceType::Cp710),
        ];
        MODELS
            .iter()
            .find(|(needle, _)| raw.contains(needle))
            .map_or(Self::None, |(_, device)| *device)
    }

    pub fn family(self) -> DeviceFamily {
        match self {
            Self::None => DeviceFamily::Unknown,
            Self::Cp100 | Self::Cp110 => DeviceFamily::Basic,
            Self::Cp200 | Self::Cp205 | Self::Cp210 => DeviceFamily::Standard,
            Self::Cp400 | Self::Cp410 | Self::Cp600 | Self::Cp700 | Self::Cp710 => {
                DeviceFamily::Advanced
            }
        }
    }
}

/// Behavioural family of a device model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    /// Not yet classified.
    #[default]
    Unknown,
    /// CP100 / CP110: single alert LED, list-box menus.
    Basic,
    /// CP200 / CP205 / CP210.
    Standard,
    /// CP400 and newer: `selected:1` markers, toasts, named input modes.
    Advanced,
}

// ── Keypad text-entry tables ─────────────────────────────────────────

/// Multi-tap sequence for a lower-case letter (`a` → `"2"`, `s` → `"7777"`).
pub fn letter_taps(c: char) -> Option<&'static str> {
    Some(match c {
        'a' => "2",
        'b' => "22",
        'c' => "222",
        'd' => "3",
        'e' => "33",
        'f' => "333",
        'g' => "4",
        'h' => "44",
        'i' => "444",
        'j' => "5",
        'k' => "55",
        'l' => "555",
        'm' => "6",
        'n' => "66",
        'o' => "666",
        'p' => "7",
        'q' => "77",
        'r' => "777",
        's' => "7777",
        't' => "8",
        'u' => "88",
        'v' => "888",
        'w' => "9",
        'x' => "99",
        'y' => "999",
        'z' => "9999",
        _ => return None,
    })
}

/// Multi-tap sequence for a punctuation character, entered in lower-case
/// mode on the `1` and `*` keys.
pub fn special_taps(c: char) -> Option<&'static str> {
    Some(match c {
        ' ' => "11",
        ';' => "111",
        '=' => "1111",
        '$' => "11111",
        '\\' => "111111",
        '&' => "1111111",
        '[' => "11111111",
        ']' => "111111111",
        '{' => "1111111111",
        '}' => "11111111111",
        '%' => "111111111111",
        '.' => "*",
        '*' => "**",
        '#' => "***",
        ',' => "****",
        '?' => "*****",
        '!' => "******",
        '\'' => "*******",
        '"' => "********",
        '+' => "*********",
        '-' => "**********",
        '(' => "***********",
        ')' => "************",
        '@' => "*************",
        '/' => "**************",
        ':' => "***************",
        '_' => "****************",
        _ => return None,
    })
}
