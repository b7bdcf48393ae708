// ── Per-family behaviour table ──
//
// Device models differ in how they render menus, signal calls and report
// input modes. All of those differences are captured here, keyed by
// `DeviceFamily`; nothing else in the crate branches on model names.

use deskctl_proto::{DeviceFamily, LampColour};

/// How a finished call is reported on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndedCallNotice {
    /// Popup notification reading `Ends: <number>`.
    Notification,
    /// Toast reading `Call with <number> ended`.
    Toast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyTraits {
    /// Colour a lit lamp shows when no colour is given explicitly.
    pub default_colour: LampColour,
    /// Display uses `selected:1` markers, `Mode*` input tokens and
    /// `ContactDetails`; otherwise list-box items, `(Abc)` tokens and
    /// `PopupCall`.
    pub modern_display: bool,
    /// Only the alert LED signals call progress (no loudspeaker/headset
    /// lamps).
    pub alert_led_only: bool,
    /// Menu entry selected while an incoming call rings.
    pub answer_label: &'static str,
    /// Menu entry selected during an active call.
    pub end_label: &'static str,
    /// A toast announces the held party.
    pub hold_toast: bool,
    pub ended_call: EndedCallNotice,
}

const BASIC: FamilyTraits = FamilyTraits {
    default_colour: LampColour::Green,
    modern_display: false,
    alert_led_only: true,
    answer_label: "Accept",
    end_label: "Disconnect",
    hold_toast: false,
    ended_call: EndedCallNotice::Notification,
};

const STANDARD: FamilyTraits = FamilyTraits {
    default_colour: LampColour::White,
    modern_display: false,
    alert_led_only: false,
    answer_label: "Answer",
    end_label: "End",
    hold_toast: false,
    ended_call: EndedCallNotice::Notification,
};

const ADVANCED: FamilyTraits = FamilyTraits {
    default_colour: LampColour::White,
    modern_display: true,
    alert_led_only: false,
    answer_label: "Answer",
    end_label: "End",
    hold_toast: true,
    ended_call: EndedCallNotice::Toast,
};

const UNKNOWN: FamilyTraits = FamilyTraits {
    default_colour: LampColour::NoColour,
    modern_display: false,
    alert_led_only: false,
    answer_label: "Answer",
    end_label: "End",
    hold_toast: false,
    ended_call: EndedCallNotice::Toast,
};

pub fn traits(family: DeviceFamily) -> &'static FamilyTraits {
    match family {
        DeviceFamily::Basic => &BASIC,
        DeviceFamily::Standard => &STANDARD,
        DeviceFamily::Advanced => &ADVANCED,
        DeviceFamily::Unknown => &UNKNOWN,
    }
}
