// ── Derived phone state ──
//
// Everything the session knows about the device, rebuilt from the event
// stream. Only the session's reader task calls `apply`; everyone else
// reads through short-lived locks. Change suppression lives here: a lamp,
// call or tone record identical to the stored one produces no event.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::trace;

use deskctl_proto::reassembly::{Progress, Reassembler};
use deskctl_proto::structured::{self, Record, RecordVisitor};
use deskctl_proto::{
    CallRecord, Decoded, DeviceFamily, DeviceType, DisplayModel, KeyModuleModel, LampColour,
    LampMode, LampRecord, ToneRecord, ToneState,
};

use crate::event::{CallChange, LampChange, PhoneEvent};
use crate::family::{FamilyTraits, traits};

/// Software version reported when the device returns none.
pub const UNKNOWN_SOFTWARE_VERSION: &str = "V0 R0.0.0";

static LEGACY_INPUT_MODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([123AaBbCcHEX]{3})\)").expect("valid input-mode regex")
});
static MODERN_INPUT_MODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("ModeNumeric|ModeCapitalised|ModeLowercase|ModeCapital")
        .expect("valid input-mode token regex")
});
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid whitespace regex"));

const SELECTED_MARKER: &str = "selected:1";
const LIST_BOX_ITEM: &str = "OperaListBoxItem";

// ── Identity ─────────────────────────────────────────────────────────

/// Identity items fetched during instrumentation setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// Own phone number.
    pub e164: String,
    /// Raw `related-device-type` string.
    pub device_type_string: String,
    pub device_type: DeviceType,
    pub software_version: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            e164: String::new(),
            device_type_string: String::new(),
            device_type: DeviceType::None,
            software_version: UNKNOWN_SOFTWARE_VERSION.to_owned(),
        }
    }
}

impl DeviceIdentity {
    /// Build from raw configuration values. Runs of whitespace in the
    /// version collapse to one space.
    pub fn from_config(
        e164: Option<String>,
        device_type: Option<String>,
        software_version: Option<&str>,
    ) -> Self {
        let device_type_string = device_type.unwrap_or_default();
        let software_version = software_version
            .map(|v| WHITESPACE_RUN.replace_all(v, " ").into_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNKNOWN_SOFTWARE_VERSION.to_owned());
        Self {
            e164: e164.unwrap_or_default(),
            device_type: DeviceType::classify(&device_type_string),
            device_type_string,
            software_version,
        }
    }
}

// ── Derived scalars ──────────────────────────────────────────────────

/// Values extracted from the latest display parse. Each keeps its last
/// value until a later parse overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedScalars {
    pub selected_item: String,
    /// JSON of the last `Toast` object.
    pub last_toast: String,
    /// JSON of the last `PopupNotification` object.
    pub last_notification: String,
    pub remote_party: String,
    /// JSON of the last call-info object.
    pub call_info: String,
    /// Current text-input mode (`123`, `Abc`, `abc`, `ABC`, …).
    pub input_mode: String,
}

struct ScalarVisitor<'a> {
    modern: bool,
    scalars: &'a mut DerivedScalars,
}

impl RecordVisitor for ScalarVisitor<'_> {
    fn record(&mut self, record: Record<'_>) {
        if self.modern {
            if record.value.contains(SELECTED_MARKER) {
                self.scalars.selected_item =
                    record.value.replacen(SELECTED_MARKER, "", 1).trim().to_owned();
            }
            if MODERN_INPUT_MODE.is_match(record.value) {
                self.scalars.input_mode = match record.value {
                    "ModeCapitalised" => "Abc",
                    "ModeLowercase" => "abc",
                    "ModeCapital" => "ABC",
                    _ => "123",
                }
                .to_owned();
            }
        } else {
            if record.subitem == Some(LIST_BOX_ITEM) && record.key.contains("string0") {
                record.value.trim().clone_into(&mut self.scalars.selected_item);
            }
            if let Some(caps) = LEGACY_INPUT_MODE.captures(record.value) {
                caps[1].clone_into(&mut self.scalars.input_mode);
            }
        }
    }
}

// ── PhoneState ───────────────────────────────────────────────────────

/// Lamp state reported for a key that never sent one.
pub const UNLIT: (LampMode, LampColour) = (LampMode::LampOff, LampColour::NoColour);

#[derive(Debug, Clone)]
pub struct PhoneState {
    identity: DeviceIdentity,
    lamps: HashMap<i32, LampRecord>,
    calls: HashMap<String, IndexMap<String, String>>,
    tones: HashMap<u8, ToneState>,
    display: Arc<DisplayModel>,
    key_module: Arc<KeyModuleModel>,
    scalars: DerivedScalars,
    display_stream: Reassembler,
    key_module_stream: Reassembler,
    subscribed: bool,
    full_access: bool,
}

impl Default for PhoneState {
    fn default() -> Self {
        Self::new()
    }
}

impl PhoneState {
    pub fn new() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            lamps: HashMap::new(),
            calls: HashMap::new(),
            tones: HashMap::new(),
            display: Arc::new(DisplayModel::new()),
            key_module: Arc::new(KeyModuleModel::new()),
            scalars: DerivedScalars::default(),
            display_stream: Reassembler::new("display"),
            key_module_stream: Reassembler::new("key-module"),
            subscribed: false,
            full_access: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn family(&self) -> DeviceFamily {
        self.identity.device_type.family()
    }

    pub fn traits(&self) -> &'static FamilyTraits {
        traits(self.family())
    }

    pub fn default_colour(&self) -> LampColour {
        self.traits().default_colour
    }

    pub fn scalars(&self) -> &DerivedScalars {
        &self.scalars
    }

    pub fn display(&self) -> &Arc<DisplayModel> {
        &self.display
    }

    pub fn key_module(&self) -> &Arc<KeyModuleModel> {
        &self.key_module
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn has_full_access(&self) -> bool {
        self.full_access
    }

    /// Current lamp of `key` as raw codes, if one was ever reported.
    pub fn lamp(&self, key: i32) -> Option<LampRecord> {
        self.lamps.get(&key).copied()
    }

    /// Decoded lamp state of `key`; unknown keys are unlit. Codes outside
    /// the tables decode to `None`.
    pub fn lamp_state(&self, key: i32) -> (Option<LampMode>, Option<LampColour>) {
        self.lamps.get(&key).map_or((Some(UNLIT.0), Some(UNLIT.1)), |record| {
            (record.mode(), record.colour())
        })
    }

    /// Call states recorded for `device`, by call index.
    pub fn calls(&self, device: &str) -> Option<&IndexMap<String, String>> {
        self.calls.get(device)
    }

    /// Call states of the device's own number.
    pub fn own_calls(&self) -> Option<&IndexMap<String, String>> {
        self.calls(&self.identity.e164)
    }

    pub fn tone(&self, tone: u8) -> Option<ToneState> {
        self.tones.get(&tone).copied()
    }

    // ── Mutation ─────────────────────────────────────────────────

    pub(crate) fn set_identity(&mut self, identity: DeviceIdentity) {
        self.identity = identity;
    }

    /// Record that an unsolicited message arrived. Returns `true` the first
    /// time.
    pub(crate) fn mark_subscribed(&mut self) -> bool {
        !std::mem::replace(&mut self.subscribed, true)
    }

    /// Fold one decoded payload into the state, returning the events to
    /// publish.
    pub fn apply(&mut self, decoded: Decoded) -> Result<Vec<PhoneEvent>, deskctl_proto::Error> {
        let event = match decoded {
            Decoded::Lamp(record) => self.apply_lamp(record),
            Decoded::Call(record) => self.apply_call(record),
            Decoded::Key(record) => Some(PhoneEvent::Key(record)),
            Decoded::Tone(record) => self.apply_tone(record),
            Decoded::Display(fragment) => match self.display_stream.push(&fragment)? {
                Progress::Complete(text) => Some(self.apply_display(&text)),
                Progress::Pending | Progress::Unchanged => None,
            },
            Decoded::KeyModule(fragment) => match self.key_module_stream.push(&fragment)? {
                Progress::Complete(text) => {
                    self.key_module = Arc::new(structured::parse_key_module(&text));
                    Some(PhoneEvent::KeyModule(Arc::clone(&self.key_module)))
                }
                Progress::Pending | Progress::Unchanged => None,
            },
        };
        Ok(event.into_iter().collect())
    }

    fn apply_lamp(&mut self, record: LampRecord) -> Option<PhoneEvent> {
        if self.lamps.get(&record.key) == Some(&record) {
            trace!(key = record.key, "lamp unchanged");
            return None;
        }
        self.lamps.insert(record.key, record);
        Some(PhoneEvent::Lamp(LampChange {
            key: record.key,
            mode: record.mode(),
            colour: record.colour(),
        }))
    }

    fn apply_call(&mut self, record: CallRecord) -> Option<PhoneEvent> {
        let state = record
            .event()
            .map_or_else(|| format!("unknown({})", record.event_code), |e| e.to_string());
        let per_device = self.calls.entry(record.device.clone()).or_default();
        if per_device.get(&record.index) == Some(&state) {
            trace!(device = %record.device, index = %record.index, "call state unchanged");
            return None;
        }
        per_device.insert(record.index.clone(), state.clone());
        Some(PhoneEvent::Call(CallChange {
            device: record.device,
            index: record.index,
            state,
        }))
    }

    fn apply_tone(&mut self, record: ToneRecord) -> Option<PhoneEvent> {
        self.full_access = true;
        if self.tones.insert(record.tone, record.state) == Some(record.state) {
            return None;
        }
        Some(PhoneEvent::Tone(record))
    }

    fn apply_display(&mut self, text: &str) -> PhoneEvent {
        let modern = self.traits().modern_display;
        let mut visitor = ScalarVisitor {
            modern,
            scalars: &mut self.scalars,
        };
        let model = structured::parse_display(text, &mut visitor);

        if let Some(toast) = model.get("Toast") {
            self.scalars.last_toast = serde_json::to_string(toast).unwrap_or_default();
        }
        if let Some(popup) = model.get("PopupNotification") {
            self.scalars.last_notification = serde_json::to_string(popup).unwrap_or_default();
        }
        if modern {
            if let Some(contact) = model.get("ContactDetails") {
                self.scalars.call_info = serde_json::to_string(contact).unwrap_or_default();
                let mut remote = contact.field("string0").unwrap_or_default().to_owned();
                if let Some(number) = contact.field("string1") {
                    remote.push(' ');
                    remote.push_str(number);
                }
                self.scalars.remote_party = remote;
            }
        } else if let Some(popup) = model.get("PopupCall") {
            self.scalars.call_info = serde_json::to_string(popup).unwrap_or_default();
            popup
                .field("caption")
                .unwrap_or_default()
                .clone_into(&mut self.scalars.remote_party);
        }

        self.display = Arc::new(model);
        PhoneEvent::Display(Arc::clone(&self.display))
    }
}
