// ── Assertion layer ──
//
// Read-only comparisons of derived state against expectations. Checks
// return structured failures instead of erroring; the session publishes
// them on the event channel. Composite call-scenario checks run every
// primitive and collect all mismatches.

use std::fmt;

use regex::RegexBuilder;
use serde::Serialize;

use deskctl_proto::{Key, LampColour, LampMode};

use crate::family::EndedCallNotice;
use crate::state::PhoneState;

/// One unmet expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionFailure {
    pub assertion: &'static str,
    pub expected: String,
    pub current: String,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: current[{}] expected[{}]",
            self.assertion, self.current, self.expected
        )
    }
}

pub type Outcome = Result<(), AssertionFailure>;

fn fail(assertion: &'static str, expected: impl Into<String>, current: impl Into<String>) -> Outcome {
    Err(AssertionFailure {
        assertion,
        expected: expected.into(),
        current: current.into(),
    })
}

/// Regex search; an invalid pattern is matched literally.
fn matches(haystack: &str, pattern: &str, case_insensitive: bool) -> bool {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(case_insensitive)
                .build()
        });
    regex.is_ok_and(|re| re.is_match(haystack))
}

// ── Primitives ───────────────────────────────────────────────────────

/// Any call index of the device's own number is in one of `expected`
/// (case-insensitive).
pub fn call_state(state: &PhoneState, expected: &[&str]) -> Outcome {
    let current = state.own_calls();
    let hit = current.is_some_and(|calls| {
        calls
            .values()
            .any(|s| expected.iter().any(|e| s.eq_ignore_ascii_case(e)))
    });
    if hit {
        return Ok(());
    }
    let current = current.map_or_else(
        || "none".to_owned(),
        |calls| {
            calls
                .iter()
                .map(|(index, s)| format!("{index}:{s}"))
                .collect::<Vec<_>>()
                .join(",")
        },
    );
    fail("call_state", expected.join("|"), current)
}

pub fn selected_item(state: &PhoneState, pattern: &str) -> Outcome {
    let current = &state.scalars().selected_item;
    if matches(current, pattern, true) {
        Ok(())
    } else {
        fail("selected_item", pattern, current.as_str())
    }
}

pub fn toast(state: &PhoneState, pattern: &str) -> Outcome {
    let current = &state.scalars().last_toast;
    if matches(current, pattern, true) {
        Ok(())
    } else {
        fail("toast", pattern, current.as_str())
    }
}

pub fn notification(state: &PhoneState, pattern: &str) -> Outcome {
    let current = &state.scalars().last_notification;
    if matches(current, pattern, true) {
        Ok(())
    } else {
        fail("notification", pattern, current.as_str())
    }
}

/// Lamp of `key` shows `mode` in `colour` (the device's default colour
/// when `None`). Keys that never reported a lamp are unlit.
pub fn key_state(state: &PhoneState, key: Key, mode: LampMode, colour: Option<LampColour>) -> Outcome {
    let colour = colour.unwrap_or_else(|| state.default_colour());
    let (current_mode, current_colour) = state.lamp_state(i32::from(key.code()));
    if current_mode == Some(mode) && current_colour == Some(colour) {
        return Ok(());
    }
    let name = |v: Option<String>| v.unwrap_or_else(|| "UNKNOWN".to_owned());
    fail(
        "key_state",
        format!("{key}={mode},{colour}"),
        format!(
            "{key}={},{}",
            name(current_mode.map(|m| m.to_string())),
            name(current_colour.map(|c| c.to_string()))
        ),
    )
}

/// Remote-party display string matches `pattern` (case-sensitive).
pub fn remote_party_info(state: &PhoneState, pattern: &str) -> Outcome {
    let current = &state.scalars().remote_party;
    if matches(current, pattern, false) {
        Ok(())
    } else {
        fail("remote_party_info", pattern, current.as_str())
    }
}

// ── Composite scenarios ──────────────────────────────────────────────

/// Parameters of the call-scenario checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallExpectation {
    /// Audio runs over the loudspeaker.
    pub loudspeaker: bool,
    /// Audio runs over the headset.
    pub headset: bool,
    /// Pattern for the remote-party display string.
    pub remote_party_info: String,
    /// Number shown in hold and call-ended messages.
    pub remote_party_number: String,
}

/// Named call scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Scenario {
    Idle,
    Dialling,
    Consultation,
    Incoming,
    Outgoing,
    Connected,
    Hold,
    Held,
    EndedCallIdle,
}

struct Checks<'a> {
    state: &'a PhoneState,
    failures: Vec<AssertionFailure>,
}

impl<'a> Checks<'a> {
    fn new(state: &'a PhoneState) -> Self {
        Self {
            state,
            failures: Vec::new(),
        }
    }

    fn push(&mut self, outcome: Outcome) {
        if let Err(failure) = outcome {
            self.failures.push(failure);
        }
    }

    fn lamp(&mut self, key: Key, mode: LampMode, colour: Option<LampColour>) {
        let outcome = key_state(self.state, key, mode, colour);
        self.push(outcome);
    }

    fn unlit(&mut self, key: Key) {
        self.lamp(key, LampMode::LampOff, Some(LampColour::NoColour));
    }

    /// Loudspeaker and headset lamps steady when in use, unlit otherwise.
    fn audio_lamps(&mut self, expect: &CallExpectation) {
        for (key, in_use) in [(Key::Loudspeaker, expect.loudspeaker), (Key::Headset, expect.headset)] {
            if in_use {
                self.lamp(key, LampMode::Steady, None);
            } else {
                self.unlit(key);
            }
        }
    }

    fn selected(&mut self, pattern: &str) {
        let outcome = selected_item(self.state, pattern);
        self.push(outcome);
    }

    fn call(&mut self, expected: &[&str]) {
        let outcome = call_state(self.state, expected);
        self.push(outcome);
    }

    fn remote(&mut self, pattern: &str) {
        let outcome = remote_party_info(self.state, pattern);
        self.push(outcome);
    }

    fn toast(&mut self, pattern: &str) {
        let outcome = toast(self.state, pattern);
        self.push(outcome);
    }

    fn notification(&mut self, pattern: &str) {
        let outcome = notification(self.state, pattern);
        self.push(outcome);
    }
}

/// Run a composite scenario check; an empty result means it passed.
pub fn scenario(state: &PhoneState, scenario: Scenario, expect: &CallExpectation) -> Vec<AssertionFailure> {
    let traits = state.traits();
    let mut checks = Checks::new(state);

    match scenario {
        Scenario::Idle => {
            checks.unlit(Key::Loudspeaker);
            checks.unlit(Key::Headset);
            checks.call(&["connectionCleared"]);
        }
        Scenario::Dialling | Scenario::Consultation => {
            if !traits.alert_led_only {
                checks.audio_lamps(expect);
                if scenario == Scenario::Consultation && traits.hold_toast {
                    checks.toast(&format!("{} is now on hold", expect.remote_party_number));
                }
            }
            checks.lamp(Key::LedAlert, LampMode::Steady, None);
            checks.call(&["serviceInitiated"]);
        }
        Scenario::Incoming => {
            if !traits.alert_led_only {
                checks.lamp(Key::Loudspeaker, LampMode::Flash, None);
            }
            checks.lamp(Key::LedAlert, LampMode::Flash, None);
            if !traits.alert_led_only && expect.headset {
                checks.lamp(Key::Headset, LampMode::Flash, None);
            }
            checks.selected(traits.answer_label);
            checks.call(&["delivered"]);
            checks.remote(&expect.remote_party_info);
        }
        Scenario::Outgoing | Scenario::Connected => {
            if !traits.alert_led_only {
                checks.audio_lamps(expect);
            }
            checks.lamp(Key::LedAlert, LampMode::Steady, None);
            checks.selected(traits.end_label);
            if scenario == Scenario::Outgoing {
                checks.call(&["delivered"]);
            } else {
                checks.call(&["established", "retrieved", "conferenced"]);
            }
            checks.remote(&expect.remote_party_info);
        }
        Scenario::Hold => {
            if traits.alert_led_only {
                checks.unlit(Key::LedAlert);
            } else {
                checks.audio_lamps(expect);
                if traits.hold_toast {
                    checks.toast(&format!("{} is now on hold", expect.remote_party_number));
                }
                checks.lamp(Key::LedAlert, LampMode::Steady, Some(LampColour::Yellow));
            }
            checks.selected(traits.end_label);
            checks.call(&["held"]);
        }
        Scenario::Held => {
            if !traits.alert_led_only {
                checks.audio_lamps(expect);
            }
            checks.lamp(Key::LedAlert, LampMode::Steady, None);
            checks.selected(traits.end_label);
            checks.call(&["held"]);
        }
        Scenario::EndedCallIdle => {
            checks.unlit(Key::Loudspeaker);
            checks.unlit(Key::Headset);
            checks.unlit(Key::LedAlert);
            checks.call(&["connectionCleared"]);
            match traits.ended_call {
                EndedCallNotice::Notification => {
                    checks.notification(&format!("Ends: {}", expect.remote_party_number));
                }
                EndedCallNotice::Toast => {
                    checks.toast(&format!("Call with {} ended", expect.remote_party_number));
                }
            }
        }
    }

    checks.failures
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use deskctl_proto::{CallRecord, Decoded, Fragment, LampRecord};

    use super::*;
    use crate::state::DeviceIdentity;

    fn device(kind: &str) -> PhoneState {
        let mut state = PhoneState::new();
        state.set_identity(DeviceIdentity::from_config(
            Some("1000".into()),
            Some(kind.into()),
            None,
        ));
        state
    }

    fn lamp(state: &mut PhoneState, key: Key, mode: u8, colour: u8) {
        state
            .apply(Decoded::Lamp(LampRecord {
                key: i32::from(key.code()),
                mode,
                colour,
            }))
            .unwrap();
    }

    fn call(state: &mut PhoneState, device: &str, index: &str, code: u8) {
        state
            .apply(Decoded::Call(CallRecord {
                device: device.into(),
                index: index.into(),
                event_code: code,
            }))
            .unwrap();
    }

    fn show(state: &mut PhoneState, text: &str) {
        state
            .apply(Decoded::Display(Fragment {
                current: 1,
                total: 1,
                content: hex::encode(text),
            }))
            .unwrap();
    }

    #[test]
    fn call_state_matches_any_index_case_insensitively() {
        let mut state = device("CP400");
        call(&mut state, "1000", "1", 4);
        call(&mut state, "1000", "2", 5);
        call(&mut state, "2000", "1", 3);

        assert!(call_state(&state, &["HELD"]).is_ok());
        assert!(call_state(&state, &["delivered", "established"]).is_ok());

        let failure = call_state(&state, &["delivered"]).unwrap_err();
        assert_eq!(failure.assertion, "call_state");
        assert_eq!(failure.current, "1:established,2:held");
    }

    #[test]
    fn call_state_without_calls_fails() {
        let state = device("CP400");
        assert_eq!(call_state(&state, &["connectionCleared"]).unwrap_err().current, "none");
    }

    #[test]
    fn key_state_uses_family_default_colour() {
        let mut basic = device("CP100");
        lamp(&mut basic, Key::LedAlert, 0, 1);
        assert!(key_state(&basic, Key::LedAlert, LampMode::Steady, None).is_ok());

        let mut advanced = device("CP700");
        lamp(&mut advanced, Key::LedAlert, 0, 1);
        assert!(key_state(&advanced, Key::LedAlert, LampMode::Steady, None).is_err());
        assert!(
            key_state(&advanced, Key::LedAlert, LampMode::Steady, Some(LampColour::Green)).is_ok()
        );
    }

    #[test]
    fn unknown_key_is_unlit() {
        let state = device("CP400");
        assert!(key_state(&state, Key::Headset, LampMode::LampOff, Some(LampColour::NoColour)).is_ok());
        let failure = key_state(&state, Key::Headset, LampMode::Steady, None).unwrap_err();
        assert_eq!(failure.current, "headset=LAMP_OFF,NO_COLOUR");
    }

    #[test]
    fn text_assertions_are_pattern_matches() {
        let mut state = device("CP400");
        show(
            &mut state,
            "object:\nname:Toast\ncaption:Call with 2000 ended\nend:\nobject:\nname:ContactDetails\nstring0:Alice\nstring1:2000\nend:\nobject:\nname:Menu\nitem:End selected:1\nend:\n",
        );

        assert!(toast(&state, "call with 2000 ENDED").is_ok());
        assert!(selected_item(&state, "^end$").is_ok());
        assert!(remote_party_info(&state, "Alice 2\\d+").is_ok());
        assert!(remote_party_info(&state, "alice").is_err());
        // Invalid regex falls back to a literal match.
        assert!(toast(&state, "(2000").is_err());
        assert!(notification(&state, "Ends").is_err());
    }

    #[test]
    fn idle_scenario_passes_on_cleared_call() {
        let mut state = device("CP400");
        call(&mut state, "1000", "1", 0);
        assert!(scenario(&state, Scenario::Idle, &CallExpectation::default()).is_empty());
    }

    #[test]
    fn incoming_scenario_uses_family_labels() {
        let mut basic = device("CP110");
        lamp(&mut basic, Key::LedAlert, 1, 1);
        call(&mut basic, "1000", "1", 3);
        show(
            &mut basic,
            "object:\nname:List\nsubitem:\nname:OperaListBoxItem\nstring0:Accept\nendsubitem:\nend:\nobject:\nname:PopupCall\ncaption:Bob\nend:\n",
        );
        let expect = CallExpectation {
            remote_party_info: "Bob".into(),
            ..CallExpectation::default()
        };
        assert_eq!(scenario(&basic, Scenario::Incoming, &expect), vec![]);

        // An advanced device also needs the loudspeaker flashing and "Answer".
        let mut advanced = device("CP400");
        lamp(&mut advanced, Key::LedAlert, 1, 3);
        call(&mut advanced, "1000", "1", 3);
        let failures = scenario(&advanced, Scenario::Incoming, &CallExpectation::default());
        let names: Vec<_> = failures.iter().map(|f| f.assertion).collect();
        assert_eq!(names, vec!["key_state", "selected_item"]);
    }

    #[test]
    fn ended_call_notice_depends_on_family() {
        let expect = CallExpectation {
            remote_party_number: "2000".into(),
            ..CallExpectation::default()
        };

        let mut standard = device("CP205");
        call(&mut standard, "1000", "1", 0);
        show(&mut standard, "object:\nname:PopupNotification\ntext:Ends: 2000\nend:\n");
        assert!(scenario(&standard, Scenario::EndedCallIdle, &expect).is_empty());

        let mut advanced = device("CP600");
        call(&mut advanced, "1000", "1", 0);
        show(&mut advanced, "object:\nname:PopupNotification\ntext:Ends: 2000\nend:\n");
        let failures = scenario(&advanced, Scenario::EndedCallIdle, &expect);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].assertion, "toast");
    }

    #[test]
    fn scenario_names_parse() {
        assert_eq!("ended-call-idle".parse::<Scenario>().unwrap(), Scenario::EndedCallIdle);
        assert_eq!(Scenario::Consultation.to_string(), "consultation");
    }
}
