// ── Keypad text entry ──
//
// Text is typed on the numeric keypad with multi-tap. Each character needs
// the right input mode first, then a run of key taps. Planning is pure;
// `Session::write` executes the plan.

use deskctl_proto::tables::{letter_taps, special_taps};

pub const MODE_NUMERIC: &str = "123";
pub const MODE_LOWER: &str = "abc";
pub const MODE_CAPITALISED: &str = "Abc";

/// Most `#` presses spent cycling to a target input mode.
pub const MAX_MODE_PRESSES: usize = 6;

/// What to do for one character of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Switch to `mode`, then dial `taps` (keypad characters).
    Tap { mode: &'static str, taps: String },
    /// No keypad mapping; only the inter-character pause applies.
    Skip(char),
}

/// Plan the key sequence for `text`, one step per character.
pub fn plan(text: &str) -> Vec<Step> {
    text.chars().map(step).collect()
}

fn step(c: char) -> Step {
    if c.is_ascii_digit() {
        return Step::Tap {
            mode: MODE_NUMERIC,
            taps: c.to_string(),
        };
    }

    let lower = c.to_lowercase().next().unwrap_or(c);
    if let Some(taps) = special_taps(lower) {
        return Step::Tap {
            mode: MODE_LOWER,
            taps: taps.to_owned(),
        };
    }
    if let Some(taps) = letter_taps(lower) {
        let mode = if c.is_uppercase() {
            MODE_CAPITALISED
        } else {
            MODE_LOWER
        };
        return Step::Tap {
            mode,
            taps: taps.to_owned(),
        };
    }
    Step::Skip(c)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tap(mode: &'static str, taps: &str) -> Step {
        Step::Tap {
            mode,
            taps: taps.to_owned(),
        }
    }

    #[test]
    fn mixed_case_and_digits() {
        assert_eq!(
            plan("Ab3"),
            vec![
                tap(MODE_CAPITALISED, "2"),
                tap(MODE_LOWER, "22"),
                tap(MODE_NUMERIC, "3"),
            ]
        );
    }

    #[test]
    fn punctuation_uses_lower_case_mode() {
        assert_eq!(plan(" ."), vec![tap(MODE_LOWER, "11"), tap(MODE_LOWER, "*")]);
        assert_eq!(plan("#"), vec![tap(MODE_LOWER, "***")]);
    }

    #[test]
    fn unmapped_characters_are_skipped() {
        assert_eq!(plan("é~"), vec![Step::Skip('é'), Step::Skip('~')]);
    }

    #[test]
    fn upper_case_letters_take_lower_case_taps() {
        assert_eq!(plan("S"), vec![tap(MODE_CAPITALISED, "7777")]);
    }
}
