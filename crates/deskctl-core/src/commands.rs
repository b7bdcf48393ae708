// ── Command surface ──
//
// Everything a test script does to a connected device: key presses,
// dialing, text entry, menu navigation, configuration items, speech-path
// control, key combos and state assertions. Every command fails with
// `CoreError::NotConnected` outside a session.

use std::time::Duration;

use indexmap::IndexMap;
use regex::Regex;
use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use deskctl_proto::{DeviceType, Hook, Key, KeyAction, LampColour, LampMode, TiRequest};

use crate::assertions::{self, AssertionFailure, CallExpectation, Outcome, Scenario};
use crate::error::CoreError;
use crate::event::PhoneEvent;
use crate::session::Session;
use crate::text_entry::{self, MAX_MODE_PRESSES, Step};

/// Digit sequence accepted by the factory-reset combo.
const FACTORY_RESET_CODE: &str = "124816";

impl Session {
    // ── Hook and keys ────────────────────────────────────────────

    pub async fn hook_off(&self) -> Result<(), CoreError> {
        self.ensure_connected()?;
        debug!("hook off");
        self.inner.ti(&TiRequest::Hook(Hook::Off)).await?;
        Ok(())
    }

    pub async fn hook_on(&self) -> Result<(), CoreError> {
        self.ensure_connected()?;
        debug!("hook on");
        self.inner.ti(&TiRequest::Hook(Hook::On)).await?;
        Ok(())
    }

    /// Press `key` without releasing it.
    pub async fn key_press(&self, key: Key) -> Result<(), CoreError> {
        self.push_key(key, KeyAction::Pressed).await
    }

    pub async fn key_release(&self, key: Key) -> Result<(), CoreError> {
        self.push_key(key, KeyAction::Released).await
    }

    async fn push_key(&self, key: Key, action: KeyAction) -> Result<(), CoreError> {
        self.ensure_connected()?;
        debug!(%key, ?action, "push key");
        self.inner.ti(&TiRequest::PushKey { key, action }).await?;
        Ok(())
    }

    /// Press, hold for the key-press delay, release, pause.
    pub async fn normal_key_press(&self, key: Key) -> Result<(), CoreError> {
        let delay = self.inner.config.key_press_delay;
        self.timed_press(key, delay).await
    }

    /// Press, hold for the long-press duration, release, pause.
    pub async fn long_key_press(&self, key: Key) -> Result<(), CoreError> {
        let hold = self.inner.config.long_press_hold;
        self.timed_press(key, hold).await
    }

    async fn timed_press(&self, key: Key, hold: Duration) -> Result<(), CoreError> {
        self.key_press(key).await?;
        tokio::time::sleep(hold).await;
        self.key_release(key).await?;
        tokio::time::sleep(self.inner.config.key_press_delay).await;
        Ok(())
    }

    pub async fn up(&self) -> Result<(), CoreError> {
        self.normal_key_press(Key::NaviUp).await
    }

    pub async fn down(&self) -> Result<(), CoreError> {
        self.normal_key_press(Key::NaviDown).await
    }

    pub async fn left(&self) -> Result<(), CoreError> {
        self.normal_key_press(Key::NaviLeft).await
    }

    pub async fn right(&self) -> Result<(), CoreError> {
        self.normal_key_press(Key::NaviRight).await
    }

    pub async fn ok(&self) -> Result<(), CoreError> {
        self.normal_key_press(Key::NaviOk).await
    }

    // ── Dialing and text entry ───────────────────────────────────

    /// Press the keypad key for every character of `digits`. Characters
    /// other than `0`-`9`, `*` and `#` are skipped.
    pub async fn dial(&self, digits: &str) -> Result<(), CoreError> {
        self.ensure_connected()?;
        info!(digits, "dial");
        for c in digits.chars() {
            match Key::from_dial_char(c) {
                Some(key) => self.normal_key_press(key).await?,
                None => debug!(character = %c, "not a keypad character"),
            }
        }
        Ok(())
    }

    /// Type `text` with keypad multi-tap, switching input modes as needed.
    pub async fn write(&self, text: &str) -> Result<(), CoreError> {
        self.ensure_connected()?;
        info!(text, "write");
        for step in text_entry::plan(text) {
            match step {
                Step::Tap { mode, taps } => {
                    self.set_input_mode(mode).await?;
                    self.dial(&taps).await?;
                }
                Step::Skip(c) => debug!(character = %c, "no keypad mapping"),
            }
            tokio::time::sleep(self.inner.config.character_delay).await;
        }
        Ok(())
    }

    /// Cycle the input mode with `#` until the display reports `mode`.
    ///
    /// Returns `false` when the mode never showed up.
    pub async fn set_input_mode(&self, mode: &str) -> Result<bool, CoreError> {
        for _ in 0..MAX_MODE_PRESSES {
            if self.with_state(|s| s.scalars().input_mode == mode) {
                return Ok(true);
            }
            self.normal_key_press(Key::Hash).await?;
        }
        let current = self.with_state(|s| s.scalars().input_mode.clone());
        if current == mode {
            return Ok(true);
        }
        warn!(
            expected = mode,
            current = %current,
            presses = MAX_MODE_PRESSES,
            "input mode not reached"
        );
        Ok(false)
    }

    /// Scroll a menu until the selected item matches one of `targets`.
    ///
    /// Jumps to the top with a long up press, then moves down. Returns
    /// `false` once the selection stops moving without a match.
    pub async fn scroll_until(&self, targets: &[&str]) -> Result<bool, CoreError> {
        self.ensure_connected()?;
        let patterns: Vec<_> = targets
            .iter()
            .map(|t| Regex::new(t).or_else(|_| Regex::new(&regex::escape(t))))
            .collect::<Result<_, _>>()
            .map_err(|e| CoreError::Internal(format!("invalid scroll target: {e}")))?;

        self.long_key_press(Key::NaviUp).await?;
        let mut current = self.selected_item();
        loop {
            if patterns.iter().any(|p| p.is_match(&current)) {
                return Ok(true);
            }
            let last = current;
            self.down().await?;
            current = self.selected_item();
            debug!(current = %current, last = %last, "scrolled");
            if current == last {
                self.report(vec![AssertionFailure {
                    assertion: "scroll_until",
                    expected: targets.join("|"),
                    current,
                }]);
                return Ok(false);
            }
        }
    }

    pub async fn sleep(&self, duration: Duration) {
        debug!(
            address = %self.inner.config.address,
            ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "sleep"
        );
        tokio::time::sleep(duration).await;
    }

    // ── Configuration items ──────────────────────────────────────

    /// Write configuration items, pausing between items.
    pub async fn set_config(&self, items: &[(&str, &str)]) -> Result<(), CoreError> {
        self.ensure_connected()?;
        info!(items = items.len(), "set config");
        self.inner.set_config(items).await
    }

    /// Read configuration items. Items the device returns no value for are
    /// absent from the result.
    pub async fn get_config(&self, items: &[&str]) -> Result<IndexMap<String, String>, CoreError> {
        self.ensure_connected()?;
        info!(items = items.len(), "get config");
        self.inner.get_config(items).await
    }

    // ── Identity ─────────────────────────────────────────────────

    pub fn phone_number(&self) -> String {
        self.with_state(|s| s.identity().e164.clone())
    }

    pub fn selected_item(&self) -> String {
        self.with_state(|s| s.scalars().selected_item.clone())
    }

    pub fn device_type(&self) -> DeviceType {
        self.with_state(|s| s.identity().device_type)
    }

    // ── Speech path ──────────────────────────────────────────────

    fn require_full_access(&self, operation: &'static str) -> Result<(), CoreError> {
        self.ensure_connected()?;
        if self.with_state(|s| s.has_full_access()) {
            Ok(())
        } else {
            Err(CoreError::FullAccessRequired { operation })
        }
    }

    pub async fn start_speech_transmit(&self) -> Result<String, CoreError> {
        self.require_full_access("start_speech_transmit")?;
        self.inner.ti(&TiRequest::SpeechTransmit { start: true }).await
    }

    pub async fn stop_speech_transmit(&self) -> Result<String, CoreError> {
        self.require_full_access("stop_speech_transmit")?;
        self.inner.ti(&TiRequest::SpeechTransmit { start: false }).await
    }

    pub async fn start_speech_receive(&self) -> Result<String, CoreError> {
        self.require_full_access("start_speech_receive")?;
        self.inner.ti(&TiRequest::SpeechReceive { start: true }).await
    }

    pub async fn stop_speech_receive(&self) -> Result<String, CoreError> {
        self.require_full_access("stop_speech_receive")?;
        self.inner.ti(&TiRequest::SpeechReceive { start: false }).await
    }

    /// Raw reply to the codec query.
    pub async fn get_codec(&self) -> Result<String, CoreError> {
        self.require_full_access("get_codec")?;
        self.inner.ti(&TiRequest::GetCodec).await
    }

    /// Raw reply to the speech-path results query.
    pub async fn get_speech_results(&self) -> Result<String, CoreError> {
        self.require_full_access("get_speech_results")?;
        self.inner.ti(&TiRequest::GetSpeechResults).await
    }

    // ── Key combos ───────────────────────────────────────────────

    /// Restart the device through the restart combo. The session is closed
    /// afterwards.
    pub async fn restart(&self) -> Result<(), CoreError> {
        info!("restart");
        self.key_press(Key::ComboRestart).await?;
        tokio::time::sleep(self.inner.config.combo_delay).await;
        let password = self.inner.config.credential.expose_secret().to_owned();
        self.dial(&password).await?;
        self.ok().await?;
        self.close_after_combo().await;
        Ok(())
    }

    /// Reset the device to factory settings. The session is closed
    /// afterwards.
    pub async fn factory_reset(&self) -> Result<(), CoreError> {
        info!("factory reset");
        self.key_press(Key::ComboReset).await?;
        tokio::time::sleep(self.inner.config.combo_delay).await;
        self.dial(FACTORY_RESET_CODE).await?;
        self.ok().await?;
        self.close_after_combo().await;
        Ok(())
    }

    /// Open the admin menu with the admin combo and the credential.
    pub async fn go_to_admin(&self) -> Result<(), CoreError> {
        info!("go to admin");
        self.key_press(Key::ComboAdmin).await?;
        tokio::time::sleep(self.inner.config.combo_delay).await;
        let password = self.inner.config.credential.expose_secret().to_owned();
        self.dial(&password).await?;
        self.ok().await
    }

    /// Pretend a headset was plugged in.
    pub async fn fake_headset_connected(&self) -> Result<(), CoreError> {
        self.key_press(Key::SocketHeadset).await?;
        tokio::time::sleep(self.inner.config.headset_delay).await;
        Ok(())
    }

    pub async fn fake_headset_disconnected(&self) -> Result<(), CoreError> {
        self.key_release(Key::SocketHeadset).await?;
        tokio::time::sleep(self.inner.config.headset_delay).await;
        Ok(())
    }

    /// The device drops the connection after a restart or reset; close our
    /// side without the hook teardown.
    async fn close_after_combo(&self) {
        self.inner
            .connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.shutdown().await;
    }

    // ── Assertions ───────────────────────────────────────────────

    /// Publish and log every failure. Returns `true` when there were none.
    fn report(&self, failures: Vec<AssertionFailure>) -> bool {
        if failures.is_empty() {
            return true;
        }
        let e164 = self.phone_number();
        for failure in failures {
            error!(
                address = %self.inner.config.address,
                e164 = %e164,
                assertion = failure.assertion,
                current = %failure.current,
                expected = %failure.expected,
                "assertion failed"
            );
            self.inner.events.publish(PhoneEvent::AssertionFailed(failure));
        }
        false
    }

    fn check(&self, f: impl FnOnce(&crate::state::PhoneState) -> Outcome) -> bool {
        let outcome = self.with_state(f);
        self.report(outcome.err().into_iter().collect())
    }

    /// Own call is in one of the `expected` states.
    pub fn assert_call_state(&self, expected: &[&str]) -> bool {
        self.check(|s| assertions::call_state(s, expected))
    }

    pub fn assert_selected_item(&self, pattern: &str) -> bool {
        self.check(|s| assertions::selected_item(s, pattern))
    }

    pub fn assert_toast(&self, pattern: &str) -> bool {
        self.check(|s| assertions::toast(s, pattern))
    }

    pub fn assert_notification(&self, pattern: &str) -> bool {
        self.check(|s| assertions::notification(s, pattern))
    }

    pub fn assert_key_state(&self, key: Key, mode: LampMode, colour: Option<LampColour>) -> bool {
        self.check(|s| assertions::key_state(s, key, mode, colour))
    }

    pub fn assert_remote_party_info(&self, pattern: &str) -> bool {
        self.check(|s| assertions::remote_party_info(s, pattern))
    }

    /// Check a whole call scenario; every mismatch is reported.
    pub fn assert_scenario(&self, scenario: Scenario, expect: &CallExpectation) -> bool {
        let failures = self.with_state(|s| assertions::scenario(s, scenario, expect));
        if !failures.is_empty() {
            debug!(%scenario, failed = failures.len(), "scenario check failed");
        }
        self.report(failures)
    }
}
