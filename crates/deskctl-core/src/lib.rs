//! Session engine for desk-phone instrumentation, built on `deskctl-proto`.
//!
//! - **[`Session`]**: one authenticated, instrumented connection to a
//!   device. [`connect()`](Session::connect) runs the bring-up (transport
//!   retry, authentication, test-mode setup, identity fetch, keepalive);
//!   [`shutdown()`](Session::shutdown) returns the device to idle. The
//!   command surface (keys, dialing, text entry, configuration items,
//!   speech path, key combos) lives on the same handle.
//!
//! - **[`PhoneState`]**: lamps, call states, tones, the display and
//!   key-module models plus the scalars derived from them. Mutated only by
//!   the session's reader task; read through
//!   [`Session::with_state`] / [`Session::snapshot`].
//!
//! - **[`PhoneEvent`]**: everything observed, fanned out over a broadcast
//!   channel ([`Session::subscribe`]) and to [`Observer`]s.
//!
//! - **[`assertions`]**: pure checks over a `PhoneState`, including the
//!   call-scenario composites. Failures are diagnostics, never errors.

pub mod assertions;
mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod family;
pub mod session;
pub mod state;
pub mod text_entry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use assertions::{AssertionFailure, CallExpectation, Scenario};
pub use config::{BackoffConfig, SessionConfig};
pub use error::CoreError;
pub use event::{CallChange, Direction, LampChange, Observer, PhoneEvent};
pub use family::{EndedCallNotice, FamilyTraits};
pub use session::{REQUIRED_DEFINITIONS_VERSION, Session, SessionInfo, SessionState};
pub use state::{DerivedScalars, DeviceIdentity, PhoneState};

// Wire-level types that appear in the public API.
pub use deskctl_proto::{
    DeviceFamily, DeviceType, Key, LampColour, LampMode, MessageBuilder, TlsMode,
};
