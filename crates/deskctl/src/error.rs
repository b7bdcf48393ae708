//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use deskctl_config::ConfigError;
use deskctl_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to device at {address}")]
    #[diagnostic(
        code(deskctl::connection_failed),
        help(
            "Check that the phone is powered and reachable on port 65532.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { address: String, reason: String },

    #[error("Device disconnected")]
    #[diagnostic(code(deskctl::disconnected))]
    Disconnected,

    #[error("Could not connect within {seconds}s")]
    #[diagnostic(
        code(deskctl::timeout),
        help("Increase the bring-up deadline with --timeout or check the device address.")
    )]
    Timeout { seconds: u64 },

    #[error("Instrumentation interface at {address} is busy")]
    #[diagnostic(
        code(deskctl::session_conflict),
        help(
            "The phone accepted the login but never reported events.\n\
             Another session is probably still attached; close it or reboot the phone."
        )
    )]
    SessionConflict { address: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("The device rejected the admin password")]
    #[diagnostic(
        code(deskctl::auth_failed),
        help("Run: deskctl config set-password {profile}")
    )]
    AuthFailed { profile: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(deskctl::no_credentials),
        help(
            "Pass --password, set DESKCTL_PASSWORD, or store one with:\n\
             deskctl config set-password {profile}"
        )
    )]
    NoCredentials { profile: String },

    #[error("'{operation}' needs full access to the device")]
    #[diagnostic(
        code(deskctl::full_access),
        help("Full access is granted once the phone reports its first tone event.")
    )]
    FullAccessRequired { operation: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(deskctl::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(deskctl::no_device),
        help(
            "Pass --address, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoDevice { path: String },

    #[error(transparent)]
    #[diagnostic(code(deskctl::config))]
    Config(Box<ConfigError>),

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(deskctl::validation))]
    Validation { field: String, reason: String },

    // ── Session ──────────────────────────────────────────────────────

    #[error("Session error: {message}")]
    #[diagnostic(code(deskctl::session))]
    Session { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(deskctl::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::SessionConflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoDevice { .. } => exit_code::USAGE,
            Self::FullAccessRequired { .. } => exit_code::PERMISSION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::AuthorizationFailed => CliError::AuthFailed {
                profile: "default".into(),
            },

            CoreError::SessionConflict { address } => CliError::SessionConflict { address },

            CoreError::NotConnected | CoreError::Disconnected => CliError::Disconnected,

            CoreError::FullAccessRequired { operation } => CliError::FullAccessRequired {
                operation: operation.into(),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            err @ (CoreError::IncompatibleDefinitions { .. } | CoreError::Internal(_)) => {
                CliError::Session {
                    message: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (CoreError::Timeout { timeout_secs: 5 }, exit_code::TIMEOUT),
            (CoreError::AuthorizationFailed, exit_code::AUTH),
            (
                CoreError::SessionConflict {
                    address: "10.0.0.5".into(),
                },
                exit_code::CONFLICT,
            ),
            (CoreError::Disconnected, exit_code::CONNECTION),
            (
                CoreError::FullAccessRequired {
                    operation: "get_codec",
                },
                exit_code::PERMISSION,
            ),
            (
                CoreError::IncompatibleDefinitions {
                    required: 1,
                    found: 2,
                },
                exit_code::GENERAL,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn config_errors_keep_their_meaning() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "lab".into(),
        });
        assert!(matches!(err, CliError::NoCredentials { ref profile } if profile == "lab"));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
