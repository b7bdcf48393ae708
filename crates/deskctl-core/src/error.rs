// ── Core error types ──
//
// Session-level errors from deskctl-core. Consumers never see raw socket
// or hex-decoding failures; the `From<deskctl_proto::Error>` impl maps
// wire-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Could not connect within {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Authorization error: device rejected the credential")]
    AuthorizationFailed,

    #[error(
        "Could not connect to phone test interface at {address}. Maybe another session is still active."
    )]
    SessionConflict { address: String },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Device disconnected")]
    Disconnected,

    // ── Capability errors ────────────────────────────────────────────
    #[error("Operation {operation} requires full access (no tone event seen yet)")]
    FullAccessRequired { operation: &'static str },

    #[error("Protocol definitions version {found} is incompatible (required {required})")]
    IncompatibleDefinitions { required: u32, found: u32 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<deskctl_proto::Error> for CoreError {
    fn from(err: deskctl_proto::Error) -> Self {
        match err {
            deskctl_proto::Error::Connect { address, reason } => {
                CoreError::ConnectionFailed { address, reason }
            }
            deskctl_proto::Error::InvalidAddress(address) => CoreError::Config {
                message: format!("Invalid device address: {address}"),
            },
            deskctl_proto::Error::Tls(msg) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            deskctl_proto::Error::Timeout { timeout_ms } => CoreError::Timeout {
                timeout_secs: timeout_ms.div_ceil(1000),
            },
            deskctl_proto::Error::Io(e) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: e.to_string(),
            },
            deskctl_proto::Error::Disconnected => CoreError::Disconnected,
            deskctl_proto::Error::Decode { category, reason } => {
                CoreError::Internal(format!("Undecodable {category} payload: {reason}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_errors_map_to_session_errors() {
        let err: CoreError = deskctl_proto::Error::Disconnected.into();
        assert!(matches!(err, CoreError::Disconnected));

        let err: CoreError = deskctl_proto::Error::Timeout { timeout_ms: 1500 }.into();
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 2 }));

        let err: CoreError = deskctl_proto::Error::Connect {
            address: "10.0.0.5:65532".into(),
            reason: "refused".into(),
        }
        .into();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    }

    #[test]
    fn conflict_message_names_the_cause() {
        let err = CoreError::SessionConflict {
            address: "10.0.0.5".into(),
        };
        assert!(err.to_string().contains("another session is still active"));
    }
}
