use thiserror::Error;

/// Top-level error type for the `deskctl-proto` crate.
///
/// Covers every failure mode of the wire layer: transport bring-up, TLS,
/// socket I/O, and payload decoding. `deskctl-core` maps these into
/// session-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// TCP connect failed (refused, unreachable, DNS, etc.)
    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    /// The device address could not be turned into a TLS server name.
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Handshake did not complete in time.
    #[error("Handshake timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Socket read/write failure on an established session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was torn down while a request was still pending.
    #[error("Connection closed before a reply arrived")]
    Disconnected,

    // ── Data ────────────────────────────────────────────────────────
    /// A payload could not be decoded (bad hex, truncated record).
    #[error("Decode error in {category} payload: {reason}")]
    Decode {
        category: &'static str,
        reason: String,
    },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying during
    /// connection bring-up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Timeout { .. } | Self::Io(_) | Self::Tls(_)
        )
    }

    pub(crate) fn decode(category: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            category,
            reason: reason.into(),
        }
    }
}
