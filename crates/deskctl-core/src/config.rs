// ── Runtime session configuration ──
//
// These types describe *how* to talk to one device. They carry the
// credential and the protocol timings but never touch disk; the CLI
// builds a `SessionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

use deskctl_proto::{DEFAULT_PORT, TlsMode, TransportConfig};

/// Exponential backoff between connection attempts during bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt. Default: 250ms.
    pub initial_delay: Duration,
    /// Upper bound on a single delay. Default: 2s.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Configuration for a session with a single device.
///
/// Built by the CLI (or a test harness) and passed to `Session`; the core
/// never reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device address (IP or host name).
    pub address: String,
    pub port: u16,
    /// Device admin password; used for authentication, instrumentation
    /// registration and the restart/admin key combos.
    pub credential: SecretString,
    pub tls: TlsMode,
    /// Overall bring-up deadline for the connect loop.
    pub timeout: Duration,
    /// Upper bound on one TCP + TLS handshake.
    pub handshake_timeout: Duration,
    /// Run instrumentation setup after authentication.
    pub init_test_mode: bool,
    pub keepalive_interval: Duration,
    /// Pause after a key press and after its release.
    pub key_press_delay: Duration,
    /// How long a long press holds the key down.
    pub long_press_hold: Duration,
    /// Pause after each character of `write`.
    pub character_delay: Duration,
    /// Pause between items of a config get/set batch.
    pub config_item_delay: Duration,
    /// Settle time after the bring-up hook-off.
    pub hook_off_settle: Duration,
    /// Settle time after the bring-up hook-on.
    pub hook_on_settle: Duration,
    /// Pause after pressing a key combo (restart, reset, admin).
    pub combo_delay: Duration,
    /// Pause after toggling the fake headset socket.
    pub headset_delay: Duration,
    pub backoff: BackoffConfig,
}

impl SessionConfig {
    pub fn new(address: impl Into<String>, credential: SecretString) -> Self {
        Self {
            address: address.into(),
            credential,
            ..Self::default()
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            handshake_timeout: self.handshake_timeout,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            credential: SecretString::from(String::new()),
            tls: TlsMode::default(),
            timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            init_test_mode: true,
            keepalive_interval: Duration::from_secs(15),
            key_press_delay: Duration::from_millis(500),
            long_press_hold: Duration::from_millis(2000),
            character_delay: Duration::from_millis(500),
            config_item_delay: Duration::from_millis(100),
            hook_off_settle: Duration::from_millis(1000),
            hook_on_settle: Duration::from_millis(500),
            combo_delay: Duration::from_millis(1500),
            headset_delay: Duration::from_millis(250),
            backoff: BackoffConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_match_device_timings() {
        let config = SessionConfig::new("10.0.0.5", SecretString::from("123456".to_owned()));
        assert_eq!(config.address, "10.0.0.5");
        assert_eq!(config.port, 65532);
        assert_eq!(config.credential.expose_secret(), "123456");
        assert!(config.init_test_mode);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.keepalive_interval, Duration::from_secs(15));
        assert_eq!(config.long_press_hold, Duration::from_secs(2));
        assert_eq!(config.tls, TlsMode::DangerAcceptInvalid);
    }

    #[test]
    fn transport_carries_tls_settings() {
        let config = SessionConfig {
            tls: TlsMode::System,
            handshake_timeout: Duration::from_secs(1),
            ..SessionConfig::default()
        };
        let transport = config.transport();
        assert_eq!(transport.tls, TlsMode::System);
        assert_eq!(transport.handshake_timeout, Duration::from_secs(1));
    }
}
