//! Shared configuration for deskctl.
//!
//! TOML device profiles, credential resolution (env + keyring + plaintext),
//! and translation to `deskctl_core::SessionConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use deskctl_core::{SessionConfig, TlsMode};

const KEYRING_SERVICE: &str = "deskctl";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{name}'")]
    UnknownProfile { name: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults, overridable per profile.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick `requested`, falling back to `default_profile`.
    pub fn profile<'a>(
        &'a self,
        requested: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Bring-up deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_init_test_mode")]
    pub init_test_mode: bool,

    /// Keepalive period in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,

    /// Verify device certificates against the webpki roots.
    #[serde(default)]
    pub verify_tls: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            init_test_mode: default_init_test_mode(),
            keepalive: default_keepalive(),
            verify_tls: false,
        }
    }
}

fn default_timeout() -> u64 {
    5
}
fn default_init_test_mode() -> bool {
    true
}
fn default_keepalive() -> u64 {
    15
}

/// A named device profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Device IP address or host name.
    pub address: String,

    /// Instrumentation port override.
    pub port: Option<u16>,

    /// Admin password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the admin password.
    pub password_env: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override the TLS verification default.
    pub verify_tls: Option<bool>,

    /// Override the bring-up timeout.
    pub timeout: Option<u64>,

    /// Override instrumentation setup after authentication.
    pub init_test_mode: Option<bool>,

    /// Override the keepalive period.
    pub keepalive: Option<u64>,
}

impl Profile {
    fn tls_mode(&self, defaults: &Defaults) -> TlsMode {
        if let Some(ref ca_path) = self.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else if self.verify_tls.unwrap_or(defaults.verify_tls) {
            TlsMode::System
        } else {
            TlsMode::DangerAcceptInvalid
        }
    }

    /// Build a `SessionConfig` from this profile with `defaults` filling gaps.
    ///
    /// Resolves the password through [`resolve_password`]; protocol timings
    /// keep their `SessionConfig` defaults.
    pub fn to_session_config(
        &self,
        name: &str,
        defaults: &Defaults,
    ) -> Result<SessionConfig, ConfigError> {
        let credential = resolve_password(self, name)?;
        self.session_config_with(name, defaults, credential)
    }

    /// Like [`to_session_config`](Self::to_session_config) with an already
    /// resolved credential.
    pub fn session_config_with(
        &self,
        name: &str,
        defaults: &Defaults,
        credential: SecretString,
    ) -> Result<SessionConfig, ConfigError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ConfigError::Validation {
                field: "address".into(),
                reason: format!("profile '{name}' has no device address"),
            });
        }

        let base = SessionConfig::default();
        let port = self.port.unwrap_or(base.port);
        if port == 0 {
            return Err(ConfigError::Validation {
                field: "port".into(),
                reason: "must be non-zero".into(),
            });
        }

        let timeout = self.timeout.unwrap_or(defaults.timeout);
        if timeout == 0 {
            return Err(ConfigError::Validation {
                field: "timeout".into(),
                reason: "must be at least one second".into(),
            });
        }

        Ok(SessionConfig {
            address: address.to_owned(),
            port,
            credential,
            tls: self.tls_mode(defaults),
            timeout: Duration::from_secs(timeout),
            init_test_mode: self.init_test_mode.unwrap_or(defaults.init_test_mode),
            keepalive_interval: Duration::from_secs(self.keepalive.unwrap_or(defaults.keepalive)),
            ..base
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "deskctl", "deskctl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("deskctl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path`, then apply `DESKCTL_` environment overrides.
///
/// Nested keys use a double underscore: `DESKCTL_DEFAULTS__TIMEOUT=10`.
/// A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DESKCTL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the admin password from the credential chain.
///
/// Order: the env var named by `password_env`, the system keyring entry
/// `deskctl` / `{profile}/password`, then the plaintext `password`.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
        default_profile = "lab"

        [defaults]
        timeout = 8

        [profiles.lab]
        address = "10.0.0.5"
        password = "123456"

        [profiles.bench]
        address = " 10.0.0.9 "
        port = 4443
        password_env = "BENCH_PW"
        ca_cert = "/etc/deskctl/ca.pem"
        init_test_mode = false
        timeout = 3
    "#;

    fn profile(address: &str) -> Profile {
        Profile {
            address: address.into(),
            password: Some("123456".into()),
            ..Profile::default()
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.default_profile.as_deref(), Some("default"));
            assert_eq!(cfg.defaults.timeout, 5);
            assert!(cfg.defaults.init_test_mode);
            assert!(cfg.profiles.is_empty());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("DESKCTL_DEFAULTS__KEEPALIVE", "30");
            jail.set_env("DESKCTL_DEFAULT_PROFILE", "bench");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.default_profile.as_deref(), Some("bench"));
            assert_eq!(cfg.defaults.timeout, 8);
            assert_eq!(cfg.defaults.keepalive, 30);
            assert_eq!(cfg.profiles.len(), 2);
            assert_eq!(cfg.profiles["bench"].port, Some(4443));
            Ok(())
        });
    }

    #[test]
    fn profile_selection() {
        let mut cfg = Config {
            default_profile: Some("lab".into()),
            ..Config::default()
        };
        cfg.profiles.insert("lab".into(), profile("10.0.0.5"));
        cfg.profiles.insert("bench".into(), profile("10.0.0.9"));

        assert_eq!(cfg.profile(None).unwrap().0, "lab");
        assert_eq!(cfg.profile(Some("bench")).unwrap().1.address, "10.0.0.9");
        assert!(matches!(
            cfg.profile(Some("nope")),
            Err(ConfigError::UnknownProfile { name }) if name == "nope"
        ));
    }

    #[test]
    fn profile_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("BENCH_PW", "from-env");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            let session = cfg.profiles["bench"]
                .to_session_config("bench", &cfg.defaults)
                .map_err(|e| e.to_string())?;

            assert_eq!(session.address, "10.0.0.9");
            assert_eq!(session.port, 4443);
            assert_eq!(session.credential.expose_secret(), "from-env");
            assert_eq!(
                session.tls,
                TlsMode::CustomCa(PathBuf::from("/etc/deskctl/ca.pem"))
            );
            assert_eq!(session.timeout, Duration::from_secs(3));
            assert!(!session.init_test_mode);
            assert_eq!(session.keepalive_interval, Duration::from_secs(15));
            Ok(())
        });
    }

    #[test]
    fn defaults_fill_profile_gaps() {
        let defaults = Defaults {
            verify_tls: true,
            ..Defaults::default()
        };
        let session = profile("10.0.0.5")
            .to_session_config("lab", &defaults)
            .unwrap();
        assert_eq!(session.port, 65532);
        assert_eq!(session.tls, TlsMode::System);
        assert_eq!(session.timeout, Duration::from_secs(5));
        assert!(session.init_test_mode);
        assert_eq!(session.credential.expose_secret(), "123456");
    }

    #[test]
    fn validation_rejects_empty_address_and_zero_port() {
        let defaults = Defaults::default();
        assert!(matches!(
            profile("  ").to_session_config("lab", &defaults),
            Err(ConfigError::Validation { field, .. }) if field == "address"
        ));

        let zero_port = Profile {
            port: Some(0),
            ..profile("10.0.0.5")
        };
        assert!(matches!(
            zero_port.to_session_config("lab", &defaults),
            Err(ConfigError::Validation { field, .. }) if field == "port"
        ));
    }

    #[test]
    fn missing_password_is_reported() {
        let bare = Profile {
            address: "10.0.0.5".into(),
            password_env: Some("DESKCTL_TEST_UNSET_PASSWORD".into()),
            ..Profile::default()
        };
        assert!(matches!(
            resolve_password(&bare, "deskctl-test-no-such-profile"),
            Err(ConfigError::NoCredentials { profile }) if profile == "deskctl-test-no-such-profile"
        ));
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                keepalive: Some(20),
                ..profile("10.0.0.5")
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles["lab"].address, "10.0.0.5");
        assert_eq!(loaded.profiles["lab"].keepalive, Some(20));
        assert_eq!(loaded.profiles["lab"].password.as_deref(), Some("123456"));
    }
}
