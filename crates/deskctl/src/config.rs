//! Flag-aware profile resolution on top of `deskctl-config`.
//!
//! This is the single boundary where CLI options and config-file types
//! cross into a core `SessionConfig`.

use std::io::IsTerminal;
use std::time::Duration;

use secrecy::SecretString;

use deskctl_config::{Config, ConfigError, Profile};
use deskctl_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

/// Build a `SessionConfig` from the config file, profile, and CLI overrides.
///
/// Returns the profile name alongside for error context.
pub fn build_session_config(global: &GlobalOpts) -> Result<(String, SessionConfig), CliError> {
    let cfg = deskctl_config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // A bare --address works without any config file.
        None if global.address.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        None => {
            return Err(CliError::NoDevice {
                path: deskctl_config::config_path().display().to_string(),
            });
        }
    };

    // 1. Address (flag > env > profile)
    if let Some(ref address) = global.address {
        profile.address.clone_from(address);
    }

    // 2. Credential (flag > env > profile chain > prompt)
    let credential = match global.password {
        Some(ref password) => SecretString::from(password.clone()),
        None => match deskctl_config::resolve_password(&profile, &profile_name) {
            Ok(secret) => secret,
            Err(ConfigError::NoCredentials { .. }) if std::io::stdin().is_terminal() => {
                prompt_password(&profile.address)?
            }
            Err(e) => return Err(e.into()),
        },
    };

    let mut session = profile.session_config_with(&profile_name, &cfg.defaults, credential)?;

    // 3. Remaining overrides
    if let Some(timeout) = global.timeout {
        if timeout == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be at least one second".into(),
            });
        }
        session.timeout = Duration::from_secs(timeout);
    }
    if global.no_test_mode {
        session.init_test_mode = false;
    }

    Ok((profile_name, session))
}

fn prompt_password(address: &str) -> Result<SecretString, CliError> {
    let password = rpassword::prompt_password(format!("Admin password for {address}: "))?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(SecretString::from(password))
}
