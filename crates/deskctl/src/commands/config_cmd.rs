//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use deskctl_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::active_profile_name;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "TLS")]
    tls: String,
    #[tabled(rename = "Timeout")]
    timeout: String,
    #[tabled(rename = "Test mode")]
    test_mode: String,
    #[tabled(rename = "Password")]
    password: String,
}

impl ProfileRow {
    fn new(name: &str, profile: &Profile, cfg: &Config) -> Self {
        let tls = if let Some(ref ca) = profile.ca_cert {
            format!("ca {}", ca.display())
        } else if profile.verify_tls.unwrap_or(cfg.defaults.verify_tls) {
            "verify".into()
        } else {
            "accept-any".into()
        };
        let password = match (&profile.password_env, &profile.password) {
            (Some(env), _) => format!("${env}"),
            (None, Some(_)) => "****".into(),
            (None, None) => "keyring".into(),
        };
        let marker = if cfg.default_profile.as_deref() == Some(name) {
            "*"
        } else {
            ""
        };
        Self {
            name: format!("{name}{marker}"),
            address: profile.address.clone(),
            port: profile
                .port
                .map_or_else(|| "default".into(), |p| p.to_string()),
            tls,
            timeout: format!("{}s", profile.timeout.unwrap_or(cfg.defaults.timeout)),
            test_mode: if profile.init_test_mode.unwrap_or(cfg.defaults.init_test_mode) {
                "yes"
            } else {
                "no"
            }
            .into(),
            password,
        }
    }
}

fn profile_rows(cfg: &Config) -> Vec<ProfileRow> {
    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| ProfileRow::new(name, &cfg.profiles[name], cfg))
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", deskctl_config::config_path().display());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = deskctl_config::load_config()?;
            let rows = profile_rows(&cfg);
            if rows.is_empty() {
                eprintln!(
                    "No profiles configured in {}",
                    deskctl_config::config_path().display()
                );
                return Ok(());
            }
            let out = output::render_list(&global.output, &rows, ProfileRow::clone, |row| {
                format!("{} {}", row.name, row.address)
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword { profile } => {
            let cfg = deskctl_config::load_config_or_default();
            let name = profile.unwrap_or_else(|| active_profile_name(global, &cfg));
            let password = rpassword::prompt_password(format!("Admin password for '{name}': "))?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            deskctl_config::store_password(&name, &password)?;
            if !global.quiet {
                eprintln!("Password for '{name}' stored in system keyring");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_sorted_and_redacted() {
        let mut cfg = Config {
            default_profile: Some("lab".into()),
            ..Config::default()
        };
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                address: "10.0.0.5".into(),
                password: Some("123456".into()),
                ..Profile::default()
            },
        );
        cfg.profiles.insert(
            "bench".into(),
            Profile {
                address: "10.0.0.9".into(),
                port: Some(4443),
                password_env: Some("BENCH_PW".into()),
                init_test_mode: Some(false),
                ..Profile::default()
            },
        );

        let rows = profile_rows(&cfg);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "bench");
        assert_eq!(rows[0].port, "4443");
        assert_eq!(rows[0].password, "$BENCH_PW");
        assert_eq!(rows[0].test_mode, "no");
        assert_eq!(rows[1].name, "lab*");
        assert_eq!(rows[1].password, "****");
        assert_eq!(rows[1].tls, "accept-any");
        assert_eq!(rows[1].timeout, "5s");
    }
}
