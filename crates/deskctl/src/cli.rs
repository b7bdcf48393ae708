//! Clap derive structures for the `deskctl` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

use deskctl_core::Key;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// deskctl -- drive desk phones through their instrumentation interface
#[derive(Debug, Parser)]
#[command(
    name = "deskctl",
    version,
    about = "Drive desk phones through their TLS instrumentation interface",
    long_about = "Connects to a desk phone's instrumentation port, puts it into\n\
        test mode, and sends key presses, text and configuration requests\n\
        while streaming the events the phone reports.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "DESKCTL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device address (overrides profile)
    #[arg(long, short = 'a', env = "DESKCTL_ADDRESS", global = true)]
    pub address: Option<String>,

    /// Device admin password
    #[arg(long, env = "DESKCTL_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Bring-up timeout in seconds (overrides profile)
    #[arg(long, short = 't', env = "DESKCTL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Skip instrumentation setup after authentication
    #[arg(long, global = true)]
    pub no_test_mode: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Plain text (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bring a session up, report the device, and tear it down
    Connect,

    /// Dial digits, `*` and `#` on the keypad
    Dial {
        /// Characters to dial; anything else is skipped
        digits: String,
    },

    /// Type text with keypad multi-tap
    Write {
        /// Text to enter
        text: String,
    },

    /// Press and release a key
    Press {
        /// Key name (e.g. `5`, `hash`, `navi-ok`, `soft1`, `loudspeaker`)
        key: Key,

        /// Hold the key down for a long press
        #[arg(long, short = 'l')]
        long: bool,
    },

    /// Read configuration items
    #[command(alias = "get")]
    GetConfig {
        /// Item names
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Write configuration items
    #[command(alias = "set")]
    SetConfig {
        /// `item=value` pairs
        #[arg(required = true, value_parser = parse_item_pair)]
        pairs: Vec<(String, String)>,
    },

    /// Stream session events as JSON lines
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long, short = 's')]
        seconds: Option<u64>,

        /// Include raw protocol traffic
        #[arg(long)]
        traffic: bool,
    },

    /// Restart the device with the admin key combo
    Restart,

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

fn parse_item_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((item, value)) if !item.trim().is_empty() => {
            Ok((item.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected item=value, got '{raw}'")),
    }
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the configured profiles (passwords redacted)
    Show,

    /// Store a profile's password in the system keyring
    SetPassword {
        /// Profile name (default: the active profile)
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn item_pairs_split_on_first_equals() {
        assert_eq!(
            parse_item_pair("e164=1000"),
            Ok(("e164".to_owned(), "1000".to_owned()))
        );
        assert_eq!(
            parse_item_pair("url=a=b"),
            Ok(("url".to_owned(), "a=b".to_owned()))
        );
        assert!(parse_item_pair("=x").is_err());
        assert!(parse_item_pair("novalue").is_err());
    }
}
