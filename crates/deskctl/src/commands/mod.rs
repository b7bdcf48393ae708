//! Command dispatch: bridges CLI args -> a live `Session` -> output.

pub mod config_cmd;
pub mod items;
pub mod keys;
pub mod watch;

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use deskctl_core::{CoreError, Session, SessionConfig, SessionInfo};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Bring a session up, run one device-bound command, and tear it down.
///
/// The teardown runs whether or not the command succeeded.
pub async fn dispatch(
    cmd: Command,
    config: SessionConfig,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = Session::new(config)?;
    let info = connect(&session, profile_name, global).await?;
    tracing::info!(device = %info, "session up");

    let result = match cmd {
        Command::Connect => {
            let out = output::render_single(&global.output, &info)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        Command::Dial { digits } => keys::dial(&session, &digits).await,
        Command::Write { text } => keys::write(&session, &text).await,
        Command::Press { key, long } => keys::press(&session, key, long).await,
        Command::Restart => keys::restart(&session, global).await,
        Command::GetConfig { items } => items::get(&session, &items, global).await,
        Command::SetConfig { pairs } => items::set(&session, &pairs, global).await,
        Command::Watch { seconds, traffic } => watch::handle(&session, seconds, traffic).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    };

    session.shutdown().await;
    result
}

async fn connect(
    session: &Session,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<SessionInfo, CliError> {
    let spinner = (!global.quiet && std::io::stderr().is_terminal()).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Connecting to {}", session.config().address));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = session.connect().await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    result.map_err(|e| match e {
        CoreError::AuthorizationFailed => CliError::AuthFailed {
            profile: profile_name.to_owned(),
        },
        other => other.into(),
    })
}
