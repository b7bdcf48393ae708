//! Key, dial, and text-entry handlers.

use deskctl_core::{Key, Session};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub async fn dial(session: &Session, digits: &str) -> Result<(), CliError> {
    session.dial(digits).await?;
    Ok(())
}

pub async fn write(session: &Session, text: &str) -> Result<(), CliError> {
    session.write(text).await?;
    Ok(())
}

pub async fn press(session: &Session, key: Key, long: bool) -> Result<(), CliError> {
    if long {
        session.long_key_press(key).await?;
    } else {
        session.normal_key_press(key).await?;
    }
    Ok(())
}

pub async fn restart(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    session.restart().await?;
    if !global.quiet {
        eprintln!("Restart requested; the phone drops the session while it reboots");
    }
    Ok(())
}
