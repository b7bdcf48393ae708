//! Event streaming as JSON lines.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use deskctl_core::{PhoneEvent, Session, SessionState};

use crate::error::CliError;

#[derive(Serialize)]
struct EventLine<'a> {
    time: String,
    #[serde(flatten)]
    event: &'a PhoneEvent,
}

fn event_line(event: &PhoneEvent) -> Result<String, CliError> {
    let line = EventLine {
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        event,
    };
    Ok(serde_json::to_string(&line)?)
}

/// Print events until the deadline, Ctrl-C, or the device going away.
pub async fn handle(
    session: &Session,
    seconds: Option<u64>,
    traffic: bool,
) -> Result<(), CliError> {
    let mut events = BroadcastStream::new(session.subscribe());
    let mut state = session.state();

    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SessionState::Disconnected {
                    eprintln!("Device closed the session");
                    break;
                }
            }
            item = events.next() => match item {
                Some(Ok(event)) => {
                    if traffic || !matches!(*event, PhoneEvent::Traffic { .. }) {
                        println!("{}", event_line(&event)?);
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "event stream lagged");
                }
                None => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_time_and_tagged_event() {
        let line = event_line(&PhoneEvent::Log("Successfully subscribed".into())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "log");
        assert_eq!(value["data"], "Successfully subscribed");
        assert!(value["time"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn unit_events_have_no_data() {
        let line = event_line(&PhoneEvent::Subscribed).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "subscribed");
        assert!(value.get("data").is_none());
    }
}
