//! Configuration item handlers.

use serde::Serialize;
use tabled::Tabled;

use deskctl_core::Session;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Tabled)]
struct ItemRow {
    #[tabled(rename = "Item")]
    item: String,
    #[tabled(rename = "Value")]
    value: String,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn get(session: &Session, items: &[String], global: &GlobalOpts) -> Result<(), CliError> {
    let names: Vec<&str> = items.iter().map(String::as_str).collect();
    let values = session.get_config(&names).await?;

    // Items the phone did not answer still get a row.
    let rows: Vec<ItemRow> = items
        .iter()
        .map(|item| ItemRow {
            item: item.clone(),
            value: values.get(item).cloned().unwrap_or_default(),
        })
        .collect();

    let out = output::render_list(&global.output, &rows, ItemRow::clone, |row| {
        format!("{}={}", row.item, row.value)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn set(
    session: &Session,
    pairs: &[(String, String)],
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let items: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(item, value)| (item.as_str(), value.as_str()))
        .collect();
    session.set_config(&items).await?;
    if !global.quiet {
        eprintln!("{} item(s) written", items.len());
    }
    Ok(())
}
