use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use prettytable::{Cell, Row, Table};
use tracing::info;
use trk_storage::SnapshotController;

use crate::snapshot::titled_table;

pub const LS_HEADERS: [&str; 4] = ["name", "id", "created at", "current"];

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Switch to the named session, creating it if it does not exist
    Start {
        #[arg(long)]
        name: String,
    },

    /// List sessions
    Ls,
}

pub fn run(ctl: &dyn SnapshotController, cmd: SessionCommand, timestamp_format: &str, out: &mut dyn Write) -> Result<()> {
    match cmd {
        SessionCommand::Start { name } => {
            info!(name = %name, "starting session");
            let session = ctl.start_session(&name)?;
            writeln!(out, "{}", session.id)?;
        }
        SessionCommand::Ls => {
            let table = ls(ctl, timestamp_format)?;
            write!(out, "{table}")?;
        }
    }
    Ok(())
}

pub fn ls(ctl: &dyn SnapshotController, timestamp_format: &str) -> Result<Table> {
    let current = ctl.current_session()?;
    let mut table = titled_table(&LS_HEADERS);
    for session in ctl.sessions()? {
        let marker = if session.id == current.id { "*" } else { "" };
        table.add_row(Row::new(vec![
            Cell::new(&session.name),
            Cell::new(session.id.as_str()),
            Cell::new(&session.created_at.format(timestamp_format).to_string()),
            Cell::new(marker),
        ]));
    }
    Ok(table)
}
