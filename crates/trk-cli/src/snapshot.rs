use std::io::Write;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use prettytable::{format, Cell, Row, Table};
use serde_json::Value;
use tracing::{info, warn};
use trk_core::{OptionMap, SessionId, SnapshotId, SnapshotRecord, SnapshotRequestBuilder};
use trk_storage::SnapshotController;

pub const LS_HEADERS: [&str; 6] = ["id", "config", "stats", "message", "label", "created at"];

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Create snapshot
    Create(CreateArgs),

    /// Delete a snapshot by id
    Delete {
        #[arg(long)]
        id: String,
    },

    /// List snapshots
    Ls(LsArgs),

    /// Checkout a snapshot by id
    Checkout {
        #[arg(long)]
        id: String,
    },
}

#[derive(Args, Default)]
pub struct CreateArgs {
    /// Message to describe snapshot
    #[arg(long, short = 'm', default_value = "")]
    pub message: String,
    /// Label snapshots with a category (e.g. best)
    #[arg(long, short = 'l', default_value = "")]
    pub label: String,
    /// User given session id
    #[arg(long, default_value = "")]
    pub session_id: String,
    /// Specify task id to pull information from
    #[arg(long, default_value = "")]
    pub task_id: String,

    /// User provided code id (e.g. git revision for git)
    #[arg(long, default_value = "")]
    pub code_id: String,
    /// Commit to record as the code version when no code id is given
    #[arg(long, default_value = "")]
    pub commit_id: String,

    /// Existing environment id
    #[arg(long, default_value = "")]
    pub environment_id: String,
    /// Path to environment definition file (e.g. /path/to/Dockerfile)
    #[arg(long, default_value = "")]
    pub environment_def_path: String,

    /// Existing file collection id
    #[arg(long, default_value = "")]
    pub file_collection_id: String,
    /// Paths to files or folders to include within the files of the snapshot
    #[arg(long, num_args = 0..)]
    pub filepaths: Vec<String>,

    /// Filename to use to search for configuration JSON
    #[arg(long, default_value = "")]
    pub config_filename: String,
    /// Path to configuration JSON
    #[arg(long, default_value = "")]
    pub config_filepath: String,

    /// Filename to use to search for metrics JSON
    #[arg(long, default_value = "")]
    pub stats_filename: String,
    /// Path to metrics JSON
    #[arg(long, default_value = "")]
    pub stats_filepath: String,

    /// Create the snapshot as not visible
    #[arg(long)]
    pub not_visible: bool,
}

impl CreateArgs {
    /// Every flag as a raw option; unset flags are present but empty.
    pub fn to_options(&self) -> OptionMap {
        let mut options = OptionMap::new();
        let mut put = |key: &str, value: Value| {
            options.insert(key.to_string(), value);
        };
        put("message", self.message.clone().into());
        put("label", self.label.clone().into());
        put("session_id", self.session_id.clone().into());
        put("task_id", self.task_id.clone().into());
        put("code_id", self.code_id.clone().into());
        put("commit_id", self.commit_id.clone().into());
        put("environment_id", self.environment_id.clone().into());
        put("environment_definition_filepath", expand(&self.environment_def_path).into());
        put("file_collection_id", self.file_collection_id.clone().into());
        put("file_collection", self.filepaths.iter().map(|p| Value::from(expand(p))).collect());
        put("config_filename", self.config_filename.clone().into());
        put("config_filepath", expand(&self.config_filepath).into());
        put("stats_filename", self.stats_filename.clone().into());
        put("stats_filepath", expand(&self.stats_filepath).into());
        put("visible", (!self.not_visible).into());
        options
    }
}

#[derive(Args, Default)]
pub struct LsArgs {
    /// Session ID to filter
    #[arg(long)]
    pub session_id: Option<String>,
    /// Session name to filter
    #[arg(long, conflicts_with = "session_id")]
    pub session_name: Option<String>,
    /// Include snapshots that are not visible
    #[arg(short = 'a', long = "all")]
    pub all: bool,
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

pub fn run(ctl: &dyn SnapshotController, cmd: SnapshotCommand, timestamp_format: &str, out: &mut dyn Write) -> Result<()> {
    match cmd {
        SnapshotCommand::Create(args) => {
            let id = create(ctl, &args)?;
            writeln!(out, "{id}")?;
        }
        SnapshotCommand::Delete { id } => {
            info!(snapshot_id = %id, "deleting snapshot");
            let deleted = ctl.delete(&SnapshotId::from_str(id))?;
            writeln!(out, "{deleted}")?;
        }
        SnapshotCommand::Ls(args) => {
            let table = ls(ctl, &args, timestamp_format)?;
            write!(out, "{table}")?;
        }
        SnapshotCommand::Checkout { id } => {
            let ok = ctl.checkout(&SnapshotId::from_str(id))?;
            writeln!(out, "{ok}")?;
        }
    }
    Ok(())
}

pub fn create(ctl: &dyn SnapshotController, args: &CreateArgs) -> Result<SnapshotId> {
    info!("creating a new snapshot");
    if !args.stats_filename.is_empty() || !args.stats_filepath.is_empty() {
        warn!("--stats-filename/--stats-filepath are not part of the creation request and are ignored");
    }
    if args.not_visible {
        warn!("--not-visible is dropped with the other falsy options; the snapshot stays visible");
    }

    let (request, dropped) = SnapshotRequestBuilder::new().build_with_report(&args.to_options());
    for d in dropped {
        warn!(group = d.group, kept = d.kept, dropped = d.dropped, "conflicting options; keeping the first");
    }
    Ok(ctl.create(&request)?.id().clone())
}

pub fn ls(ctl: &dyn SnapshotController, args: &LsArgs, timestamp_format: &str) -> Result<Table> {
    let session_id = match (&args.session_id, &args.session_name) {
        (Some(id), _) => SessionId::from_str(id.clone()),
        (None, Some(name)) => {
            ctl.session_by_name(name)?.ok_or_else(|| anyhow!("no session named {name}"))?.id
        }
        (None, None) => ctl.current_session()?.id,
    };

    let mut table = titled_table(&LS_HEADERS);
    for snap in ctl.list(&session_id, args.all)? {
        table.add_row(row(&snap, timestamp_format));
    }
    Ok(table)
}

/// Bordered table with a title separator and no lines between rows.
pub fn titled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(headers.iter().map(|h| Cell::new(h)).collect()));
    table
}

fn row(snap: &SnapshotRecord, timestamp_format: &str) -> Row {
    let data = snap.data();
    Row::new(vec![
        Cell::new(snap.id().as_str()),
        Cell::new(&Value::Object(data.config.clone()).to_string()),
        Cell::new(&Value::Object(data.stats.clone()).to_string()),
        Cell::new(data.message.as_deref().unwrap_or_default()),
        Cell::new(data.label.as_deref().unwrap_or_default()),
        Cell::new(&snap.created_at().format(timestamp_format).to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use trk_storage::InMemoryController;

    const FMT: &str = "%Y-%m-%d %H:%M:%S";

    #[test]
    fn create_prints_new_id() {
        let ctl = InMemoryController::new(".");
        let args = CreateArgs { message: "baseline".into(), code_id: "c1".into(), commit_id: "abc".into(), ..Default::default() };
        let mut out = Vec::new();
        run(&ctl, SnapshotCommand::Create(args), FMT, &mut out).unwrap();
        let id = String::from_utf8(out).unwrap().trim().to_string();

        let session = ctl.current_session().unwrap();
        let listed = ctl.list(&session.id, false).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id().as_str(), id);
        assert_eq!(listed[0].data().code_id.as_deref(), Some("c1"));
        assert_eq!(listed[0].data().message.as_deref(), Some("baseline"));
    }

    #[test]
    fn options_map_flags_onto_request_keys() {
        let args = CreateArgs {
            environment_def_path: "/tmp/Dockerfile".into(),
            filepaths: vec!["/data".into()],
            not_visible: true,
            ..Default::default()
        };
        let options = args.to_options();
        assert_eq!(options["environment_definition_filepath"], Value::from("/tmp/Dockerfile"));
        assert_eq!(options["file_collection"], serde_json::json!(["/data"]));
        assert_eq!(options["visible"], Value::Bool(false));

        let request = SnapshotRequestBuilder::new().build(&options);
        let keys: Vec<_> = request.keys().collect();
        assert_eq!(keys, vec!["environment_definition_filepath", "file_collection"]);
    }

    #[test]
    fn ls_renders_header_and_rows() {
        let ctl = InMemoryController::new(".");
        let id = create(&ctl, &CreateArgs { label: "best".into(), ..Default::default() }).unwrap();

        let table = ls(&ctl, &LsArgs::default(), FMT).unwrap();
        assert_eq!(table.len(), 1);
        let first = table.get_row(0).unwrap();
        assert_eq!(first.get_cell(0).unwrap().get_content(), id.as_str());
        assert_eq!(first.get_cell(1).unwrap().get_content(), "{}");
        assert_eq!(first.get_cell(4).unwrap().get_content(), "best");

        let created = ctl.list(&ctl.current_session().unwrap().id, false).unwrap()[0].created_at();
        assert_eq!(first.get_cell(5).unwrap().get_content(), created.format(FMT).to_string());

        let rendered = table.to_string();
        let lines: Vec<_> = rendered.lines().collect();
        assert!(lines[1].starts_with("| id "));
        assert!(lines[1].contains("created at"));
        assert!(lines[3].contains(id.as_str()));
    }

    #[test]
    fn ls_by_session_name() {
        let ctl = InMemoryController::new(".");
        create(&ctl, &CreateArgs::default()).unwrap();
        ctl.start_session("tuning").unwrap();

        let by_name = LsArgs { session_name: Some("default".into()), ..Default::default() };
        assert_eq!(ls(&ctl, &by_name, FMT).unwrap().len(), 1);

        let current = ls(&ctl, &LsArgs::default(), FMT).unwrap();
        assert_eq!(current.len(), 0);
        assert!(current.to_string().contains("message"));

        let unknown = LsArgs { session_name: Some("nope".into()), ..Default::default() };
        assert!(ls(&ctl, &unknown, FMT).is_err());
    }

    #[test]
    fn ls_prints_through_run() {
        let ctl = InMemoryController::new(".");
        let id = create(&ctl, &CreateArgs { message: "baseline".into(), ..Default::default() }).unwrap();
        let mut out = Vec::new();
        run(&ctl, SnapshotCommand::Ls(LsArgs::default()), FMT, &mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains(id.as_str()));
        assert!(printed.contains("baseline"));
    }

    #[test]
    fn create_with_wrong_typed_option_fails() {
        let ctl = InMemoryController::new(".");
        let mut options = CreateArgs::default().to_options();
        options.insert("task_id".into(), serde_json::json!(42));
        let request = SnapshotRequestBuilder::new().build(&options);
        assert!(ctl.create(&request).is_err());
    }

    #[test]
    fn delete_and_checkout_print_results() {
        let ctl = InMemoryController::new(".");
        let id = create(&ctl, &CreateArgs::default()).unwrap();

        let mut out = Vec::new();
        run(&ctl, SnapshotCommand::Checkout { id: id.0.clone() }, FMT, &mut out).unwrap();
        run(&ctl, SnapshotCommand::Delete { id: id.0.clone() }, FMT, &mut out).unwrap();
        run(&ctl, SnapshotCommand::Delete { id: id.0 }, FMT, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "true\ntrue\nfalse\n");
    }
}
