use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trk_project::Project;

mod session;
mod snapshot;

use session::SessionCommand;
use snapshot::SnapshotCommand;

#[derive(Parser)]
#[command(name = "trk", version)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a project in the root directory (creates .trk/, config, db)
    Init {
        #[arg(long)]
        name: Option<String>,
    },

    /// Snapshot module
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Session module
    #[command(subcommand)]
    Session(SessionCommand),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    match cli.cmd {
        Command::Init { name } => {
            let project = Project::init(&root, name.as_deref())?;
            println!("Initialized {} in {}", project.cfg.project.name, root.display());
        }
        Command::Snapshot(cmd) => {
            let project = Project::open(root)?;
            let mut stdout = std::io::stdout().lock();
            snapshot::run(&project.controller, cmd, &project.cfg.snapshots.timestamp_format, &mut stdout)?;
        }
        Command::Session(cmd) => {
            let project = Project::open(root)?;
            let mut stdout = std::io::stdout().lock();
            session::run(&project.controller, cmd, &project.cfg.snapshots.timestamp_format, &mut stdout)?;
        }
    }

    Ok(())
}
