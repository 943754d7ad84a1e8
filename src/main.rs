mod cli;

use anyhow::Result;
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use medrem::config::MedremConfig;
use medrem::medicine::types::MedicineEdit;

#[derive(Parser)]
#[command(name = "medrem", version, about = "Medicine reminders backed by a persistent schedule")]
struct Cli {
    /// Config file (default: ~/.medrem/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User to act as (default: storage.default_user)
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run due reminders until Ctrl-C
    Serve {
        /// Re-register every user's reminders before starting
        #[arg(long)]
        resync: bool,
    },
    /// Add a medicine and schedule its reminders
    Add {
        name: String,
        #[arg(long)]
        dosage: String,
        /// Time of day (HH:MM or HH:MM:SS); repeat for several
        #[arg(long = "time", required = true, value_parser = cli::parse_time)]
        times: Vec<NaiveTime>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List medicines
    List {
        /// Only medicines not yet taken
        #[arg(long)]
        pending: bool,
        /// Only medicines scheduled at this time
        #[arg(long, value_parser = cli::parse_time)]
        at: Option<NaiveTime>,
        #[arg(long)]
        json: bool,
    },
    /// Change a medicine; new times replace the old ones
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        dosage: Option<String>,
        /// Time of day (HH:MM or HH:MM:SS); repeat for several
        #[arg(long = "time", value_parser = cli::parse_time)]
        times: Vec<NaiveTime>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Mark a medicine as taken
    Take { id: i64 },
    /// Mark a medicine as missed
    Miss { id: i64 },
    /// Delete a medicine
    Delete { id: i64 },
    /// Run one due check now, as a tick would
    Check {
        /// Pretend the local time is this
        #[arg(long, value_parser = cli::parse_time)]
        at: Option<NaiveTime>,
    },
    /// Show scheduled reminders
    Schedules {
        #[arg(long)]
        json: bool,
    },
    /// Re-register reminders from stored medicines
    Resync {
        /// Every user, not just the current one
        #[arg(long)]
        all: bool,
    },
    /// Show notifications written by the outbox sink
    Notifications,
    /// Run database diagnostics
    Doctor,
    /// Ask a how-to question
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MedremConfig::load_from(path)?,
        None => MedremConfig::load()?,
    };

    // Log to stderr so command output stays clean on stdout.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let user = cli
        .user
        .clone()
        .unwrap_or_else(|| config.storage.default_user.clone());

    match cli.command {
        Command::Serve { resync } => cli::serve::serve(&config, resync).await?,
        Command::Add {
            name,
            dosage,
            times,
            notes,
        } => cli::medicine::add(&config, &user, name, dosage, times, notes).await?,
        Command::List { pending, at, json } => {
            cli::medicine::list(&config, &user, pending, at, json).await?
        }
        Command::Edit {
            id,
            name,
            dosage,
            times,
            notes,
        } => {
            let edit = MedicineEdit {
                name,
                dosage,
                times: (!times.is_empty()).then_some(times),
                notes,
            };
            cli::medicine::edit(&config, id, edit).await?
        }
        Command::Take { id } => cli::medicine::set_status(&config, id, true).await?,
        Command::Miss { id } => cli::medicine::set_status(&config, id, false).await?,
        Command::Delete { id } => cli::medicine::delete(&config, id).await?,
        Command::Check { at } => cli::reminders::check(&config, &user, at).await?,
        Command::Schedules { json } => cli::reminders::schedules(&config, &user, json).await?,
        Command::Resync { all } => cli::reminders::resync(&config, &user, all).await?,
        Command::Notifications => cli::reminders::notifications(&config, &user).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Ask { query } => cli::ask(&query.join(" ")),
    }

    Ok(())
}
