mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    EntryFields, ProfileUpdate, Service, cmd_add, cmd_export, cmd_history, cmd_import, cmd_list,
    cmd_month, cmd_profile_set, cmd_profile_show, cmd_remove, cmd_streak, cmd_summary,
    cmd_target_history, cmd_target_set, cmd_target_show, cmd_update, cmd_week,
};
use crate::config::Config;
use proteus_core::clock::SystemClock;

/// Log filter, e.g. `PROTEUS_LOG=debug` or `PROTEUS_LOG=proteus_core=trace`.
const LOG_ENV: &str = "PROTEUS_LOG";

#[derive(Parser)]
#[command(
    name = "proteus",
    version,
    about = "A simple daily protein tracker",
    long_about = "Log protein as you eat it, track it against a daily goal, \
and keep an eye on weekly and monthly averages and your streak."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log an amount of protein
    Add {
        /// Grams of protein (e.g. "30" or "30g")
        grams: String,
        /// Date to log for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time eaten (HH:MM, default: now)
        #[arg(long)]
        time: Option<String>,
        /// Food name
        #[arg(long)]
        food: Option<String>,
        /// Free-form description
        #[arg(long = "desc")]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries for a day (defaults to today)
    List {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update an entry (grams, time, food, or description)
    Update {
        /// Entry ID (or a unique prefix)
        id: String,
        /// Only look for the entry on this date
        #[arg(long)]
        date: Option<String>,
        /// New amount in grams
        #[arg(short, long)]
        grams: Option<String>,
        /// New time (HH:MM)
        #[arg(long)]
        time: Option<String>,
        /// New food name
        #[arg(long)]
        food: Option<String>,
        /// New description
        #[arg(long = "desc")]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an entry by ID
    Remove {
        /// Entry ID (or a unique prefix)
        id: String,
        /// Only look for the entry on this date
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the daily protein target
    Target {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Manage your profile (weight drives the recommended target)
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show a day's total against its target (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Average daily protein for a week
    Week {
        /// First day of the week (default: this Monday)
        #[arg(long)]
        start: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Average daily protein for a calendar month
    Month {
        /// Any day in the month (default: this month)
        #[arg(long)]
        start: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how many days in a row you have hit your target
    Streak {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show totals against targets for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the whole log (JSON by default)
    Export {
        /// File to write (default: stdout)
        file: Option<PathBuf>,
        /// Export entries as CSV instead
        #[arg(long)]
        csv: bool,
        /// Output status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a JSON export (replaces the log) or a CSV file (appends entries)
    Import {
        /// Path to the file
        file: PathBuf,
        /// Read the file as CSV (Date,Time,Grams,Food,Description)
        #[arg(long)]
        csv: bool,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Set the daily target from a date onward ("unset" returns to the recommended goal)
    Set {
        /// Grams of protein per day, or "unset"
        value: String,
        /// First day the target applies (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the target in effect on a date
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every target change
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create or update the profile
    Set {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Body weight
        #[arg(short, long)]
        weight: Option<f64>,
        /// Weight unit: kg or lb (default: kg)
        #[arg(short, long)]
        unit: Option<String>,
        /// First day of tracking (default: today)
        #[arg(long)]
        inception: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the profile and recommended target
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    debug!(db = %config.db_path.display(), "opening database");
    let mut svc: Service = Service::open(&config.db_path, SystemClock)?;

    match cli.command {
        Commands::Add {
            grams,
            date,
            time,
            food,
            description,
            json,
        } => cmd_add(
            &mut svc,
            &grams,
            date,
            EntryFields {
                time,
                food,
                description,
            },
            json,
        ),
        Commands::List { date, json } => cmd_list(&svc, date, json),
        Commands::Update {
            id,
            date,
            grams,
            time,
            food,
            description,
            json,
        } => cmd_update(
            &mut svc,
            &id,
            date,
            grams.as_deref(),
            EntryFields {
                time,
                food,
                description,
            },
            json,
        ),
        Commands::Remove { id, date, json } => cmd_remove(&mut svc, &id, date, json),
        Commands::Target { command } => match command {
            TargetCommands::Set { value, date, json } => cmd_target_set(&mut svc, &value, date, json),
            TargetCommands::Show { date, json } => cmd_target_show(&svc, date, json),
            TargetCommands::History { json } => cmd_target_history(&svc, json),
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                name,
                weight,
                unit,
                inception,
                json,
            } => cmd_profile_set(
                &mut svc,
                ProfileUpdate {
                    name,
                    weight,
                    unit,
                    inception,
                },
                json,
            ),
            ProfileCommands::Show { json } => cmd_profile_show(&svc, json),
        },
        Commands::Summary { date, json } => cmd_summary(&svc, date, json),
        Commands::Week { start, json } => cmd_week(&svc, start, json),
        Commands::Month { start, json } => cmd_month(&svc, start, json),
        Commands::Streak { json } => cmd_streak(&svc, json),
        Commands::History { days, json } => cmd_history(&svc, days, json),
        Commands::Export { file, csv, json } => cmd_export(&svc, file.as_deref(), csv, json),
        Commands::Import {
            file,
            csv,
            dry_run,
            json,
        } => cmd_import(&mut svc, &file, csv, dry_run, json),
    }
}
