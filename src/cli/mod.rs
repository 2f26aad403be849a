pub mod backup;
pub mod clean;
pub mod dupes;
pub mod export;
pub mod extract;
pub mod init;
pub mod load;
pub mod report;
pub mod run;
pub mod status;

use std::path::Path;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rusqlite::Connection;

use crate::db;
use crate::error::Result;
use crate::history::Artifacts;
use crate::loader::{LoadMode, LoadOutcome, NoopReason};
use crate::pipeline::Pipeline;
use crate::settings::{load_settings, Settings};
use crate::source::{FixtureSource, HttpSource, PurchaseSource};

#[derive(Parser)]
#[command(name = "suds", about = "Incremental purchase ETL for self-serve car washes.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for suds data (default: ~/Documents/suds)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Extract, clean and load in one go.
    Run {
        /// Replay raw entries from a JSON file instead of the live source
        #[arg(long)]
        fixture: Option<String>,
        /// Replace already-loaded purchases instead of failing on them
        #[arg(long)]
        upsert: bool,
    },
    /// Fetch new raw entries into the raw history.
    Extract {
        /// Replay raw entries from a JSON file instead of the live source
        #[arg(long)]
        fixture: Option<String>,
    },
    /// Normalize raw history past the watermark into the cleaned history and delta.
    Clean,
    /// Load the cleaned history (first time) or the latest delta into the database.
    Load {
        /// Replace already-loaded purchases instead of failing on them
        #[arg(long)]
        upsert: bool,
    },
    /// Daily totals: overall, wash, vacuum, per bay and per vacuum.
    Report {
        /// Date: YYYY-MM-DD (default: today; falls back to the latest day with data)
        #[arg(long)]
        date: Option<String>,
    },
    /// List transaction ids that appear more than once in the raw history.
    Dupes,
    /// Export loaded purchases to CSV.
    Export {
        /// Output path (default: <data_dir>/exports/purchases-YYYY-MM-DD.csv)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show data locations, watermark and row counts.
    Status,
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/suds-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
}

pub(crate) struct Context {
    pub settings: Settings,
    pub pipeline: Pipeline,
}

impl Context {
    pub fn load() -> Result<Self> {
        let settings = load_settings()?;
        let pipeline = Pipeline::new(Artifacts::in_dir(&settings.data_dir()));
        Ok(Self { settings, pipeline })
    }

    pub fn connection(&self) -> Result<Connection> {
        db::open(&self.settings.db_path())
    }

    pub fn source(&self, fixture: Option<&str>) -> Result<Box<dyn PurchaseSource>> {
        let source: Box<dyn PurchaseSource> = match fixture {
            Some(path) => Box::new(FixtureSource::from_file(Path::new(path))?),
            None => Box::new(HttpSource::new(&self.settings.source)?),
        };
        Ok(source)
    }
}

pub(crate) fn load_mode(upsert: bool) -> LoadMode {
    if upsert {
        LoadMode::Upsert
    } else {
        LoadMode::Insert
    }
}

pub(crate) fn print_load_outcome(outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Loaded { full, counts } => {
            let what = if *full { "full history" } else { "delta" };
            println!(
                "{} {what}: {} purchases, {} vacuum rows, {} wash bay rows",
                "Loaded".green().bold(),
                counts.purchases,
                counts.vacuums,
                counts.wash_bays
            );
        }
        LoadOutcome::Skipped(reason) => {
            let why = match reason {
                NoopReason::NoHistory => "no cleaned history yet",
                NoopReason::NoDelta => "no delta has been produced yet",
                NoopReason::EmptyDelta => "no new purchases",
                NoopReason::AlreadyLoaded => "this delta was already loaded",
            };
            println!("{} ({why})", "Nothing to load".yellow());
        }
    }
}
