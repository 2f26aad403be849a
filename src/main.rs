mod cli;
mod db;
mod delta;
mod error;
mod fmt;
mod history;
mod loader;
mod models;
mod normalizer;
mod pipeline;
mod reports;
mod settings;
mod source;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Run { fixture, upsert } => cli::run::run(fixture.as_deref(), upsert),
        Commands::Extract { fixture } => cli::extract::run(fixture.as_deref()),
        Commands::Clean => cli::clean::run(),
        Commands::Load { upsert } => cli::load::run(upsert),
        Commands::Report { date } => cli::report::run(date),
        Commands::Dupes => cli::dupes::run(),
        Commands::Export { output } => cli::export::run(output),
        Commands::Status => cli::status::run(),
        Commands::Backup { output } => cli::backup::run(output),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
