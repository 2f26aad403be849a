use crate::cli::Context;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::pipeline::load_raw_or_empty;
use crate::reports::store_summary;

pub fn run() -> Result<()> {
    let ctx = Context::load()?;
    let data_dir = ctx.settings.data_dir();
    let db_path = ctx.settings.db_path();
    let artifacts = ctx.pipeline.artifacts();

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());
    println!(
        "Source:     {}",
        ctx.settings.source.endpoint.as_deref().unwrap_or("(not set)")
    );

    let raw = load_raw_or_empty(artifacts)?;
    let cleaned = artifacts.load_cleaned()?;
    let delta = artifacts.load_delta()?;

    println!();
    println!("Raw entries:   {}", raw.len());
    match &cleaned {
        Some(history) => {
            println!("Cleaned:       {}", history.len());
            match history.first() {
                Some(head) => println!("Watermark:     {}", head.transaction_id),
                None => println!("Watermark:     (none)"),
            }
        }
        None => println!("Cleaned:       (never run)"),
    }
    match &delta {
        Some(d) => println!("Last delta:    {}", d.len()),
        None => println!("Last delta:    (none)"),
    }

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:       {}", format_bytes(size));

        let conn = ctx.connection()?;
        let summary = store_summary(&conn)?;
        println!();
        println!("Purchases:     {}", summary.purchases);
        println!("Vacuum rows:   {}", summary.vacuums);
        println!("Wash bay rows: {}", summary.wash_bays);
        if let (Some(first), Some(last)) = (&summary.first_date, &summary.last_date) {
            println!("Date range:    {first} to {last}");
        }
        if let Some(load) = summary.last_load {
            println!(
                "Last load:     {} ({}, {} purchases)",
                load.loaded_at, load.mode, load.purchase_count
            );
        }
        match super::backup::latest_backup(&super::backup::backups_dir(&data_dir)) {
            Some(path) => println!("Last backup:   {}", path.display()),
            None => println!("Last backup:   (none)"),
        }
    } else {
        println!();
        println!("Database not found. Run `suds init` to set up.");
    }

    Ok(())
}
