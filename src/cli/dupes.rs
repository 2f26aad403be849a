use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::Context;
use crate::error::Result;
use crate::pipeline::load_raw_or_empty;

pub fn run() -> Result<()> {
    let ctx = Context::load()?;
    let raw = load_raw_or_empty(ctx.pipeline.artifacts())?;
    let dupes = raw.duplicate_ids();

    if dupes.is_empty() {
        println!("{}", "No reused transaction ids.".green());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Transaction", "Date/time", "Cardholder", "Total"]);
    for (id, entries) in &dupes {
        for entry in entries {
            table.add_row(vec![
                Cell::new(id),
                Cell::new(entry.datetime.trim()),
                Cell::new(entry.cardholder.trim()),
                Cell::new(entry.total.trim()),
            ]);
        }
    }
    println!("{table}");
    println!(
        "{} ids appear more than once; only the newest entry of each is cleaned.",
        dupes.len().to_string().yellow().bold()
    );
    Ok(())
}
