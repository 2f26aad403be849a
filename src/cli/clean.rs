use crate::cli::Context;
use crate::delta::{DeltaOutcome, ScanMode};
use crate::error::Result;
use crate::normalizer::TextNormalizer;

pub fn run() -> Result<()> {
    let ctx = Context::load()?;
    let outcome = ctx.pipeline.clean(&TextNormalizer::default())?;
    print_report(&outcome);
    Ok(())
}

pub(crate) fn print_report(outcome: &DeltaOutcome) {
    match outcome.mode {
        ScanMode::FirstRun => println!("First clean: {} purchases normalized", outcome.delta.len()),
        ScanMode::Incremental { watermark, hit } => {
            println!("{} new purchases since transaction {watermark}", outcome.delta.len());
            if !hit {
                println!("(watermark not found in raw history; every scanned entry was new)");
            }
        }
    }
    if outcome.is_empty() {
        println!("Raw history is fully cleaned ({} entries scanned)", outcome.scanned);
    }
    if outcome.skipped > 0 {
        println!("{} entries skipped for reused transaction ids", outcome.skipped);
    }
    println!("Cleaned history now holds {} purchases", outcome.history.len());
}
