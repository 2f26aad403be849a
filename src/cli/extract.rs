use crate::cli::Context;
use crate::error::Result;
use crate::pipeline::ExtractReport;

pub fn run(fixture: Option<&str>) -> Result<()> {
    let ctx = Context::load()?;
    let mut source = ctx.source(fixture)?;
    let report = ctx.pipeline.extract(source.as_mut())?;
    print_report(&report);
    Ok(())
}

pub(crate) fn print_report(report: &ExtractReport) {
    if report.first_run {
        println!("Full fetch: {} entries", report.fetched);
    } else {
        println!(
            "{} new entries ({} fetched, {} already known)",
            report.added,
            report.fetched,
            report.fetched - report.added
        );
    }
    println!("Raw history now holds {} entries", report.total);
}
