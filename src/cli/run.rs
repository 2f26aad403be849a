use colored::Colorize;

use crate::cli::{load_mode, print_load_outcome, Context};
use crate::error::Result;
use crate::normalizer::TextNormalizer;

pub fn run(fixture: Option<&str>, upsert: bool) -> Result<()> {
    let ctx = Context::load()?;
    let mut source = ctx.source(fixture)?;
    let mut conn = ctx.connection()?;

    let report = ctx.pipeline.run(
        source.as_mut(),
        &TextNormalizer::default(),
        &mut conn,
        load_mode(upsert),
    )?;

    println!("{}", "Extract".bold());
    super::extract::print_report(&report.extract);
    println!("{}", "Clean".bold());
    super::clean::print_report(&report.clean);
    println!("{}", "Load".bold());
    print_load_outcome(&report.load);
    println!("{}", "Pipeline completed.".green().bold());
    Ok(())
}
