use crate::cli::{load_mode, print_load_outcome, Context};
use crate::error::Result;

pub fn run(upsert: bool) -> Result<()> {
    let ctx = Context::load()?;
    let mut conn = ctx.connection()?;
    let outcome = ctx.pipeline.load(&mut conn, load_mode(upsert))?;
    print_load_outcome(&outcome);
    Ok(())
}
