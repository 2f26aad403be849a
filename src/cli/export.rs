use std::path::PathBuf;

use crate::cli::Context;
use crate::error::Result;
use crate::reports::purchase_rows;

pub fn run(output: Option<String>) -> Result<()> {
    let ctx = Context::load()?;
    let conn = ctx.connection()?;
    let rows = purchase_rows(&conn)?;

    let path = match output {
        Some(p) => PathBuf::from(p),
        None => {
            let date = chrono::Local::now().format("%Y-%m-%d");
            ctx.settings
                .data_dir()
                .join("exports")
                .join(format!("purchases-{date}.csv"))
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(&path)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    println!("Wrote {} purchases to {}", rows.len(), path.display());
    Ok(())
}
