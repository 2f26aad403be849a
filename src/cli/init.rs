use std::path::PathBuf;

use crate::db;
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(resolved.join("exports"))?;

    db::open(&settings.db_path())?;

    println!("Initialized suds at {}", resolved.display());
    if settings.source.endpoint.is_none() {
        println!("No source endpoint configured; use `suds run --fixture <file>` or set source.endpoint.");
    }
    Ok(())
}
