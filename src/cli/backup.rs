use std::path::{Path, PathBuf};

use rusqlite::backup::Backup;

use crate::cli::Context;
use crate::db::purchase_count;
use crate::error::{Result, SudsError};
use crate::fmt::format_bytes;

const PREFIX: &str = "suds-";

pub fn run(output: Option<String>) -> Result<()> {
    let ctx = Context::load()?;
    let conn = ctx.connection()?;
    let expected = purchase_count(&conn)?;

    let dest_path = match output {
        Some(p) => PathBuf::from(p),
        None => {
            let backups_dir = backups_dir(&ctx.settings.data_dir());
            std::fs::create_dir_all(&backups_dir)?;
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            backups_dir.join(format!("{PREFIX}{stamp}.db"))
        }
    };

    let mut dest_conn = rusqlite::Connection::open(&dest_path)?;
    {
        let backup = Backup::new(&conn, &mut dest_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
    }
    drop(dest_conn);

    let copied = verify(&dest_path, expected)?;
    let size = std::fs::metadata(&dest_path)?.len();
    println!("Backup saved to {}", dest_path.display());
    println!("Size: {} ({copied} purchases)", format_bytes(size));
    Ok(())
}

pub(crate) fn backups_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("backups")
}

/// Reopens the copy and checks it holds every purchase.
fn verify(path: &Path, expected: i64) -> Result<i64> {
    let conn = rusqlite::Connection::open(path)?;
    let copied = purchase_count(&conn)?;
    if copied != expected {
        return Err(SudsError::Integrity(format!(
            "backup at {} holds {copied} purchases, expected {expected}",
            path.display()
        )));
    }
    Ok(copied)
}

/// Newest `suds-YYYYMMDD-HHMMSS.db` in `dir`; the timestamped names sort in
/// time order.
pub(crate) fn latest_backup(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(".db"))
        })
        .max()
}
