use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

// Money columns hold decimal text ("3.75"), never REAL.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Purchase (
    transaction_id INTEGER PRIMARY KEY,
    purchase_date TEXT NOT NULL,
    purchase_time TEXT NOT NULL,
    cardholder_name TEXT,
    cardholder_last4 TEXT,
    total_amount TEXT NOT NULL,
    purchase_type TEXT NOT NULL CHECK (purchase_type IN ('V', 'W'))
);

CREATE TABLE IF NOT EXISTS VacuumPurchase (
    transaction_id INTEGER PRIMARY KEY,
    vacuum_number INTEGER NOT NULL CHECK (vacuum_number BETWEEN 1 AND 6),
    FOREIGN KEY (transaction_id) REFERENCES Purchase(transaction_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS WashBayPurchase (
    id INTEGER PRIMARY KEY,
    transaction_id INTEGER NOT NULL,
    bay_number INTEGER NOT NULL CHECK (bay_number BETWEEN 1 AND 7),
    wash_purchase_total TEXT NOT NULL,
    FOREIGN KEY (transaction_id) REFERENCES Purchase(transaction_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_purchase_date ON Purchase(purchase_date);
CREATE INDEX IF NOT EXISTS idx_wash_bay_tx ON WashBayPurchase(transaction_id);

CREATE TABLE IF NOT EXISTS load_runs (
    id INTEGER PRIMARY KEY,
    loaded_at TEXT DEFAULT (datetime('now')),
    mode TEXT NOT NULL,
    purchase_count INTEGER NOT NULL,
    vacuum_count INTEGER NOT NULL,
    wash_bay_count INTEGER NOT NULL,
    head_transaction_id INTEGER,
    checksum TEXT
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    if let Some(dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Opens the database and makes sure the schema exists.
pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = get_connection(db_path)?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn purchase_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT count(*) FROM Purchase", [], |r| r.get(0))?)
}
