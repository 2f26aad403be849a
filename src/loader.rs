use rusqlite::{Connection, OptionalExtension, Transaction};
use rust_decimal::Decimal;

use crate::db::purchase_count;
use crate::error::{Result, SudsError};
use crate::history::{file_checksum, read_json, records_checksum, Artifacts};
use crate::models::{Purchase, PurchaseDetail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// An id that is already stored aborts the batch.
    Insert,
    /// Existing rows for an id are replaced, children included.
    Upsert,
}

impl LoadMode {
    fn key(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Upsert => "upsert",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub purchases: usize,
    pub vacuums: usize,
    pub wash_bays: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    /// Empty store and no cleaned history to seed it with.
    NoHistory,
    /// Store already seeded but no clean run has produced a delta.
    NoDelta,
    /// The last clean run found nothing new.
    EmptyDelta,
    /// This exact delta file was committed by the latest load.
    AlreadyLoaded,
}

#[derive(Debug, Clone)]
pub enum LoadPlan {
    Full { records: Vec<Purchase>, checksum: String },
    Delta { records: Vec<Purchase>, checksum: String },
    Noop(NoopReason),
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded { full: bool, counts: LoadCounts },
    Skipped(NoopReason),
}

fn money_text(value: Decimal) -> String {
    let mut value = value.round_dp(2);
    value.rescale(2);
    value.to_string()
}

/// The most recent committed load run.
struct LastRun {
    head_transaction_id: Option<i64>,
    checksum: Option<String>,
}

fn last_run(conn: &Connection) -> Result<Option<LastRun>> {
    Ok(conn
        .query_row(
            "SELECT head_transaction_id, checksum FROM load_runs ORDER BY id DESC LIMIT 1",
            [],
            |r| {
                Ok(LastRun {
                    head_transaction_id: r.get(0)?,
                    checksum: r.get(1)?,
                })
            },
        )
        .optional()?)
}

/// Picks what to load.
///
/// An empty store gets the full cleaned history. Once seeded, everything in
/// the cleaned history above the head of the last committed run is pending,
/// which is normally exactly the latest delta. Going by the committed head
/// means a delta that a later clean replaced before it was loaded still gets
/// loaded. When that head is not in the cleaned history the delta file is
/// used as is.
pub fn plan_load(conn: &Connection, artifacts: &Artifacts, mode: LoadMode) -> Result<LoadPlan> {
    let history = read_json::<Vec<Purchase>>(&artifacts.cleaned)?;

    if purchase_count(conn)? == 0 {
        return Ok(match history {
            Some(records) if !records.is_empty() => {
                let checksum = file_checksum(&artifacts.cleaned)?;
                LoadPlan::Full { records, checksum }
            }
            _ => LoadPlan::Noop(NoopReason::NoHistory),
        });
    }

    let last = last_run(conn)?;
    let committed_head = last.as_ref().and_then(|run| run.head_transaction_id);
    let pending = history.and_then(|history| {
        let head = committed_head?;
        let pos = history.iter().position(|p| p.transaction_id == head)?;
        let mut records = history;
        records.truncate(pos);
        Some(records)
    });
    if let Some(records) = pending {
        if records.is_empty() {
            return Ok(LoadPlan::Noop(NoopReason::EmptyDelta));
        }
        if let Some(delta) = read_json::<Vec<Purchase>>(&artifacts.delta)? {
            if delta.len() < records.len() {
                tracing::warn!(
                    pending = records.len(),
                    delta = delta.len(),
                    "loading purchases left behind by an earlier unfinished run"
                );
            }
        }
        let checksum = records_checksum(&records)?;
        return Ok(LoadPlan::Delta { records, checksum });
    }

    tracing::debug!(?committed_head, "committed head not in cleaned history, using the delta file");
    let Some(records) = read_json::<Vec<Purchase>>(&artifacts.delta)? else {
        return Ok(LoadPlan::Noop(NoopReason::NoDelta));
    };
    if records.is_empty() {
        return Ok(LoadPlan::Noop(NoopReason::EmptyDelta));
    }
    let checksum = file_checksum(&artifacts.delta)?;
    let last_checksum = last.and_then(|run| run.checksum);
    if mode == LoadMode::Insert && last_checksum.as_deref() == Some(checksum.as_str()) {
        return Ok(LoadPlan::Noop(NoopReason::AlreadyLoaded));
    }
    Ok(LoadPlan::Delta { records, checksum })
}

fn exists(tx: &Transaction, transaction_id: i64) -> Result<bool> {
    let mut stmt = tx.prepare_cached("SELECT 1 FROM Purchase WHERE transaction_id = ?1")?;
    Ok(stmt.exists([transaction_id])?)
}

fn remove(tx: &Transaction, transaction_id: i64) -> Result<()> {
    tx.execute("DELETE FROM VacuumPurchase WHERE transaction_id = ?1", [transaction_id])?;
    tx.execute("DELETE FROM WashBayPurchase WHERE transaction_id = ?1", [transaction_id])?;
    tx.execute("DELETE FROM Purchase WHERE transaction_id = ?1", [transaction_id])?;
    Ok(())
}

fn insert_purchase(tx: &Transaction, p: &Purchase, counts: &mut LoadCounts) -> Result<()> {
    tx.prepare_cached(
        "INSERT INTO Purchase (transaction_id, purchase_date, purchase_time, cardholder_name, \
         cardholder_last4, total_amount, purchase_type) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(rusqlite::params![
        p.transaction_id,
        p.purchase_date.format("%Y-%m-%d").to_string(),
        p.purchase_time.format("%H:%M:%S").to_string(),
        p.cardholder_name,
        p.cardholder_last4,
        money_text(p.total_amount),
        p.purchase_type().code(),
    ])?;
    counts.purchases += 1;

    match &p.detail {
        PurchaseDetail::Vacuum { vacuum_number } => {
            tx.prepare_cached(
                "INSERT INTO VacuumPurchase (transaction_id, vacuum_number) VALUES (?1, ?2)",
            )?
            .execute(rusqlite::params![p.transaction_id, vacuum_number])?;
            counts.vacuums += 1;
        }
        PurchaseDetail::Wash { wash_bay_purchases } => {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO WashBayPurchase (transaction_id, bay_number, wash_purchase_total) \
                 VALUES (?1, ?2, ?3)",
            )?;
            for bay in wash_bay_purchases {
                stmt.execute(rusqlite::params![
                    p.transaction_id,
                    bay.bay_number,
                    money_text(bay.wash_purchase_total),
                ])?;
                counts.wash_bays += 1;
            }
        }
    }
    Ok(())
}

/// Writes `records` and their children in one transaction. Any failure rolls
/// the whole batch back.
pub fn load_batch(
    conn: &mut Connection,
    records: &[Purchase],
    mode: LoadMode,
    checksum: Option<&str>,
) -> Result<LoadCounts> {
    for p in records {
        p.validate()?;
    }

    let tx = conn.transaction()?;
    let mut counts = LoadCounts::default();
    for p in records {
        if exists(&tx, p.transaction_id)? {
            match mode {
                LoadMode::Insert => {
                    return Err(SudsError::Integrity(format!(
                        "transaction {} is already loaded",
                        p.transaction_id
                    )));
                }
                LoadMode::Upsert => remove(&tx, p.transaction_id)?,
            }
        }
        insert_purchase(&tx, p, &mut counts)?;
    }

    tx.execute(
        "INSERT INTO load_runs (mode, purchase_count, vacuum_count, wash_bay_count, \
         head_transaction_id, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            mode.key(),
            counts.purchases as i64,
            counts.vacuums as i64,
            counts.wash_bays as i64,
            records.first().map(|p| p.transaction_id),
            checksum,
        ],
    )?;
    tx.commit()?;

    tracing::info!(
        purchases = counts.purchases,
        vacuums = counts.vacuums,
        wash_bays = counts.wash_bays,
        mode = mode.key(),
        "committed load batch"
    );
    Ok(counts)
}

/// Plans and applies one load run.
pub fn run_load(conn: &mut Connection, artifacts: &Artifacts, mode: LoadMode) -> Result<LoadOutcome> {
    match plan_load(conn, artifacts, mode)? {
        LoadPlan::Noop(reason) => {
            tracing::info!(?reason, "nothing to load");
            Ok(LoadOutcome::Skipped(reason))
        }
        LoadPlan::Full { records, checksum } => {
            let counts = load_batch(conn, &records, mode, Some(&checksum))?;
            Ok(LoadOutcome::Loaded { full: true, counts })
        }
        LoadPlan::Delta { records, checksum } => {
            let counts = load_batch(conn, &records, mode, Some(&checksum))?;
            Ok(LoadOutcome::Loaded { full: false, counts })
        }
    }
}
