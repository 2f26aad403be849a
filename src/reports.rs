use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::error::{Result, SudsError};
use crate::models::{PurchaseType, BAY_NUMBERS, VACUUM_NUMBERS};

// ---------------------------------------------------------------------------
// Daily metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DailyMetrics {
    /// Date the figures are for.
    pub date: NaiveDate,
    /// Date that was asked for; differs from `date` after a fallback.
    pub requested: NaiveDate,
    pub grand_total: Decimal,
    pub wash_total: Decimal,
    pub vac_total: Decimal,
    pub bay_totals: BTreeMap<u8, Decimal>,
    pub vacuum_totals: BTreeMap<u8, Decimal>,
}

impl DailyMetrics {
    fn empty(date: NaiveDate, requested: NaiveDate) -> Self {
        Self {
            date,
            requested,
            grand_total: Decimal::ZERO,
            wash_total: Decimal::ZERO,
            vac_total: Decimal::ZERO,
            bay_totals: BAY_NUMBERS.map(|b| (b, Decimal::ZERO)).collect(),
            vacuum_totals: VACUUM_NUMBERS.map(|v| (v, Decimal::ZERO)).collect(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.date != self.requested
    }
}

fn money(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|_| SudsError::Other(format!("stored amount {raw:?} is not a decimal")))
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The date to report on: `requested` if it has purchases, else the latest
/// date that does. `None` when the store is empty.
fn effective_date(conn: &Connection, requested: NaiveDate) -> Result<Option<NaiveDate>> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM Purchase WHERE purchase_date = ?1",
        [fmt_date(requested)],
        |r| r.get(0),
    )?;
    if count > 0 {
        return Ok(Some(requested));
    }
    let latest: Option<String> =
        conn.query_row("SELECT MAX(purchase_date) FROM Purchase", [], |r| r.get(0))?;
    match latest {
        None => Ok(None),
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| SudsError::Other(format!("stored date {d:?} is not YYYY-MM-DD"))),
    }
}

/// Totals for one day: overall, per kind, per bay and per vacuum.
pub fn daily_metrics(conn: &Connection, requested: NaiveDate) -> Result<DailyMetrics> {
    let Some(date) = effective_date(conn, requested)? else {
        return Ok(DailyMetrics::empty(requested, requested));
    };
    let mut metrics = DailyMetrics::empty(date, requested);
    let day = fmt_date(date);

    let mut stmt =
        conn.prepare("SELECT purchase_type, total_amount FROM Purchase WHERE purchase_date = ?1")?;
    let rows = stmt.query_map([&day], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (kind, total) = row?;
        let total = money(&total)?;
        metrics.grand_total += total;
        match PurchaseType::from_code(&kind) {
            Some(PurchaseType::Wash) => metrics.wash_total += total,
            Some(PurchaseType::Vacuum) => metrics.vac_total += total,
            None => {}
        }
    }

    let mut stmt = conn.prepare(
        "SELECT w.bay_number, w.wash_purchase_total FROM WashBayPurchase w \
         JOIN Purchase p ON p.transaction_id = w.transaction_id \
         WHERE p.purchase_date = ?1",
    )?;
    let rows = stmt.query_map([&day], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (bay, total) = row?;
        if let Some(slot) = metrics.bay_totals.get_mut(&bay) {
            *slot += money(&total)?;
        }
    }

    let mut stmt = conn.prepare(
        "SELECT v.vacuum_number, p.total_amount FROM VacuumPurchase v \
         JOIN Purchase p ON p.transaction_id = v.transaction_id \
         WHERE p.purchase_date = ?1",
    )?;
    let rows = stmt.query_map([&day], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (vacuum, total) = row?;
        if let Some(slot) = metrics.vacuum_totals.get_mut(&vacuum) {
            *slot += money(&total)?;
        }
    }

    Ok(metrics)
}

// ---------------------------------------------------------------------------
// Store summary
// ---------------------------------------------------------------------------

pub struct StoreSummary {
    pub purchases: i64,
    pub vacuums: i64,
    pub wash_bays: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub last_load: Option<LastLoad>,
}

pub struct LastLoad {
    pub loaded_at: String,
    pub mode: String,
    pub purchase_count: i64,
}

pub fn store_summary(conn: &Connection) -> Result<StoreSummary> {
    let count = |table: &str| -> Result<i64> {
        Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?)
    };
    let (first_date, last_date): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(purchase_date), MAX(purchase_date) FROM Purchase",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let last_load = conn
        .prepare("SELECT loaded_at, mode, purchase_count FROM load_runs ORDER BY id DESC LIMIT 1")?
        .query_map([], |r| {
            Ok(LastLoad {
                loaded_at: r.get(0)?,
                mode: r.get(1)?,
                purchase_count: r.get(2)?,
            })
        })?
        .next()
        .transpose()?;
    Ok(StoreSummary {
        purchases: count("Purchase")?,
        vacuums: count("VacuumPurchase")?,
        wash_bays: count("WashBayPurchase")?,
        first_date,
        last_date,
        last_load,
    })
}

// ---------------------------------------------------------------------------
// Purchase listing
// ---------------------------------------------------------------------------

/// One loaded purchase, flattened for export. `units` is the vacuum number or
/// the bays with their amounts, e.g. "5:3.75 7:5.00".
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PurchaseRow {
    pub transaction_id: i64,
    pub purchase_date: String,
    pub purchase_time: String,
    pub cardholder_name: String,
    pub cardholder_last4: String,
    pub purchase_type: String,
    pub total_amount: String,
    pub units: String,
}

/// Every loaded purchase, newest first.
pub fn purchase_rows(conn: &Connection) -> Result<Vec<PurchaseRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.transaction_id, p.purchase_date, p.purchase_time,
                COALESCE(p.cardholder_name, ''), COALESCE(p.cardholder_last4, ''),
                p.purchase_type, p.total_amount,
                COALESCE(
                    CAST(v.vacuum_number AS TEXT),
                    (SELECT group_concat(w.bay_number || ':' || w.wash_purchase_total, ' ')
                     FROM WashBayPurchase w WHERE w.transaction_id = p.transaction_id),
                    ''
                )
         FROM Purchase p
         LEFT JOIN VacuumPurchase v ON v.transaction_id = p.transaction_id
         ORDER BY p.transaction_id DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(PurchaseRow {
                transaction_id: r.get(0)?,
                purchase_date: r.get(1)?,
                purchase_time: r.get(2)?,
                cardholder_name: r.get(3)?,
                cardholder_last4: r.get(4)?,
                purchase_type: r.get(5)?,
                total_amount: r.get(6)?,
                units: r.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open;
    use crate::loader::{load_batch, LoadMode};
    use crate::models::{Purchase, PurchaseDetail, WashBayPurchase};
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&dir.path().join("test.db")).unwrap();
        (dir, conn)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, d).unwrap()
    }

    fn purchase(id: i64, date: NaiveDate, total: Decimal, detail: PurchaseDetail) -> Purchase {
        Purchase {
            transaction_id: id,
            purchase_date: date,
            purchase_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            cardholder_name: "EMV-TAP".into(),
            cardholder_last4: "0420".into(),
            total_amount: total,
            detail,
        }
    }

    fn seed(conn: &mut Connection) {
        let records = vec![
            purchase(
                4,
                day(26),
                dec!(8.75),
                PurchaseDetail::Wash {
                    wash_bay_purchases: vec![
                        WashBayPurchase { bay_number: 5, wash_purchase_total: dec!(3.75) },
                        WashBayPurchase { bay_number: 7, wash_purchase_total: dec!(5.00) },
                    ],
                },
            ),
            purchase(3, day(26), dec!(1.50), PurchaseDetail::Vacuum { vacuum_number: 2 }),
            purchase(2, day(26), dec!(1.50), PurchaseDetail::Vacuum { vacuum_number: 2 }),
            purchase(1, day(25), dec!(0.05), PurchaseDetail::Vacuum { vacuum_number: 6 }),
        ];
        load_batch(conn, &records, LoadMode::Insert, None).unwrap();
    }

    #[test]
    fn test_daily_metrics_for_date_with_data() {
        let (_dir, mut conn) = test_db();
        seed(&mut conn);
        let m = daily_metrics(&conn, day(26)).unwrap();
        assert!(!m.is_fallback());
        assert_eq!(m.grand_total, dec!(11.75));
        assert_eq!(m.wash_total, dec!(8.75));
        assert_eq!(m.vac_total, dec!(3.00));
        assert_eq!(m.bay_totals[&5], dec!(3.75));
        assert_eq!(m.bay_totals[&1], Decimal::ZERO);
        assert_eq!(m.bay_totals.len(), 7);
        assert_eq!(m.vacuum_totals[&2], dec!(3.00));
        assert_eq!(m.vacuum_totals.len(), 6);
    }

    #[test]
    fn test_daily_metrics_falls_back_to_latest_date() {
        let (_dir, mut conn) = test_db();
        seed(&mut conn);
        let m = daily_metrics(&conn, day(30)).unwrap();
        assert!(m.is_fallback());
        assert_eq!(m.date, day(26));
        assert_eq!(m.requested, day(30));
        assert_eq!(m.grand_total, dec!(11.75));
    }

    #[test]
    fn test_daily_metrics_empty_store() {
        let (_dir, conn) = test_db();
        let m = daily_metrics(&conn, day(1)).unwrap();
        assert_eq!(m.date, day(1));
        assert_eq!(m.grand_total, Decimal::ZERO);
        assert!(m.bay_totals.values().all(|v| v.is_zero()));
    }

    #[test]
    fn test_store_summary() {
        let (_dir, mut conn) = test_db();
        let empty = store_summary(&conn).unwrap();
        assert_eq!(empty.purchases, 0);
        assert!(empty.last_load.is_none());

        seed(&mut conn);
        let s = store_summary(&conn).unwrap();
        assert_eq!(s.purchases, 4);
        assert_eq!(s.vacuums, 3);
        assert_eq!(s.wash_bays, 2);
        assert_eq!(s.first_date.as_deref(), Some("2025-11-25"));
        assert_eq!(s.last_date.as_deref(), Some("2025-11-26"));
        assert_eq!(s.last_load.unwrap().purchase_count, 4);
    }

    #[test]
    fn test_purchase_rows_flatten_units() {
        let (_dir, mut conn) = test_db();
        seed(&mut conn);
        let rows = purchase_rows(&conn).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].transaction_id, 4);
        assert_eq!(rows[0].purchase_type, "W");
        assert_eq!(rows[0].total_amount, "8.75");
        assert!(rows[0].units.contains("5:3.75"));
        assert!(rows[0].units.contains("7:5.00"));
        assert_eq!(rows[3].units, "6");
    }
}
