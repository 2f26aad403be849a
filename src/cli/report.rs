use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::Context;
use crate::error::{Result, SudsError};
use crate::fmt::money;
use crate::reports::{daily_metrics, DailyMetrics};

pub fn run(date: Option<String>) -> Result<()> {
    let requested = match date {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map_err(|_| SudsError::Other(format!("invalid date {d:?}, expected YYYY-MM-DD")))?,
        None => chrono::Local::now().date_naive(),
    };
    let ctx = Context::load()?;
    let conn = ctx.connection()?;
    let metrics = daily_metrics(&conn, requested)?;
    print_metrics(&metrics);
    Ok(())
}

fn money_cell(val: rust_decimal::Decimal) -> Cell {
    Cell::new(money(val)).set_alignment(CellAlignment::Right)
}

fn print_metrics(m: &DailyMetrics) {
    if m.is_fallback() {
        println!(
            "{}",
            format!("No purchases on {}; showing {} instead.", m.requested, m.date).yellow()
        );
    }
    println!("{}", format!("Daily report for {}", m.date).bold());

    let mut totals = Table::new();
    totals.set_header(vec!["", "Amount"]);
    totals.add_row(vec![Cell::new("Wash"), money_cell(m.wash_total)]);
    totals.add_row(vec![Cell::new("Vacuum"), money_cell(m.vac_total)]);
    totals.add_row(vec![
        Cell::new("Total"),
        Cell::new(money(m.grand_total).bold().to_string()).set_alignment(CellAlignment::Right),
    ]);
    println!("{totals}");

    let mut bays = Table::new();
    bays.set_header(vec!["Bay", "Amount"]);
    for (bay, total) in &m.bay_totals {
        bays.add_row(vec![Cell::new(bay), money_cell(*total)]);
    }
    println!("{bays}");

    let mut vacuums = Table::new();
    vacuums.set_header(vec!["Vacuum", "Amount"]);
    for (vacuum, total) in &m.vacuum_totals {
        vacuums.add_row(vec![Cell::new(vacuum), money_cell(*total)]);
    }
    println!("{vacuums}");
}
