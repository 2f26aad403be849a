//! Incremental delta computation.
//!
//! Raw and normalized histories are both newest first. The head of the
//! normalized history is the watermark: scanning the raw history from its head,
//! everything before the watermark is new and everything from it onward has
//! already been normalized in an earlier run.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Purchase, RawEntry};
use crate::normalizer::Normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// No prior normalized history; every raw entry was normalized.
    FirstRun,
    /// Scanned down to `watermark`. `hit` is false when the raw history ran
    /// out first, which just means everything scanned was new.
    Incremental { watermark: i64, hit: bool },
}

#[derive(Debug, Clone)]
pub struct DeltaOutcome {
    /// Newly normalized purchases, newest first.
    pub delta: Vec<Purchase>,
    /// `delta ++ previous history`.
    pub history: Vec<Purchase>,
    pub mode: ScanMode,
    /// Raw entries looked at, including the watermark entry if reached.
    pub scanned: usize,
    /// Raw entries passed over because their id was already known.
    pub skipped: usize,
}

impl DeltaOutcome {
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }
}

fn parse_id(raw: &RawEntry) -> Option<i64> {
    raw.transaction_id.trim().parse().ok()
}

/// Computes the purchases in `raw` that `history` does not reflect yet.
///
/// Any normalization failure aborts the whole computation: skipping a record
/// would leave it below the next watermark where it would never be revisited.
pub fn compute_delta(
    history: &[Purchase],
    raw: &[RawEntry],
    normalizer: &dyn Normalizer,
) -> Result<DeltaOutcome> {
    let watermark = history.first().map(|p| p.transaction_id);
    let mut known: HashSet<i64> = history.iter().map(|p| p.transaction_id).collect();

    let mut delta = Vec::new();
    let mut scanned = 0usize;
    let mut skipped = 0usize;
    let mut hit = false;

    for (position, entry) in raw.iter().enumerate() {
        scanned += 1;
        let id = parse_id(entry);

        if watermark.is_some() && id == watermark {
            hit = true;
            break;
        }
        if let Some(id) = id {
            if known.contains(&id) {
                tracing::warn!(
                    transaction_id = id,
                    position,
                    "skipping raw entry with an already known transaction id"
                );
                skipped += 1;
                continue;
            }
        }

        let purchase = normalizer.normalize(entry, position)?;
        known.insert(purchase.transaction_id);
        delta.push(purchase);
    }

    let mode = match watermark {
        None => ScanMode::FirstRun,
        Some(watermark) => {
            if !hit {
                tracing::info!(watermark, "raw history exhausted before reaching the watermark");
            }
            ScanMode::Incremental { watermark, hit }
        }
    };

    let mut merged = Vec::with_capacity(delta.len() + history.len());
    merged.extend(delta.iter().cloned());
    merged.extend(history.iter().cloned());

    tracing::info!(
        new = delta.len(),
        total = merged.len(),
        scanned,
        skipped,
        "computed delta"
    );

    Ok(DeltaOutcome {
        delta,
        history: merged,
        mode,
        scanned,
        skipped,
    })
}
