//! Extract -> clean -> load, strictly in that order.
//!
//! Each stage reads the previous stage's artifact from disk and replaces its
//! own artifact atomically, so a crash at any point leaves the last complete
//! state in place and a rerun resumes from the watermark. Runs are not locked
//! against each other; callers must not overlap them.

use rusqlite::Connection;

use crate::delta::{compute_delta, DeltaOutcome};
use crate::error::{Result, Stage, SudsError};
use crate::history::{Artifacts, RawHistory};
use crate::loader::{run_load, LoadMode, LoadOutcome};
use crate::normalizer::Normalizer;
use crate::source::PurchaseSource;

#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub first_run: bool,
    pub fetched: usize,
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub extract: ExtractReport,
    pub clean: DeltaOutcome,
    pub load: LoadOutcome,
}

pub struct Pipeline {
    artifacts: Artifacts,
}

impl Pipeline {
    pub fn new(artifacts: Artifacts) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Pulls new raw entries and merges them into the raw history file. The
    /// file is only replaced once the source has delivered everything.
    pub fn extract(&self, source: &mut dyn PurchaseSource) -> Result<ExtractReport> {
        self.try_extract(source).map_err(|e| e.at(Stage::Extract))
    }

    fn try_extract(&self, source: &mut dyn PurchaseSource) -> Result<ExtractReport> {
        let existing = self.artifacts.load_raw()?;
        let first_run = existing.is_none();
        let mut history = existing.unwrap_or_default();

        let fresh = if first_run {
            tracing::info!("no raw history yet, fetching everything");
            source.fetch_all()?
        } else {
            let latest = history.latest_id().map(str::to_string);
            tracing::info!(latest = ?latest, "fetching entries newer than the latest known id");
            source.fetch_since(latest.as_deref())?
        };

        let fetched = fresh.len();
        let added = history.merge_new(fresh);
        if first_run || added > 0 {
            self.artifacts.save_raw(&history)?;
        }
        Ok(ExtractReport {
            first_run,
            fetched,
            added,
            total: history.len(),
        })
    }

    /// Normalizes whatever the raw history holds beyond the watermark and
    /// writes the full history plus the delta. Nothing is written on failure.
    pub fn clean(&self, normalizer: &dyn Normalizer) -> Result<DeltaOutcome> {
        self.try_clean(normalizer).map_err(|e| e.at(Stage::Clean))
    }

    fn try_clean(&self, normalizer: &dyn Normalizer) -> Result<DeltaOutcome> {
        let raw = self.artifacts.load_raw()?.ok_or_else(|| {
            SudsError::Other("no raw history found; run `suds extract` first".into())
        })?;
        let previous = self.artifacts.load_cleaned()?.unwrap_or_default();
        let outcome = compute_delta(&previous, &raw.entries, normalizer)?;
        self.artifacts.save_clean(&outcome.history, &outcome.delta)?;
        Ok(outcome)
    }

    pub fn load(&self, conn: &mut Connection, mode: LoadMode) -> Result<LoadOutcome> {
        run_load(conn, &self.artifacts, mode).map_err(|e| e.at(Stage::Load))
    }

    pub fn run(
        &self,
        source: &mut dyn PurchaseSource,
        normalizer: &dyn Normalizer,
        conn: &mut Connection,
        mode: LoadMode,
    ) -> Result<RunReport> {
        let extract = self.extract(source)?;
        let clean = self.clean(normalizer)?;
        let load = self.load(conn, mode)?;
        Ok(RunReport {
            extract,
            clean,
            load,
        })
    }
}

/// Raw history loaded for inspection commands; empty when never extracted.
pub fn load_raw_or_empty(artifacts: &Artifacts) -> Result<RawHistory> {
    Ok(artifacts.load_raw()?.unwrap_or_default())
}
