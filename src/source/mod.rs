//! Where raw purchases come from.
//!
//! Sources page through the remote purchase list newest first. The pipeline
//! only sees the `PurchaseSource` capability, so tests can replay fixtures
//! instead of talking to the live endpoint.

pub mod fixture;
pub mod http;

use std::time::Duration;

use crate::error::{Result, SudsError};
use crate::models::RawEntry;

pub use fixture::FixtureSource;
pub use http::HttpSource;

pub trait PurchaseSource {
    /// Every entry across all pages, newest first.
    fn fetch_all(&mut self) -> Result<Vec<RawEntry>>;

    /// Entries newer than `known_id`, newest first. Paging stops as soon as
    /// `known_id` shows up; that entry itself is not returned.
    fn fetch_since(&mut self, known_id: Option<&str>) -> Result<Vec<RawEntry>>;
}

/// Bounded retry with linear backoff: `delay * attempt` between tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }

    /// Runs `op` until it succeeds or `retries` extra attempts are used up,
    /// then surfaces the last failure as a source error.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    let wait = self.delay_for_attempt(attempt);
                    tracing::warn!(%what, attempt, error = %e, ?wait, "retrying");
                    std::thread::sleep(wait);
                }
                Err(e) => {
                    return Err(SudsError::Source(format!(
                        "{what} failed after {} attempts: {e}",
                        attempt + 1
                    )))
                }
            }
        }
    }
}

/// Walks pages 1..=max_pages, stopping at an empty page or at `known_id`.
pub(crate) fn collect_pages(
    max_pages: u32,
    known_id: Option<&str>,
    mut fetch_page: impl FnMut(u32) -> Result<Vec<RawEntry>>,
) -> Result<Vec<RawEntry>> {
    let known_id = known_id.map(str::trim).filter(|id| !id.is_empty());
    let mut collected = Vec::new();

    for page_num in 1..=max_pages {
        let page = fetch_page(page_num)?;
        tracing::debug!(page = page_num, entries = page.len(), "fetched page");
        if page.is_empty() {
            break;
        }
        for entry in page {
            if known_id.is_some_and(|known| entry.transaction_id.trim() == known) {
                tracing::info!(page = page_num, "reached latest known transaction");
                return Ok(collected);
            }
            collected.push(entry);
        }
    }
    Ok(collected)
}
