use std::path::Path;

use crate::error::{Result, SudsError};
use crate::models::RawEntry;
use crate::source::{collect_pages, PurchaseSource};

const DEFAULT_PAGE_SIZE: usize = 25;

/// Replays a fixed, newest-first list of entries as if it were paged.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    entries: Vec<RawEntry>,
    page_size: usize,
    pages_served: u32,
}

impl FixtureSource {
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self::with_page_size(entries, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(entries: Vec<RawEntry>, page_size: usize) -> Self {
        Self {
            entries,
            page_size: page_size.max(1),
            pages_served: 0,
        }
    }

    /// Loads a JSON array of raw entries, the same shape as the raw history file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SudsError::Source(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        let entries: Vec<RawEntry> = serde_json::from_str(&content)?;
        Ok(Self::new(entries))
    }

    pub fn pages_served(&self) -> u32 {
        self.pages_served
    }

    fn page_count(&self) -> u32 {
        self.entries.len().div_ceil(self.page_size) as u32
    }

    fn collect(&mut self, known_id: Option<&str>) -> Result<Vec<RawEntry>> {
        let max_pages = self.page_count();
        let entries = &self.entries;
        let page_size = self.page_size;
        let served = &mut self.pages_served;
        collect_pages(max_pages, known_id, |n| {
            *served += 1;
            let start = (n as usize - 1) * page_size;
            Ok(entries.iter().skip(start).take(page_size).cloned().collect())
        })
    }
}

impl PurchaseSource for FixtureSource {
    fn fetch_all(&mut self) -> Result<Vec<RawEntry>> {
        self.collect(None)
    }

    fn fetch_since(&mut self, known_id: Option<&str>) -> Result<Vec<RawEntry>> {
        self.collect(known_id)
    }
}
