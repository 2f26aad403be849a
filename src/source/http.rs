use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;

use crate::error::{Result, SudsError};
use crate::models::RawEntry;
use crate::settings::SourceSettings;
use crate::source::{collect_pages, PurchaseSource, RetryPolicy};

fn transaction_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Transaction ID[:\s]+(\d+)").expect("valid transaction id regex"))
}

/// Pulls the id out of a rendered details block when the row itself lacked one.
pub fn recover_transaction_id(entry: &mut RawEntry) {
    if !entry.transaction_id.trim().is_empty() {
        return;
    }
    if let Some(caps) = transaction_id_re().captures(&entry.details_text) {
        entry.transaction_id = caps[1].to_string();
    }
}

/// Polls `fetch` until it yields non-blank text or `attempts` run out.
/// Running out is not an error: the entry keeps empty details and fails
/// normalization later, attributed to that entry.
pub fn poll_details(
    attempts: u32,
    delay: Duration,
    mut fetch: impl FnMut() -> Result<String>,
) -> String {
    for attempt in 1..=attempts {
        match fetch() {
            Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
            Ok(_) => {}
            Err(e) => tracing::debug!(attempt, error = %e, "details not ready"),
        }
        if attempt < attempts {
            std::thread::sleep(delay);
        }
    }
    String::new()
}

/// Live source backed by a JSON purchases endpoint.
///
/// `GET {endpoint}?page=N` returns a JSON array of raw entries (an empty array
/// past the last page). `GET {endpoint}/details?page=N&row=I` returns the
/// rendered details text for one row, which may still be empty while the
/// remote side is rendering it.
pub struct HttpSource {
    client: Client,
    endpoint: String,
    settings: SourceSettings,
}

impl HttpSource {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .ok_or_else(|| {
                SudsError::Settings(
                    "no source endpoint configured (set source.endpoint in settings.json)".into(),
                )
            })?
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            settings: settings.clone(),
        })
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.settings.page_retries,
            delay: Duration::from_millis(self.settings.retry_delay_ms),
        }
    }

    fn get_page(&self, page_num: u32) -> Result<Vec<RawEntry>> {
        let entries = self
            .client
            .get(&self.endpoint)
            .query(&[("page", page_num)])
            .send()?
            .error_for_status()?
            .json::<Vec<RawEntry>>()?;
        Ok(entries)
    }

    fn get_details(&self, page_num: u32, row: usize) -> Result<String> {
        let url = format!("{}/details", self.endpoint);
        let text = self
            .client
            .get(&url)
            .query(&[("page", page_num as usize), ("row", row)])
            .send()?
            .error_for_status()?
            .text()?;
        Ok(text)
    }

    fn fetch_page(&self, page_num: u32) -> Result<Vec<RawEntry>> {
        let mut entries = self
            .retry_policy()
            .run(&format!("page {page_num}"), || self.get_page(page_num))?;

        let attempts = self.settings.detail_poll_attempts;
        let delay = Duration::from_millis(self.settings.detail_poll_delay_ms);
        for (row, entry) in entries.iter_mut().enumerate() {
            if entry.details_text.trim().is_empty() {
                entry.details_text = poll_details(attempts, delay, || self.get_details(page_num, row));
                if entry.details_text.is_empty() {
                    tracing::warn!(
                        page = page_num,
                        row,
                        datetime = %entry.datetime,
                        "details never rendered"
                    );
                }
            }
            recover_transaction_id(entry);
        }
        Ok(entries)
    }
}

impl PurchaseSource for HttpSource {
    fn fetch_all(&mut self) -> Result<Vec<RawEntry>> {
        collect_pages(self.settings.max_pages, None, |n| self.fetch_page(n))
    }

    fn fetch_since(&mut self, known_id: Option<&str>) -> Result<Vec<RawEntry>> {
        collect_pages(self.settings.max_pages, known_id, |n| self.fetch_page(n))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_recover_transaction_id() {
        let mut entry = RawEntry {
            details_text: "Transaction ID: 2085361712\nWash Bay\t(bay 5)\t$3.75".into(),
            ..Default::default()
        };
        recover_transaction_id(&mut entry);
        assert_eq!(entry.transaction_id, "2085361712");

        let mut keep = RawEntry {
            transaction_id: "11".into(),
            details_text: "Transaction ID: 99".into(),
            ..Default::default()
        };
        recover_transaction_id(&mut keep);
        assert_eq!(keep.transaction_id, "11");
    }

    #[test]
    fn test_poll_details_waits_for_text() {
        let calls = Cell::new(0);
        let text = poll_details(5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            Ok(if calls.get() < 3 { String::new() } else { " Vac\t(vacuum 1)\t$1.00 ".into() })
        });
        assert_eq!(text, "Vac\t(vacuum 1)\t$1.00");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_poll_details_times_out_to_empty() {
        let calls = Cell::new(0);
        let text = poll_details(4, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            Err(SudsError::Other("not rendered".into()))
        });
        assert!(text.is_empty());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_requires_endpoint() {
        let err = HttpSource::new(&SourceSettings::default()).err().unwrap();
        assert!(matches!(err, SudsError::Settings(_)));
    }
}
