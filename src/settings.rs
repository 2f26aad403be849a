use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SudsError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub source: SourceSettings,
}

/// Knobs for the live purchase source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Base URL of the paginated purchases endpoint.
    pub endpoint: Option<String>,
    pub max_pages: u32,
    pub page_retries: u32,
    pub retry_delay_ms: u64,
    pub detail_poll_attempts: u32,
    pub detail_poll_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_pages: 50,
            page_retries: 3,
            retry_delay_ms: 1_000,
            detail_poll_attempts: 30,
            detail_poll_delay_ms: 200,
            timeout_secs: 30,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            source: SourceSettings::default(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("suds")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("suds")
}

/// Defaults when no settings file exists yet. A file that exists but cannot
/// be read or parsed is an error: silently falling back to the default data
/// dir would start a fresh history and lose the watermark.
pub fn load_settings() -> Result<Settings> {
    let path = settings_path();
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| SudsError::Settings(format!("cannot read {}: {e}", path.display())))?;
    parse_settings(&content)
        .map_err(|e| SudsError::Settings(format!("{}: {e}", path.display())))
}

fn parse_settings(content: &str) -> Result<Settings> {
    serde_json::from_str(content).map_err(|e| SudsError::Settings(format!("malformed settings: {e}")))
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| SudsError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

impl Settings {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("suds.db")
    }
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
