use std::fmt;

use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Clean,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Clean => "clean",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SudsError {
    #[error("Source error: {0}")]
    Source(String),

    #[error("Parse error in record {record}: {reason}")]
    Parse { record: String, reason: String },

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<SudsError>,
    },

    #[error("{0}")]
    Other(String),
}

impl SudsError {
    pub fn parse(record: impl Into<String>, reason: impl Into<String>) -> Self {
        SudsError::Parse {
            record: record.into(),
            reason: reason.into(),
        }
    }

    pub fn at(self, stage: Stage) -> Self {
        match self {
            already @ SudsError::Stage { .. } => already,
            other => SudsError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SudsError>;
