use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid date window: {0}")]
    InvalidWindow(String),

    #[error("Upstream fetch from {source_name} failed: {details}")]
    UpstreamFetch {
        source_name: String,
        details: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AnalyticsError {
    pub fn upstream(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::UpstreamFetch {
            source_name: source_name.into(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Non-fatal notice that a secondary source contributed nothing to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PartialDataWarning {
    pub source_name: String,
    pub details: String,
}

impl std::fmt::Display for PartialDataWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} unavailable, treated as zero: {}",
            self.source_name, self.details
        )
    }
}
