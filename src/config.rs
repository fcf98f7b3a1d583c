use crate::error::{AnalyticsError, Result};
use crate::ingestion::DEFAULT_PAGE_SIZE;
use crate::insights::InsightThresholds;
use crate::schema::CurrencyMode;
use crate::window::ComparisonMode;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalyticsConfig {
    #[schemars(description = "Rows requested per page from the record source. Must be positive.")]
    pub page_size: u32,

    #[schemars(description = "Currency the rankings and growth figures are computed in")]
    pub currency_mode: CurrencyMode,

    #[schemars(description = "How the previous period is derived from the current window")]
    pub comparison_mode: ComparisonMode,

    pub insight_thresholds: InsightThresholds,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            currency_mode: CurrencyMode::default(),
            comparison_mode: ComparisonMode::default(),
            insight_thresholds: InsightThresholds::default(),
        }
    }
}

impl AnalyticsConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }

        let t = &self.insight_thresholds;
        if t.decline_below_pct >= Decimal::ZERO {
            return Err(AnalyticsError::InvalidConfig(format!(
                "decline_below_pct must be negative, got {}",
                t.decline_below_pct
            )));
        }

        for (name, value) in [
            ("potential_share_below_pct", t.potential_share_below_pct),
            ("new_share_below_pct", t.new_share_below_pct),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}
