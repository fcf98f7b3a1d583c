//! # Clinic Revenue Analytics
//!
//! Turns raw clinic ledger records into department rankings, per-currency
//! monthly (or daily) series, period-over-period growth and short narrative
//! insights.
//!
//! ## Core Concepts
//!
//! - **Windows**: A named range (`this-year`, `last-3-months`, `custom`, ...) is
//!   resolved against an injected `now` into a half-open current window and a
//!   previous window used for growth.
//! - **Buckets**: One per calendar month (or day for single-month views),
//!   created before any record is folded so quiet periods still show up.
//! - **Currencies**: SSP and USD are kept apart. Anything that is not USD is SSP.
//! - **Secondary sources**: Insurance remittances are added on top of ledger
//!   buckets. If they cannot be fetched the report carries a warning instead
//!   of failing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use clinic_revenue_analytics::*;
//! use chrono::NaiveDate;
//!
//! let processor = AnalyticsProcessor::new(AnalyticsConfig::default())?;
//! let now = NaiveDate::from_ymd_opt(2025, 5, 14).unwrap().and_hms_opt(9, 0, 0).unwrap();
//!
//! let report = processor
//!     .run(
//!         &ledger_api,
//!         &department_api,
//!         Some(&insurance_api),
//!         &WindowRequest::preset(RangePreset::Last6Months),
//!         &RecordFilter::default(),
//!         now,
//!     )
//!     .await?;
//!
//! for department in &report.metrics {
//!     println!("#{} {} {}", department.rank, department.name, format_compact(department.revenue));
//! }
//! ```

pub mod aggregation;
pub mod config;
pub mod error;
pub mod format;
pub mod ingestion;
pub mod insights;
pub mod metrics;
pub mod schema;
pub mod utils;
pub mod window;

pub use aggregation::{grand_totals, merge_additive, BucketAggregator};
pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, PartialDataWarning, Result};
pub use format::*;
pub use ingestion::{
    collect_all, collect_entities, EntitySource, RecordFilter, RecordPage, RecordQuery,
    RecordSource, RemittanceSource, RemittanceTotal, UpstreamRow,
};
pub use insights::{InsightThresholds, InsightsGenerator};
pub use metrics::{growth_pct, share_pct, MetricsCalculator};
pub use schema::*;
pub use window::{
    previous_window, resolve, resolve_with_mode, ComparisonMode, RangePreset, ResolvedWindows,
    WindowRequest,
};

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything a dashboard view needs for one query.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyticsReport {
    pub windows: ResolvedWindows,
    pub currency_mode: CurrencyMode,
    pub current_buckets: Vec<Bucket>,
    pub previous_buckets: Vec<Bucket>,
    /// Ranked, zero-revenue entities excluded.
    pub metrics: Vec<EntityMetrics>,
    pub totals: WindowTotals,
    pub insights: Vec<Insight>,
    pub warnings: Vec<PartialDataWarning>,
}

impl AnalyticsReport {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalyticsReport)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Records already collected for both windows, ready for the pure stage.
#[derive(Debug, Clone, Default)]
pub struct CollectedData {
    pub entities: Vec<Entity>,
    pub current_records: Vec<RawRecord>,
    pub previous_records: Vec<RawRecord>,
    pub current_remittances: Vec<RemittanceTotal>,
    pub previous_remittances: Vec<RemittanceTotal>,
    pub warnings: Vec<PartialDataWarning>,
}

pub struct AnalyticsProcessor {
    config: AnalyticsConfig,
}

impl AnalyticsProcessor {
    pub fn new(config: AnalyticsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn resolve(&self, request: &WindowRequest, now: NaiveDateTime) -> Result<ResolvedWindows> {
        resolve_with_mode(request, now, self.config.comparison_mode)
    }

    /// Fetches everything for `request` and builds the report.
    ///
    /// The current and previous windows are collected concurrently; pages
    /// within each are fetched one at a time. Record and entity failures
    /// abort the call. Remittance failures only add a warning.
    pub async fn run<R, E>(
        &self,
        records: &R,
        entities: &E,
        remittances: Option<&dyn RemittanceSource>,
        request: &WindowRequest,
        filter: &RecordFilter,
        now: NaiveDateTime,
    ) -> Result<AnalyticsReport>
    where
        R: RecordSource + ?Sized,
        E: EntitySource + ?Sized,
    {
        let windows = self.resolve(request, now)?;

        info!(
            "Building {:?} report for [{}, {}) in {:?}",
            request.preset, windows.current.start, windows.current.end, self.config.currency_mode
        );

        let page_size = self.config.page_size;
        let (current_records, previous_records, entity_list) = futures::try_join!(
            collect_all(records, &windows.current, filter, page_size),
            collect_all(records, &windows.previous, filter, page_size),
            collect_entities(entities),
        )?;

        debug!(
            "Collected {} current and {} previous records, {} active entities",
            current_records.len(),
            previous_records.len(),
            entity_list.len()
        );

        let mut data = CollectedData {
            entities: restrict_entities(entity_list, filter),
            current_records,
            previous_records,
            ..CollectedData::default()
        };

        if let Some(source) = remittances {
            let (current, previous) = futures::join!(
                source.remittance_totals(&windows.current),
                source.remittance_totals(&windows.previous),
            );
            data.current_remittances = take_or_warn(source.name(), current, &mut data.warnings);
            data.previous_remittances = take_or_warn(source.name(), previous, &mut data.warnings);
        }

        Ok(self.compute(windows, data))
    }

    /// Pure stage: buckets, metrics, totals and insights from collected data.
    pub fn compute(&self, windows: ResolvedWindows, data: CollectedData) -> AnalyticsReport {
        let mode = self.config.currency_mode;

        let current = BucketAggregator::new(windows.current, windows.granularity);
        let previous = BucketAggregator::new(windows.previous, windows.granularity);

        let mut current_buckets = current.aggregate(&data.current_records);
        let mut previous_buckets = previous.aggregate(&data.previous_records);

        merge_additive(&mut current_buckets, &data.current_remittances, &windows.current);
        merge_additive(&mut previous_buckets, &data.previous_remittances, &windows.previous);

        let expense_buckets = current
            .with_kind(RecordKind::Expense)
            .aggregate(&data.current_records);

        let calculator = MetricsCalculator::new(mode);
        let metrics = calculator.compute(&data.entities, &current_buckets, &previous_buckets);
        let totals =
            calculator.window_totals(&current_buckets, &expense_buckets, &previous_buckets, &metrics);

        let insights =
            InsightsGenerator::new(self.config.insight_thresholds.clone()).generate(&metrics);

        info!(
            "Report ready: {} ranked entities, {} insights, {} warnings",
            metrics.len(),
            insights.len(),
            data.warnings.len()
        );

        AnalyticsReport {
            windows,
            currency_mode: mode,
            current_buckets,
            previous_buckets,
            metrics,
            totals,
            insights,
            warnings: data.warnings,
        }
    }
}

fn restrict_entities(entities: Vec<Entity>, filter: &RecordFilter) -> Vec<Entity> {
    if filter.entity_ids.is_empty() {
        return entities;
    }
    entities
        .into_iter()
        .filter(|e| filter.entity_ids.contains(&e.id))
        .collect()
}

fn take_or_warn(
    source_name: &str,
    result: Result<Vec<RemittanceTotal>>,
    warnings: &mut Vec<PartialDataWarning>,
) -> Vec<RemittanceTotal> {
    match result {
        Ok(totals) => totals,
        Err(e) => {
            let warning = PartialDataWarning {
                source_name: source_name.to_string(),
                details: e.to_string(),
            };
            warn!("{}", warning);
            warnings.push(warning);
            Vec::new()
        }
    }
}
