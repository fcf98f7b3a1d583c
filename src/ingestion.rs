//! Boundary with the external data layer.
//!
//! Upstream rows arrive in several shapes (different timestamp and id field
//! names, amounts as numbers or strings). [`UpstreamRow::normalize`] is the
//! only place those shapes are reconciled into a [`RawRecord`].

use crate::error::{AnalyticsError, Result};
use crate::schema::{Currency, Entity, Period, RawRecord, RecordKind, TimeWindow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Hard stop for sources that never report an empty page.
pub const MAX_PAGES: u32 = 10_000;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Empty means every entity.
    #[serde(default)]
    pub entity_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub window: TimeWindow,
    pub filter: RecordFilter,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    #[serde(default)]
    pub rows: Vec<UpstreamRow>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRow {
    #[serde(default, alias = "departmentId", alias = "entity_id", alias = "department_id")]
    pub entity_id: Option<serde_json::Value>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, rename = "dateISO")]
    pub date_iso: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
}

impl UpstreamRow {
    /// Converts the row into a canonical record. Rows without any timestamp
    /// field yield `Ok(None)`; rows whose fields are present but unreadable
    /// are malformed.
    pub fn normalize(&self, source_name: &str) -> Result<Option<RawRecord>> {
        let Some(raw_timestamp) = self.timestamp_field() else {
            return Ok(None);
        };

        let occurred_at = parse_timestamp(raw_timestamp).ok_or_else(|| {
            AnalyticsError::upstream(
                source_name,
                format!("unparseable timestamp '{}'", raw_timestamp),
            )
        })?;

        let amount = match &self.amount {
            Some(value) => parse_amount(value).ok_or_else(|| {
                AnalyticsError::upstream(source_name, format!("unparseable amount {}", value))
            })?,
            None => {
                return Err(AnalyticsError::upstream(
                    source_name,
                    "row is missing an amount",
                ))
            }
        };

        let kind = match self.kind.as_deref() {
            Some(kind) => RecordKind::from_str(kind)
                .map_err(|e| AnalyticsError::upstream(source_name, e))?,
            None => RecordKind::Income,
        };

        Ok(Some(RawRecord {
            entity_id: self.entity_key(),
            amount,
            currency: Currency::normalize(self.currency.as_deref().unwrap_or("")),
            occurred_at,
            kind,
        }))
    }

    fn timestamp_field(&self) -> Option<&str> {
        [&self.date_iso, &self.date, &self.created_at]
            .into_iter()
            .find_map(|field| field.as_deref().filter(|s| !s.trim().is_empty()))
    }

    fn entity_key(&self) -> Option<String> {
        match &self.entity_id {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Accepts RFC 3339, ISO local date-times and bare `YYYY-MM-DD` dates.
/// Offsets are converted to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
}

fn parse_amount(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().replace(',', ""),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Paged listing of ledger transactions.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &str {
        "records"
    }

    async fn fetch_page(&self, query: &RecordQuery) -> Result<RecordPage>;
}

/// Listing of departments.
#[async_trait]
pub trait EntitySource: Send + Sync {
    fn name(&self) -> &str {
        "entities"
    }

    async fn list_entities(&self) -> Result<Vec<Entity>>;
}

/// Insurance remittance total for one entity, period and currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemittanceTotal {
    pub entity_id: Option<String>,
    pub period: Period,
    pub currency: Currency,
    pub amount: Decimal,
}

impl RemittanceTotal {
    pub fn new(
        entity_id: Option<String>,
        period: Period,
        currency_code: &str,
        amount: Decimal,
    ) -> Self {
        Self {
            entity_id,
            period,
            currency: Currency::normalize(currency_code),
            amount,
        }
    }
}

/// Secondary, additive-only source of revenue.
#[async_trait]
pub trait RemittanceSource: Send + Sync {
    fn name(&self) -> &str {
        "insurance remittances"
    }

    async fn remittance_totals(&self, window: &TimeWindow) -> Result<Vec<RemittanceTotal>>;
}

/// Drains every page of `source` for `window`, sequentially.
///
/// Stops on the first empty page or when the source says there are no more
/// pages. A page without a `has_more` flag is treated as "maybe more".
pub async fn collect_all<S>(
    source: &S,
    window: &TimeWindow,
    filter: &RecordFilter,
    page_size: u32,
) -> Result<Vec<RawRecord>>
where
    S: RecordSource + ?Sized,
{
    if page_size == 0 {
        return Err(AnalyticsError::InvalidConfig(
            "page size must be greater than zero".to_string(),
        ));
    }

    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut page = 1u32;

    loop {
        if page > MAX_PAGES {
            return Err(AnalyticsError::upstream(
                source.name(),
                format!("pagination did not terminate after {} pages", MAX_PAGES),
            ));
        }

        let query = RecordQuery {
            window: *window,
            filter: filter.clone(),
            page,
            limit: page_size,
        };

        let result = source
            .fetch_page(&query)
            .await
            .map_err(|e| into_upstream(source.name(), e))?;

        if result.rows.is_empty() {
            debug!("{}: page {} empty, done", source.name(), page);
            break;
        }

        debug!(
            "{}: page {} returned {} rows (has_more: {:?})",
            source.name(),
            page,
            result.rows.len(),
            result.has_more
        );

        for row in &result.rows {
            match row.normalize(source.name())? {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }

        if result.has_more == Some(false) {
            break;
        }
        page += 1;
    }

    if skipped > 0 {
        debug!(
            "{}: skipped {} rows without a timestamp",
            source.name(),
            skipped
        );
    }

    Ok(records)
}

/// Active entities only, in upstream order.
pub async fn collect_entities<S>(source: &S) -> Result<Vec<Entity>>
where
    S: EntitySource + ?Sized,
{
    let entities = source
        .list_entities()
        .await
        .map_err(|e| into_upstream(source.name(), e))?;

    Ok(entities.into_iter().filter(|e| e.is_active).collect())
}

fn into_upstream(source_name: &str, error: AnalyticsError) -> AnalyticsError {
    match error {
        upstream @ AnalyticsError::UpstreamFetch { .. } => upstream,
        other => AnalyticsError::upstream(source_name, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Mutex;

    fn row(value: serde_json::Value) -> UpstreamRow {
        serde_json::from_value(value).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow {
            start: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    struct PagedSource {
        pages: Vec<RecordPage>,
        requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl RecordSource for PagedSource {
        async fn fetch_page(&self, query: &RecordQuery) -> Result<RecordPage> {
            self.requested.lock().unwrap().push(query.page);
            Ok(self
                .pages
                .get(query.page as usize - 1)
                .cloned()
                .unwrap_or_default())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RecordSource for FailingSource {
        fn name(&self) -> &str {
            "ledger"
        }

        async fn fetch_page(&self, _query: &RecordQuery) -> Result<RecordPage> {
            Err(AnalyticsError::InvalidConfig("connection reset".to_string()))
        }
    }

    fn income_row(day: u32, amount: i64) -> UpstreamRow {
        row(json!({
            "departmentId": "lab",
            "amount": amount,
            "currency": "SSP",
            "date": format!("2025-03-{:02}", day),
        }))
    }

    #[test]
    fn test_normalize_prefers_date_iso() {
        let record = row(json!({
            "entityId": "lab",
            "amount": "1,250.50",
            "currency": "usd",
            "dateISO": "2025-03-05T10:00:00Z",
            "date": "2025-01-01",
            "type": "income"
        }))
        .normalize("test")
        .unwrap()
        .unwrap();

        assert_eq!(record.entity_id.as_deref(), Some("lab"));
        assert_eq!(record.amount, dec!(1250.50));
        assert_eq!(record.currency, Currency::Usd);
        assert_eq!(
            record.occurred_at,
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap().and_hms_opt(10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_normalize_falls_back_to_created_at() {
        let record = row(json!({
            "department_id": 7,
            "amount": 99.5,
            "createdAt": "2025-03-07 08:15:00",
            "kind": "expense"
        }))
        .normalize("test")
        .unwrap()
        .unwrap();

        assert_eq!(record.entity_id.as_deref(), Some("7"));
        assert_eq!(record.amount, dec!(99.5));
        assert_eq!(record.currency, Currency::Ssp);
        assert_eq!(record.kind, RecordKind::Expense);
    }

    #[test]
    fn test_normalize_skips_blank_timestamp_fields() {
        let record = row(json!({
            "departmentId": "lab",
            "amount": 500,
            "dateISO": "",
            "date": "2025-03-05"
        }))
        .normalize("test")
        .unwrap()
        .expect("blank dateISO should fall through to date");

        assert_eq!(record.amount, dec!(500));
        assert_eq!(
            record.occurred_at,
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );

        let blank_everywhere = row(json!({ "amount": 1, "dateISO": " ", "createdAt": "" }));
        assert!(blank_everywhere.normalize("test").unwrap().is_none());
    }

    #[test]
    fn test_normalize_without_timestamp_is_skipped() {
        let normalized = row(json!({ "amount": 10 })).normalize("test").unwrap();
        assert!(normalized.is_none());
    }

    #[test]
    fn test_normalize_rejects_malformed_rows() {
        let bad_amount = row(json!({ "amount": "ten", "date": "2025-03-01" }));
        assert!(matches!(
            bad_amount.normalize("test"),
            Err(AnalyticsError::UpstreamFetch { .. })
        ));

        let bad_date = row(json!({ "amount": 10, "date": "yesterday" }));
        assert!(bad_date.normalize("test").is_err());

        let bad_kind = row(json!({ "amount": 10, "date": "2025-03-01", "kind": "transfer" }));
        assert!(bad_kind.normalize("test").is_err());
    }

    #[tokio::test]
    async fn test_collect_all_stops_on_has_more_false() {
        let source = PagedSource {
            pages: vec![
                RecordPage {
                    rows: vec![income_row(1, 100), income_row(2, 200)],
                    has_more: Some(true),
                },
                RecordPage {
                    rows: vec![income_row(3, 300)],
                    has_more: Some(false),
                },
                RecordPage {
                    rows: vec![income_row(4, 400)],
                    has_more: Some(false),
                },
            ],
            requested: Mutex::new(Vec::new()),
        };

        let records = collect_all(&source, &window(), &RecordFilter::default(), 2)
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_collect_all_without_flag_stops_on_empty_page() {
        let source = PagedSource {
            pages: vec![
                RecordPage {
                    rows: vec![income_row(1, 100)],
                    has_more: None,
                },
                RecordPage {
                    rows: vec![income_row(2, 200)],
                    has_more: None,
                },
            ],
            requested: Mutex::new(Vec::new()),
        };

        let records = collect_all(&source, &window(), &RecordFilter::default(), 1000)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_collect_all_keeps_partial_last_page() {
        let source = PagedSource {
            pages: vec![
                RecordPage {
                    rows: vec![income_row(1, 100), income_row(2, 200)],
                    has_more: Some(true),
                },
                RecordPage {
                    rows: vec![income_row(3, 300)],
                    has_more: Some(true),
                },
            ],
            requested: Mutex::new(Vec::new()),
        };

        let records = collect_all(&source, &window(), &RecordFilter::default(), 2)
            .await
            .unwrap();

        let total: Decimal = records.iter().map(|r| r.amount).sum();
        assert_eq!(total, dec!(600));
    }

    #[tokio::test]
    async fn test_collect_all_wraps_source_errors() {
        let err = collect_all(&FailingSource, &window(), &RecordFilter::default(), 10)
            .await
            .unwrap_err();

        match err {
            AnalyticsError::UpstreamFetch {
                source_name,
                details,
            } => {
                assert_eq!(source_name, "ledger");
                assert!(details.contains("connection reset"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collect_all_rejects_zero_page_size() {
        let source = PagedSource {
            pages: vec![],
            requested: Mutex::new(Vec::new()),
        };
        let result = collect_all(&source, &window(), &RecordFilter::default(), 0).await;
        assert!(matches!(result, Err(AnalyticsError::InvalidConfig(_))));
        assert!(source.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_timestamp_with_offset_converts_to_utc() {
        let parsed = parse_timestamp("2025-03-31T23:30:00-02:00").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap().and_hms_opt(1, 30, 0).unwrap()
        );
    }
}
