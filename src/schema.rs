use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Key under which records without an entity id are folded.
pub const UNASSIGNED_ENTITY: &str = "unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[schemars(description = "South Sudanese Pound. Default bucket for any code that is not USD.")]
    Ssp,

    #[schemars(description = "US Dollar. Kept as a separate, non-convertible total.")]
    Usd,
}

impl Currency {
    /// Strips everything but letters, uppercases, and maps anything other
    /// than `USD` to SSP.
    pub fn normalize(code: &str) -> Self {
        let letters: String = code
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if letters == "USD" {
            Currency::Usd
        } else {
            Currency::Ssp
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ssp => "SSP",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Income,
    Expense,
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" | "revenue" => Ok(RecordKind::Income),
            "expense" | "expenses" => Ok(RecordKind::Expense),
            other => Err(format!("unknown record kind '{}'", other)),
        }
    }
}

/// A canonical ledger record. Built only by the ingestion adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawRecord {
    pub entity_id: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub occurred_at: NaiveDateTime,
    pub kind: RecordKind,
}

impl RawRecord {
    pub fn entity_key(&self) -> &str {
        self.entity_id.as_deref().unwrap_or(UNASSIGNED_ENTITY)
    }
}

/// A department (or any other revenue-bearing unit) as listed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Half-open `[start, end)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn first_day(&self) -> NaiveDate {
        self.start.date()
    }

    /// Last calendar day touched by the window. An empty window reports its
    /// start day.
    pub fn last_day(&self) -> NaiveDate {
        if self.end <= self.start {
            return self.start.date();
        }
        (self.end - chrono::Duration::nanoseconds(1)).date()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

/// A calendar unit used as a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Period {
    Month { year: i32, month: u32 },
    Day(NaiveDate),
}

impl Period {
    pub fn of(instant: NaiveDateTime, granularity: Granularity) -> Self {
        let date = instant.date();
        match granularity {
            Granularity::Day => Period::Day(date),
            Granularity::Month => Period::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            Period::Month { year, .. } => *year,
            Period::Day(date) => date.year(),
        }
    }

    pub fn month(&self) -> u32 {
        match self {
            Period::Month { month, .. } => *month,
            Period::Day(date) => date.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Period::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl JsonSchema for Period {
    fn schema_name() -> String {
        "Period".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Period::Day(date));
        }
        NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
            .map(|date| Period::Month {
                year: date.year(),
                month: date.month(),
            })
            .map_err(|_| format!("Invalid period '{}'. Expected YYYY-MM or YYYY-MM-DD", s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CurrencyTotals {
    pub ssp: Decimal,
    pub usd: Decimal,
}

impl CurrencyTotals {
    pub fn add(&mut self, currency: Currency, amount: Decimal) {
        match currency {
            Currency::Ssp => self.ssp += amount,
            Currency::Usd => self.usd += amount,
        }
    }

    pub fn amount_in(&self, mode: CurrencyMode) -> Decimal {
        match mode {
            CurrencyMode::Ssp => self.ssp,
            CurrencyMode::Usd => self.usd,
            CurrencyMode::Combined => self.ssp + self.usd,
        }
    }

    pub fn absorb(&mut self, other: &CurrencyTotals) {
        self.ssp += other.ssp;
        self.usd += other.usd;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Bucket {
    pub period: Period,
    pub per_entity: BTreeMap<String, CurrencyTotals>,
}

impl Bucket {
    pub fn empty(period: Period) -> Self {
        Self {
            period,
            per_entity: BTreeMap::new(),
        }
    }

    pub fn entity_amount(&self, entity_id: &str, mode: CurrencyMode) -> Decimal {
        self.per_entity
            .get(entity_id)
            .map(|totals| totals.amount_in(mode))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn totals(&self) -> CurrencyTotals {
        let mut sum = CurrencyTotals::default();
        for totals in self.per_entity.values() {
            sum.absorb(totals);
        }
        sum
    }
}

/// Which currency a metric is computed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyMode {
    #[default]
    #[schemars(description = "Metrics over SSP amounts only")]
    Ssp,

    #[schemars(description = "Metrics over USD amounts only")]
    Usd,

    #[schemars(
        description = "SSP and USD summed. Only meaningful for clinics that operate in a single currency."
    )]
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodRevenue {
    pub period: Period,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityMetrics {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub revenue: Decimal,
    /// Percent of the window's revenue, 0..=100.
    pub share: Decimal,
    pub avg_per_period: Decimal,
    pub best_period: Option<PeriodRevenue>,
    pub growth_pct: Decimal,
    pub previous_revenue: Decimal,
    /// 1-based position after sorting by revenue.
    pub rank: u32,
    pub monthly_series: Vec<PeriodRevenue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Info,
    Warning,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowTotals {
    pub revenue: CurrencyTotals,
    pub expenses: CurrencyTotals,
    pub net: CurrencyTotals,
    pub active_entities: usize,
    pub overall_growth_pct: Decimal,
}
