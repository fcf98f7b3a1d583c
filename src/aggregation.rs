use crate::ingestion::RemittanceTotal;
use crate::schema::{
    Bucket, CurrencyTotals, Granularity, Period, RawRecord, RecordKind, TimeWindow,
    UNASSIGNED_ENTITY,
};
use crate::utils::periods_in_window;
use chrono::Datelike;
use log::debug;
use std::collections::BTreeMap;

/// Folds records into per-period, per-entity, per-currency totals.
pub struct BucketAggregator {
    window: TimeWindow,
    granularity: Granularity,
    kind: RecordKind,
}

impl BucketAggregator {
    pub fn new(window: TimeWindow, granularity: Granularity) -> Self {
        Self {
            window,
            granularity,
            kind: RecordKind::Income,
        }
    }

    /// Selects which record kind is folded. Income by default.
    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    /// One zero bucket per calendar unit of the window.
    pub fn empty_buckets(&self) -> Vec<Bucket> {
        periods_in_window(&self.window, self.granularity)
            .into_iter()
            .map(Bucket::empty)
            .collect()
    }

    pub fn aggregate(&self, records: &[RawRecord]) -> Vec<Bucket> {
        // The grid must exist before any record is folded so that quiet
        // periods stay in the series.
        let mut grid: BTreeMap<Period, Bucket> = self
            .empty_buckets()
            .into_iter()
            .map(|b| (b.period, b))
            .collect();

        let mut dropped = 0usize;

        for record in records.iter().filter(|r| r.kind == self.kind) {
            if !self.window.contains(record.occurred_at) {
                dropped += 1;
                continue;
            }

            let period = Period::of(record.occurred_at, self.granularity);

            match grid.get_mut(&period) {
                Some(bucket) => {
                    bucket
                        .per_entity
                        .entry(record.entity_key().to_string())
                        .or_default()
                        .add(record.currency, record.amount);
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(
                "Dropped {} {:?} records outside [{}, {})",
                dropped, self.kind, self.window.start, self.window.end
            );
        }

        grid.into_values().collect()
    }
}

/// Adds secondary-source totals into existing buckets.
///
/// Strictly additive: amounts are summed into `(period, entity, currency)`
/// and never replace what is there. Merging the same dataset twice counts it
/// twice, so each source must be merged at most once per window.
///
/// Day-dated totals follow the same boundary as ledger records: a day outside
/// `window` is skipped even when its month has a bucket.
pub fn merge_additive(
    buckets: &mut [Bucket],
    totals: &[RemittanceTotal],
    window: &TimeWindow,
) -> usize {
    let mut merged = 0usize;

    for total in totals {
        if let Period::Day(day) = total.period {
            if day < window.first_day() || day > window.last_day() {
                debug!("Remittance for {} outside the window, skipped", day);
                continue;
            }
        }

        let target = buckets
            .iter_mut()
            .find(|b| period_matches(&b.period, &total.period));

        let Some(bucket) = target else {
            debug!(
                "Remittance for {} outside the window, skipped",
                total.period
            );
            continue;
        };

        let entity = total
            .entity_id
            .clone()
            .unwrap_or_else(|| UNASSIGNED_ENTITY.to_string());

        bucket
            .per_entity
            .entry(entity)
            .or_default()
            .add(total.currency, total.amount);
        merged += 1;
    }

    merged
}

/// A monthly remittance lands on the first day of its month when buckets are
/// daily; a daily remittance lands on its month when buckets are monthly.
fn period_matches(bucket: &Period, incoming: &Period) -> bool {
    match (bucket, incoming) {
        (Period::Day(day), Period::Month { year, month }) => {
            day.year() == *year && day.month() == *month && day.day() == 1
        }
        (Period::Month { year, month }, Period::Day(day)) => {
            day.year() == *year && day.month() == *month
        }
        (a, b) => a == b,
    }
}

/// Sums every entity of every bucket, per currency.
pub fn grand_totals(buckets: &[Bucket]) -> CurrencyTotals {
    let mut sum = CurrencyTotals::default();
    for bucket in buckets {
        sum.absorb(&bucket.totals());
    }
    sum
}
