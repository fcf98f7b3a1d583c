use crate::aggregation::grand_totals;
use crate::schema::{
    Bucket, CurrencyMode, CurrencyTotals, Entity, EntityMetrics, PeriodRevenue, WindowTotals,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;

/// Growth reported for an entity that had nothing in the previous window.
pub const NEW_ENTITY_GROWTH_PCT: Decimal = dec!(100);

/// `(current - previous) / previous * 100`, with fixed answers when the
/// previous value is not positive: 100 for new revenue, 0 otherwise.
pub fn growth_pct(current: Decimal, previous: Decimal) -> Decimal {
    if previous > Decimal::ZERO {
        (current - previous) / previous * dec!(100)
    } else if current > Decimal::ZERO {
        NEW_ENTITY_GROWTH_PCT
    } else {
        Decimal::ZERO
    }
}

/// Percent of `whole`, or 0 when there is no whole to divide by.
pub fn share_pct(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        part / whole * dec!(100)
    }
}

pub struct MetricsCalculator {
    mode: CurrencyMode,
}

struct Draft {
    index: usize,
    metrics: EntityMetrics,
}

impl MetricsCalculator {
    pub fn new(mode: CurrencyMode) -> Self {
        Self { mode }
    }

    pub fn revenue(&self, entity_id: &str, buckets: &[Bucket]) -> Decimal {
        buckets
            .iter()
            .map(|b| b.entity_amount(entity_id, self.mode))
            .sum()
    }

    pub fn series(&self, entity_id: &str, buckets: &[Bucket]) -> Vec<PeriodRevenue> {
        buckets
            .iter()
            .map(|b| PeriodRevenue {
                period: b.period,
                revenue: b.entity_amount(entity_id, self.mode),
            })
            .collect()
    }

    /// Ranked metrics for every entity with positive revenue in `current`.
    ///
    /// Output order is `(revenue desc, position in entities asc)`, so equal
    /// revenues keep the caller's order. Duplicate ids after the first are
    /// ignored.
    pub fn compute(
        &self,
        entities: &[Entity],
        current: &[Bucket],
        previous: &[Bucket],
    ) -> Vec<EntityMetrics> {
        let mut seen = HashSet::new();
        let mut drafts: Vec<Draft> = Vec::new();

        for (index, entity) in entities.iter().enumerate() {
            if !seen.insert(entity.id.as_str()) {
                continue;
            }

            let revenue = self.revenue(&entity.id, current);
            if revenue <= Decimal::ZERO {
                continue;
            }

            let series = self.series(&entity.id, current);
            let active: Vec<&PeriodRevenue> =
                series.iter().filter(|p| !p.revenue.is_zero()).collect();

            let avg_per_period = if active.is_empty() {
                Decimal::ZERO
            } else {
                revenue / Decimal::from(active.len())
            };

            let mut best_period: Option<PeriodRevenue> = None;
            for point in &active {
                match best_period {
                    Some(best) if point.revenue <= best.revenue => {}
                    _ => best_period = Some(**point),
                }
            }

            let previous_revenue = self.revenue(&entity.id, previous);

            drafts.push(Draft {
                index,
                metrics: EntityMetrics {
                    id: entity.id.clone(),
                    name: entity.name.clone(),
                    code: entity.code.clone(),
                    revenue,
                    share: Decimal::ZERO,
                    avg_per_period,
                    best_period,
                    growth_pct: growth_pct(revenue, previous_revenue),
                    previous_revenue,
                    rank: 0,
                    monthly_series: series,
                },
            });
        }

        let total: Decimal = drafts.iter().map(|d| d.metrics.revenue).sum();

        drafts.sort_by(|a, b| {
            b.metrics
                .revenue
                .cmp(&a.metrics.revenue)
                .then(a.index.cmp(&b.index))
        });

        drafts
            .into_iter()
            .enumerate()
            .map(|(position, draft)| {
                let mut metrics = draft.metrics;
                metrics.share = share_pct(metrics.revenue, total);
                metrics.rank = position as u32 + 1;
                metrics
            })
            .collect()
    }

    /// Window-level figures, per currency.
    pub fn window_totals(
        &self,
        income: &[Bucket],
        expenses: &[Bucket],
        previous_income: &[Bucket],
        ranked: &[EntityMetrics],
    ) -> WindowTotals {
        let revenue = grand_totals(income);
        let expense_totals = grand_totals(expenses);
        let previous = grand_totals(previous_income);

        let net = CurrencyTotals {
            ssp: revenue.ssp - expense_totals.ssp,
            usd: revenue.usd - expense_totals.usd,
        };

        WindowTotals {
            revenue,
            expenses: expense_totals,
            net,
            active_entities: ranked.len(),
            overall_growth_pct: growth_pct(
                revenue.amount_in(self.mode),
                previous.amount_in(self.mode),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Period;

    fn entity(id: &str) -> Entity {
        Entity {
            id: id.to_string(),
            name: format!("{} Department", id),
            code: Some(id.to_uppercase()),
            is_active: true,
        }
    }

    fn month(m: u32) -> Period {
        Period::Month { year: 2025, month: m }
    }

    /// Buckets for months 1..=n with SSP amounts per entity.
    fn buckets(rows: &[(&str, Vec<i64>)]) -> Vec<Bucket> {
        let months = rows.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        (0..months)
            .map(|i| {
                let mut bucket = Bucket::empty(month(i as u32 + 1));
                for (id, values) in rows {
                    if let Some(v) = values.get(i) {
                        if *v != 0 {
                            bucket.per_entity.entry(id.to_string()).or_default().ssp =
                                Decimal::from(*v);
                        }
                    }
                }
                bucket
            })
            .collect()
    }

    #[test]
    fn test_growth_rules() {
        assert_eq!(growth_pct(dec!(300), dec!(200)), dec!(50));
        assert_eq!(growth_pct(dec!(100), dec!(100)), dec!(0));
        assert_eq!(growth_pct(dec!(50), dec!(100)), dec!(-50));
        assert_eq!(growth_pct(dec!(500), dec!(0)), dec!(100));
        assert_eq!(growth_pct(dec!(0), dec!(0)), dec!(0));
        assert_eq!(growth_pct(dec!(0), dec!(-10)), dec!(0));
    }

    #[test]
    fn test_share_with_zero_denominator() {
        assert_eq!(share_pct(dec!(0), dec!(0)), dec!(0));
        assert_eq!(share_pct(dec!(25), dec!(100)), dec!(25));
    }

    #[test]
    fn test_two_entity_scenario() {
        let current = buckets(&[("a", vec![300]), ("b", vec![100])]);
        let previous = buckets(&[("a", vec![200]), ("b", vec![100])]);

        let ranked = MetricsCalculator::new(CurrencyMode::Ssp).compute(
            &[entity("b"), entity("a")],
            &current,
            &previous,
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "a");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].growth_pct, dec!(50));
        assert_eq!(ranked[0].share, dec!(75));
        assert_eq!(ranked[1].id, "b");
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[1].growth_pct, dec!(0));
    }

    #[test]
    fn test_zero_revenue_entities_are_excluded() {
        let current = buckets(&[("a", vec![10, 0]), ("x", vec![0, 0])]);
        let ranked =
            MetricsCalculator::new(CurrencyMode::Ssp).compute(&[entity("x"), entity("a")], &current, &[]);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "a");
        assert_eq!(ranked[0].share, dec!(100));
    }

    #[test]
    fn test_new_entity_gets_sentinel_growth() {
        let current = buckets(&[("a", vec![500])]);
        let ranked = MetricsCalculator::new(CurrencyMode::Ssp).compute(&[entity("a")], &current, &[]);
        assert_eq!(ranked[0].growth_pct, dec!(100));
        assert_eq!(ranked[0].previous_revenue, dec!(0));
    }

    #[test]
    fn test_average_counts_only_active_periods() {
        let current = buckets(&[("a", vec![100, 0, 200, 0])]);
        let ranked = MetricsCalculator::new(CurrencyMode::Ssp).compute(&[entity("a")], &current, &[]);

        assert_eq!(ranked[0].revenue, dec!(300));
        assert_eq!(ranked[0].avg_per_period, dec!(150));
        assert_eq!(ranked[0].monthly_series.len(), 4);
        assert_eq!(ranked[0].monthly_series[1].revenue, dec!(0));
    }

    #[test]
    fn test_best_period_first_seen_wins_ties() {
        let current = buckets(&[("a", vec![100, 300, 300, 50])]);
        let ranked = MetricsCalculator::new(CurrencyMode::Ssp).compute(&[entity("a")], &current, &[]);

        let best = ranked[0].best_period.unwrap();
        assert_eq!(best.period, month(2));
        assert_eq!(best.revenue, dec!(300));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let current = buckets(&[("c", vec![100]), ("a", vec![100]), ("b", vec![200])]);
        let ranked = MetricsCalculator::new(CurrencyMode::Ssp).compute(
            &[entity("c"), entity("a"), entity("b")],
            &current,
            &[],
        );

        let ids: Vec<&str> = ranked.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        let ranks: Vec<u32> = ranked.iter().map(|m| m.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_rank_is_monotonic_and_shares_sum_to_hundred() {
        let current = buckets(&[
            ("a", vec![17, 3]),
            ("b", vec![1, 1]),
            ("c", vec![333, 0]),
            ("d", vec![7, 7]),
            ("e", vec![0, 0]),
            ("f", vec![1, 0]),
        ]);
        let entities: Vec<Entity> = ["a", "b", "c", "d", "e", "f"].iter().map(|id| entity(id)).collect();
        let ranked = MetricsCalculator::new(CurrencyMode::Ssp).compute(&entities, &current, &[]);

        for pair in ranked.windows(2) {
            assert!(pair[0].rank < pair[1].rank);
            assert!(pair[0].revenue >= pair[1].revenue);
        }

        let total_share: Decimal = ranked.iter().map(|m| m.share).sum();
        let tolerance = dec!(0.000001) * Decimal::from(ranked.len());
        assert!((total_share - dec!(100)).abs() <= tolerance);
    }

    #[test]
    fn test_currency_modes_do_not_mix() {
        let mut bucket = Bucket::empty(month(1));
        let totals = bucket.per_entity.entry("a".to_string()).or_default();
        totals.ssp = dec!(1000);
        totals.usd = dec!(50);
        let current = vec![bucket];

        let ssp = MetricsCalculator::new(CurrencyMode::Ssp).compute(&[entity("a")], &current, &[]);
        let usd = MetricsCalculator::new(CurrencyMode::Usd).compute(&[entity("a")], &current, &[]);
        let combined =
            MetricsCalculator::new(CurrencyMode::Combined).compute(&[entity("a")], &current, &[]);

        assert_eq!(ssp[0].revenue, dec!(1000));
        assert_eq!(usd[0].revenue, dec!(50));
        assert_eq!(combined[0].revenue, dec!(1050));
    }

    #[test]
    fn test_window_totals() {
        let income = buckets(&[("a", vec![300]), ("b", vec![100])]);
        let expenses = buckets(&[("a", vec![120])]);
        let previous = buckets(&[("a", vec![200]), ("b", vec![200])]);

        let calculator = MetricsCalculator::new(CurrencyMode::Ssp);
        let ranked = calculator.compute(&[entity("a"), entity("b")], &income, &previous);
        let totals = calculator.window_totals(&income, &expenses, &previous, &ranked);

        assert_eq!(totals.revenue.ssp, dec!(400));
        assert_eq!(totals.expenses.ssp, dec!(120));
        assert_eq!(totals.net.ssp, dec!(280));
        assert_eq!(totals.net.usd, dec!(0));
        assert_eq!(totals.active_entities, 2);
        assert_eq!(totals.overall_growth_pct, dec!(0));
    }
}
