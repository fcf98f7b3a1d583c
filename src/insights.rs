use crate::format::{format_percent, format_signed_percent};
use crate::schema::{EntityMetrics, Insight, InsightKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Cut-offs for the insight rules. Percent values, compared strictly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct InsightThresholds {
    /// Fastest grower is reported only above this growth.
    pub fastest_growth_min_pct: Decimal,
    /// Entities below this growth get a warning.
    pub decline_below_pct: Decimal,
    /// Share under which a lower-ranked entity is called out.
    pub potential_share_below_pct: Decimal,
    /// Rank after which an entity counts as lower-ranked.
    pub potential_rank_after: u32,
    pub new_growth_above_pct: Decimal,
    pub new_share_below_pct: Decimal,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            fastest_growth_min_pct: dec!(10),
            decline_below_pct: dec!(-5),
            potential_share_below_pct: dec!(10),
            potential_rank_after: 3,
            new_growth_above_pct: dec!(90),
            new_share_below_pct: dec!(5),
        }
    }
}

pub struct InsightsGenerator {
    thresholds: InsightThresholds,
}

impl Default for InsightsGenerator {
    fn default() -> Self {
        Self::new(InsightThresholds::default())
    }
}

impl InsightsGenerator {
    pub fn new(thresholds: InsightThresholds) -> Self {
        Self { thresholds }
    }

    /// Runs every rule in order over an already ranked list. Each rule adds
    /// zero or more insights; output order is rule order. A repeated id only
    /// counts at its first position.
    pub fn generate(&self, ranked: &[EntityMetrics]) -> Vec<Insight> {
        let mut seen = HashSet::new();
        let unique: Vec<EntityMetrics> = ranked
            .iter()
            .filter(|m| seen.insert(m.id.as_str()))
            .cloned()
            .collect();
        let ranked = unique.as_slice();

        let mut insights = Vec::new();

        self.top_performer(ranked, &mut insights);
        self.fastest_growing(ranked, &mut insights);
        self.decliners(ranked, &mut insights);
        self.untapped_potential(ranked, &mut insights);
        self.new_and_growing(ranked, &mut insights);

        insights
    }

    fn top_performer(&self, ranked: &[EntityMetrics], out: &mut Vec<Insight>) {
        if let Some(top) = ranked.first() {
            out.push(Insight {
                kind: InsightKind::Info,
                message: format!(
                    "{} is the top performer with {} of total revenue",
                    top.name,
                    format_percent(top.share, 1)
                ),
            });
        }
    }

    fn fastest_growing(&self, ranked: &[EntityMetrics], out: &mut Vec<Insight>) {
        let mut fastest: Option<&EntityMetrics> = None;
        for metrics in ranked {
            match fastest {
                Some(best) if metrics.growth_pct <= best.growth_pct => {}
                _ => fastest = Some(metrics),
            }
        }

        if let Some(best) = fastest {
            if best.growth_pct > self.thresholds.fastest_growth_min_pct {
                out.push(Insight {
                    kind: InsightKind::Success,
                    message: format!(
                        "{} is the fastest growing at {} versus the previous period",
                        best.name,
                        format_signed_percent(best.growth_pct, 1)
                    ),
                });
            }
        }
    }

    fn decliners(&self, ranked: &[EntityMetrics], out: &mut Vec<Insight>) {
        for metrics in ranked
            .iter()
            .filter(|m| m.growth_pct < self.thresholds.decline_below_pct)
        {
            out.push(Insight {
                kind: InsightKind::Warning,
                message: format!(
                    "{} revenue fell {} versus the previous period",
                    metrics.name,
                    format_percent(metrics.growth_pct.abs(), 1)
                ),
            });
        }
    }

    fn untapped_potential(&self, ranked: &[EntityMetrics], out: &mut Vec<Insight>) {
        let candidate = ranked.iter().find(|m| {
            m.share < self.thresholds.potential_share_below_pct
                && m.rank > self.thresholds.potential_rank_after
        });

        if let Some(metrics) = candidate {
            out.push(Insight {
                kind: InsightKind::Info,
                message: format!(
                    "{} contributes only {} of revenue and has room to grow",
                    metrics.name,
                    format_percent(metrics.share, 1)
                ),
            });
        }
    }

    fn new_and_growing(&self, ranked: &[EntityMetrics], out: &mut Vec<Insight>) {
        for metrics in ranked.iter().filter(|m| {
            m.growth_pct > self.thresholds.new_growth_above_pct
                && m.share < self.thresholds.new_share_below_pct
        }) {
            out.push(Insight {
                kind: InsightKind::Success,
                message: format!(
                    "{} is a small but fast-rising contributor ({})",
                    metrics.name,
                    format_signed_percent(metrics.growth_pct, 1)
                ),
            });
        }
    }
}
