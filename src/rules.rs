use crate::schema::{AggregationKind, MetricId};
use serde::{Deserialize, Serialize};

const ADDITIVE: &[MetricId] = &[
    MetricId::Revenue,
    MetricId::LoanIssue,
    MetricId::PenaltiesReceived,
    MetricId::MarkupAmount,
    MetricId::PenaltiesPlusMarkup,
    MetricId::LoanIssueUnits,
    MetricId::BelowLoan,
    MetricId::BelowLoanUnits,
    MetricId::LoanValueOfSold,
    MetricId::AuctionedItemsCount,
    MetricId::RedeemedItemsCount,
    MetricId::RedeemedSum,
    MetricId::LoanRepaymentSum,
    MetricId::LossBelowLoan,
    MetricId::BranchNewCount,
    MetricId::BranchClosedCount,
    MetricId::UniqueClients,
    MetricId::NewUniqueClients,
];

const AVERAGED: &[MetricId] = &[
    MetricId::MarkupPct,
    MetricId::Yield,
    MetricId::IlliquidByCountPct,
    MetricId::IlliquidByValuePct,
    MetricId::IssueShare,
    MetricId::DebtShare,
    MetricId::InterestShare,
    MetricId::PlanIssuePct,
    MetricId::PlanPenaltiesPct,
    MetricId::PlanRevenuePct,
    MetricId::AvgLoan,
    MetricId::AvgLoanTerm,
    MetricId::RedeemedSharePct,
];

const SNAPSHOT: &[MetricId] = &[
    MetricId::Debt,
    MetricId::DebtNoSale,
    MetricId::DebtUnits,
    MetricId::BranchCount,
];

/// Metrics whose non-zero values mark a branch as active in the
/// non-jewelry segment.
const ACTIVITY: &[MetricId] = &[
    MetricId::DebtNoSale,
    MetricId::LoanIssue,
    MetricId::LoanIssueUnits,
    MetricId::PenaltiesReceived,
    MetricId::Revenue,
    MetricId::MarkupAmount,
    MetricId::PenaltiesPlusMarkup,
    MetricId::LoanValueOfSold,
    MetricId::AuctionedItemsCount,
    MetricId::AvgLoan,
    MetricId::MarkupPct,
    MetricId::RedeemedSum,
    MetricId::RedeemedItemsCount,
    MetricId::AvgLoanTerm,
    MetricId::LoanRepaymentSum,
    MetricId::BelowLoanUnits,
    MetricId::BelowLoan,
    MetricId::LossBelowLoan,
    MetricId::DebtUnits,
    MetricId::IlliquidByCountPct,
    MetricId::IlliquidByValuePct,
    MetricId::Yield,
    MetricId::IssueShare,
    MetricId::DebtShare,
    MetricId::InterestShare,
    MetricId::PlanIssuePct,
    MetricId::PlanPenaltiesPct,
    MetricId::PlanRevenuePct,
];

pub fn is_activity_metric(metric: MetricId) -> bool {
    ACTIVITY.contains(&metric)
}

const PERCENT: &[MetricId] = &[
    MetricId::MarkupPct,
    MetricId::IlliquidByCountPct,
    MetricId::IlliquidByValuePct,
    MetricId::Yield,
    MetricId::RiskShare,
    MetricId::IssueShare,
    MetricId::DebtShare,
    MetricId::RedeemedSharePct,
    MetricId::PlanIssuePct,
    MetricId::PlanPenaltiesPct,
    MetricId::PlanRevenuePct,
    MetricId::InterestShare,
    MetricId::CalcMarkupPct,
];

/// Whether a metric's values are percentages.
pub fn is_percent_metric(metric: MetricId) -> bool {
    if PERCENT.contains(&metric) {
        return true;
    }
    let label = metric.label().to_lowercase();
    label.contains("доля") || label.contains("share")
}

/// Period aggregation of a metric: static table membership, else averaged
/// for percentages and additive for everything else.
pub fn aggregation_kind(metric: MetricId) -> AggregationKind {
    if ADDITIVE.contains(&metric) {
        AggregationKind::Additive
    } else if AVERAGED.contains(&metric) {
        AggregationKind::Averaged
    } else if SNAPSHOT.contains(&metric) {
        AggregationKind::Snapshot
    } else if is_percent_metric(metric) {
        AggregationKind::Averaged
    } else {
        AggregationKind::Additive
    }
}

/// Collapses month-ordered values into one period value. `None` when there
/// is nothing to aggregate.
pub fn aggregate(kind: AggregationKind, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let value = match kind {
        AggregationKind::Additive => values.iter().sum(),
        AggregationKind::Averaged => values.iter().sum::<f64>() / values.len() as f64,
        AggregationKind::Snapshot => *values.last()?,
    };
    Some(value)
}

/// Combines parallel values of one period (several regions, or several
/// branch lines of the same month). Snapshots resolved separately add up;
/// rates are averaged.
pub fn combine(kind: AggregationKind, values: &[f64]) -> Option<f64> {
    match kind {
        AggregationKind::Averaged => aggregate(AggregationKind::Averaged, values),
        AggregationKind::Additive | AggregationKind::Snapshot => {
            aggregate(AggregationKind::Additive, values)
        }
    }
}

/// How a percentage metric is shown to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDecision {
    /// Values are used as stored.
    AsIs,
    /// Every observed value sits within the fraction threshold, so values are
    /// read as 0..1 fractions and multiplied by 100.
    FractionTimes100,
}

impl ScaleDecision {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            ScaleDecision::AsIs => value,
            ScaleDecision::FractionTimes100 => value * 100.0,
        }
    }
}

/// Decides the display scale of a metric from all of its observed values.
pub fn percent_scale<I>(metric: MetricId, observed: I, threshold: f64) -> ScaleDecision
where
    I: IntoIterator<Item = f64>,
{
    if !is_percent_metric(metric) {
        return ScaleDecision::AsIs;
    }
    let mut seen_any = false;
    for value in observed {
        seen_any = true;
        if value.abs() > threshold {
            return ScaleDecision::AsIs;
        }
    }
    if seen_any {
        ScaleDecision::FractionTimes100
    } else {
        ScaleDecision::AsIs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Option<f64>, expected: f64) {
        let value = actual.unwrap_or_else(|| panic!("expected {}, got None", expected));
        assert!(
            (value - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            value
        );
    }

    #[test]
    fn test_every_metric_has_one_kind() {
        for metric in MetricId::ALL {
            let memberships = [ADDITIVE, AVERAGED, SNAPSHOT]
                .iter()
                .filter(|set| set.contains(&metric))
                .count();
            assert!(memberships <= 1, "{:?} is in {} sets", metric, memberships);
        }
    }

    #[test]
    fn test_default_fallback() {
        assert_eq!(aggregation_kind(MetricId::RiskShare), AggregationKind::Averaged);
        assert_eq!(aggregation_kind(MetricId::CalcMarkupPct), AggregationKind::Averaged);
        assert_eq!(aggregation_kind(MetricId::LoanIssue), AggregationKind::Additive);
        assert_eq!(aggregation_kind(MetricId::Debt), AggregationKind::Snapshot);
        assert_eq!(aggregation_kind(MetricId::AvgLoanTerm), AggregationKind::Averaged);
    }

    #[test]
    fn test_aggregation_kinds() {
        assert_close(aggregate(AggregationKind::Additive, &[100.0, 200.0, 300.0]), 600.0);
        assert_close(aggregate(AggregationKind::Averaged, &[10.0, 20.0, 30.0]), 20.0);
        assert_close(aggregate(AggregationKind::Snapshot, &[5.0, 5.0, 7.0]), 7.0);
        assert_close(aggregate(AggregationKind::Snapshot, &[5.0, 5.0]), 5.0);
        assert_eq!(aggregate(AggregationKind::Additive, &[]), None);
        assert_close(aggregate(AggregationKind::Additive, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_combine() {
        assert_close(combine(AggregationKind::Snapshot, &[10.0, 15.0]), 25.0);
        assert_close(combine(AggregationKind::Averaged, &[10.0, 20.0]), 15.0);
        assert_eq!(combine(AggregationKind::Additive, &[]), None);
    }

    #[test]
    fn test_activity_metrics() {
        assert!(is_activity_metric(MetricId::LoanIssue));
        assert!(is_activity_metric(MetricId::DebtUnits));
        assert!(is_activity_metric(MetricId::PlanRevenuePct));
        assert!(is_activity_metric(MetricId::InterestShare));
        assert!(!is_activity_metric(MetricId::Debt));
        assert!(!is_activity_metric(MetricId::BranchCount));
    }

    #[test]
    fn test_percent_detection() {
        assert!(is_percent_metric(MetricId::Yield));
        assert!(is_percent_metric(MetricId::IlliquidByValuePct));
        assert!(!is_percent_metric(MetricId::LoanIssue));
        assert!(!is_percent_metric(MetricId::AvgLoan));
    }

    #[test]
    fn test_percent_scale() {
        let fractions = [0.12, 0.5, -0.3];
        assert_eq!(
            percent_scale(MetricId::Yield, fractions, 1.5),
            ScaleDecision::FractionTimes100
        );
        assert_eq!(
            percent_scale(MetricId::Yield, [0.8, 12.0], 1.5),
            ScaleDecision::AsIs
        );
        assert_eq!(
            percent_scale(MetricId::LoanIssue, [0.5], 1.5),
            ScaleDecision::AsIs
        );
        assert_eq!(
            percent_scale(MetricId::Yield, Vec::<f64>::new(), 1.5),
            ScaleDecision::AsIs
        );
        assert!((ScaleDecision::FractionTimes100.apply(0.25) - 25.0).abs() < 1e-9);
    }
}
