use crate::schema::{Category, MetricId};
use regex::Regex;
use std::sync::OnceLock;

fn non_jewelry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bн\s*ю\s*з\b|нюз").expect("invalid non-jewelry regex"))
}

fn jewelry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bю\s*з\b").expect("invalid jewelry regex"))
}

/// Classifies free text by its segment markers.
///
/// Non-jewelry markers are removed before looking for the jewelry code, since
/// "юз" is a substring of "нюз". Text carrying both markers is ambiguous and
/// stays unlabeled.
pub fn classify(text: &str) -> Category {
    let lowered = text.to_lowercase().replace('ё', "е");
    let has_non_jewelry = non_jewelry_re().is_match(&lowered);
    let remainder = non_jewelry_re().replace_all(&lowered, " ");
    let has_jewelry = jewelry_re().is_match(&remainder);

    match (has_non_jewelry, has_jewelry) {
        (true, false) => Category::NonJewelry,
        (false, true) => Category::Jewelry,
        _ => Category::Unlabeled,
    }
}

/// Metrics that are only ever reported for one segment, whatever the row
/// text says.
pub fn fixed_override(metric: MetricId) -> Option<Category> {
    match metric {
        MetricId::IssueShare
        | MetricId::DebtShare
        | MetricId::InterestShare
        | MetricId::RedeemedSharePct => Some(Category::NonJewelry),
        _ => None,
    }
}

/// Texts of one data row that may carry a segment marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowContext<'a> {
    pub metric_label: &'a str,
    pub branch_label: &'a str,
    pub left_text: &'a str,
}

/// Category decided for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCategory {
    pub category: Category,
    /// The explicit marker found in the row text, which becomes the new
    /// sticky category for the rows below.
    pub signal: Option<Category>,
}

/// Resolves a row's category: fixed override, then metric label, branch
/// label, left-of-metric text and finally the inherited sticky category.
pub fn resolve_row_category(
    metric: MetricId,
    context: RowContext<'_>,
    inherited: Category,
) -> RowCategory {
    let signal = [context.metric_label, context.branch_label, context.left_text]
        .into_iter()
        .map(classify)
        .find(Category::is_labeled);

    let category = fixed_override(metric)
        .or(signal)
        .unwrap_or(inherited);

    RowCategory { category, signal }
}
