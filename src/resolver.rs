use crate::config::IngestConfig;
use crate::extract::totals_agree;
use crate::numeric::is_effectively_zero;
use crate::rules::{self, aggregate, combine, is_activity_metric, ScaleDecision};
use crate::schema::{AggregationKind, Category, MetricId, MonthLabel, ParsedRow, SourceKind};
use crate::table::LongTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// One line of the month check table: resolved monthly values of a metric
/// and its period value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotalsRow {
    pub metric: MetricId,
    pub aggregation: AggregationKind,
    pub months: BTreeMap<MonthLabel, f64>,
    pub period_value: Option<f64>,
}

/// A file-provided period total that disagrees with the total recomputed
/// from the same line's monthly values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalMismatch {
    pub region: String,
    pub year: Option<i32>,
    pub branch_label: String,
    pub metric: MetricId,
    pub category: Category,
    pub file_total: f64,
    pub recomputed_total: f64,
}

impl TotalMismatch {
    pub fn difference(&self) -> f64 {
        self.recomputed_total - self.file_total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchKey {
    pub region: String,
    pub branch_label: String,
    pub branch_code: Option<String>,
}

/// Read-side queries over an ingested [`LongTable`].
///
/// Monthly values come from "Итого" rows by source priority; only when a
/// region has no "Итого" rows for a cell are its branch lines combined
/// instead. Percentage metrics are rescaled on the way out, never in the
/// table.
pub struct PeriodResolver<'a> {
    table: &'a LongTable,
    config: &'a IngestConfig,
    category: Option<Category>,
}

impl<'a> PeriodResolver<'a> {
    pub fn new(table: &'a LongTable, config: &'a IngestConfig) -> Self {
        Self {
            table,
            config,
            category: None,
        }
    }

    /// Restricts every query to rows of one segment.
    pub fn for_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn aggregation_kind(&self, metric: MetricId) -> AggregationKind {
        rules::aggregation_kind(metric)
    }

    fn admits(&self, row: &ParsedRow) -> bool {
        self.category.map_or(true, |c| row.category == c)
    }

    /// Display scale of a percentage metric, decided from every value of it
    /// in the table.
    pub fn percent_scale(&self, metric: MetricId) -> ScaleDecision {
        let observed = self
            .table
            .iter()
            .filter(|r| r.metric == metric && self.admits(r))
            .map(|r| r.value);
        rules::percent_scale(metric, observed, self.config.percent_fraction_threshold)
    }

    /// The value the files report for one (region, month, metric) cell,
    /// before any percent rescaling.
    ///
    /// "Итого" lines win over branch lines. Lines of a totals-only file win
    /// over the "Итого" lines of branch files. Each line is resolved on its
    /// own by source priority before the lines are combined.
    pub fn resolve_cell(&self, region: &str, month: MonthLabel, metric: MetricId) -> Option<f64> {
        let kind = rules::aggregation_kind(metric);
        let (totals, lines): (Vec<&ParsedRow>, Vec<&ParsedRow>) = self
            .table
            .iter()
            .filter(|r| r.region == region && r.metric == metric && self.admits(r))
            .partition(|r| r.is_total_line());

        let total_cell: Vec<&ParsedRow> = totals.iter().copied().filter(|r| r.month == month).collect();
        if !total_cell.is_empty() {
            let totals_file_lines: HashSet<LineKey<'_>> = totals
                .iter()
                .filter(|r| r.source_kind == SourceKind::TotalsFile)
                .map(|r| line_key(r))
                .collect();
            let preferred: Vec<&ParsedRow> = total_cell
                .iter()
                .copied()
                .filter(|r| totals_file_lines.contains(&line_key(r)))
                .collect();
            if !preferred.is_empty() {
                return resolve_lines(&preferred, month, kind);
            }
            return resolve_lines(&total_cell, month, kind);
        }

        let line_cell: Vec<&ParsedRow> = lines.into_iter().filter(|r| r.month == month).collect();
        resolve_lines(&line_cell, month, kind)
    }

    fn region_value_raw(&self, region: &str, metric: MetricId, months: &[MonthLabel]) -> Option<f64> {
        let values: Vec<f64> = months
            .iter()
            .filter_map(|m| self.resolve_cell(region, *m, metric))
            .collect();
        aggregate(rules::aggregation_kind(metric), &values)
    }

    /// Period value over a set of regions: each region is aggregated on its
    /// own, then the regions are combined. `None` means no data at all.
    pub fn period_value<S: AsRef<str>>(
        &self,
        regions: &[S],
        metric: MetricId,
        months: &[MonthLabel],
    ) -> Option<f64> {
        let per_region: Vec<f64> = regions
            .iter()
            .filter_map(|region| self.region_value_raw(region.as_ref(), metric, months))
            .collect();

        match combine(rules::aggregation_kind(metric), &per_region) {
            Some(value) => Some(self.percent_scale(metric).apply(value)),
            None => self.derive_ratio(metric, |m| self.period_value(regions, m, months)),
        }
    }

    pub fn period_value_per_region<S: AsRef<str>>(
        &self,
        regions: &[S],
        metric: MetricId,
        months: &[MonthLabel],
    ) -> BTreeMap<String, f64> {
        let scale = self.percent_scale(metric);
        regions
            .iter()
            .filter_map(|region| {
                let region = region.as_ref();
                let value = match self.region_value_raw(region, metric, months) {
                    Some(raw) => Some(scale.apply(raw)),
                    None => self.derive_ratio(metric, |m| {
                        self.period_value(&[region], m, months)
                    }),
                };
                value.map(|v| (region.to_string(), v))
            })
            .collect()
    }

    /// Resolved value per calendar month, regions combined month by month.
    pub fn monthly_series<S: AsRef<str>>(
        &self,
        regions: &[S],
        metric: MetricId,
    ) -> BTreeMap<MonthLabel, f64> {
        let series = self.series_for(regions, metric, &MonthLabel::CALENDAR);
        if !series.is_empty() || !self.is_derivable(metric) {
            return series;
        }

        MonthLabel::CALENDAR
            .iter()
            .filter_map(|month| {
                self.derive_ratio(metric, |m| {
                    self.series_for(regions, m, &[*month]).get(month).copied()
                })
                .map(|v| (*month, v))
            })
            .collect()
    }

    fn series_for<S: AsRef<str>>(
        &self,
        regions: &[S],
        metric: MetricId,
        months: &[MonthLabel],
    ) -> BTreeMap<MonthLabel, f64> {
        let kind = rules::aggregation_kind(metric);
        let scale = self.percent_scale(metric);
        months
            .iter()
            .filter_map(|month| {
                let values: Vec<f64> = regions
                    .iter()
                    .filter_map(|region| self.resolve_cell(region.as_ref(), *month, metric))
                    .collect();
                combine(kind, &values).map(|v| (*month, scale.apply(v)))
            })
            .collect()
    }

    /// Raw branch lines (no "Итого" rows) for structure and leaderboard
    /// views. Not deduplicated across files.
    pub fn branch_level_table<S: AsRef<str>>(&self, regions: &[S], months: &[MonthLabel]) -> LongTable {
        let mut scales: HashMap<MetricId, ScaleDecision> = HashMap::new();
        self.table
            .iter()
            .filter(|r| {
                !r.is_total_line()
                    && self.admits(r)
                    && months.contains(&r.month)
                    && regions.iter().any(|g| g.as_ref() == r.region)
            })
            .map(|r| {
                let scale = *scales
                    .entry(r.metric)
                    .or_insert_with(|| self.percent_scale(r.metric));
                ParsedRow {
                    value: scale.apply(r.value),
                    ..r.clone()
                }
            })
            .collect()
    }

    /// Month check table: every metric present for the regions, with its
    /// resolved monthly values and period value.
    pub fn monthly_totals_table<S: AsRef<str>>(
        &self,
        regions: &[S],
        months: &[MonthLabel],
    ) -> Vec<MonthlyTotalsRow> {
        let metrics: BTreeSet<MetricId> = self
            .table
            .iter()
            .filter(|r| self.admits(r) && regions.iter().any(|g| g.as_ref() == r.region))
            .map(|r| r.metric)
            .collect();

        metrics
            .into_iter()
            .map(|metric| MonthlyTotalsRow {
                metric,
                aggregation: rules::aggregation_kind(metric),
                months: self.series_for(regions, metric, months),
                period_value: self.period_value(regions, metric, months),
            })
            .collect()
    }

    /// Every file-provided total that the recomputation disagrees with.
    ///
    /// A line is identified by its region, year, branch label, metric and
    /// category; row order in the table does not matter.
    pub fn reconcile_totals<S: AsRef<str>>(&self, regions: &[S]) -> Vec<TotalMismatch> {
        let in_scope = |r: &&ParsedRow| {
            r.month == MonthLabel::Total
                && self.admits(r)
                && regions.iter().any(|g| g.as_ref() == r.region)
        };

        let mut recomputed: HashMap<ReconcileKey<'_>, f64> = HashMap::new();
        for row in self
            .table
            .iter()
            .filter(in_scope)
            .filter(|r| r.source_kind == SourceKind::RecomputedTotal)
        {
            recomputed.entry(reconcile_key(row)).or_insert(row.value);
        }

        self.table
            .iter()
            .filter(in_scope)
            .filter(|r| r.source_kind != SourceKind::RecomputedTotal)
            .filter_map(|file| {
                let recomputed_total = *recomputed.get(&reconcile_key(file))?;
                if totals_agree(file.value, recomputed_total) {
                    return None;
                }
                Some(TotalMismatch {
                    region: file.region.clone(),
                    year: file.year,
                    branch_label: file.branch_label.clone(),
                    metric: file.metric,
                    category: file.category,
                    file_total: file.value,
                    recomputed_total,
                })
            })
            .collect()
    }

    /// Branches with non-zero non-jewelry activity in the window.
    pub fn active_branches<S: AsRef<str>>(&self, regions: &[S], months: &[MonthLabel]) -> Vec<BranchKey> {
        let mut activity: BTreeMap<(String, String), (Option<String>, f64)> = BTreeMap::new();
        for row in self.table.iter().filter(|r| {
            !r.is_total_line()
                && r.category != Category::Jewelry
                && is_activity_metric(r.metric)
                && months.contains(&r.month)
                && regions.iter().any(|g| g.as_ref() == r.region)
        }) {
            let entry = activity
                .entry((row.region.clone(), row.branch_label.clone()))
                .or_insert_with(|| (row.branch_code.clone(), 0.0));
            entry.1 += row.value.abs();
        }

        activity
            .into_iter()
            .filter(|(_, (_, total))| !is_effectively_zero(*total))
            .map(|((region, branch_label), (branch_code, _))| BranchKey {
                region,
                branch_label,
                branch_code,
            })
            .collect()
    }

    fn is_derivable(&self, metric: MetricId) -> bool {
        self.config.derive_missing_ratios && ratio_components(metric).is_some()
    }

    /// Ratio metric computed from its components, only when the config asks
    /// for derived values.
    fn derive_ratio<F>(&self, metric: MetricId, component: F) -> Option<f64>
    where
        F: Fn(MetricId) -> Option<f64>,
    {
        if !self.config.derive_missing_ratios {
            return None;
        }
        let (numerator, denominator, factor) = ratio_components(metric)?;
        let den = component(denominator)?;
        if is_effectively_zero(den) {
            return None;
        }
        Some(component(numerator)? / den * factor)
    }
}

/// (numerator, denominator, factor) of the ratio metrics that can be rebuilt
/// from flow metrics.
pub fn ratio_components(metric: MetricId) -> Option<(MetricId, MetricId, f64)> {
    match metric {
        MetricId::AvgLoan => Some((MetricId::LoanIssue, MetricId::LoanIssueUnits, 1.0)),
        MetricId::MarkupPct => Some((MetricId::MarkupAmount, MetricId::Revenue, 100.0)),
        MetricId::RiskShare => Some((MetricId::BelowLoan, MetricId::Revenue, 100.0)),
        MetricId::Yield => Some((MetricId::PenaltiesReceived, MetricId::LoanIssue, 100.0)),
        _ => None,
    }
}

type LineKey<'r> = (&'r str, Category);

type ReconcileKey<'r> = (&'r str, Option<i32>, &'r str, MetricId, Category);

fn line_key(row: &ParsedRow) -> LineKey<'_> {
    (row.branch_label.as_str(), row.category)
}

fn reconcile_key(row: &ParsedRow) -> ReconcileKey<'_> {
    (
        row.region.as_str(),
        row.year,
        row.branch_label.as_str(),
        row.metric,
        row.category,
    )
}

/// Groups the rows of one cell by line, resolves every line by source
/// priority and combines the lines.
fn resolve_lines(rows: &[&ParsedRow], month: MonthLabel, kind: AggregationKind) -> Option<f64> {
    let mut by_line: BTreeMap<(&str, &str), Vec<&ParsedRow>> = BTreeMap::new();
    for row in rows.iter().copied() {
        by_line
            .entry((row.branch_label.as_str(), row.category.label()))
            .or_default()
            .push(row);
    }
    let values: Vec<f64> = by_line
        .values()
        .filter_map(|line| pick_by_priority(line, month, kind))
        .collect();
    combine(kind, &values)
}

/// Recomputed total (period total only), then a totals-only file, then all
/// branch-file rows of the line combined.
fn pick_by_priority(rows: &[&ParsedRow], month: MonthLabel, kind: AggregationKind) -> Option<f64> {
    if month == MonthLabel::Total {
        if let Some(row) = rows
            .iter()
            .find(|r| r.source_kind == SourceKind::RecomputedTotal)
        {
            return Some(row.value);
        }
    }
    if let Some(row) = rows.iter().find(|r| r.source_kind == SourceKind::TotalsFile) {
        return Some(row.value);
    }
    let branch: Vec<f64> = rows
        .iter()
        .filter(|r| r.source_kind == SourceKind::BranchFile)
        .map(|r| r.value)
        .collect();
    combine(kind, &branch)
}
