use crate::canonical::canonicalize_accepted;
use crate::category::{resolve_row_category, RowContext};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::header::{locate_month_header, MonthHeader};
use crate::numeric::{coerce_cell, is_effectively_zero};
use crate::rules::{aggregate, aggregation_kind};
use crate::schema::{is_total_label, Category, MonthLabel, ParsedRow, SourceKind};
use crate::utils::{normalize_region, region_from_total_header};
use crate::workbook::Sheet;
use log::{debug, info, warn};
use regex::Regex;
use std::sync::OnceLock;

/// Relative tolerance when comparing a file total with the recomputed one.
const TOTAL_TOLERANCE: f64 = 1e-9;

fn branch_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"№\s*(\d+)").expect("invalid branch code regex"))
}

/// Digits following "№" in a branch label.
pub fn branch_code(label: &str) -> Option<String> {
    branch_code_re()
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whole-sheet facts shared by every row of the walk.
#[derive(Debug, Clone)]
pub struct SheetContext<'a> {
    pub sheet: &'a Sheet,
    pub header: &'a MonthHeader,
    pub region: String,
    pub year: Option<i32>,
    pub source_kind: SourceKind,
    pub config: &'a IngestConfig,
}

/// Sticky context carried from one row to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWalkState {
    pub current_branch: String,
    pub last_category: Category,
}

impl Default for RowWalkState {
    fn default() -> Self {
        Self {
            current_branch: String::new(),
            last_category: Category::Unlabeled,
        }
    }
}

/// Fold accumulator of the row walk.
#[derive(Debug, Clone, Default)]
pub struct RowWalk {
    pub state: RowWalkState,
    pub rows: Vec<ParsedRow>,
    /// Rows whose metric label canonicalized to an accepted metric.
    pub recognized_rows: usize,
    /// Rows dropped by the segment filter.
    pub filtered_rows: usize,
}

impl RowWalk {
    /// Walks every row below the header.
    pub fn run(ctx: &SheetContext<'_>) -> Self {
        (ctx.header.row + 1..ctx.sheet.row_count())
            .fold(RowWalk::default(), |walk, row| walk.step(ctx, row))
    }

    /// Advances the walk by one sheet row.
    pub fn step(mut self, ctx: &SheetContext<'_>, row: usize) -> Self {
        if let Some(text) = ctx.sheet.text(row, 0) {
            self.state.current_branch = text.to_string();
        }

        let first_month_col = ctx.header.first_month_col();
        let Some((label_col, metric_label)) = (0..first_month_col)
            .rev()
            .find_map(|c| ctx.sheet.text(row, c).map(|t| (c, t)))
        else {
            return self;
        };

        let Some(metric) = canonicalize_accepted(metric_label) else {
            debug!("Row {}: metric label '{}' not recognized", row + 1, metric_label);
            return self;
        };
        self.recognized_rows += 1;

        let left_text = (0..label_col)
            .filter_map(|c| ctx.sheet.text(row, c))
            .collect::<Vec<_>>()
            .join(" ");
        let resolved = resolve_row_category(
            metric,
            RowContext {
                metric_label,
                branch_label: &self.state.current_branch,
                left_text: &left_text,
            },
            self.state.last_category,
        );
        if let Some(signal) = resolved.signal {
            self.state.last_category = signal;
        }

        if !ctx.config.segment_filter.admits(resolved.category) {
            debug!(
                "Row {}: {} dropped by segment filter ({})",
                row + 1,
                metric.id(),
                resolved.category.label()
            );
            self.filtered_rows += 1;
            return self;
        }

        let line = LineValues::read(ctx, row);
        if !line.has_activity() {
            debug!("Row {}: {} has no reported values", row + 1, metric.id());
            return self;
        }

        let template = ParsedRow {
            region: ctx.region.clone(),
            year: ctx.year,
            source_kind: ctx.source_kind,
            branch_code: branch_code(&self.state.current_branch),
            branch_label: self.state.current_branch.clone(),
            metric,
            month: MonthLabel::Total,
            value: 0.0,
            category: resolved.category,
        };
        self.rows.extend(line.into_rows(&template));
        self
    }
}

/// Month values of one data row after trimming.
#[derive(Debug, Clone, PartialEq)]
struct LineValues {
    monthly: Vec<(MonthLabel, f64)>,
    literal_total: Option<f64>,
}

impl LineValues {
    fn read(ctx: &SheetContext<'_>, row: usize) -> Self {
        let raw: Vec<(MonthLabel, Option<f64>)> = ctx
            .header
            .calendar_columns()
            .map(|(col, month)| (month, coerce_cell(ctx.sheet.cell(row, col))))
            .collect();
        let literal_total = ctx
            .header
            .total_column()
            .and_then(|col| coerce_cell(ctx.sheet.cell(row, col)));

        Self {
            monthly: trim_edge_zeros(&raw),
            literal_total,
        }
    }

    fn has_activity(&self) -> bool {
        self.monthly.iter().any(|(_, v)| !is_effectively_zero(*v))
            || self.literal_total.is_some_and(|t| !is_effectively_zero(t))
    }

    /// Monthly rows, the file's own total and the recomputed total when it
    /// adds information.
    fn into_rows(self, template: &ParsedRow) -> Vec<ParsedRow> {
        let at = |month: MonthLabel, value: f64, source_kind: SourceKind| ParsedRow {
            month,
            value,
            source_kind,
            ..template.clone()
        };

        let values: Vec<f64> = self.monthly.iter().map(|(_, v)| *v).collect();
        let recomputed = aggregate(aggregation_kind(template.metric), &values);

        let mut rows: Vec<ParsedRow> = self
            .monthly
            .iter()
            .map(|(month, value)| at(*month, *value, template.source_kind))
            .collect();

        if let Some(total) = self.literal_total {
            rows.push(at(MonthLabel::Total, total, template.source_kind));
        }

        match (recomputed, self.literal_total) {
            (Some(value), None) => {
                rows.push(at(MonthLabel::Total, value, SourceKind::RecomputedTotal));
            }
            (Some(value), Some(total)) if !totals_agree(value, total) => {
                warn!(
                    "{} / {} / {}: file total {} differs from recomputed {}",
                    template.region,
                    template.branch_label,
                    template.metric.id(),
                    total,
                    value
                );
                rows.push(at(MonthLabel::Total, value, SourceKind::RecomputedTotal));
            }
            _ => {}
        }
        rows
    }
}

pub(crate) fn totals_agree(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOTAL_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Drops missing cells and the effectively-zero runs touching the first or
/// last month column; zeros between reported values are kept.
pub fn trim_edge_zeros(values: &[(MonthLabel, Option<f64>)]) -> Vec<(MonthLabel, f64)> {
    let is_edge_zero = |v: &Option<f64>| v.is_some_and(is_effectively_zero);
    let leading = values.iter().take_while(|(_, v)| is_edge_zero(v)).count();
    let trailing = values[leading..]
        .iter()
        .rev()
        .take_while(|(_, v)| is_edge_zero(v))
        .count();

    values[leading..values.len() - trailing]
        .iter()
        .filter_map(|(month, v)| v.map(|value| (*month, value)))
        .collect()
}

/// Workbooks whose first column-0 text is an "Итого" line carry totals only.
pub fn detect_source_kind(sheet: &Sheet) -> SourceKind {
    match sheet.first_column_text() {
        Some(text) if is_total_label(text) => SourceKind::TotalsFile,
        _ => SourceKind::BranchFile,
    }
}

/// Region named by an "Итого <Region>" line above the month header.
pub fn region_above_header(sheet: &Sheet, header_row: usize) -> Option<String> {
    (0..header_row)
        .filter_map(|r| sheet.text(r, 0))
        .find_map(region_from_total_header)
}

/// Extracts every row of one data sheet.
///
/// Fails when the sheet has no month header, when no row carries an accepted
/// metric, when the segment filter leaves nothing, or when the recognized rows
/// hold no values.
pub fn ingest_sheet(
    sheet: &Sheet,
    region: &str,
    year: Option<i32>,
    config: &IngestConfig,
) -> Result<Vec<ParsedRow>> {
    let header = locate_month_header(sheet, config.max_header_scan_rows).ok_or_else(|| {
        IngestError::HeaderNotFound {
            sheet: sheet.name.clone(),
            scanned_rows: config.max_header_scan_rows,
        }
    })?;

    let region = region_above_header(sheet, header.row)
        .map(|r| normalize_region(&r))
        .unwrap_or_else(|| normalize_region(region));
    let source_kind = detect_source_kind(sheet);

    let ctx = SheetContext {
        sheet,
        header: &header,
        region,
        year,
        source_kind,
        config,
    };
    let walk = RowWalk::run(&ctx);

    if walk.recognized_rows == 0 {
        return Err(IngestError::NoRecognizedMetrics {
            sheet: sheet.name.clone(),
        });
    }
    if walk.rows.is_empty() && walk.filtered_rows > 0 {
        return Err(IngestError::SegmentFilterEmpty {
            segment: config.segment_filter.label().to_string(),
        });
    }
    if walk.rows.is_empty() {
        return Err(IngestError::NoUsableValues {
            sheet: sheet.name.clone(),
        });
    }

    info!(
        "Sheet '{}' ({}, {}): header at row {}, {} metric rows, {} values",
        sheet.name,
        ctx.region,
        source_kind.label(),
        header.row + 1,
        walk.recognized_rows,
        walk.rows.len()
    );
    Ok(walk.rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::is_accepted;
    use crate::config::SegmentFilter;
    use crate::schema::MetricId;
    use crate::workbook::Cell;

    const MONTHS: [&str; 12] = [
        "Январь", "Февраль", "Март", "Апрель", "Май", "Июнь", "Июль", "Август", "Сентябрь",
        "Октябрь", "Ноябрь", "Декабрь",
    ];

    fn header_row() -> Vec<Cell> {
        let mut row = vec![Cell::Empty, Cell::from("Показатель")];
        row.extend(MONTHS.iter().map(|m| Cell::from(*m)));
        row.push(Cell::from("Итого"));
        row
    }

    fn data_row(branch: &str, label: &str, values: &[Option<f64>]) -> Vec<Cell> {
        let mut row = vec![Cell::from(branch), Cell::from(label)];
        row.extend(values.iter().map(|v| v.map(Cell::Number).unwrap_or(Cell::Empty)));
        row
    }

    fn sheet(rows: Vec<Vec<Cell>>) -> Sheet {
        let mut all = vec![vec![Cell::from("Отчет по подразделениям")], header_row()];
        all.extend(rows);
        Sheet::new("TDSheet", all)
    }

    fn twelve(value: f64) -> Vec<Option<f64>> {
        vec![Some(value); 12]
    }

    fn monthly(rows: &[ParsedRow]) -> Vec<&ParsedRow> {
        rows.iter().filter(|r| r.month.is_calendar()).collect()
    }

    #[test]
    fn test_branch_code() {
        assert_eq!(branch_code("Филиал №7"), Some("7".to_string()));
        assert_eq!(branch_code("Ломбард № 112 (Тверь)"), Some("112".to_string()));
        assert_eq!(branch_code("Итого"), None);
    }

    #[test]
    fn test_trim_edge_zeros() {
        use MonthLabel::*;
        let values = [
            (January, None),
            (February, None),
            (March, Some(0.0)),
            (April, Some(5.0)),
            (May, Some(3.0)),
            (June, Some(0.0)),
            (July, None),
        ];
        assert_eq!(
            trim_edge_zeros(&values),
            vec![(March, 0.0), (April, 5.0), (May, 3.0), (June, 0.0)]
        );

        let anchored = [
            (January, Some(0.0)),
            (February, Some(0.0)),
            (March, Some(4.0)),
            (April, Some(0.0)),
            (May, Some(2.0)),
            (June, Some(0.0)),
        ];
        assert_eq!(
            trim_edge_zeros(&anchored),
            vec![(March, 4.0), (April, 0.0), (May, 2.0)]
        );

        let all_zero = [(January, Some(0.0)), (February, Some(0.0))];
        assert!(trim_edge_zeros(&all_zero).is_empty());
    }

    #[test]
    fn test_single_row_with_recomputed_total() {
        let sheet = sheet(vec![data_row("Филиал №7", "Выдано займов НЮЗ (руб)", &twelve(1000.0))]);
        let rows = ingest_sheet(&sheet, "Тверь", Some(2024), &IngestConfig::default()).unwrap();

        assert_eq!(monthly(&rows).len(), 12);
        assert!(rows.iter().all(|r| r.metric == MetricId::LoanIssue));
        assert!(rows.iter().all(|r| r.category == Category::NonJewelry));
        assert!(rows.iter().all(|r| r.branch_code.as_deref() == Some("7")));

        let totals: Vec<&ParsedRow> = rows.iter().filter(|r| r.month == MonthLabel::Total).collect();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].source_kind, SourceKind::RecomputedTotal);
        assert!((totals[0].value - 12000.0).abs() < 1e-9);
    }

    #[test]
    fn test_literal_total_kept_and_mismatch_recomputed() {
        let mut values = twelve(10.0);
        values.push(Some(120.0));
        let mut off = twelve(10.0);
        off.push(Some(999.0));
        let sheet = sheet(vec![
            data_row("Филиал №1", "Выдано займов НЮЗ (руб)", &values),
            data_row("Филиал №2", "Выдано займов НЮЗ (руб)", &off),
        ]);
        let rows = ingest_sheet(&sheet, "Тверь", None, &IngestConfig::default()).unwrap();

        let totals = |code: &str| -> Vec<(SourceKind, f64)> {
            rows.iter()
                .filter(|r| r.month == MonthLabel::Total && r.branch_code.as_deref() == Some(code))
                .map(|r| (r.source_kind, r.value))
                .collect()
        };
        assert_eq!(totals("1"), vec![(SourceKind::BranchFile, 120.0)]);
        assert_eq!(
            totals("2"),
            vec![
                (SourceKind::BranchFile, 999.0),
                (SourceKind::RecomputedTotal, 120.0)
            ]
        );
    }

    #[test]
    fn test_snapshot_total_is_last_month() {
        let mut values = vec![Some(5.0), Some(5.0), Some(7.0)];
        values.extend(vec![None; 9]);
        let sheet = sheet(vec![data_row("Итого", "Количество ломбардов", &values)]);
        let rows = ingest_sheet(&sheet, "Тверь", None, &IngestConfig::default()).unwrap();
        let total = rows.iter().find(|r| r.month == MonthLabel::Total).unwrap();
        assert_eq!(total.source_kind, SourceKind::RecomputedTotal);
        assert!((total.value - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_whitelist_closure_and_unknown_rows_skipped() {
        let sheet = sheet(vec![
            data_row("Филиал №1", "Выдано займов НЮЗ (руб)", &twelve(1.0)),
            data_row("", "Совершенно новый показатель", &twelve(2.0)),
            data_row("", "Уникальные клиенты", &twelve(3.0)),
            data_row("", "Доходность НЮЗ", &twelve(0.1)),
        ]);
        let rows = ingest_sheet(&sheet, "Тверь", None, &IngestConfig::default()).unwrap();
        assert!(rows.iter().all(|r| is_accepted(r.metric)));
        assert!(rows.iter().any(|r| r.metric == MetricId::Yield));
        assert!(rows.iter().all(|r| r.metric != MetricId::UniqueClients));
    }

    #[test]
    fn test_sticky_branch_and_category() {
        let sheet = sheet(vec![
            data_row("Филиал №3", "Выдано займов НЮЗ (руб)", &twelve(1.0)),
            data_row("", "Ссудная задолженность (руб)", &twelve(50.0)),
            data_row("Филиал №4", "Количество ломбардов", &twelve(1.0)),
        ]);
        let rows = ingest_sheet(&sheet, "Тверь", None, &IngestConfig::default()).unwrap();

        let debt: Vec<&ParsedRow> = rows.iter().filter(|r| r.metric == MetricId::Debt).collect();
        assert!(!debt.is_empty());
        assert!(debt.iter().all(|r| r.branch_label == "Филиал №3"));
        assert!(debt.iter().all(|r| r.category == Category::NonJewelry));

        let count: Vec<&ParsedRow> = rows
            .iter()
            .filter(|r| r.metric == MetricId::BranchCount)
            .collect();
        assert!(count.iter().all(|r| r.branch_code.as_deref() == Some("4")));
        assert!(count.iter().all(|r| r.category == Category::NonJewelry));
    }

    #[test]
    fn test_missing_cells_dropped_inner_zero_kept() {
        let mut values = vec![None, Some(0.0), Some(5.0)];
        values.extend(vec![None; 9]);
        let sheet = sheet(vec![data_row("Филиал №1", "Выдано займов НЮЗ (руб)", &values)]);
        let rows = ingest_sheet(&sheet, "Тверь", None, &IngestConfig::default()).unwrap();
        let months: Vec<(MonthLabel, f64)> =
            monthly(&rows).iter().map(|r| (r.month, r.value)).collect();
        assert_eq!(
            months,
            vec![(MonthLabel::February, 0.0), (MonthLabel::March, 5.0)]
        );
    }

    #[test]
    fn test_text_values_are_coerced() {
        let mut row = vec![Cell::from("Филиал №1"), Cell::from("Выдано займов НЮЗ (руб)")];
        row.push(Cell::from("1 234,5"));
        row.push(Cell::from("-"));
        row.push(Cell::from("2.000.000,0"));
        let sheet = sheet(vec![row]);
        let rows = ingest_sheet(&sheet, "Тверь", None, &IngestConfig::default()).unwrap();
        let values: Vec<f64> = monthly(&rows).iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1234.5, 2_000_000.0]);
    }

    #[test]
    fn test_region_and_source_from_total_header() {
        let mut all = vec![vec![Cell::from("Итого Ростовская область")], header_row()];
        all.push(data_row("Итого", "Выдано займов НЮЗ (руб)", &twelve(5.0)));
        let sheet = Sheet::new("TDSheet", all);
        let rows = ingest_sheet(&sheet, "файл", Some(2025), &IngestConfig::default()).unwrap();
        assert!(rows.iter().all(|r| r.region == "Ростовская область"));
        assert!(rows
            .iter()
            .filter(|r| r.month.is_calendar())
            .all(|r| r.source_kind == SourceKind::TotalsFile));
        assert!(rows.iter().all(|r| r.is_total_line()));
    }

    #[test]
    fn test_structural_failures() {
        let no_header = Sheet::new("Лист1", vec![vec![Cell::from("нет месяцев")]]);
        assert!(matches!(
            ingest_sheet(&no_header, "Тверь", None, &IngestConfig::default()),
            Err(IngestError::HeaderNotFound { .. })
        ));

        let no_metrics = sheet(vec![data_row("Филиал №1", "Прочее", &twelve(1.0))]);
        assert!(matches!(
            ingest_sheet(&no_metrics, "Тверь", None, &IngestConfig::default()),
            Err(IngestError::NoRecognizedMetrics { .. })
        ));
    }

    #[test]
    fn test_blank_template_is_a_failure() {
        let mut values = vec![Some(0.0), None, Some(0.0)];
        values.extend(vec![None; 9]);
        let blank = sheet(vec![data_row("Филиал №1", "Выдано займов НЮЗ (руб)", &values)]);
        assert!(matches!(
            ingest_sheet(&blank, "Тверь", None, &IngestConfig::default()),
            Err(IngestError::NoUsableValues { .. })
        ));
    }

    #[test]
    fn test_segment_filter() {
        let config = IngestConfig {
            segment_filter: SegmentFilter::NonJewelryOnly,
            ..IngestConfig::default()
        };

        let jewelry_only = sheet(vec![data_row("Филиалы ЮЗ", "Ссудная задолженность (руб)", &twelve(1.0))]);
        assert!(matches!(
            ingest_sheet(&jewelry_only, "Тверь", None, &config),
            Err(IngestError::SegmentFilterEmpty { .. })
        ));

        let mixed = sheet(vec![
            data_row("Филиалы ЮЗ", "Ссудная задолженность (руб)", &twelve(1.0)),
            data_row("Филиал №2", "Выдано займов НЮЗ (руб)", &twelve(2.0)),
        ]);
        let rows = ingest_sheet(&mixed, "Тверь", None, &config).unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.category == Category::NonJewelry));
    }
}
