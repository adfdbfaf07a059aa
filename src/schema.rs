use crate::utils::last_day_of_month;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the twelve calendar months, or the period-total sentinel.
///
/// Declaration order is calendar order with `Total` last, so `Ord` sorts a
/// month list the way the reports print it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum MonthLabel {
    #[serde(rename = "Январь")]
    January,
    #[serde(rename = "Февраль")]
    February,
    #[serde(rename = "Март")]
    March,
    #[serde(rename = "Апрель")]
    April,
    #[serde(rename = "Май")]
    May,
    #[serde(rename = "Июнь")]
    June,
    #[serde(rename = "Июль")]
    July,
    #[serde(rename = "Август")]
    August,
    #[serde(rename = "Сентябрь")]
    September,
    #[serde(rename = "Октябрь")]
    October,
    #[serde(rename = "Ноябрь")]
    November,
    #[serde(rename = "Декабрь")]
    December,
    #[serde(rename = "Итого")]
    Total,
}

impl MonthLabel {
    pub const CALENDAR: [MonthLabel; 12] = [
        MonthLabel::January,
        MonthLabel::February,
        MonthLabel::March,
        MonthLabel::April,
        MonthLabel::May,
        MonthLabel::June,
        MonthLabel::July,
        MonthLabel::August,
        MonthLabel::September,
        MonthLabel::October,
        MonthLabel::November,
        MonthLabel::December,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MonthLabel::January => "Январь",
            MonthLabel::February => "Февраль",
            MonthLabel::March => "Март",
            MonthLabel::April => "Апрель",
            MonthLabel::May => "Май",
            MonthLabel::June => "Июнь",
            MonthLabel::July => "Июль",
            MonthLabel::August => "Август",
            MonthLabel::September => "Сентябрь",
            MonthLabel::October => "Октябрь",
            MonthLabel::November => "Ноябрь",
            MonthLabel::December => "Декабрь",
            MonthLabel::Total => "Итого",
        }
    }

    /// Exact (case-insensitive) match on the printed label.
    pub fn from_label(label: &str) -> Option<MonthLabel> {
        let wanted = label.trim().to_lowercase();
        MonthLabel::CALENDAR
            .iter()
            .copied()
            .chain(std::iter::once(MonthLabel::Total))
            .find(|m| m.label().to_lowercase() == wanted)
    }

    /// 1-based calendar month number; `None` for `Total`.
    pub fn number(&self) -> Option<u32> {
        MonthLabel::CALENDAR
            .iter()
            .position(|m| m == self)
            .map(|idx| idx as u32 + 1)
    }

    pub fn is_calendar(&self) -> bool {
        *self != MonthLabel::Total
    }

    /// Calendar months from `start` to `end` inclusive; empty if reversed or
    /// either end is `Total`.
    pub fn range(start: MonthLabel, end: MonthLabel) -> Vec<MonthLabel> {
        match (start.number(), end.number()) {
            (Some(s), Some(e)) if s <= e => MonthLabel::CALENDAR[(s - 1) as usize..e as usize].to_vec(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for MonthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Provenance of a row, used for conflict priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    #[schemars(description = "Workbook whose first column-0 text is an 'Итого' line: it carries only totals.")]
    TotalsFile,
    #[schemars(description = "Workbook with per-branch blocks (possibly with its own 'Итого' rows).")]
    BranchFile,
    #[schemars(description = "Period total recomputed from the row's monthly values.")]
    RecomputedTotal,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::TotalsFile => "TOTALS_FILE",
            SourceKind::BranchFile => "BRANCH_FILE",
            SourceKind::RecomputedTotal => "RECOMPUTED_TOTAL",
        }
    }
}

/// Business segment of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Category {
    #[schemars(description = "Non-jewelry pledges (НЮЗ).")]
    NonJewelry,
    #[schemars(description = "Jewelry pledges (ЮЗ).")]
    Jewelry,
    #[schemars(description = "No explicit segment marker anywhere in the row context.")]
    Unlabeled,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::NonJewelry => "НЮЗ",
            Category::Jewelry => "ЮЗ",
            Category::Unlabeled => "Общее",
        }
    }

    pub fn is_labeled(&self) -> bool {
        *self != Category::Unlabeled
    }
}

/// Closed vocabulary of reported KPIs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricId {
    Revenue,
    LoanIssue,
    BelowLoan,
    LoanValueOfSold,
    AuctionedItemsCount,
    PenaltiesReceived,
    MarkupAmount,
    PenaltiesPlusMarkup,
    LoanIssueUnits,
    BelowLoanUnits,
    Debt,
    DebtUnits,
    DebtNoSale,
    MarkupPct,
    AvgLoan,
    AvgLoanTerm,
    IlliquidByCountPct,
    IlliquidByValuePct,
    Yield,
    IssueShare,
    DebtShare,
    RiskShare,
    CalcMarkupPct,
    PlanIssuePct,
    PlanPenaltiesPct,
    PlanRevenuePct,
    UniqueClients,
    NewUniqueClients,
    BranchCount,
    BranchNewCount,
    BranchClosedCount,
    RedeemedItemsCount,
    LoanRepaymentSum,
    LossBelowLoan,
    InterestShare,
    RedeemedSum,
    RedeemedSharePct,
}

impl MetricId {
    pub const ALL: [MetricId; 37] = [
        MetricId::Revenue,
        MetricId::LoanIssue,
        MetricId::BelowLoan,
        MetricId::LoanValueOfSold,
        MetricId::AuctionedItemsCount,
        MetricId::PenaltiesReceived,
        MetricId::MarkupAmount,
        MetricId::PenaltiesPlusMarkup,
        MetricId::LoanIssueUnits,
        MetricId::BelowLoanUnits,
        MetricId::Debt,
        MetricId::DebtUnits,
        MetricId::DebtNoSale,
        MetricId::MarkupPct,
        MetricId::AvgLoan,
        MetricId::AvgLoanTerm,
        MetricId::IlliquidByCountPct,
        MetricId::IlliquidByValuePct,
        MetricId::Yield,
        MetricId::IssueShare,
        MetricId::DebtShare,
        MetricId::RiskShare,
        MetricId::CalcMarkupPct,
        MetricId::PlanIssuePct,
        MetricId::PlanPenaltiesPct,
        MetricId::PlanRevenuePct,
        MetricId::UniqueClients,
        MetricId::NewUniqueClients,
        MetricId::BranchCount,
        MetricId::BranchNewCount,
        MetricId::BranchClosedCount,
        MetricId::RedeemedItemsCount,
        MetricId::LoanRepaymentSum,
        MetricId::LossBelowLoan,
        MetricId::InterestShare,
        MetricId::RedeemedSum,
        MetricId::RedeemedSharePct,
    ];

    /// Canonical report phrasing of the metric.
    pub fn label(&self) -> &'static str {
        match self {
            MetricId::Revenue => "Выручка от распродажи НЮЗ (руб)",
            MetricId::LoanIssue => "Выдано займов НЮЗ (руб)",
            MetricId::BelowLoan => "Товар проданный ниже суммы займа НЮЗ (руб)",
            MetricId::LoanValueOfSold => "Ссуда вышедших изделий на аукцион НЮЗ (руб)",
            MetricId::AuctionedItemsCount => "Количество вышедших изделий на аукцион НЮЗ",
            MetricId::PenaltiesReceived => "Получено % и пени НЮЗ (руб)",
            MetricId::MarkupAmount => "Получено наценки от распродажи НЮЗ (руб)",
            MetricId::PenaltiesPlusMarkup => "Получено % и пени + наценка на распродажу НЮЗ (руб)",
            MetricId::LoanIssueUnits => "Выдано займов НЮЗ (шт)",
            MetricId::BelowLoanUnits => "Товар проданный ниже суммы займа НЮЗ (шт)",
            MetricId::Debt => "Ссудная задолженность (руб)",
            MetricId::DebtUnits => "Ссудная задолженность без распродажи НЮЗ (шт)",
            MetricId::DebtNoSale => "Ссудная задолженность без распродажи НЮЗ (руб)",
            MetricId::MarkupPct => "Процент наценки НЮЗ",
            MetricId::AvgLoan => "Средняя сумма займа НЮЗ (руб)",
            MetricId::AvgLoanTerm => "Средний срок займа НЮЗ (дней)",
            MetricId::IlliquidByCountPct => "Доля неликвида от количества (%)",
            MetricId::IlliquidByValuePct => "Доля неликвида от оценки (%)",
            MetricId::Yield => "Доходность",
            MetricId::IssueShare => "Доля НЮЗ по выдаче",
            MetricId::DebtShare => "Доля НЮЗ по ссудной задолженности",
            MetricId::RiskShare => "Доля ниже займа, %",
            MetricId::CalcMarkupPct => "Расчетная наценка за период, %",
            MetricId::PlanIssuePct => "% выполнения плана выданных займов НЮЗ",
            MetricId::PlanPenaltiesPct => "% выполнения плана по полученным % и пеням НЮЗ",
            MetricId::PlanRevenuePct => "% выполнения плана по выручке от распродажи НЮЗ",
            MetricId::UniqueClients => "Уникальные клиенты",
            MetricId::NewUniqueClients => "Новые уникальные клиенты",
            MetricId::BranchCount => "Количество ломбардов",
            MetricId::BranchNewCount => "Количество новых ломбардов",
            MetricId::BranchClosedCount => "Количество закрытых ломбардов",
            MetricId::RedeemedItemsCount => "Количество выкупленных залогов за период НЮЗ (шт)",
            MetricId::LoanRepaymentSum => "Сумма погашения суммы займа НЮЗ (руб)",
            MetricId::LossBelowLoan => "Убыток от товара проданного ниже суммы займа НЮЗ (руб)",
            MetricId::InterestShare => "Доля НЮЗ по полученным % и пени",
            MetricId::RedeemedSum => "Сумма выкупленных за период НЮЗ (руб)",
            MetricId::RedeemedSharePct => "Доля выкупов заложенных за период НЮЗ (%)",
        }
    }

    /// Stable machine identifier, e.g. `LOAN_ISSUE`.
    pub fn id(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", self))
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a metric's monthly values collapse into one period value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AggregationKind {
    #[schemars(description = "Flow metric: the period value is the sum of monthly values.")]
    Additive,
    #[schemars(description = "Rate or average: the period value is the mean of monthly values.")]
    Averaged,
    #[schemars(description = "Point-in-time state: the period value is the last month with data.")]
    Snapshot,
}

impl AggregationKind {
    /// Caption explaining how the number was computed.
    pub fn describe(&self) -> &'static str {
        match self {
            AggregationKind::Additive => "сумма месячных значений за период",
            AggregationKind::Averaged => "среднее месячных значений за период",
            AggregationKind::Snapshot => "значение последнего месяца периода",
        }
    }
}

/// The atomic unit produced by extraction: one value of one metric for one
/// month of one branch line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedRow {
    #[schemars(description = "Canonical region name (file name or in-file 'Итого <Region>' line)")]
    pub region: String,

    #[schemars(description = "Fiscal year supplied by the caller for the whole workbook")]
    pub year: Option<i32>,

    pub source_kind: SourceKind,

    #[schemars(description = "Digits following '№' in the branch label, if any")]
    pub branch_code: Option<String>,

    #[schemars(description = "Sticky branch text from column 0 at the time the row was read")]
    pub branch_label: String,

    pub metric: MetricId,

    pub month: MonthLabel,

    #[schemars(description = "Locale-coerced numeric value; missing cells never produce a row")]
    pub value: f64,

    pub category: Category,
}

impl ParsedRow {
    /// True for pre-aggregated "Итого ..." lines rather than a branch's own data.
    pub fn is_total_line(&self) -> bool {
        is_total_label(&self.branch_label)
    }

    /// Month-end date of this row's calendar month, when the year is known.
    pub fn period_end(&self) -> Option<NaiveDate> {
        let year = self.year?;
        let month = self.month.number()?;
        last_day_of_month(year, month)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ParsedRow)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Whether a label denotes an "Итого" line (case-insensitive, whole word).
pub fn is_total_label(label: &str) -> bool {
    let lower = label.trim_start().to_lowercase();
    match lower.strip_prefix("итого") {
        Some(rest) => rest.chars().next().map_or(true, |c| !c.is_alphanumeric()),
        None => false,
    }
}
