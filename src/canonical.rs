use crate::schema::MetricId;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

const EDGE_PUNCTUATION: &[char] = &[
    '"', '\'', '«', '»', '“', '”', '„', '`', '.', ',', ';', ':', '!', '?', '*', '-', '–', '—',
];

/// Report phrasings seen in the regional workbooks besides the canonical
/// label of each metric.
const EXTRA_ALIASES: &[(&str, MetricId)] = &[
    ("Выручка от распродажи НЮЗ", MetricId::Revenue),
    ("Выручка от распродажи НЮЗ, руб", MetricId::Revenue),
    ("Выручка от продажи НЮЗ (руб)", MetricId::Revenue),
    ("Выдано займов НЮЗ", MetricId::LoanIssue),
    ("Выдано займов НЮЗ, руб", MetricId::LoanIssue),
    ("Выдано займов НЮЗ (руб.)", MetricId::LoanIssue),
    ("Сумма выданных займов НЮЗ (руб)", MetricId::LoanIssue),
    ("Выдано займов НЮЗ, шт", MetricId::LoanIssueUnits),
    ("Выдано займов НЮЗ (шт.)", MetricId::LoanIssueUnits),
    ("Количество выданных займов НЮЗ (шт)", MetricId::LoanIssueUnits),
    ("Товар проданный ниже суммы займа НЮЗ", MetricId::BelowLoan),
    ("Товар, проданный ниже суммы займа НЮЗ (руб)", MetricId::BelowLoan),
    ("Товар, проданный ниже суммы займа НЮЗ (шт)", MetricId::BelowLoanUnits),
    ("Ссуда вышедших изделий на аукцион НЮЗ", MetricId::LoanValueOfSold),
    ("Количество вышедших изделий на аукцион НЮЗ (шт)", MetricId::AuctionedItemsCount),
    ("Получено % и пени НЮЗ", MetricId::PenaltiesReceived),
    ("Получено процентов и пени НЮЗ (руб)", MetricId::PenaltiesReceived),
    ("Получено наценки от распродажи НЮЗ", MetricId::MarkupAmount),
    ("Получено % и пени + наценка на распродажу НЮЗ", MetricId::PenaltiesPlusMarkup),
    ("Ссудная задолженность", MetricId::Debt),
    ("Ссудная задолженность НЮЗ (руб)", MetricId::Debt),
    ("Ссудная задолженность без распродажи НЮЗ", MetricId::DebtNoSale),
    ("Средняя ссудная задолженность НЮЗ (руб)", MetricId::DebtNoSale),
    ("Ссудная задолженность НЮЗ (шт)", MetricId::DebtUnits),
    ("Процент наценки НЮЗ (%)", MetricId::MarkupPct),
    ("Наценка НЮЗ, %", MetricId::MarkupPct),
    ("Средняя сумма займа НЮЗ", MetricId::AvgLoan),
    ("Средний займ НЮЗ (руб)", MetricId::AvgLoan),
    ("Средний срок займа за период НЮЗ (дней)", MetricId::AvgLoanTerm),
    ("Средний срок займа НЮЗ", MetricId::AvgLoanTerm),
    ("Доля неликвида от количества", MetricId::IlliquidByCountPct),
    ("Доля неликвида от оценки", MetricId::IlliquidByValuePct),
    ("Доходность НЮЗ", MetricId::Yield),
    ("Доходность НЮЗ, %", MetricId::Yield),
    ("Доля НЮЗ по выдаче (%)", MetricId::IssueShare),
    ("Доля НЮЗ по ссудной задолженности (%)", MetricId::DebtShare),
    ("Доля НЮЗ по полученным % и пеням", MetricId::InterestShare),
    ("Доля ниже займа", MetricId::RiskShare),
    ("Расчетная наценка за период", MetricId::CalcMarkupPct),
    ("% выполнения плана выданных займов", MetricId::PlanIssuePct),
    ("% выполнения плана по полученным процентам и пеням НЮЗ", MetricId::PlanPenaltiesPct),
    ("% выполнения плана по выручке НЮЗ", MetricId::PlanRevenuePct),
    ("Количество уникальных клиентов", MetricId::UniqueClients),
    ("Количество новых уникальных клиентов", MetricId::NewUniqueClients),
    ("Количество ломбардов (шт)", MetricId::BranchCount),
    ("Количество открытых ломбардов", MetricId::BranchNewCount),
    ("Количество выкупленных залогов за период НЮЗ", MetricId::RedeemedItemsCount),
    ("Количество выкупов за период НЮЗ (шт)", MetricId::RedeemedItemsCount),
    ("Сумма погашения суммы займа НЮЗ", MetricId::LoanRepaymentSum),
    ("Убыток от товара проданного ниже суммы займа НЮЗ", MetricId::LossBelowLoan),
    ("Сумма выкупленных за период НЮЗ", MetricId::RedeemedSum),
    ("Доля выкупов заложенных за период НЮЗ", MetricId::RedeemedSharePct),
];

/// Metrics the row walk never stores even though they canonicalize: they are
/// computed downstream or not reported per branch.
const NOT_ACCEPTED: [MetricId; 4] = [
    MetricId::UniqueClients,
    MetricId::NewUniqueClients,
    MetricId::RiskShare,
    MetricId::CalcMarkupPct,
];

/// Lowercase, fold ё, collapse whitespace and strip edge quotes/punctuation.
pub fn normalize_label(raw: &str) -> String {
    let folded = raw.to_lowercase().replace('ё', "е");
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || EDGE_PUNCTUATION.contains(&c))
        .to_string()
}

fn alias_table() -> &'static HashMap<String, MetricId> {
    static TABLE: OnceLock<HashMap<String, MetricId>> = OnceLock::new();
    TABLE.get_or_init(|| {
        MetricId::ALL
            .iter()
            .map(|metric| (metric.label(), *metric))
            .chain(EXTRA_ALIASES.iter().copied())
            .map(|(alias, metric)| (normalize_label(alias), metric))
            .collect()
    })
}

fn accepted_set() -> &'static HashSet<MetricId> {
    static ACCEPTED: OnceLock<HashSet<MetricId>> = OnceLock::new();
    ACCEPTED.get_or_init(|| {
        MetricId::ALL
            .iter()
            .copied()
            .filter(|m| !NOT_ACCEPTED.contains(m))
            .collect()
    })
}

/// Maps a raw metric label to its canonical id, or `None` if the label is not
/// a known phrasing.
pub fn canonicalize(raw_label: &str) -> Option<MetricId> {
    let key = normalize_label(raw_label);
    if key.is_empty() {
        return None;
    }
    alias_table().get(&key).copied()
}

/// Whether extracted rows of this metric are kept.
pub fn is_accepted(metric: MetricId) -> bool {
    accepted_set().contains(&metric)
}

/// `canonicalize` restricted to the accepted whitelist.
pub fn canonicalize_accepted(raw_label: &str) -> Option<MetricId> {
    canonicalize(raw_label).filter(|m| is_accepted(*m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(
            normalize_label("  «Выдано   займов НЮЗ (руб)».  "),
            "выдано займов нюз (руб)"
        );
        assert_eq!(normalize_label("Ссудная задолжённость"), "ссудная задолженность");
        assert_eq!(normalize_label("\"\""), "");
    }

    #[test]
    fn test_every_canonical_label_resolves_to_itself() {
        for metric in MetricId::ALL {
            assert_eq!(
                canonicalize(metric.label()),
                Some(metric),
                "label {:?} should map back to {:?}",
                metric.label(),
                metric
            );
        }
    }

    #[test]
    fn test_variants_resolve() {
        assert_eq!(canonicalize("ВЫДАНО ЗАЙМОВ НЮЗ, РУБ"), Some(MetricId::LoanIssue));
        assert_eq!(canonicalize("Выдано займов НЮЗ (шт.)"), Some(MetricId::LoanIssueUnits));
        assert_eq!(
            canonicalize("Средняя ссудная задолженность НЮЗ (руб)"),
            Some(MetricId::DebtNoSale)
        );
        assert_eq!(canonicalize(" Доходность НЮЗ "), Some(MetricId::Yield));
    }

    #[test]
    fn test_unknown_labels_rejected() {
        assert_eq!(canonicalize("Выдано займов ЮЗ (руб)"), None);
        assert_eq!(canonicalize("Прочие расходы"), None);
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("..."), None);
    }

    #[test]
    fn test_whitelist() {
        assert!(is_accepted(MetricId::LoanIssue));
        assert!(is_accepted(MetricId::Debt));
        assert!(!is_accepted(MetricId::UniqueClients));
        assert!(!is_accepted(MetricId::RiskShare));
        assert_eq!(canonicalize("Уникальные клиенты"), Some(MetricId::UniqueClients));
        assert_eq!(canonicalize_accepted("Уникальные клиенты"), None);
        assert_eq!(
            canonicalize_accepted("Количество ломбардов"),
            Some(MetricId::BranchCount)
        );
    }
}
