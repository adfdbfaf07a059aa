use crate::schema::MonthLabel;
use crate::workbook::Sheet;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Minimum number of distinct calendar months a row needs to count as the
/// month header.
pub const MIN_HEADER_MONTHS: usize = 3;

fn month_tokens() -> &'static HashMap<&'static str, MonthLabel> {
    static TOKENS: OnceLock<HashMap<&'static str, MonthLabel>> = OnceLock::new();
    TOKENS.get_or_init(|| {
        HashMap::from([
            ("январь", MonthLabel::January),
            ("янв", MonthLabel::January),
            ("февраль", MonthLabel::February),
            ("фев", MonthLabel::February),
            ("март", MonthLabel::March),
            ("мар", MonthLabel::March),
            ("апрель", MonthLabel::April),
            ("апр", MonthLabel::April),
            ("май", MonthLabel::May),
            ("июнь", MonthLabel::June),
            ("июн", MonthLabel::June),
            ("июль", MonthLabel::July),
            ("июл", MonthLabel::July),
            ("август", MonthLabel::August),
            ("авг", MonthLabel::August),
            ("сентябрь", MonthLabel::September),
            ("сен", MonthLabel::September),
            ("октябрь", MonthLabel::October),
            ("окт", MonthLabel::October),
            ("ноябрь", MonthLabel::November),
            ("ноя", MonthLabel::November),
            ("декабрь", MonthLabel::December),
            ("дек", MonthLabel::December),
            ("итого", MonthLabel::Total),
            ("итог", MonthLabel::Total),
        ])
    })
}

/// Recognizes a header cell as a month label.
///
/// Case-insensitive; dots are dropped and a trailing year ("2024", "2024 г",
/// "2024 год") is stripped before lookup.
pub fn normalize_month_token(raw: &str) -> Option<MonthLabel> {
    let lowered = raw.trim().to_lowercase().replace('.', "");
    let stripped = lowered
        .trim_end_matches(|c: char| c.is_ascii_digit() || c.is_whitespace() || "год".contains(c))
        .trim();
    month_tokens()
        .get(stripped)
        .or_else(|| month_tokens().get(lowered.trim()))
        .copied()
}

/// Location of the month header inside a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthHeader {
    pub row: usize,
    /// (column index, month) in column order, adjacent duplicates collapsed.
    pub columns: Vec<(usize, MonthLabel)>,
}

impl MonthHeader {
    pub fn first_month_col(&self) -> usize {
        self.columns.first().map(|(col, _)| *col).unwrap_or(0)
    }

    pub fn calendar_columns(&self) -> impl Iterator<Item = (usize, MonthLabel)> + '_ {
        self.columns.iter().copied().filter(|(_, m)| m.is_calendar())
    }

    pub fn total_column(&self) -> Option<usize> {
        self.columns
            .iter()
            .find(|(_, m)| *m == MonthLabel::Total)
            .map(|(col, _)| *col)
    }
}

/// Finds the first row within `max_scan_rows` holding at least three distinct
/// calendar months.
pub fn locate_month_header(sheet: &Sheet, max_scan_rows: usize) -> Option<MonthHeader> {
    for row in 0..max_scan_rows.min(sheet.row_count()) {
        let found: Vec<(usize, MonthLabel)> = sheet
            .row(row)
            .iter()
            .enumerate()
            .filter_map(|(col, cell)| {
                cell.display()
                    .and_then(|text| normalize_month_token(&text))
                    .map(|m| (col, m))
            })
            .collect();

        let distinct: HashSet<MonthLabel> = found
            .iter()
            .map(|(_, m)| *m)
            .filter(MonthLabel::is_calendar)
            .collect();
        if distinct.len() < MIN_HEADER_MONTHS {
            continue;
        }

        let mut columns: Vec<(usize, MonthLabel)> = Vec::with_capacity(found.len());
        for (col, month) in found {
            if columns.last().map(|(_, last)| *last) != Some(month) {
                columns.push((col, month));
            }
        }
        return Some(MonthHeader { row, columns });
    }
    None
}

/// Picks the sheet most likely to hold the report: a preferred name if
/// present, otherwise the sheet whose header row recognizes the most months.
pub fn select_data_sheet<'a>(
    sheets: &'a [Sheet],
    preferred: &[String],
    max_scan_rows: usize,
) -> Option<&'a Sheet> {
    if let Some(sheet) = sheets.iter().find(|s| preferred.iter().any(|p| p == &s.name)) {
        return Some(sheet);
    }

    let mut best: Option<(&Sheet, usize)> = None;
    for sheet in sheets {
        let score = locate_month_header(sheet, max_scan_rows)
            .map(|h| h.columns.len())
            .unwrap_or(0);
        debug!("Sheet '{}' scored {} month columns", sheet.name, score);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((sheet, score));
        }
    }
    best.map(|(sheet, _)| sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Cell;

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Cell::from(*c)).collect()
    }

    #[test]
    fn test_normalize_month_token() {
        assert_eq!(normalize_month_token("Январь"), Some(MonthLabel::January));
        assert_eq!(normalize_month_token("ФЕВ."), Some(MonthLabel::February));
        assert_eq!(normalize_month_token("март 2024"), Some(MonthLabel::March));
        assert_eq!(normalize_month_token("Сентябрь 2024 г."), Some(MonthLabel::September));
        assert_eq!(normalize_month_token("Итого"), Some(MonthLabel::Total));
        assert_eq!(normalize_month_token("итог"), Some(MonthLabel::Total));
        assert_eq!(normalize_month_token("Показатель"), None);
        assert_eq!(normalize_month_token("2024"), None);
    }

    #[test]
    fn test_locate_header_skips_title_rows() {
        let sheet = Sheet::new(
            "TDSheet",
            vec![
                text_row(&["Отчет по НЮЗ"]),
                text_row(&["Итого Москва", "", "Январь"]),
                text_row(&["", "Показатель", "Январь", "Февраль", "Март", "Итого"]),
            ],
        );
        let header = locate_month_header(&sheet, 15).unwrap();
        assert_eq!(header.row, 2);
        assert_eq!(header.first_month_col(), 2);
        assert_eq!(header.calendar_columns().count(), 3);
        assert_eq!(header.total_column(), Some(5));
    }

    #[test]
    fn test_total_does_not_count_toward_threshold() {
        let sheet = Sheet::new(
            "S",
            vec![text_row(&["", "Январь", "Февраль", "Итого", "Итог"])],
        );
        assert!(locate_month_header(&sheet, 15).is_none());
    }

    #[test]
    fn test_merged_duplicates_collapsed() {
        let sheet = Sheet::new(
            "S",
            vec![text_row(&["", "Январь", "Январь", "Февраль", "Март", "Март"])],
        );
        let header = locate_month_header(&sheet, 15).unwrap();
        assert_eq!(
            header.columns,
            vec![
                (1, MonthLabel::January),
                (3, MonthLabel::February),
                (4, MonthLabel::March)
            ]
        );
    }

    #[test]
    fn test_scan_window_respected() {
        let mut rows: Vec<Vec<Cell>> = (0..5).map(|_| text_row(&["шапка"])).collect();
        rows.push(text_row(&["", "Январь", "Февраль", "Март"]));
        let sheet = Sheet::new("S", rows);
        assert!(locate_month_header(&sheet, 5).is_none());
        assert_eq!(locate_month_header(&sheet, 6).unwrap().row, 5);
    }

    #[test]
    fn test_select_data_sheet() {
        let notes = Sheet::new("Notes", vec![text_row(&["прочее"])]);
        let partial = Sheet::new("Q1", vec![text_row(&["", "Январь", "Февраль", "Март"])]);
        let full = Sheet::new(
            "Год",
            vec![text_row(&[
                "", "Январь", "Февраль", "Март", "Апрель", "Май", "Июнь",
            ])],
        );
        let sheets = vec![notes.clone(), partial.clone(), full.clone()];

        let chosen = select_data_sheet(&sheets, &["TDSheet".to_string()], 15).unwrap();
        assert_eq!(chosen.name, "Год");

        let chosen = select_data_sheet(&sheets, &["Q1".to_string()], 15).unwrap();
        assert_eq!(chosen.name, "Q1");

        let only_notes = vec![notes];
        assert_eq!(
            select_data_sheet(&only_notes, &[], 15).unwrap().name,
            "Notes"
        );
    }
}
