use crate::error::{IngestError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use log::debug;
use std::io::Cursor;

/// A spreadsheet cell reduced to what the pipeline cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Trimmed non-empty text, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.trim()).filter(|t| !t.is_empty()),
            _ => None,
        }
    }

    /// Display form used by the header locator: text as-is, numbers printed.
    pub fn display(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(n.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// One worksheet as an absolute-coordinate grid: row 0 / column 0 are the
/// sheet's real origin even when the used range starts further in.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.cell(row, col).as_text()
    }

    /// First non-empty text in column 0, scanning top to bottom.
    pub fn first_column_text(&self) -> Option<&str> {
        (0..self.row_count()).find_map(|r| self.text(r, 0))
    }
}

/// Reads every sheet of an in-memory workbook (xlsx, xlsm, xls, ods).
pub fn read_workbook(bytes: &[u8]) -> Result<Vec<Sheet>> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        match workbook.worksheet_range(&name) {
            Ok(range) => sheets.push(sheet_from_range(&name, &range)),
            Err(e) => debug!("Skipping unreadable sheet '{}': {}", name, e),
        }
    }

    if sheets.is_empty() {
        return Err(IngestError::EmptyWorkbook);
    }
    Ok(sheets)
}

fn sheet_from_range(name: &str, range: &Range<Data>) -> Sheet {
    let (start_row, start_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row];
    for source_row in range.rows() {
        let mut row = vec![Cell::Empty; start_col];
        row.extend(source_row.iter().map(convert_cell));
        rows.push(row);
    }

    Sheet::new(name, rows)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::from(s.as_str()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Text(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from(s.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_out_of_range_is_empty() {
        let sheet = Sheet::new("S", vec![vec![Cell::from("a"), Cell::from(1.0)]]);
        assert_eq!(sheet.cell(0, 1), &Cell::Number(1.0));
        assert_eq!(sheet.cell(5, 5), &Cell::Empty);
        assert!(sheet.row(3).is_empty());
        assert_eq!(sheet.text(0, 0), Some("a"));
        assert_eq!(sheet.text(0, 1), None);
    }

    #[test]
    fn test_blank_text_becomes_empty() {
        assert_eq!(Cell::from("   "), Cell::Empty);
        assert_eq!(Cell::Text("  x ".to_string()).as_text(), Some("x"));
    }

    #[test]
    fn test_first_column_text() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![Cell::Empty, Cell::from("title")],
                vec![Cell::from(" Итого Москва ")],
            ],
        );
        assert_eq!(sheet.first_column_text(), Some("Итого Москва"));
    }

    #[test]
    fn test_convert_cell() {
        assert_eq!(convert_cell(&Data::Int(5)), Cell::Number(5.0));
        assert_eq!(convert_cell(&Data::Empty), Cell::Empty);
        assert_eq!(
            convert_cell(&Data::String("Январь".to_string())),
            Cell::Text("Январь".to_string())
        );
    }

    #[test]
    fn test_garbage_bytes_fail() {
        let result = read_workbook(b"definitely not a spreadsheet");
        assert!(result.is_err());
    }
}
