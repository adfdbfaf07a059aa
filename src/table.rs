use crate::error::{IngestError, Result};
use crate::schema::{MonthLabel, ParsedRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;

pub const CSV_COLUMNS: [&str; 9] = [
    "Region", "Year", "Code", "Branch", "Metric", "Month", "Value", "Category", "Source",
];

/// The long-format table: every ingested row of every workbook, in
/// ingestion order. Built once and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTable {
    rows: Vec<ParsedRow>,
}

impl LongTable {
    pub fn new(rows: Vec<ParsedRow>) -> Self {
        Self { rows }
    }

    /// Concatenates per-workbook results in the given order.
    pub fn concat<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Vec<ParsedRow>>,
    {
        Self {
            rows: parts.into_iter().flatten().collect(),
        }
    }

    pub fn rows(&self) -> &[ParsedRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParsedRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct regions, sorted.
    pub fn regions(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct known years, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.rows
            .iter()
            .filter_map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Calendar months that carry at least one row, in calendar order.
    pub fn available_months(&self) -> Vec<MonthLabel> {
        self.rows
            .iter()
            .map(|r| r.month)
            .filter(MonthLabel::is_calendar)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows of one fiscal year, for year-over-year views.
    pub fn for_year(&self, year: i32) -> LongTable {
        self.rows
            .iter()
            .filter(|r| r.year == Some(year))
            .cloned()
            .collect()
    }

    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().from_writer(out);
        writer.write_record(CSV_COLUMNS)?;

        for row in &self.rows {
            writer.write_record([
                row.region.as_str(),
                &row.year.map(|y| y.to_string()).unwrap_or_default(),
                row.branch_code.as_deref().unwrap_or(""),
                row.branch_label.as_str(),
                &row.metric.id(),
                row.month.label(),
                &row.value.to_string(),
                row.category.label(),
                row.source_kind.label(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Long-format CSV export, one line per row.
    pub fn to_csv(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| IngestError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rows)?)
    }
}

impl FromIterator<ParsedRow> for LongTable {
    fn from_iter<T: IntoIterator<Item = ParsedRow>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a LongTable {
    type Item = &'a ParsedRow;
    type IntoIter = std::slice::Iter<'a, ParsedRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
