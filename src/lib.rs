//! # Pawn Report Ingest
//!
//! A library for turning semi-structured monthly pawnshop-loan workbooks (one
//! per region and year) into a normalized long-format time series, and for
//! answering period questions over it.
//!
//! ## Core Concepts
//!
//! - **Month header**: the row of calendar month labels somewhere in the top of
//!   an otherwise free-form sheet
//! - **Row walk**: data rows are read below the header while the current branch
//!   and the last explicit segment marker stick from row to row
//! - **Canonical metrics**: free-text metric labels map onto a closed vocabulary
//!   through a reviewed alias table; anything else is dropped
//! - **"Итого" rows**: pre-aggregated totals, preferred over branch lines when
//!   resolving what a region reported for a month
//! - **Aggregation kinds**: flows add up, rates average, balances take the last
//!   month with data
//!
//! ## Example
//!
//! ```rust,ignore
//! use pawn_report_ingest::*;
//!
//! let bytes = std::fs::read("Тверь 2024.xlsx")?;
//! let config = IngestConfig::default();
//! let rows = ingest_workbook(&bytes, "Тверь", Some(2024), &config)?;
//!
//! let table = LongTable::new(rows);
//! let resolver = PeriodResolver::new(&table, &config);
//! let q1 = MonthLabel::range(MonthLabel::January, MonthLabel::March);
//! let issued = resolver.period_value(&["Тверь"], MetricId::LoanIssue, &q1);
//! ```

pub mod canonical;
pub mod category;
pub mod config;
pub mod error;
pub mod extract;
pub mod header;
pub mod numeric;
pub mod resolver;
pub mod rules;
pub mod schema;
pub mod table;
pub mod utils;
pub mod workbook;

pub use canonical::{canonicalize, canonicalize_accepted, is_accepted, normalize_label};
pub use category::{classify, fixed_override, resolve_row_category, RowCategory, RowContext};
pub use config::*;
pub use error::{IngestError, Result};
pub use extract::{ingest_sheet, trim_edge_zeros, RowWalk, RowWalkState};
pub use header::{locate_month_header, normalize_month_token, select_data_sheet, MonthHeader};
pub use numeric::{coerce, coerce_cell};
pub use resolver::*;
pub use rules::{aggregate, aggregation_kind, is_percent_metric, percent_scale, ScaleDecision};
pub use schema::*;
pub use table::LongTable;
pub use utils::*;
pub use workbook::{read_workbook, Cell, Sheet};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One uploaded workbook of a batch.
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Prepended to the region derived from the file name ("<prefix>: <region>").
    pub region_prefix: Option<String>,
    /// Used instead of the year guessed from the file name.
    pub year_override: Option<i32>,
}

impl WorkbookSource {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            region_prefix: None,
            year_override: None,
        }
    }

    pub fn region(&self) -> String {
        region_from_file_name(&self.file_name, self.region_prefix.as_deref())
    }

    pub fn year(&self) -> Option<i32> {
        self.year_override
            .or_else(|| guess_year_from_filename(&self.file_name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file_name: String,
    pub message: String,
}

/// Result of a batch: the combined table of every file that parsed, plus one
/// entry per file that did not.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub table: LongTable,
    pub failures: Vec<FileFailure>,
}

pub struct ReportIngestor;

impl ReportIngestor {
    /// Parses one workbook held in memory.
    pub fn ingest_workbook(
        bytes: &[u8],
        region: &str,
        year: Option<i32>,
        config: &IngestConfig,
    ) -> Result<Vec<ParsedRow>> {
        config.validate()?;
        let sheets = read_workbook(bytes)?;
        Self::ingest_sheets(&sheets, region, year, config)
    }

    /// Picks the data sheet among already-read sheets and extracts it.
    pub fn ingest_sheets(
        sheets: &[Sheet],
        region: &str,
        year: Option<i32>,
        config: &IngestConfig,
    ) -> Result<Vec<ParsedRow>> {
        let sheet = select_data_sheet(sheets, &config.preferred_sheets, config.max_header_scan_rows)
            .ok_or(IngestError::EmptyWorkbook)?;
        debug!(
            "Selected sheet '{}' out of {} for region '{}'",
            sheet.name,
            sheets.len(),
            region
        );
        if year.is_none() {
            warn!("No year known for region '{}'; rows are stored without a year", region);
        }
        ingest_sheet(sheet, region, year, config)
    }

    pub fn ingest_source(source: &WorkbookSource, config: &IngestConfig) -> Result<Vec<ParsedRow>> {
        Self::ingest_workbook(&source.bytes, &source.region(), source.year(), config)
    }

    /// Parses every source independently and in parallel. Failed files are
    /// collected, not fatal, unless none succeeded.
    pub fn ingest_batch(sources: &[WorkbookSource], config: &IngestConfig) -> Result<BatchOutcome> {
        config.validate()?;

        let results: Vec<Result<Vec<ParsedRow>>> = sources
            .par_iter()
            .map(|source| Self::ingest_source(source, config))
            .collect();

        let mut parts = Vec::new();
        let mut failures = Vec::new();
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(rows) => parts.push(rows),
                Err(e) => {
                    warn!("Failed to ingest '{}': {}", source.file_name, e);
                    failures.push(FileFailure {
                        file_name: source.file_name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if parts.is_empty() {
            return Err(IngestError::NoUsableData {
                failed: failures.len(),
            });
        }

        let table = LongTable::concat(parts);
        info!(
            "Ingested {} of {} workbooks: {} rows, {} regions",
            sources.len() - failures.len(),
            sources.len(),
            table.len(),
            table.regions().len()
        );
        Ok(BatchOutcome { table, failures })
    }

    /// Reads a workbook from disk; the region comes from the file stem and the
    /// year from the explicit argument or the file name.
    pub fn ingest_path<P: AsRef<Path>>(
        path: P,
        year: Option<i32>,
        config: &IngestConfig,
    ) -> Result<Vec<ParsedRow>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let source = WorkbookSource {
            file_name: file_name.to_string(),
            bytes,
            region_prefix: None,
            year_override: year,
        };
        Self::ingest_source(&source, config)
    }
}

pub fn ingest_workbook(
    bytes: &[u8],
    region: &str,
    year: Option<i32>,
    config: &IngestConfig,
) -> Result<Vec<ParsedRow>> {
    ReportIngestor::ingest_workbook(bytes, region, year, config)
}

pub fn ingest_sheets(
    sheets: &[Sheet],
    region: &str,
    year: Option<i32>,
    config: &IngestConfig,
) -> Result<Vec<ParsedRow>> {
    ReportIngestor::ingest_sheets(sheets, region, year, config)
}

pub fn ingest_batch(sources: &[WorkbookSource], config: &IngestConfig) -> Result<BatchOutcome> {
    ReportIngestor::ingest_batch(sources, config)
}

pub fn ingest_path<P: AsRef<Path>>(
    path: P,
    year: Option<i32>,
    config: &IngestConfig,
) -> Result<Vec<ParsedRow>> {
    ReportIngestor::ingest_path(path, year, config)
}
