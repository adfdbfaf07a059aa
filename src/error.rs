use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No month header row found on sheet '{sheet}' (scanned the first {scanned_rows} rows, need at least 3 calendar months in one row)")]
    HeaderNotFound { sheet: String, scanned_rows: usize },

    #[error("No recognized metrics on sheet '{sheet}': every metric label failed canonicalization or is not accepted")]
    NoRecognizedMetrics { sheet: String },

    #[error("Data not recognized on sheet '{sheet}': metric rows were found but none carries a non-zero value")]
    NoUsableValues { sheet: String },

    #[error("Segment filter '{segment}' is active but no rows of that segment were found")]
    SegmentFilterEmpty { segment: String },

    #[error("Workbook contains no readable sheets")]
    EmptyWorkbook,

    #[error("Workbook read error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("No usable data: all {failed} file(s) failed to parse")]
    NoUsableData { failed: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
