use crate::error::{IngestError, Result};
use crate::schema::Category;
use serde::{Deserialize, Serialize};

/// Restricts which business segment survives classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentFilter {
    #[default]
    All,
    /// Keep only non-jewelry pledge (НЮЗ) rows; a workbook without any fails.
    NonJewelryOnly,
}

impl SegmentFilter {
    pub fn admits(&self, category: Category) -> bool {
        match self {
            SegmentFilter::All => true,
            SegmentFilter::NonJewelryOnly => category == Category::NonJewelry,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SegmentFilter::All => "all",
            SegmentFilter::NonJewelryOnly => Category::NonJewelry.label(),
        }
    }
}

/// Behavior switches for one ingestion call.
///
/// Passed explicitly into every entry point, so two calls with different
/// configs in the same process never influence each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub segment_filter: SegmentFilter,
    /// How many rows from the top are searched for the month header.
    pub max_header_scan_rows: usize,
    /// Sheet names tried before falling back to header scoring.
    pub preferred_sheets: Vec<String>,
    /// Percentage metrics whose observed values all stay within this bound are
    /// treated as fractions and shown ×100.
    pub percent_fraction_threshold: f64,
    /// When false (simple mode) every number comes straight from the files.
    pub derive_missing_ratios: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            segment_filter: SegmentFilter::All,
            max_header_scan_rows: 15,
            preferred_sheets: vec!["TDSheet".to_string()],
            percent_fraction_threshold: 1.5,
            derive_missing_ratios: false,
        }
    }
}

impl IngestConfig {
    pub fn non_jewelry_only() -> Self {
        Self {
            segment_filter: SegmentFilter::NonJewelryOnly,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IngestConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_header_scan_rows == 0 {
            return Err(IngestError::InvalidConfig(
                "max_header_scan_rows must be at least 1".to_string(),
            ));
        }
        if !self.percent_fraction_threshold.is_finite() || self.percent_fraction_threshold <= 0.0
        {
            return Err(IngestError::InvalidConfig(format!(
                "percent_fraction_threshold must be a positive number, got {}",
                self.percent_fraction_threshold
            )));
        }
        Ok(())
    }
}
