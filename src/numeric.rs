use crate::workbook::Cell;

const MISSING_TOKENS: [&str; 5] = ["", "-", "—", "na", "nan"];

/// Coerces locale-ambiguous numeric text into a float.
///
/// Returns `None` for anything that is not a number; a missing value is never
/// turned into zero and this never fails.
pub fn coerce(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if MISSING_TOKENS.contains(&trimmed.to_lowercase().as_str()) {
        return None;
    }

    let without_percent = trimmed.strip_suffix('%').unwrap_or(trimmed);
    let compact: String = without_percent
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{00A0}' | '\u{202F}'))
        .collect();

    let commas = compact.matches(',').count();
    let periods = compact.matches('.').count();

    let normalized = if commas == 1 && periods > 1 {
        compact.replace('.', "").replace(',', ".")
    } else if commas > 1 && periods <= 1 {
        compact.replace(',', "")
    } else if commas == 1 && periods == 0 {
        compact.replace(',', ".")
    } else {
        compact
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Numeric value of a sheet cell: native numbers pass through, text goes
/// through [`coerce`].
pub fn coerce_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Empty => None,
        Cell::Number(value) => Some(*value).filter(|v| v.is_finite()),
        Cell::Text(text) => coerce(text),
    }
}

/// Effectively zero for edge trimming purposes.
pub fn is_effectively_zero(value: f64) -> bool {
    value.abs() <= 1e-12
}
