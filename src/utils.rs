use chrono::{Days, NaiveDate};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("invalid digits regex"))
}

fn multi_space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("invalid whitespace regex"))
}

fn service_words_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(итого|подразделени[яе]|расширенн\w*|данн\w*)\b")
            .expect("invalid service words regex")
    })
}

fn year_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b20\d{2}\b").expect("invalid year regex"))
}

fn month_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{1,2}\s*[-–—_]\s*\d{1,2}\b").expect("invalid month span regex")
    })
}

fn numeric_tail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ _\-–—]*\d+\b").expect("invalid numeric tail regex"))
}

fn krasnodar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(кк|краснодар)").expect("invalid krasnodar regex"))
}

fn spb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(санкт(-|\s*)петербург|санкт)$").expect("invalid spb regex")
    })
}

fn total_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*итого\s+").expect("invalid total header regex"))
}

/// Guesses a fiscal year from a file name: the first standalone `20xx`
/// digit run. The Russian year marker "г"/"г." counts as a separator.
pub fn guess_year_from_filename(name: &str) -> Option<i32> {
    let lowered = name.to_lowercase().replace("г.", " ").replace('г', " ");
    digits_re()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .find(|run| run.len() == 4 && run.starts_with("20"))
        .and_then(|run| run.parse().ok())
}

/// Collapses whitespace runs and strips trailing dots/middle dots.
pub fn normalize_region(name: &str) -> String {
    let collapsed = multi_space_re().replace_all(name.trim(), " ");
    collapsed
        .trim_end_matches(['·', '.'])
        .trim()
        .to_string()
}

/// Cleans a file stem into a region name: drops service words, years, month
/// spans and numeric tails, then applies the known spelling fixes.
pub fn canonical_region_from_stem(stem: &str) -> String {
    let mut s = service_words_re().replace_all(stem, "").into_owned();
    s = year_token_re().replace_all(&s, "").into_owned();
    s = month_span_re().replace_all(&s, "").into_owned();
    s = numeric_tail_re().replace_all(&s, "").into_owned();
    s = multi_space_re().replace_all(&s, " ").into_owned();
    let trimmed = s.trim_matches(|c: char| c.is_whitespace() || "_-·.".contains(c));

    if krasnodar_re().is_match(trimmed) {
        return "Краснодарский край".to_string();
    }
    if spb_re().is_match(trimmed) {
        return "Санкт-Петербург".to_string();
    }
    if trimmed.is_empty() {
        stem.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Region for an uploaded file: cleaned stem, optionally behind a prefix.
pub fn region_from_file_name(file_name: &str, prefix: Option<&str>) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let region = canonical_region_from_stem(stem);
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => format!("{}: {}", p, region),
        None => region,
    }
}

/// Extracts `<Region>` from an in-file "Итого <Region>" line.
pub fn region_from_total_header(text: &str) -> Option<String> {
    let stripped = total_header_re().replace(text.trim(), "");
    if stripped.len() == text.trim().len() {
        return None;
    }
    let region = multi_space_re().replace_all(&stripped, " ");
    let region = region.trim_matches(|c: char| c.is_whitespace() || " _-·.".contains(c));
    if region.is_empty() {
        None
    } else {
        Some(region.to_string())
    }
}
