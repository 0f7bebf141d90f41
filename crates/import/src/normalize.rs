use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use fins_core::Money;
use rust_decimal::Decimal;

re!(re_reference_number, r"#\d+");
re!(re_reference_label, r"(?i)REF:\s*\w+");
re!(re_masked_card, r"[*xX]{2,}\d{4}");
re!(re_embedded_date, r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}");

// ── Dates ────────────────────────────────────────────────────────────────────

/// Tried in order. Day-first formats only win when month-first cannot parse.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%m/%d/%y",
    "%d/%m/%y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Looser shapes accepted once the known statement formats have failed.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
];

fn plausible(date: NaiveDate) -> bool {
    (1900..=2100).contains(&date.year())
}

fn parse_compact(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let y = s[0..4].parse().ok()?;
    let m = s[4..6].parse().ok()?;
    let d = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Parses a statement date into a calendar date, or `None` if no known shape fits.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if plausible(date) {
                return Some(date);
            }
        }
    }

    if let Some(date) = parse_compact(s) {
        return Some(date);
    }

    for fmt in FALLBACK_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if plausible(date) {
                return Some(date);
            }
        }
    }

    // Timestamps such as 2024-01-02T00:00:00 or "2024-01-02 13:45".
    if s.len() > 10 && s.is_char_boundary(10) {
        if let Ok(date) = NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }

    None
}

// ── Amounts ──────────────────────────────────────────────────────────────────

/// Parses a statement amount. A leading `(` or trailing `DR` marks a debit;
/// a trailing `CR` is a credit. Currency symbols and thousands separators are ignored.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let s = raw.trim().trim_matches('"').trim();
    if s.is_empty() {
        return None;
    }

    let upper = s.to_ascii_uppercase();
    let debit_marker = s.starts_with('(') || upper.ends_with("DR");

    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let dec = Decimal::from_str(&cleaned).ok()?;
    let dec = if debit_marker { -dec.abs() } else { dec };
    Some(Money::from_decimal(dec))
}

// ── Merchant names ───────────────────────────────────────────────────────────

/// Strips reference numbers, masked card suffixes and embedded dates from a
/// raw description, leaving something close to the merchant's name.
pub fn clean_merchant_name(description: &str) -> String {
    let s = re_reference_number().replace_all(description, "");
    let s = re_reference_label().replace_all(&s, "");
    let s = re_masked_card().replace_all(&s, "");
    let s = re_embedded_date().replace_all(&s, "");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
