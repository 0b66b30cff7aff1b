use once_cell::sync::Lazy;
use regex::Regex;

/// `1.234,56`, `12,5` or `0,00`. Thousands groups must be complete.
static MONETARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,3}(?:\.\d{3})+|\d+),\d{1,2}$").unwrap());

/// Parse a locale-formatted number (`"1.234,56"` → `1234.56`).
///
/// Total: blank input, unparseable input and non-finite results all yield `0.0`.
/// Thousands dots are removed and the decimal comma becomes a point; whatever
/// remains must be a plain float literal.
pub fn normalize_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let canonical = trimmed.replace('.', "").replace(',', ".");
    if !canonical
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
    {
        return 0.0;
    }
    match canonical.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// [`normalize_number`] clamped to the non-negative range monetary fields require.
pub fn normalize_amount(raw: &str) -> f64 {
    let v = normalize_number(raw);
    if v > 0.0 { v } else { 0.0 }
}

/// Whether a word is a monetary token (decimal comma with one or two decimals).
pub fn is_monetary(word: &str) -> bool {
    MONETARY_RE.is_match(word)
}

/// Whether a word consists solely of digits, dots and commas (at least one digit).
pub fn is_numeric(word: &str) -> bool {
    !word.is_empty()
        && word.chars().any(|c| c.is_ascii_digit())
        && word
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
}

pub fn monetary_count(words: &[&str]) -> usize {
    words.iter().filter(|w| is_monetary(w)).count()
}

/// Number of consecutive monetary words at the end of `words`.
pub fn trailing_monetary(words: &[&str]) -> usize {
    words.iter().rev().take_while(|w| is_monetary(w)).count()
}

/// Share of numeric words, `0.0` for an empty slice.
pub fn numeric_ratio(words: &[&str]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let numeric = words.iter().filter(|w| is_numeric(w)).count();
    numeric as f64 / words.len() as f64
}

/// Render an amount the way the statement prints it: `1.234,56`.
pub fn format_amount(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let int_part = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{}{},{:02}", if negative { "-" } else { "" }, grouped, frac)
}
