use once_cell::sync::Lazy;
use regex::Regex;

use extrato_core::{HeaderField, HeaderInfo};

use crate::config::ParsingConfig;
use crate::layout::Line;
use crate::section::{is_record_start, is_section_marker};

/// Statement month codes, in calendar order.
pub const MONTHS: [&str; 12] = [
    "JAN", "FEV", "MAR", "ABR", "MAI", "JUN", "JUL", "AGO", "SET", "OUT", "NOV", "DEZ",
];

static WORKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3}-\d)\b\s*(.*)$").unwrap());

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:19|20)\d{2}$").unwrap());

/// Header fields plus which of them had to be replaced by sentinels.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderExtraction {
    pub header: HeaderInfo,
    pub missing: Vec<HeaderField>,
    /// Fields that were only found by the whole-document pass.
    pub relaxed: Vec<HeaderField>,
}

impl HeaderExtraction {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

fn is_month(word: &str) -> bool {
    MONTHS.contains(&word)
}

fn is_year(word: &str) -> bool {
    YEAR_RE.is_match(word)
}

/// Drop category, month and year words from a candidate worker name.
fn clean_name(raw: &str, config: &ParsingConfig) -> String {
    raw.split_whitespace()
        .filter(|w| {
            let parts: Vec<&str> = w.split('/').filter(|p| !p.is_empty()).collect();
            let period = !parts.is_empty() && parts.iter().all(|p| is_month(p) || is_year(p));
            config.category(w).is_none() && !period
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First worker id in `lines`, with the name that follows it. When `relaxed`,
/// a bare id may take its name from the next line.
fn find_worker(
    lines: &[Line],
    relaxed: bool,
    config: &ParsingConfig,
) -> (Option<String>, Option<String>) {
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = WORKER_RE.captures(&line.text) else {
            continue;
        };
        let id = caps.get(1).map(|m| m.as_str().to_string());
        let mut name = caps
            .get(2)
            .map(|m| clean_name(m.as_str(), config))
            .unwrap_or_default();
        if name.is_empty() && relaxed {
            if let Some(next) = lines.get(i + 1) {
                if !is_record_start(next, config) && !is_section_marker(next, config) {
                    name = clean_name(&next.text, config);
                }
            }
        }
        return (id, (!name.is_empty()).then_some(name));
    }
    (None, None)
}

/// A month code and a year at most `month_year_window` words apart, in either
/// order. `/` separates words too, so `ABR/2024` counts.
fn find_period(lines: &[Line], config: &ParsingConfig) -> Option<(String, String)> {
    let window = config.month_year_window;
    for line in lines {
        let words: Vec<&str> = line
            .text
            .split(|c: char| c.is_whitespace() || c == '/')
            .filter(|w| !w.is_empty())
            .collect();
        for (i, w) in words.iter().enumerate() {
            if !is_month(w) {
                continue;
            }
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(words.len().saturating_sub(1));
            // Nearest year wins; ties prefer the one after the month.
            let year = (1..=window)
                .flat_map(|d| [i + d, i.wrapping_sub(d)])
                .filter(|&j| j >= lo && j <= hi && j != i)
                .find(|&j| is_year(words[j]));
            if let Some(j) = year {
                return Some((w.to_string(), words[j].to_string()));
            }
        }
    }
    None
}

fn find_category(lines: &[Line], config: &ParsingConfig) -> Option<String> {
    lines
        .iter()
        .flat_map(|l| l.text.split_whitespace())
        .find_map(|w| config.category(w).map(|c| c.to_string()))
}

#[derive(Debug, Default)]
struct Found {
    worker_id: Option<String>,
    worker_name: Option<String>,
    period: Option<(String, String)>,
    category: Option<String>,
}

fn search(lines: &[Line], relaxed: bool, config: &ParsingConfig) -> Found {
    let (worker_id, worker_name) = find_worker(lines, relaxed, config);
    Found {
        worker_id,
        worker_name,
        period: find_period(lines, config),
        category: find_category(lines, config),
    }
}

/// Extract header fields with the default configuration.
pub fn extract_header(header_lines: &[Line], all_lines: &[Line]) -> HeaderExtraction {
    extract_header_with_config(header_lines, all_lines, &ParsingConfig::default())
}

/// Config-aware version of [`extract_header`].
///
/// Every field is searched in the header region first and, if still missing,
/// across the whole document. Fields missing after both passes hold sentinels.
pub(crate) fn extract_header_with_config(
    header_lines: &[Line],
    all_lines: &[Line],
    config: &ParsingConfig,
) -> HeaderExtraction {
    let primary = search(header_lines, false, config);
    let needs_secondary = primary.worker_id.is_none()
        || primary.worker_name.is_none()
        || primary.period.is_none()
        || primary.category.is_none();
    let secondary = if needs_secondary {
        search(all_lines, true, config)
    } else {
        Found::default()
    };

    let mut header = HeaderInfo::default();
    let mut missing = Vec::new();
    let mut relaxed = Vec::new();

    let mut pick = |first: Option<String>, second: Option<String>, field: HeaderField| {
        match (first, second) {
            (Some(v), _) => Some(v),
            (None, Some(v)) => {
                relaxed.push(field);
                Some(v)
            }
            (None, None) => {
                missing.push(field);
                None
            }
        }
    };

    if let Some(v) = pick(primary.worker_id, secondary.worker_id, HeaderField::WorkerId) {
        header.worker_id = v;
    }
    if let Some(v) = pick(primary.worker_name, secondary.worker_name, HeaderField::WorkerName) {
        header.worker_name = v;
    }
    let (p_month, p_year) = primary.period.unzip();
    let (s_month, s_year) = secondary.period.unzip();
    if let Some(v) = pick(p_month, s_month, HeaderField::Month) {
        header.month = v;
    }
    if let Some(v) = pick(p_year, s_year, HeaderField::Year) {
        header.year = v;
    }
    if let Some(v) = pick(primary.category, secondary.category, HeaderField::Category) {
        header.category = v;
    }

    HeaderExtraction {
        header,
        missing,
        relaxed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extrato_core::{Token, UNKNOWN, UNKNOWN_YEAR};

    fn lines(texts: &[&str]) -> Vec<Line> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let tokens = t
                    .split_whitespace()
                    .enumerate()
                    .map(|(x, w)| Token::new(w, x as f64, i as f64, 0))
                    .collect();
                Line::new(0, i as f64, tokens)
            })
            .collect()
    }

    #[test]
    fn test_full_header() {
        let ls = lines(&["EXTRATO ANALITICO ABR/2024", "123-4 JOSE DA SILVA ESTIVADOR"]);
        let h = extract_header(&ls, &ls);
        assert!(h.is_complete());
        assert_eq!(h.header.worker_id, "123-4");
        assert_eq!(h.header.worker_name, "JOSE DA SILVA");
        assert_eq!(h.header.month, "ABR");
        assert_eq!(h.header.year, "2024");
        assert_eq!(h.header.category, "ESTIVADOR");
        assert!(h.relaxed.is_empty());
    }

    #[test]
    fn test_year_before_month_within_window() {
        let ls = lines(&["PERIODO 2023 REF DEZ", "555-1 MARIA"]);
        let h = extract_header(&ls, &ls);
        assert_eq!(h.header.month, "DEZ");
        assert_eq!(h.header.year, "2023");
    }

    #[test]
    fn test_year_outside_window_not_paired() {
        let ls = lines(&["JAN A B C D 2024"]);
        let h = extract_header(&ls, &ls);
        assert_eq!(h.header.month, UNKNOWN);
        assert_eq!(h.header.year, UNKNOWN_YEAR);
        assert!(h.missing.contains(&HeaderField::Month));
        assert!(h.missing.contains(&HeaderField::Year));
    }

    #[test]
    fn test_name_strips_period_and_category() {
        let ls = lines(&["123-4 JOSE SILVA VIGIA MAR/2024"]);
        let h = extract_header(&ls, &ls);
        assert_eq!(h.header.worker_name, "JOSE SILVA");
        assert_eq!(h.header.category, "VIGIA");
        assert_eq!(h.header.month, "MAR");
    }

    #[test]
    fn test_no_worker_id_gives_sentinels() {
        let ls = lines(&["EXTRATO ANALITICO"]);
        let h = extract_header(&ls, &ls);
        assert_eq!(h.header, HeaderInfo::default());
        assert_eq!(
            h.missing,
            vec![
                HeaderField::WorkerId,
                HeaderField::WorkerName,
                HeaderField::Month,
                HeaderField::Year,
                HeaderField::Category
            ]
        );
    }

    #[test]
    fn test_secondary_pass_searches_whole_document() {
        let header = lines(&["123-4 JOSE"]);
        let all = lines(&["123-4 JOSE", "01 684855 00 SAGRES", "CONFERENTE OUT/2022"]);
        let h = extract_header(&header, &all);
        assert!(h.is_complete());
        assert_eq!(h.header.category, "CONFERENTE");
        assert_eq!(h.header.year, "2022");
        assert_eq!(
            h.relaxed,
            vec![HeaderField::Month, HeaderField::Year, HeaderField::Category]
        );
    }

    #[test]
    fn test_relaxed_pass_takes_name_from_next_line() {
        let ls = lines(&["MATRICULA 987-6", "ANTONIO PEREIRA", "ARRUMADOR JUN/2021"]);
        let h = extract_header(&ls, &ls);
        assert_eq!(h.header.worker_id, "987-6");
        assert_eq!(h.header.worker_name, "ANTONIO PEREIRA");
        assert_eq!(h.relaxed, vec![HeaderField::WorkerName]);
    }
}
