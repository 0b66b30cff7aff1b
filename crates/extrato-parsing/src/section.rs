use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::ParsingConfig;
use crate::layout::Line;
use crate::numeric::numeric_ratio;

static RECORD_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2})\s+(\d{6})\s+(\d{2})(?:\s|$)").unwrap());

static DECLARED_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)folhas\s*/\s*complementos").unwrap());

static REVISED_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\brevisadas\b").unwrap());

/// Column-header and title banners repeated at the top of each page.
static HEADER_BANNER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:dia\s+folha\b|extrato\s+anal[ií]tico\b|total\s+geral\b)").unwrap()
});

/// The `day batch sub-batch` prefix of a record-start line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStart {
    pub day: u8,
    pub batch: String,
    pub sub_batch: String,
    /// Number of words the prefix occupies; field extraction starts after them.
    pub prefix_words: usize,
}

impl RecordStart {
    /// `NNNNNN-NN`
    pub fn batch_id(&self) -> String {
        format!("{}-{}", self.batch, self.sub_batch)
    }
}

/// Match the record-start prefix. The day must be within 1–31.
pub fn match_record_start(text: &str) -> Option<RecordStart> {
    match_record_start_with_config(text, &ParsingConfig::default())
}

/// Config-aware version of [`match_record_start`].
pub(crate) fn match_record_start_with_config(
    text: &str,
    config: &ParsingConfig,
) -> Option<RecordStart> {
    let re = config.record_start_re.as_ref().unwrap_or(&RECORD_START_RE);
    let caps = re.captures(text)?;
    let day: u8 = caps.get(1)?.as_str().parse().ok()?;
    if !(1..=31).contains(&day) {
        return None;
    }
    let batch = caps.get(2)?.as_str().to_string();
    let sub_batch = caps.get(3)?.as_str().to_string();
    let prefix_words = caps.get(0)?.as_str().split_whitespace().count();
    Some(RecordStart {
        day,
        batch,
        sub_batch,
        prefix_words,
    })
}

pub(crate) fn is_record_start(line: &Line, config: &ParsingConfig) -> bool {
    match_record_start_with_config(&line.text, config).is_some()
}

pub(crate) fn is_declared_marker(line: &Line, config: &ParsingConfig) -> bool {
    let re = config
        .declared_marker_re
        .as_ref()
        .unwrap_or(&DECLARED_MARKER_RE);
    re.is_match(&line.text)
}

pub(crate) fn is_revised_marker(line: &Line, config: &ParsingConfig) -> bool {
    let re = config
        .revised_marker_re
        .as_ref()
        .unwrap_or(&REVISED_MARKER_RE);
    re.is_match(&line.text)
}

/// Summary labels and repeated page banners. Such lines never belong to a record.
pub(crate) fn is_section_marker(line: &Line, config: &ParsingConfig) -> bool {
    let banner = config
        .header_banner_re
        .as_ref()
        .unwrap_or(&HEADER_BANNER_RE);
    is_declared_marker(line, config) || is_revised_marker(line, config) || banner.is_match(&line.text)
}

/// A totals-style line: enough words, almost all of them numeric, and not a
/// record start.
pub(crate) fn is_numeric_heavy(line: &Line, config: &ParsingConfig) -> bool {
    let words = line.words();
    words.len() >= config.numeric_line_min_tokens
        && numeric_ratio(&words) >= config.numeric_line_ratio
        && !is_record_start(line, config)
}

/// How the summary region was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SummaryAnchor {
    DeclaredMarker,
    NumericLine,
    None,
}

/// Line index ranges of the three regions of a statement.
///
/// `header.end == data.start` and `data.end == summary.start`; the ranges tile
/// the whole line sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sections {
    pub header: Range<usize>,
    pub data: Range<usize>,
    pub summary: Range<usize>,
    pub summary_anchor: SummaryAnchor,
    /// No record start was found; `data` is a fixed prefix and `header` is empty.
    pub degraded: bool,
}

/// Split lines into header, data and summary regions with the default configuration.
pub fn segment(lines: &[Line]) -> Sections {
    segment_with_config(lines, &ParsingConfig::default())
}

/// Config-aware version of [`segment`].
pub(crate) fn segment_with_config(lines: &[Line], config: &ParsingConfig) -> Sections {
    let total = lines.len();
    let Some(data_start) = lines.iter().position(|l| is_record_start(l, config)) else {
        let end = config.fallback_data_lines.min(total);
        return Sections {
            header: 0..0,
            data: 0..end,
            summary: end..end,
            summary_anchor: SummaryAnchor::None,
            degraded: true,
        };
    };

    let (summary_start, summary_anchor) = find_summary_start(lines, data_start, config);
    Sections {
        header: 0..data_start,
        data: data_start..summary_start,
        summary: summary_start..total,
        summary_anchor,
        degraded: false,
    }
}

fn find_summary_start(
    lines: &[Line],
    data_start: usize,
    config: &ParsingConfig,
) -> (usize, SummaryAnchor) {
    let candidates = (data_start + 1)..lines.len();

    // Last declared marker wins; earlier pages may carry partial subtotals.
    if let Some(i) = candidates
        .clone()
        .rev()
        .find(|&i| is_declared_marker(&lines[i], config))
    {
        return (i, SummaryAnchor::DeclaredMarker);
    }

    if let Some(last) = candidates
        .rev()
        .find(|&i| is_numeric_heavy(&lines[i], config))
    {
        // Keep positional declared/revised pairs together.
        let mut start = last;
        while start > data_start + 1 && is_numeric_heavy(&lines[start - 1], config) {
            start -= 1;
        }
        return (start, SummaryAnchor::NumericLine);
    }

    (lines.len(), SummaryAnchor::None)
}

/// Share of numeric words in a line, for diagnostics.
pub fn line_numeric_ratio(line: &Line) -> f64 {
    numeric_ratio(&line.words())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParsingConfigBuilder;
    use extrato_core::Token;

    fn line(i: usize, text: &str) -> Line {
        let tokens = text
            .split_whitespace()
            .enumerate()
            .map(|(x, w)| Token::new(w, x as f64, i as f64, 0))
            .collect();
        Line::new(0, i as f64, tokens)
    }

    fn lines(texts: &[&str]) -> Vec<Line> {
        texts.iter().enumerate().map(|(i, t)| line(i, t)).collect()
    }

    const THIRTEEN: &str =
        "1.439,07 100,00 50,00 0,00 10,00 5,00 2,00 1,00 1.242,74 20,00 30,00 40,00 50,00";

    #[test]
    fn test_match_record_start() {
        let m = match_record_start("01 684855 00 SAGRES INDIAN OCEAN").unwrap();
        assert_eq!(m.day, 1);
        assert_eq!(m.batch_id(), "684855-00");
        assert_eq!(m.prefix_words, 3);
        assert!(match_record_start("32 684855 00 SAGRES").is_none());
        assert!(match_record_start("00 684855 00 SAGRES").is_none());
        assert!(match_record_start("1 68485 00 SAGRES").is_none());
        assert!(match_record_start("15 684855 01").is_some());
        assert!(match_record_start("15 684855 012").is_none());
    }

    #[test]
    fn test_custom_record_start_regex() {
        let config = ParsingConfigBuilder::new()
            .record_start_regex(r"^D(\d{1,2})\s+(\d{6})/(\d{2})\b")
            .build()
            .unwrap();
        let m = match_record_start_with_config("D05 123456/07 LIBRA", &config).unwrap();
        assert_eq!(m.day, 5);
        assert_eq!(m.batch_id(), "123456-07");
        assert_eq!(m.prefix_words, 2);
    }

    #[test]
    fn test_segment_with_declared_marker() {
        let ls = lines(&[
            "EXTRATO ANALITICO",
            "123-4 JOSE DA SILVA",
            "01 684855 00 SAGRES INDIAN OCEAN 802 D 1 04/04",
            &format!("02 684856 00 LIBRA OCEAN 802 D 1 05/04 {}", THIRTEEN),
            &format!("FOLHAS/COMPLEMENTOS {}", THIRTEEN),
            "REVISADAS",
        ]);
        let s = segment(&ls);
        assert_eq!(s.header, 0..2);
        assert_eq!(s.data, 2..4);
        assert_eq!(s.summary, 4..6);
        assert_eq!(s.summary_anchor, SummaryAnchor::DeclaredMarker);
        assert!(!s.degraded);
    }

    #[test]
    fn test_segment_numeric_fallback_extends_backward() {
        let ls = lines(&[
            "123-4 JOSE",
            &format!("01 684855 00 SAGRES OCEAN 802 D 1 04/04 {}", THIRTEEN),
            THIRTEEN,
            THIRTEEN,
        ]);
        let s = segment(&ls);
        assert_eq!(s.data, 1..2);
        assert_eq!(s.summary, 2..4);
        assert_eq!(s.summary_anchor, SummaryAnchor::NumericLine);
    }

    #[test]
    fn test_segment_no_summary() {
        let ls = lines(&["HDR", "01 684855 00 SAGRES", "02 684856 00 LIBRA"]);
        let s = segment(&ls);
        assert_eq!(s.data, 1..3);
        assert_eq!(s.summary, 3..3);
        assert_eq!(s.summary_anchor, SummaryAnchor::None);
    }

    #[test]
    fn test_segment_degraded_without_record_start() {
        let texts: Vec<String> = (0..15).map(|i| format!("LINE {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let s = segment(&lines(&refs));
        assert!(s.degraded);
        assert_eq!(s.header, 0..0);
        assert_eq!(s.data, 0..10);

        let short = segment(&lines(&["ONLY", "TWO"]));
        assert_eq!(short.data, 0..2);
    }

    #[test]
    fn test_section_markers() {
        let config = ParsingConfig::default();
        assert!(is_section_marker(&line(0, "Folhas/Complementos"), &config));
        assert!(is_section_marker(&line(0, "Revisadas 0,00"), &config));
        assert!(is_section_marker(&line(0, "DIA FOLHA TOMADOR NAVIO"), &config));
        assert!(!is_section_marker(&line(0, "01 684855 00 SAGRES"), &config));
    }

    #[test]
    fn test_numeric_heavy_excludes_record_start() {
        let config = ParsingConfig::default();
        assert!(is_numeric_heavy(&line(0, THIRTEEN), &config));
        assert!(!is_numeric_heavy(&line(0, "1,00 2,00"), &config));
        let record = format!("01 684855 00 {}", THIRTEEN);
        assert!(!is_numeric_heavy(&line(0, &record), &config));
        assert!((line_numeric_ratio(&line(0, "A 1,00 2 B")) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_heavy_token_count_boundary() {
        let config = ParsingConfig::default();
        let amounts = |n: usize| vec!["1,00"; n].join(" ");
        assert!(is_numeric_heavy(&line(0, &amounts(10)), &config));
        assert!(!is_numeric_heavy(&line(0, &amounts(9)), &config));
    }

    #[test]
    fn test_numeric_heavy_ratio_boundary() {
        let config = ParsingConfig::default();
        // 9 of 10 numeric: exactly the threshold.
        let at = format!("TOTAL {}", ["1,00"; 9].join(" "));
        assert!(is_numeric_heavy(&line(0, &at), &config));
        // 17 of 19 numeric: just under it.
        let under = format!("SOMA PARCIAL {}", ["1,00"; 17].join(" "));
        assert!(line_numeric_ratio(&line(0, &under)) < 0.9);
        assert!(!is_numeric_heavy(&line(0, &under), &config));
    }
}
