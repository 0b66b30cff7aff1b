use crate::config::ParsingConfig;
use crate::layout::Line;
use crate::numeric::monetary_count;
use crate::section::{is_record_start, is_section_marker};

/// One or more consecutive lines judged to hold a single work entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalRecord {
    pub lines: Vec<Line>,
}

impl LogicalRecord {
    /// The record's lines joined with single spaces.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn first_line(&self) -> Option<&Line> {
        self.lines.first()
    }
}

/// Group data-region lines into records with the default configuration.
pub fn group_records(lines: &[Line]) -> Vec<LogicalRecord> {
    group_records_with_config(lines, &ParsingConfig::default())
}

/// Config-aware version of [`group_records`].
///
/// A record opens at every record-start line. A following line joins it while
/// it sits within `record_gap` of the previous line, is not a section marker,
/// and either carries fewer than 10 monetary words or is directly followed by
/// a new record start. Anything before the first record start, and anything
/// after a marker until the next record start, is ignored.
pub(crate) fn group_records_with_config(
    lines: &[Line],
    config: &ParsingConfig,
) -> Vec<LogicalRecord> {
    let mut records = Vec::new();
    let mut current: Option<Vec<Line>> = None;

    for (i, line) in lines.iter().enumerate() {
        if is_record_start(line, config) {
            if let Some(done) = current.take() {
                records.push(LogicalRecord { lines: done });
            }
            current = Some(vec![line.clone()]);
            continue;
        }

        let Some(acc) = current.as_mut() else {
            continue;
        };

        if is_section_marker(line, config) {
            if let Some(done) = current.take() {
                records.push(LogicalRecord { lines: done });
            }
            continue;
        }

        let close_enough = acc
            .last()
            .map(|prev| prev.distance_to(line) < config.record_gap)
            .unwrap_or(false);
        let next_starts_record = lines
            .get(i + 1)
            .map(|n| is_record_start(n, config))
            .unwrap_or(false);
        let sparse = monetary_count(&line.words()) < 10;

        if close_enough && (sparse || next_starts_record) {
            acc.push(line.clone());
        } else if let Some(done) = current.take() {
            records.push(LogicalRecord { lines: done });
        }
    }

    if let Some(done) = current {
        records.push(LogicalRecord { lines: done });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use extrato_core::Token;

    fn line_at(page: usize, y: f64, text: &str) -> Line {
        let tokens = text
            .split_whitespace()
            .enumerate()
            .map(|(x, w)| Token::new(w, x as f64, y, page))
            .collect();
        Line::new(page, y, tokens)
    }

    const THIRTEEN: &str =
        "1.439,07 100,00 50,00 0,00 10,00 5,00 2,00 1,00 1.242,74 20,00 30,00 40,00 50,00";

    #[test]
    fn test_one_record_per_start() {
        let lines = vec![
            line_at(0, 0.0, "HEADER"),
            line_at(0, 1.0, "01 684855 00 SAGRES"),
            line_at(0, 2.0, "INDIAN OCEAN 802 D 1 04/04"),
            line_at(0, 3.0, "02 684856 00 LIBRA"),
        ];
        let records = group_records(&lines);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lines.len(), 2);
        assert_eq!(records[0].text(), "01 684855 00 SAGRES INDIAN OCEAN 802 D 1 04/04");
        assert_eq!(records[1].lines.len(), 1);
    }

    #[test]
    fn test_gap_closes_record() {
        let lines = vec![
            line_at(0, 1.0, "01 684855 00 SAGRES"),
            line_at(0, 10.0, "STRAY FOOTER"),
        ];
        let records = group_records(&lines);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].lines.len(), 1);
    }

    #[test]
    fn test_page_change_closes_record() {
        let lines = vec![
            line_at(0, 1.0, "01 684855 00 SAGRES"),
            line_at(1, 1.0, "CONTINUED"),
        ];
        assert_eq!(group_records(&lines)[0].lines.len(), 1);
    }

    #[test]
    fn test_marker_stops_attachment() {
        let lines = vec![
            line_at(0, 1.0, "01 684855 00 SAGRES"),
            line_at(0, 2.0, "REVISADAS"),
            line_at(0, 3.0, "LOOSE"),
            line_at(0, 4.0, "02 684856 00 LIBRA"),
        ];
        let records = group_records(&lines);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lines.len(), 1);
        assert_eq!(records[1].text(), "02 684856 00 LIBRA");
    }

    #[test]
    fn test_dense_line_attached_only_before_next_start() {
        let lines = vec![
            line_at(0, 1.0, "01 684855 00 SAGRES OCEAN 802 D 1 04/04"),
            line_at(0, 2.0, THIRTEEN),
            line_at(0, 3.0, "02 684856 00 LIBRA OCEAN 802 D 1 04/04"),
            line_at(0, 4.0, THIRTEEN),
        ];
        let records = group_records(&lines);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lines.len(), 2);
        assert_eq!(records[1].lines.len(), 1);
    }

    #[test]
    fn test_gap_measured_from_last_row_of_merged_line() {
        let merged = line_at(0, 5.0, "01 684855 00 SAGRES BULK BOLIVIA (PORTO")
            .merged(&line_at(0, 6.0, "NOVO) 802 D 1 04/04"))
            .merged(&line_at(0, 7.0, "1.439,07 100,00 50,00 0,00 10,00 5,00"));
        let lines = vec![
            merged,
            line_at(0, 8.0, "2,00 1,00 1.242,74 20,00 30,00 40,00 50,00"),
        ];
        let records = group_records(&lines);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].lines.len(), 2);
        assert!(records[0].text().ends_with("40,00 50,00"));
    }

    #[test]
    fn test_lines_before_first_start_ignored() {
        let lines = vec![line_at(0, 0.0, "JUNK"), line_at(0, 1.0, "MORE JUNK")];
        assert!(group_records(&lines).is_empty());
    }
}
