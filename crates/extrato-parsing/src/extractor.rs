use std::collections::HashSet;
use std::path::Path;

use extrato_core::{
    Amounts, Document, ExtractionResult, ExtractionStats, ExtractionWarning, Token, TokenSource,
    WorkEntry,
};

use crate::ParsingError;
use crate::config::ParsingConfig;
use crate::fields::{self, ParsedRecord};
use crate::grouping::{self, LogicalRecord};
use crate::header::{self, HeaderExtraction};
use crate::layout::{self, Line};
use crate::reconstruct::{self, Merge};
use crate::section::{self, Sections};
use crate::summary::{self, Reconciliation};
use crate::trace::{ParseTrace, RecordTrace};

/// Configurable pay-statement extractor.
///
/// Holds a [`ParsingConfig`] and exposes each pipeline stage as a method, plus
/// [`extract`](Self::extract) to run them all. Holds no per-run state, so one
/// instance can serve many documents across threads.
#[derive(Debug, Clone, Default)]
pub struct StatementExtractor {
    config: ParsingConfig,
}

impl StatementExtractor {
    /// Create an extractor with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor with a custom configuration.
    pub fn with_config(config: ParsingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    /// Group tokens into lines by page and rounded y.
    pub fn assemble_lines(&self, tokens: &[Token]) -> Vec<Line> {
        layout::assemble_lines_with_config(tokens, &self.config)
    }

    /// Merge wrapped fragments back into logical lines.
    pub fn reconstruct_lines(&self, lines: &[Line]) -> (Vec<Line>, Vec<Merge>) {
        reconstruct::reconstruct_lines_with_config(lines, &self.config)
    }

    /// Locate header, data and summary regions.
    pub fn segment(&self, lines: &[Line]) -> Sections {
        section::segment_with_config(lines, &self.config)
    }

    /// Split the data region into logical records.
    pub fn group_records(&self, data_lines: &[Line]) -> Vec<LogicalRecord> {
        grouping::group_records_with_config(data_lines, &self.config)
    }

    /// Parse one logical record into a work entry.
    pub fn parse_record(&self, record: &LogicalRecord) -> Option<ParsedRecord> {
        fields::parse_record_with_config(record, &self.config)
    }

    /// Recover worker identity and period.
    pub fn extract_header(&self, header_lines: &[Line], all_lines: &[Line]) -> HeaderExtraction {
        header::extract_header_with_config(header_lines, all_lines, &self.config)
    }

    /// Establish declared/revised summaries and check them against the entries.
    pub fn reconcile(&self, summary_lines: &[Line], entries_total: &Amounts) -> Reconciliation {
        summary::reconcile_with_config(summary_lines, entries_total, &self.config)
    }

    /// Run the full pipeline on a token stream.
    pub fn extract(&self, tokens: &[Token]) -> Result<ExtractionResult, ParsingError> {
        self.extract_traced(tokens).map(|(result, _)| result)
    }

    /// Run the full pipeline, returning the intermediate decisions alongside
    /// the result.
    ///
    /// Pipeline:
    /// 1. Assemble tokens into lines
    /// 2. Reconstruct wrapped lines
    /// 3. Segment into header / data / summary
    /// 4. Extract the header (primary, then whole-document pass)
    /// 5. Group and parse records, dropping duplicate `(day, batchId)` pairs
    /// 6. Reconcile the summary against the kept entries
    pub fn extract_traced(
        &self,
        tokens: &[Token],
    ) -> Result<(ExtractionResult, ParseTrace), ParsingError> {
        let mut trace = ParseTrace::default();
        let mut stats = ExtractionStats::default();
        let mut warnings = Vec::new();

        let raw = self.assemble_lines(tokens);
        stats.lines_assembled = raw.len();
        trace.lines_assembled = raw.len();

        let (lines, merges) = self.reconstruct_lines(&raw);
        stats.lines_reconstructed = lines.len();
        stats.merges = merges.len();
        for merge in &merges {
            tracing::debug!(line = merge.line_index, rule = ?merge.rule, "merged line fragment");
        }
        trace.merges = merges;

        let sections = self.segment(&lines);
        trace.sections = Some(sections.clone());
        if sections.degraded {
            return Err(ParsingError::UnrecoverableLayout(format!(
                "no record-start line among {} reconstructed lines",
                lines.len()
            )));
        }

        let header = self.extract_header(&lines[sections.header.clone()], &lines);
        trace.header_relaxed = header.relaxed.clone();
        if !header.missing.is_empty() {
            tracing::debug!(missing = ?header.missing, "header incomplete");
            warnings.push(ExtractionWarning::IncompleteHeader {
                missing: header.missing.clone(),
            });
        }

        let records = self.group_records(&lines[sections.data.clone()]);
        stats.records = records.len();

        let mut seen: HashSet<(u8, String)> = HashSet::new();
        let mut entries: Vec<WorkEntry> = Vec::with_capacity(records.len());
        for record in &records {
            let parsed = self.parse_record(record);
            let mut record_trace = RecordTrace::new(record, parsed.as_ref());
            let Some(parsed) = parsed else {
                trace.records.push(record_trace);
                continue;
            };

            let key = (parsed.entry.day, parsed.entry.batch_id.clone());
            if !seen.insert(key) {
                tracing::debug!(
                    day = parsed.entry.day,
                    batch = %parsed.entry.batch_id,
                    "dropping duplicate record"
                );
                stats.duplicates += 1;
                record_trace.duplicate = true;
                trace.records.push(record_trace);
                warnings.push(ExtractionWarning::DuplicateRecord {
                    day: parsed.entry.day,
                    batch_id: parsed.entry.batch_id,
                });
                continue;
            }

            if !parsed.is_complete() {
                stats.incomplete_records += 1;
                warnings.push(ExtractionWarning::IncompleteRecord {
                    day: parsed.entry.day,
                    batch_id: parsed.entry.batch_id.clone(),
                    missing: parsed.missing.clone(),
                });
            }
            trace.records.push(record_trace);
            entries.push(parsed.entry);
        }
        stats.entries = entries.len();

        let total: Amounts = entries.iter().map(|e| &e.amounts).sum();
        let reconciliation = self.reconcile(&lines[sections.summary.clone()], &total);
        trace.summary_source = Some(reconciliation.source);
        if let Some(warning) = reconciliation.warning {
            if let ExtractionWarning::SummaryMismatch { ratio, .. } = &warning {
                tracing::warn!(ratio = *ratio, "declared summary disagrees with entries");
            }
            warnings.push(warning);
        }

        tracing::info!(
            entries = stats.entries,
            duplicates = stats.duplicates,
            warnings = warnings.len(),
            "statement extracted"
        );

        let document = Document {
            header: header.header,
            entries,
            summary: reconciliation.declared,
            revised_summary: reconciliation.revised,
        };
        Ok((
            ExtractionResult {
                document,
                warnings,
                stats,
            },
            trace,
        ))
    }

    /// Load tokens through `source` and run the full pipeline.
    pub fn extract_via_source(
        &self,
        path: &Path,
        source: &dyn TokenSource,
    ) -> Result<ExtractionResult, ParsingError> {
        let tokens = source.load_tokens(path)?;
        self.extract(&tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParsingConfigBuilder;
    use extrato_core::SourceError;

    const THIRTEEN: &str =
        "1.439,07 109,99 0,00 0,00 86,34 0,00 0,00 0,00 1.242,74 160,02 120,02 30,25 137,53";

    fn tokens(lines: &[&str]) -> Vec<Token> {
        lines
            .iter()
            .enumerate()
            .flat_map(|(row, text)| {
                text.split_whitespace()
                    .enumerate()
                    .map(move |(col, w)| Token::new(w, col as f64 * 3.0, row as f64, 0))
            })
            .collect()
    }

    #[test]
    fn test_extract_basic() {
        let toks = tokens(&[
            "123-4 JOSE DA SILVA ESTIVADOR ABR/2024",
            &format!("01 684855 00 SAGRES INDIAN OCEAN 802 D 1 04/04 {}", THIRTEEN),
            &format!("FOLHAS/COMPLEMENTOS {}", THIRTEEN),
        ]);
        let result = StatementExtractor::new().extract(&toks).unwrap();
        assert_eq!(result.document.entries.len(), 1);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.stats.lines_assembled, 3);
        assert_eq!(result.stats.entries, 1);
        assert_eq!(result.document.header.worker_id, "123-4");
    }

    #[test]
    fn test_unrecoverable_layout() {
        let toks = tokens(&["NOTHING HERE", "STILL NOTHING"]);
        let err = StatementExtractor::new().extract(&toks).unwrap_err();
        assert!(matches!(err, ParsingError::UnrecoverableLayout(_)));
    }

    #[test]
    fn test_trace_records_decisions() {
        let toks = tokens(&[
            "123-4 JOSE ESTIVADOR ABR/2024",
            "01 684855 00 SAGRES BULK BOLIVIA (PORTO",
            &format!("NOVO) 802 D 1 04/04 {}", THIRTEEN),
            &format!("01 684855 00 SAGRES INDIAN OCEAN 802 D 1 04/04 {}", THIRTEEN),
        ]);
        let (result, trace) = StatementExtractor::new().extract_traced(&toks).unwrap();
        assert_eq!(trace.lines_assembled, 4);
        assert_eq!(trace.merges.len(), 1);
        assert_eq!(trace.records.len(), 2);
        assert_eq!(trace.duplicates(), 1);
        assert_eq!(result.stats.duplicates, 1);
        assert_eq!(trace.summary_source, Some(crate::summary::SummarySource::Computed));
        assert_eq!(
            result.document.entries[0].vessel_name,
            "BULK BOLIVIA (PORTO NOVO)"
        );
    }

    #[test]
    fn test_incomplete_record_warning() {
        let toks = tokens(&[
            "123-4 JOSE ESTIVADOR ABR/2024",
            "01 684855 00 SAGRES INDIAN OCEAN 802 D 1 04/04 10,00",
        ]);
        let result = StatementExtractor::new().extract(&toks).unwrap();
        assert_eq!(result.stats.incomplete_records, 1);
        assert!(result.warnings.iter().any(|w| matches!(
            w,
            ExtractionWarning::IncompleteRecord { day: 1, .. }
        )));
    }

    #[test]
    fn test_custom_config_tolerance() {
        let config = ParsingConfigBuilder::new()
            .mismatch_tolerance(0.0)
            .build()
            .unwrap();
        let toks = tokens(&[
            "123-4 JOSE ESTIVADOR ABR/2024",
            &format!("01 684855 00 SAGRES INDIAN OCEAN 802 D 1 04/04 {}", THIRTEEN),
            "FOLHAS/COMPLEMENTOS 1.500,00 0,00 0,00 0,00 0,00 0,00 0,00 0,00 0,00 0,00 0,00 0,00 0,00",
        ]);
        let result = StatementExtractor::with_config(config).extract(&toks).unwrap();
        assert!(result.warnings.iter().any(|w| matches!(
            w,
            ExtractionWarning::SummaryMismatch { .. }
        )));
        assert_eq!(result.document.summary.base_amount, 1500.0);
    }

    struct FailingSource;

    impl TokenSource for FailingSource {
        fn load_tokens(&self, _path: &Path) -> Result<Vec<Token>, SourceError> {
            Err(SourceError::Decode("broken".into()))
        }
    }

    struct FixedSource(Vec<Token>);

    impl TokenSource for FixedSource {
        fn load_tokens(&self, _path: &Path) -> Result<Vec<Token>, SourceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_extract_via_source() {
        let extractor = StatementExtractor::new();
        let err = extractor
            .extract_via_source(Path::new("x.json"), &FailingSource)
            .unwrap_err();
        assert!(matches!(err, ParsingError::Source(_)));

        let source = FixedSource(tokens(&[&format!(
            "02 684856 00 LIBRA OCEAN 802 D 1 04/04 {}",
            THIRTEEN
        )]));
        let result = extractor
            .extract_via_source(Path::new("x.json"), &source)
            .unwrap();
        assert_eq!(result.document.entries[0].operator_code, "LIBRA");
        assert!(result.is_low_confidence());
    }
}
