use serde::Serialize;

use extrato_core::{EntryField, HeaderField};

use crate::fields::{AnchorStrategy, MoneySource, ParsedRecord};
use crate::grouping::LogicalRecord;
use crate::reconstruct::Merge;
use crate::section::Sections;
use crate::summary::SummarySource;

/// How one logical record was parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTrace {
    pub line_count: usize,
    pub text: String,
    /// `None` if the record did not yield an entry.
    pub day: Option<u8>,
    pub batch_id: Option<String>,
    pub anchor: Option<AnchorStrategy>,
    pub money_source: Option<MoneySource>,
    pub vessel_reappended: bool,
    pub missing: Vec<EntryField>,
    pub duplicate: bool,
}

impl RecordTrace {
    pub(crate) fn new(record: &LogicalRecord, parsed: Option<&ParsedRecord>) -> Self {
        Self {
            line_count: record.lines.len(),
            text: record.text(),
            day: parsed.map(|p| p.entry.day),
            batch_id: parsed.map(|p| p.entry.batch_id.clone()),
            anchor: parsed.and_then(|p| p.anchor),
            money_source: parsed.map(|p| p.money_source),
            vessel_reappended: parsed.is_some_and(|p| p.vessel_reappended),
            missing: parsed.map(|p| p.missing.clone()).unwrap_or_default(),
            duplicate: false,
        }
    }
}

/// Intermediate decisions of one extraction run, for layout debugging.
///
/// Returned by `StatementExtractor::extract_traced`; the plain `extract`
/// path builds the same value and drops it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseTrace {
    pub lines_assembled: usize,
    pub merges: Vec<Merge>,
    pub sections: Option<Sections>,
    pub header_relaxed: Vec<HeaderField>,
    pub records: Vec<RecordTrace>,
    pub summary_source: Option<SummarySource>,
}

impl ParseTrace {
    pub fn duplicates(&self) -> usize {
        self.records.iter().filter(|r| r.duplicate).count()
    }
}
