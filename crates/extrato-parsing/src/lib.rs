use std::path::Path;

use thiserror::Error;

pub mod config;
pub mod extractor;
pub mod fields;
pub mod grouping;
pub mod header;
pub mod layout;
pub mod numeric;
pub mod reconstruct;
pub mod section;
pub mod summary;
pub mod trace;

pub use config::{ListOverride, ParsingConfig, ParsingConfigBuilder};
pub use extractor::StatementExtractor;
pub use fields::{AnchorStrategy, MoneySource, ParsedRecord};
pub use grouping::LogicalRecord;
pub use layout::Line;
pub use reconstruct::{Merge, MergeRule};
pub use section::{Sections, SummaryAnchor};
pub use summary::{Reconciliation, SummarySource};
pub use trace::{ParseTrace, RecordTrace};
// Re-export domain types from core (canonical definitions live there)
pub use extrato_core::{
    Document, ExtractionResult, ExtractionWarning, SourceError, Token, TokenSource,
};

#[derive(Error, Debug)]
pub enum ParsingError {
    #[error("unrecoverable layout: {0}")]
    UnrecoverableLayout(String),
    #[error("token source error: {0}")]
    Source(#[from] SourceError),
}

/// Extract a statement from an in-memory token stream with the default configuration.
pub fn extract_document(tokens: &[Token]) -> Result<ExtractionResult, ParsingError> {
    StatementExtractor::new().extract(tokens)
}

/// Extract a statement from a file, using `source` to read its tokens.
///
/// Pipeline:
/// 1. Load positioned tokens via `source`
/// 2. Assemble and reconstruct lines
/// 3. Segment header / data / summary regions
/// 4. Parse the header and every work entry
/// 5. Reconcile the printed summary against the entries
pub fn extract_statement(
    path: &Path,
    source: &dyn TokenSource,
) -> Result<ExtractionResult, ParsingError> {
    StatementExtractor::new().extract_via_source(path, source)
}
