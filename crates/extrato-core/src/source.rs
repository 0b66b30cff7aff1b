use std::path::Path;

use thiserror::Error;

use crate::Token;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to decode token stream: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for token-stream backends.
///
/// Implementors turn a converted statement file into positioned tokens; the
/// reconstruction pipeline (line assembly, segmentation, field extraction)
/// lives in `extrato_parsing::StatementExtractor`.
pub trait TokenSource: Send + Sync {
    /// Load every token of every page. Order is not significant.
    fn load_tokens(&self, path: &Path) -> Result<Vec<Token>, SourceError>;
}
