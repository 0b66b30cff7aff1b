use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Document;

/// Upsert key for a stored statement. Always populated: header fields that
/// could not be recovered carry sentinel values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentKey {
    pub worker_id: String,
    pub month: String,
    pub year: String,
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.worker_id, self.year, self.month)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether an upsert created a new record or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Storage collaborator for extracted statements.
///
/// A statement parsed again for the same [`DocumentKey`] replaces the
/// previous one.
pub trait DocumentStore {
    fn upsert(&mut self, document: &Document) -> Result<UpsertOutcome, StoreError>;
}
