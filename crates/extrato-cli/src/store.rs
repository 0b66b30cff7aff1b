use std::path::{Path, PathBuf};

use extrato_core::{Document, DocumentKey, DocumentStore, StoreError, UpsertOutcome};

/// Stores each statement as `<dir>/<workerId>_<year>_<month>.json`.
///
/// Re-parsing a statement with the same key overwrites the previous file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &DocumentKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocumentStore for FileStore {
    fn upsert(&mut self, document: &Document) -> Result<UpsertOutcome, StoreError> {
        let path = self.path_for(&document.key());
        let outcome = if path.exists() {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        };
        let json = serde_json::to_string_pretty(document)?;
        std::fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), ?outcome, "stored statement");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extrato_core::{Amounts, HeaderInfo};

    fn document(worker_id: &str, base: f64) -> Document {
        Document {
            header: HeaderInfo {
                worker_id: worker_id.to_string(),
                worker_name: "JOSE".to_string(),
                month: "ABR".to_string(),
                year: "2024".to_string(),
                category: "ESTIVADOR".to_string(),
            },
            entries: vec![],
            summary: Amounts {
                base_amount: base,
                ..Default::default()
            },
            revised_summary: Amounts::default(),
        }
    }

    #[test]
    fn test_insert_then_replace() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("out")).unwrap();

        assert_eq!(
            store.upsert(&document("123-4", 1.0)).unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert(&document("123-4", 2.0)).unwrap(),
            UpsertOutcome::Replaced
        );

        let path = store.dir().join("123-4_2024_ABR.json");
        let stored: Document =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(stored.summary.base_amount, 2.0);
    }

    #[test]
    fn test_sentinel_header_still_has_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        let doc = Document {
            header: HeaderInfo::default(),
            ..document("x", 0.0)
        };
        store.upsert(&doc).unwrap();
        assert!(store.dir().join("UNKNOWN_0000_UNKNOWN.json").exists());
    }
}
