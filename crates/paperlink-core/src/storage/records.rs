use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::models::{DocumentRecord, LanguageClass, MatchPairing};

/// On-disk shape of `records.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryRecords {
    #[serde(default)]
    pub records: Vec<DocumentRecord>,
    #[serde(default)]
    pub pairings: Vec<MatchPairing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// JSON-file record store: one row per document plus the active pairings.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    data: LibraryRecords,
}

impl RecordStore {
    /// Open the store at `path`, starting empty when the file doesn't exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            LibraryRecords::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Write the store back to disk through a temp file + rename.
    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.data.updated_at = Some(Utc::now());
        self.data.records.sort_by_key(|r| r.sequence_id);

        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            records = self.data.records.len(),
            pairings = self.data.pairings.len(),
            "record store saved"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[DocumentRecord] {
        &self.data.records
    }

    pub fn pairings(&self) -> &[MatchPairing] {
        &self.data.pairings
    }

    pub fn get(&self, sequence_id: u32) -> Result<&DocumentRecord> {
        self.data
            .records
            .iter()
            .find(|r| r.sequence_id == sequence_id)
            .ok_or(CoreError::RecordNotFound(sequence_id))
    }

    /// Records of one language class, ordered by `sequence_id`.
    pub fn by_language(&self, language: LanguageClass) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> = self
            .data
            .records
            .iter()
            .filter(|r| r.language_class == language)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.sequence_id);
        records
    }

    pub fn find_by_original(
        &self,
        language: LanguageClass,
        original_filename: &str,
    ) -> Option<&DocumentRecord> {
        self.data.records.iter().find(|r| {
            r.language_class == language && r.original_filename == original_filename
        })
    }

    /// Next free sequence id (ids start at 1).
    pub fn next_sequence_id(&self) -> u32 {
        self.data
            .records
            .iter()
            .map(|r| r.sequence_id)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Insert or replace a record by `sequence_id`.
    ///
    /// Rejects a record whose canonical filename is already taken by a
    /// different record of the same language class.
    pub fn upsert(&mut self, record: DocumentRecord) -> Result<()> {
        let collides = self.data.records.iter().any(|r| {
            r.sequence_id != record.sequence_id
                && r.language_class == record.language_class
                && r.canonical_filename == record.canonical_filename
        });
        if collides {
            return Err(CoreError::FilenameCollision {
                language: record.language_class.to_string(),
                filename: record.canonical_filename,
            });
        }

        match self
            .data
            .records
            .iter_mut()
            .find(|r| r.sequence_id == record.sequence_id)
        {
            Some(existing) => *existing = record,
            None => self.data.records.push(record),
        }
        Ok(())
    }

    /// Replace the active pairings; earlier pairings never survive a rerun.
    pub fn replace_pairings(&mut self, pairings: Vec<MatchPairing>) {
        apply_pairings(&mut self.data.records, &pairings);
        self.data.pairings = pairings;
    }
}

/// Clear every record's pairing fields, then write each pairing onto its en record.
///
/// zh rows stay blank: the spreadsheet records pairings on the English side only.
pub fn apply_pairings(records: &mut [DocumentRecord], pairings: &[MatchPairing]) {
    for record in records.iter_mut() {
        record.clear_pairing();
    }
    for pairing in pairings {
        if let Some(en) = records
            .iter_mut()
            .find(|r| r.sequence_id == pairing.en_id && r.language_class == LanguageClass::En)
        {
            en.paired_with = Some(pairing.zh_id);
            en.pair_confidence = Some(pairing.match_confidence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchRationale;
    use tempfile::TempDir;

    fn pairing(zh_id: u32, en_id: u32, confidence: f64) -> MatchPairing {
        MatchPairing {
            zh_id,
            en_id,
            match_confidence: confidence,
            rationale: MatchRationale::default(),
        }
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");

        let mut store = RecordStore::open(&path).unwrap();
        assert!(store.records().is_empty());
        store
            .upsert(DocumentRecord::new(2, LanguageClass::En, "b.pdf", "Second"))
            .unwrap();
        store
            .upsert(DocumentRecord::new(1, LanguageClass::Zh, "a.pdf", "第一"))
            .unwrap();
        store.save().unwrap();

        let reopened = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.records().len(), 2);
        assert_eq!(reopened.records()[0].sequence_id, 1);
        assert_eq!(reopened.get(2).unwrap().title, "Second");
        assert!(matches!(reopened.get(9), Err(CoreError::RecordNotFound(9))));
    }

    #[test]
    fn test_next_sequence_id() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(&dir.path().join("r.json")).unwrap();
        assert_eq!(store.next_sequence_id(), 1);
        store
            .upsert(DocumentRecord::new(7, LanguageClass::Zh, "x.pdf", "x"))
            .unwrap();
        assert_eq!(store.next_sequence_id(), 8);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(&dir.path().join("r.json")).unwrap();
        store
            .upsert(DocumentRecord::new(1, LanguageClass::En, "a.pdf", "Old"))
            .unwrap();
        store
            .upsert(DocumentRecord::new(1, LanguageClass::En, "a.pdf", "New"))
            .unwrap();
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.get(1).unwrap().title, "New");
    }

    #[test]
    fn test_upsert_rejects_filename_collision() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(&dir.path().join("r.json")).unwrap();
        store
            .upsert(DocumentRecord::new(1, LanguageClass::En, "a.pdf", "A"))
            .unwrap();

        let mut clash = DocumentRecord::new(2, LanguageClass::En, "b.pdf", "B");
        clash.canonical_filename = "e01.pdf".to_string();
        let err = store.upsert(clash).unwrap_err();
        assert!(matches!(err, CoreError::FilenameCollision { .. }));

        // Same name in the other language class is fine.
        let mut other = DocumentRecord::new(3, LanguageClass::Zh, "c.pdf", "C");
        other.canonical_filename = "e01.pdf".to_string();
        store.upsert(other).unwrap();
    }

    #[test]
    fn test_replace_pairings_writes_en_rows_only_and_clears_old() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(&dir.path().join("r.json")).unwrap();
        store
            .upsert(DocumentRecord::new(1, LanguageClass::Zh, "a.pdf", "中文"))
            .unwrap();
        store
            .upsert(DocumentRecord::new(2, LanguageClass::En, "b.pdf", "English"))
            .unwrap();
        store
            .upsert(DocumentRecord::new(3, LanguageClass::En, "c.pdf", "Other"))
            .unwrap();

        store.replace_pairings(vec![pairing(1, 2, 0.9)]);
        assert_eq!(store.get(2).unwrap().paired_with, Some(1));
        assert_eq!(store.get(2).unwrap().pair_confidence, Some(0.9));
        assert_eq!(store.get(1).unwrap().paired_with, None);

        store.replace_pairings(vec![pairing(1, 3, 0.8)]);
        assert_eq!(store.pairings().len(), 1);
        assert_eq!(store.get(2).unwrap().paired_with, None);
        assert_eq!(store.get(3).unwrap().paired_with, Some(1));
    }

    #[test]
    fn test_by_language_sorted() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(&dir.path().join("r.json")).unwrap();
        for (id, lang) in [(5, LanguageClass::En), (2, LanguageClass::En), (3, LanguageClass::Zh)] {
            store
                .upsert(DocumentRecord::new(id, lang, "f.pdf", "t"))
                .unwrap();
        }
        let en: Vec<u32> = store
            .by_language(LanguageClass::En)
            .iter()
            .map(|r| r.sequence_id)
            .collect();
        assert_eq!(en, vec![2, 5]);
        assert!(store.find_by_original(LanguageClass::Zh, "f.pdf").is_some());
        assert!(store.find_by_original(LanguageClass::Zh, "g.pdf").is_none());
    }
}
