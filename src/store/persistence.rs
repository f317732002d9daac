//! Whole-document persistence for the key store.
//!
//! The store never reads or writes individual records: it loads the entire
//! [`KeyDocument`], changes it in memory, and saves it back in one go.
//!
//! A missing or unparsable document loads as an empty store, and a record
//! that cannot be read is skipped. Both are logged at `warn` level, and the
//! file is copied aside before the next write replaces it.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::errors::{KeyError, KeyResult};
use crate::record::{KeyDocument, KeyRecord};

/// Load/save contract for the key document.
pub trait Persistence: Send + Sync {
    /// Read the whole document. Never fails; unreadable data yields an empty map.
    fn load(&self) -> KeyDocument;

    /// Replace the whole document.
    fn save(&self, document: &KeyDocument) -> KeyResult<()>;

    /// Short description of where the document lives, for health output.
    fn location(&self) -> String;
}

/// JSON file on local disk, written with 2-space indentation.
///
/// Records that fail to parse are skipped on load. Before the next save
/// replaces such a file, the unreadable original is copied to
/// `<name>.bad` so that nothing is silently lost.
#[derive(Debug)]
pub struct JsonFilePersistence {
    path: PathBuf,
    unreadable: AtomicBool,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            unreadable: AtomicBool::new(false),
        }
    }

    /// Sibling of the document named `<name><suffix>`.
    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "keys.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Sibling file used to stage a write before the rename.
    fn staging_path(&self) -> PathBuf {
        self.sibling_path(".tmp")
    }

    /// Where an unreadable document is kept before it is overwritten.
    pub fn backup_path(&self) -> PathBuf {
        self.sibling_path(".bad")
    }

    fn mark_unreadable(&self) {
        self.unreadable.store(true, Ordering::SeqCst);
    }

    fn parse(&self, text: &str) -> KeyDocument {
        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "key document is not valid JSON, treating as empty");
                self.mark_unreadable();
                return KeyDocument::new();
            }
        };

        let mut document = KeyDocument::new();
        for (key, value) in raw {
            match serde_json::from_value::<KeyRecord>(value) {
                Ok(record) => {
                    document.insert(key, record);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), key = %key, error = %e, "skipping unreadable key record");
                    self.mark_unreadable();
                }
            }
        }
        document
    }

    /// Copy the current file aside if the last load could not read all of it.
    fn preserve_unreadable(&self) -> KeyResult<()> {
        if !self.unreadable.load(Ordering::SeqCst) || !self.path.exists() {
            return Ok(());
        }

        let backup = self.backup_path();
        fs::copy(&self.path, &backup).map_err(|e| {
            KeyError::Storage(format!("failed to back up {}: {e}", self.path.display()))
        })?;
        self.unreadable.store(false, Ordering::SeqCst);

        warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            "kept a copy of the unreadable key document before overwriting it"
        );
        Ok(())
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self) -> KeyDocument {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "key document does not exist yet");
                return KeyDocument::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read key document, treating as empty");
                self.mark_unreadable();
                return KeyDocument::new();
            }
        };

        if text.trim().is_empty() {
            return KeyDocument::new();
        }

        self.parse(&text)
    }

    fn save(&self, document: &KeyDocument) -> KeyResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        self.preserve_unreadable()?;

        let mut bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| KeyError::Storage(format!("failed to serialize key document: {e}")))?;
        bytes.push(b'\n');

        let staging = self.staging_path();
        fs::write(&staging, &bytes).map_err(|e| {
            KeyError::Storage(format!("failed to write {}: {e}", staging.display()))
        })?;
        fs::rename(&staging, &self.path).map_err(|e| {
            KeyError::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), keys = document.len(), "key document saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process document, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    document: Mutex<KeyDocument>,
    fail_saves: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: KeyDocument) -> Self {
        Self {
            document: Mutex::new(document),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `save` fail with a storage error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> KeyDocument {
        self.document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn save(&self, document: &KeyDocument) -> KeyResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(KeyError::Storage("simulated write failure".to_string()));
        }
        *self.document.lock().unwrap_or_else(|e| e.into_inner()) = document.clone();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::LeaseDuration;
    use chrono::{TimeZone, Utc};

    fn sample_document() -> KeyDocument {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut document = KeyDocument::new();
        document.insert(
            "7DAY-CHECKKEY-ABCDEFGHIJKL".to_string(),
            KeyRecord::new(LeaseDuration::SevenDays, "test".into(), now, None),
        );
        document
    }

    #[test]
    fn staging_and_backup_paths_are_siblings() {
        let persistence = JsonFilePersistence::new("data/keys.json");
        assert_eq!(persistence.staging_path(), PathBuf::from("data/keys.json.tmp"));
        assert_eq!(persistence.backup_path(), PathBuf::from("data/keys.json.bad"));
    }

    #[test]
    fn parse_keeps_readable_records() {
        let persistence = JsonFilePersistence::new("unused.json");
        let document = persistence.parse(
            r#"{ "A": { "duration": 7 }, "B": { "duration": "forever" }, "C": 5 }"#,
        );

        assert_eq!(document.len(), 1);
        assert_eq!(document["A"].duration, Some(LeaseDuration::SevenDays));
        assert!(persistence.unreadable.load(Ordering::SeqCst));
    }

    #[test]
    fn memory_round_trip() {
        let persistence = MemoryPersistence::new();
        assert!(persistence.load().is_empty());

        let document = sample_document();
        persistence.save(&document).unwrap();
        assert_eq!(persistence.load(), document);
    }

    #[test]
    fn memory_failing_saves_leave_document_untouched() {
        let persistence = MemoryPersistence::new();
        persistence.set_fail_saves(true);

        assert!(matches!(
            persistence.save(&sample_document()),
            Err(KeyError::Storage(_))
        ));
        assert!(persistence.load().is_empty());
    }
}
