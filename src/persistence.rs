//! Key/value persistence for reading progress, preferences and bookmarks.

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReaderError, Result};
use crate::progress::ReadingProgress;
use crate::typography::TypographyPrefs;

pub const GLOBAL_PREFS_KEY: &str = "reader_prefs_v1";
pub const LAST_READ_KEY: &str = "last_read_book";
pub const STORE_FILENAME: &str = "progress.json";

pub fn prefs_key(storage_key: &str) -> String {
    format!("{storage_key}:prefs")
}

pub fn bookmarks_key(storage_key: &str) -> String {
    format!("{storage_key}:bookmarks")
}

pub trait ProgressStore {
    fn save(&mut self, key: &str, value: &Value) -> Result<()>;
    fn load(&self, key: &str) -> Option<Value>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// All keys in one JSON object on disk, rewritten on every change.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JsonFileStore {
    entries: BTreeMap<String, Value>,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

impl JsonFileStore {
    pub fn ephemeral() -> Self {
        Self::default()
    }

    pub fn with_file(file_path: impl Into<PathBuf>) -> Self {
        Self {
            entries: BTreeMap::new(),
            file_path: Some(file_path.into()),
        }
    }

    pub fn load_or_ephemeral(file_path: Option<&Path>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                error!("Failed to load progress store from {path:?}: {e:#}");
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    pub fn load_from_file(file_path: &Path) -> anyhow::Result<Self> {
        if file_path.exists() {
            let content = fs::read_to_string(file_path)?;
            let mut store: Self = serde_json::from_str(&content)?;
            store.file_path = Some(file_path.to_path_buf());
            Ok(store)
        } else {
            Ok(Self::with_file(file_path))
        }
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ReaderError::persistence(e.to_string()))?;
        fs::write(path, content).map_err(|e| ReaderError::persistence(format!("{path:?}: {e}")))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl ProgressStore for JsonFileStore {
    fn save(&mut self, key: &str, value: &Value) -> Result<()> {
        self.entries.insert(key.to_string(), value.clone());
        self.flush()
    }

    fn load(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// In-memory store; optionally fails every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
    pub fail_writes: bool,
    pub writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }
}

impl ProgressStore for MemoryStore {
    fn save(&mut self, key: &str, value: &Value) -> Result<()> {
        if self.fail_writes {
            return Err(ReaderError::persistence("store is read-only"));
        }
        self.writes += 1;
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.fail_writes {
            return Err(ReaderError::persistence("store is read-only"));
        }
        self.entries.remove(key);
        Ok(())
    }
}

impl<S: ProgressStore + ?Sized> ProgressStore for Box<S> {
    fn save(&mut self, key: &str, value: &Value) -> Result<()> {
        (**self).save(key, value)
    }

    fn load(&self, key: &str) -> Option<Value> {
        (**self).load(key)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Serialize and save, logging instead of failing.
pub fn save_json<T: Serialize>(store: &mut dyn ProgressStore, key: &str, value: &T) -> bool {
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not serialize '{key}': {e}");
            return false;
        }
    };
    match store.save(key, &value) {
        Ok(()) => {
            debug!("Saved '{key}'");
            true
        }
        Err(e) => {
            warn!("Could not save '{key}': {e}");
            false
        }
    }
}

/// Load and deserialize; anything unreadable is a miss.
pub fn load_json<T: DeserializeOwned>(store: &dyn ProgressStore, key: &str) -> Option<T> {
    let value = store.load(key)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring unreadable '{key}': {e}");
            None
        }
    }
}

pub fn load_progress(store: &dyn ProgressStore, storage_key: &str) -> Option<ReadingProgress> {
    load_json::<ReadingProgress>(store, storage_key).map(ReadingProgress::normalized)
}

pub fn save_progress(
    store: &mut dyn ProgressStore,
    storage_key: &str,
    progress: &ReadingProgress,
) -> bool {
    save_json(store, storage_key, progress)
}

fn prefs_store_key(storage_key: &str, isolate: bool) -> String {
    if isolate {
        prefs_key(storage_key)
    } else {
        GLOBAL_PREFS_KEY.to_string()
    }
}

/// Stored prefs, normalized; defaults when nothing usable is stored.
pub fn load_prefs(store: &dyn ProgressStore, storage_key: &str, isolate: bool) -> TypographyPrefs {
    store
        .load(&prefs_store_key(storage_key, isolate))
        .map(|value| TypographyPrefs::from_value(&value))
        .unwrap_or_default()
}

pub fn save_prefs(
    store: &mut dyn ProgressStore,
    storage_key: &str,
    isolate: bool,
    prefs: &TypographyPrefs,
) -> bool {
    save_json(store, &prefs_store_key(storage_key, isolate), &prefs.normalized())
}

/// The document most recently opened
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastRead {
    pub path: String,
    pub storage_key: String,
    pub opened_at: DateTime<Utc>,
}

pub fn record_last_read(store: &mut dyn ProgressStore, last: &LastRead) -> bool {
    save_json(store, LAST_READ_KEY, last)
}

pub fn last_read(store: &dyn ProgressStore) -> Option<LastRead> {
    load_json(store, LAST_READ_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Locator;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn progress(pct: f64) -> ReadingProgress {
        ReadingProgress {
            percentage: pct,
            format_locator: Locator::page(3),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join(STORE_FILENAME);

        let mut store = JsonFileStore::load_or_ephemeral(Some(&path));
        assert!(save_progress(&mut store, "reader_abc_book", &progress(42.0)));

        let reloaded = JsonFileStore::load_or_ephemeral(Some(&path));
        assert_eq!(
            load_progress(&reloaded, "reader_abc_book"),
            Some(progress(42.0))
        );
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STORE_FILENAME);
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::load_or_ephemeral(Some(&path));
        assert_eq!(store.keys().count(), 0);
    }

    #[test]
    fn undecodable_progress_is_a_miss() {
        let mut store = MemoryStore::new();
        store.save("k", &json!({"percentage": "lots"})).unwrap();
        assert_eq!(load_progress(&store, "k"), None);
    }

    #[test]
    fn write_failures_are_reported_not_raised() {
        let mut store = MemoryStore::failing();
        assert!(!save_progress(&mut store, "k", &progress(1.0)));
        assert_eq!(load_progress(&store, "k"), None);
    }

    #[test]
    fn prefs_key_depends_on_isolation() {
        let mut store = MemoryStore::new();
        let wide = TypographyPrefs {
            page_width: 1200.0,
            ..TypographyPrefs::default()
        };
        assert!(save_prefs(&mut store, "book", true, &wide));
        assert!(store.load("book:prefs").is_some());
        assert!(store.load(GLOBAL_PREFS_KEY).is_none());
        assert_eq!(load_prefs(&store, "book", false), TypographyPrefs::default());
        assert_eq!(load_prefs(&store, "book", true), wide);
    }

    #[test]
    fn remove_deletes_key() {
        let mut store = JsonFileStore::ephemeral();
        store.save("a", &json!(1)).unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.load("a"), None);
        store.remove("missing").unwrap();
    }
}
