/// Keyed JSON stores for the bot's editable data: custom commands,
/// auto-replies and timers.
///
/// Each store is a string-keyed map held in memory and written back to a
/// single JSON object file on every change (write to tmp file, then rename
/// for crash safety). A missing file starts empty; an unreadable one is
/// logged and also starts empty so a bad edit can't keep the bot offline.
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

pub struct JsonStore<V> {
    entries: BTreeMap<String, V>,
    persist_path: Option<PathBuf>,
}

impl<V> fmt::Debug for JsonStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonStore")
            .field("entries", &self.entries.len())
            .field("persist_path", &self.persist_path)
            .finish()
    }
}

impl<V> Default for JsonStore<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            persist_path: None,
        }
    }
}

impl<V: Serialize + DeserializeOwned> JsonStore<V> {
    /// Create an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path` or start empty.
    pub fn load_or_create(path: &Path) -> Self {
        let mut store = Self {
            entries: BTreeMap::new(),
            persist_path: Some(path.to_path_buf()),
        };

        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(json) => match serde_json::from_str::<BTreeMap<String, V>>(&json) {
                    Ok(entries) => {
                        store.entries = entries;
                        info!(path = %path.display(), count = store.entries.len(), "loaded store");
                    }
                    Err(e) => warn!("failed to parse {}: {e}", path.display()),
                },
                Err(e) => warn!("failed to read {}: {e}", path.display()),
            }
        }

        store
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or replace an entry. Returns the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let previous = self.entries.insert(key.into(), value);
        self.persist();
        previous
    }

    /// Remove an entry. Returns it if it existed.
    pub fn delete(&mut self, key: &str) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomic persist to disk (tmp + rename).
    fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("failed to create {}: {e}", dir.display());
                return;
            }
        }
        match serde_json::to_string_pretty(&self.entries) {
            Ok(json) => {
                let tmp = path.with_extension("json.tmp");
                if let Err(e) = std::fs::write(&tmp, &json) {
                    warn!("failed to write {}: {e}", tmp.display());
                    return;
                }
                if let Err(e) = std::fs::rename(&tmp, path) {
                    warn!("failed to rename {}: {e}", tmp.display());
                }
            }
            Err(e) => warn!("failed to serialize {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tidebot-test-store-{}", rand::random::<u64>()))
    }

    #[test]
    fn set_get_delete() {
        let mut store: JsonStore<String> = JsonStore::in_memory();
        assert_eq!(store.set("hi", "hello!".into()), None);
        assert_eq!(store.get("hi").map(String::as_str), Some("hello!"));
        assert_eq!(store.set("hi", "hey".into()).as_deref(), Some("hello!"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete("hi").as_deref(), Some("hey"));
        assert_eq!(store.delete("hi"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn persistence_roundtrip() {
        let dir = tmp_dir();
        let path = dir.join("auto_replies.json");

        {
            let mut store: JsonStore<String> = JsonStore::load_or_create(&path);
            assert!(store.is_empty());
            store.set("o7", "o7".to_string());
            store.set("gg", "well played".to_string());
            store.delete("o7");
        }

        let store: JsonStore<String> = JsonStore::load_or_create(&path);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("gg").map(String::as_str), Some("well played"));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tmp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("custom_commands.json");
        std::fs::write(&path, "{not json").unwrap();

        let store: JsonStore<String> = JsonStore::load_or_create(&path);
        assert!(store.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
