use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context};

/// String key/value store for credentials and session bookkeeping.
/// [`FileStore`] survives restarts; [`MemoryStore`] lives as long as the process.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// A JSON object on disk, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> anyhow::Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw).with_context(|| format!("parse {}", self.path.display()))
    }

    fn write(&self, map: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).context("create store dir")?;
            }
        }
        let raw = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, raw).with_context(|| format!("write {}", self.path.display()))
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> anyhow::Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("file store poisoned"))?;
        let mut map = self.read()?;
        f(&mut map);
        self.write(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("file store poisoned"))?;
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        FileStore::new(&path).set("daypat.remember_me", "true").unwrap();
        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("daypat.remember_me").unwrap().as_deref(), Some("true"));

        reopened.remove("daypat.remember_me").unwrap();
        assert_eq!(FileStore::new(&path).get("daypat.remember_me").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileStore::new(&path).get("k").is_err());
    }
}
