use super::store::{KeyValueStore, KeyValueStoreExt};
use crate::session::GeneratedArtifact;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

const HISTORY_PREFIX: &str = "history:";

/// Saved artifacts, one store entry each
#[derive(Clone)]
pub struct HistoryRepository {
    store: Arc<dyn KeyValueStore>,
}

impl HistoryRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{}{}", HISTORY_PREFIX, id)
    }

    /// Insert or replace an artifact
    pub fn save(&self, artifact: &GeneratedArtifact) -> Result<()> {
        self.store.put_json(&Self::key(&artifact.id), artifact)?;
        debug!("Saved artifact {} to history", artifact.id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<GeneratedArtifact>> {
        self.store.get_json(&Self::key(id))
    }

    /// All artifacts, newest first
    ///
    /// Entries that no longer parse are skipped with a warning.
    pub fn list(&self) -> Result<Vec<GeneratedArtifact>> {
        let mut items = Vec::new();
        for key in self.store.keys(HISTORY_PREFIX)? {
            match self.store.get_json::<GeneratedArtifact>(&key) {
                Ok(Some(artifact)) => items.push(artifact),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable history entry {}: {}", key, e),
            }
        }
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!("Retrieved {} history items", items.len());
        Ok(items)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(&Self::key(id))?;
        if removed {
            debug!("Deleted artifact {} from history", id);
        }
        Ok(removed)
    }

    /// Make the stored history equal to `items`
    pub fn replace_all(&self, items: &[GeneratedArtifact]) -> Result<()> {
        for key in self.store.keys(HISTORY_PREFIX)? {
            let id = &key[HISTORY_PREFIX.len()..];
            if !items.iter().any(|artifact| artifact.id == id) {
                self.store.delete(&key)?;
            }
        }
        for artifact in items {
            let current = self.get(&artifact.id).ok().flatten();
            if current.as_ref() != Some(artifact) {
                self.save(artifact)?;
            }
        }
        info!("History synchronized: {} items", items.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::DateTime;

    fn artifact(id: &str, millis: i64) -> GeneratedArtifact {
        GeneratedArtifact {
            id: id.into(),
            timestamp: DateTime::from_timestamp_millis(millis).unwrap(),
            ..Default::default()
        }
    }

    fn repository() -> (HistoryRepository, MemoryStore) {
        let store = MemoryStore::new();
        (HistoryRepository::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn test_list_is_newest_first() {
        let (history, _) = repository();
        history.save(&artifact("b", 2_000)).unwrap();
        history.save(&artifact("c", 3_000)).unwrap();
        history.save(&artifact("a", 1_000)).unwrap();

        let ids: Vec<String> = history.list().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_save_replaces_and_delete_removes() {
        let (history, _) = repository();
        let mut item = artifact("a", 1_000);
        history.save(&item).unwrap();
        item.image = "edited".into();
        history.save(&item).unwrap();

        assert_eq!(history.get("a").unwrap().unwrap().image, "edited");
        assert!(history.delete("a").unwrap());
        assert!(!history.delete("a").unwrap());
        assert!(history.list().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_entries_skipped() {
        let (history, store) = repository();
        history.save(&artifact("ok", 1)).unwrap();
        store.put("history:bad", "{").unwrap();
        assert_eq!(history.list().unwrap().len(), 1);
    }

    #[test]
    fn test_replace_all() {
        let (history, _) = repository();
        history.save(&artifact("gone", 1)).unwrap();
        history
            .replace_all(&[artifact("x", 5), artifact("y", 6)])
            .unwrap();
        let ids: Vec<String> = history.list().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["y", "x"]);
    }
}
