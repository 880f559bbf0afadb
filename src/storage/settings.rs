use super::store::{KeyValueStore, KeyValueStoreExt};
use crate::session::LastSelections;
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

const SETTINGS_PREFIX: &str = "settings:";
const LAST_SELECTIONS: &str = "lastSelections";
const NARRATION_GAIN: &str = "narrationGain";
const MUSIC_GAIN: &str = "musicGain";

/// User preferences
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn KeyValueStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{}{}", SETTINGS_PREFIX, name)
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.store.get_json(&Self::key(name))
    }

    pub fn set<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        self.store.put_json(&Self::key(name), value)
    }

    pub fn last_selections(&self) -> Result<LastSelections> {
        Ok(self.get(LAST_SELECTIONS)?.unwrap_or_default())
    }

    pub fn save_last_selections(&self, selections: &LastSelections) -> Result<()> {
        self.set(LAST_SELECTIONS, selections)
    }

    /// Saved narration and music gains, if any
    pub fn gains(&self) -> Result<(Option<f32>, Option<f32>)> {
        Ok((self.get(NARRATION_GAIN)?, self.get(MUSIC_GAIN)?))
    }

    pub fn save_gains(&self, narration: f32, music: f32) -> Result<()> {
        self.set(NARRATION_GAIN, &narration)?;
        self.set(MUSIC_GAIN, &music)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ReprogramArea;
    use crate::storage::MemoryStore;

    #[test]
    fn test_last_selections_default_and_roundtrip() {
        let settings = Settings::new(Arc::new(MemoryStore::new()));
        assert_eq!(settings.last_selections().unwrap(), LastSelections::default());

        let selections = LastSelections {
            area_id: Some(ReprogramArea::Energetic),
            scenario_id: Some("ener-2".into()),
        };
        settings.save_last_selections(&selections).unwrap();
        assert_eq!(settings.last_selections().unwrap(), selections);
    }

    #[test]
    fn test_gains() {
        let settings = Settings::new(Arc::new(MemoryStore::new()));
        assert_eq!(settings.gains().unwrap(), (None, None));
        settings.save_gains(0.8, 0.3).unwrap();
        assert_eq!(settings.gains().unwrap(), (Some(0.8), Some(0.3)));
    }
}
