//! Background music per area
//!
//! Tracks live as files in a directory, one per [`ReprogramArea`]. They are
//! read once, kept base64-encoded in memory and optionally mirrored into a
//! [`KeyValueStore`] so later launches skip the file read.

use super::store::KeyValueStore;
use crate::audio::bytes_to_base64;
use crate::session::ReprogramArea;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MUSIC_PREFIX: &str = "music:";

/// Progress of a preload pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreloadStatus {
    pub is_preloading: bool,
    pub preloaded_count: usize,
    pub total_areas: usize,
    pub errors: BTreeMap<ReprogramArea, String>,
}

#[derive(Default)]
struct PreloadState {
    is_preloading: bool,
    preloaded: HashSet<ReprogramArea>,
    errors: BTreeMap<ReprogramArea, String>,
}

pub struct MusicLibrary {
    dir: PathBuf,
    cache: RwLock<HashMap<ReprogramArea, String>>,
    store: Option<Arc<dyn KeyValueStore>>,
    preload: Mutex<PreloadState>,
}

impl MusicLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
            store: None,
            preload: Mutex::new(PreloadState::default()),
        }
    }

    /// Mirror loaded tracks into `store`
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn track_path(&self, area: ReprogramArea) -> PathBuf {
        self.dir.join(area.music_file())
    }

    fn store_key(area: ReprogramArea) -> String {
        format!("{}{}", MUSIC_PREFIX, area.music_file())
    }

    fn cached(&self, area: ReprogramArea) -> Option<String> {
        if let Some(data) = self.cache.read().get(&area) {
            return Some(data.clone());
        }
        let store = self.store.as_ref()?;
        match store.get(&Self::store_key(area)) {
            Ok(Some(data)) if !data.is_empty() => {
                self.cache.write().insert(area, data.clone());
                Some(data)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to read cached music for {}: {}", area, e);
                None
            }
        }
    }

    async fn load(&self, area: ReprogramArea) -> Result<String, String> {
        if let Some(data) = self.cached(area) {
            debug!("Music for {} served from cache", area);
            return Ok(data);
        }

        let path = self.track_path(area);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        if bytes.is_empty() {
            return Err(format!("Music file {:?} is empty", path));
        }

        let data = bytes_to_base64(&bytes);
        self.cache.write().insert(area, data.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.put(&Self::store_key(area), &data) {
                warn!("Failed to cache music for {}: {}", area, e);
            }
        }
        info!("Loaded music for {} ({} bytes)", area, bytes.len());
        Ok(data)
    }

    /// Base64 track for `area`, or an empty string when it can't be loaded
    pub async fn background_music(&self, area: ReprogramArea) -> String {
        match self.load(area).await {
            Ok(data) => data,
            Err(e) => {
                warn!("No background music for {}: {}", area, e);
                String::new()
            }
        }
    }

    /// Load one area ahead of time
    pub async fn preload_area(&self, area: ReprogramArea) -> bool {
        if self.is_preloaded(area) {
            return true;
        }
        match self.load(area).await {
            Ok(_) => {
                let mut state = self.preload.lock();
                state.preloaded.insert(area);
                state.errors.remove(&area);
                true
            }
            Err(e) => {
                warn!("Preload failed for {}: {}", area, e);
                self.preload.lock().errors.insert(area, e);
                false
            }
        }
    }

    /// Load every area; a second call while one runs is ignored
    pub async fn preload_all(&self) {
        {
            let mut state = self.preload.lock();
            if state.is_preloading {
                debug!("Preload already running");
                return;
            }
            state.is_preloading = true;
        }

        for area in ReprogramArea::ALL {
            self.preload_area(area).await;
        }

        let mut state = self.preload.lock();
        state.is_preloading = false;
        info!(
            "Music preload finished: {}/{} areas",
            state.preloaded.len(),
            ReprogramArea::ALL.len()
        );
    }

    pub fn is_preloaded(&self, area: ReprogramArea) -> bool {
        self.preload.lock().preloaded.contains(&area)
    }

    pub fn preload_status(&self) -> PreloadStatus {
        let state = self.preload.lock();
        PreloadStatus {
            is_preloading: state.is_preloading,
            preloaded_count: state.preloaded.len(),
            total_areas: ReprogramArea::ALL.len(),
            errors: state.errors.clone(),
        }
    }

    /// Whether a track is cached or present on disk
    pub fn has_music_for(&self, area: ReprogramArea) -> bool {
        self.cache.read().contains_key(&area) || self.track_path(area).is_file()
    }

    /// Drop the in-memory cache, the mirrored copies and preload state
    pub fn clear(&self) {
        self.cache.write().clear();
        if let Some(store) = &self.store {
            for area in ReprogramArea::ALL {
                if let Err(e) = store.delete(&Self::store_key(area)) {
                    warn!("Failed to clear cached music for {}: {}", area, e);
                }
            }
        }
        *self.preload.lock() = PreloadState::default();
        debug!("Music cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::base64_to_bytes;
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    fn library_with(files: &[(ReprogramArea, &[u8])]) -> (MusicLibrary, TempDir) {
        let dir = TempDir::new().unwrap();
        for (area, bytes) in files {
            std::fs::write(dir.path().join(area.music_file()), bytes).unwrap();
        }
        (MusicLibrary::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_background_music_reads_and_caches() {
        let (library, dir) = library_with(&[(ReprogramArea::Physical, b"ID3 track")]);
        let data = library.background_music(ReprogramArea::Physical).await;
        assert_eq!(base64_to_bytes(&data).unwrap(), b"ID3 track");

        std::fs::remove_file(dir.path().join("physical.mp3")).unwrap();
        assert_eq!(library.background_music(ReprogramArea::Physical).await, data);
        assert!(library.has_music_for(ReprogramArea::Physical));
    }

    #[tokio::test]
    async fn test_missing_track_is_empty() {
        let (library, _dir) = library_with(&[]);
        assert_eq!(library.background_music(ReprogramArea::Economic).await, "");
        assert!(!library.has_music_for(ReprogramArea::Economic));
    }

    #[tokio::test]
    async fn test_preload_status() {
        let (library, _dir) = library_with(&[
            (ReprogramArea::Physical, b"a"),
            (ReprogramArea::Spiritual, b"b"),
        ]);
        library.preload_all().await;

        let status = library.preload_status();
        assert!(!status.is_preloading);
        assert_eq!(status.preloaded_count, 2);
        assert_eq!(status.total_areas, 4);
        assert_eq!(status.errors.len(), 2);
        assert!(status.errors.contains_key(&ReprogramArea::Economic));
        assert!(library.is_preloaded(ReprogramArea::Spiritual));

        library.clear();
        assert_eq!(library.preload_status().preloaded_count, 0);
    }

    #[tokio::test]
    async fn test_store_mirror_survives_restart() {
        let store = MemoryStore::new();
        let (library, dir) = library_with(&[(ReprogramArea::Energetic, b"flow")]);
        let library = library.with_store(Arc::new(store.clone()));
        let data = library.background_music(ReprogramArea::Energetic).await;
        assert_eq!(store.len(), 1);

        let fresh = MusicLibrary::new(dir.path().join("elsewhere")).with_store(Arc::new(store));
        assert_eq!(fresh.background_music(ReprogramArea::Energetic).await, data);
    }
}
