//! Persistence for history, settings, music and images
//!
//! - **store**: the key-value capability plus memory and JSON-file stores
//! - **history**: saved artifacts, newest first
//! - **settings**: last selections and gains
//! - **music**: per-area background tracks with preloading
//! - **image**: decoded data-URL images and size helpers

pub mod history;
pub mod image;
pub mod music;
pub mod settings;
pub mod store;

pub use history::HistoryRepository;
pub use image::{base64_size, format_bytes, parse_data_url, DecodedImage, ImageCache};
pub use music::{MusicLibrary, PreloadStatus};
pub use settings::Settings;
pub use store::{default_data_dir, JsonFileStore, KeyValueStore, KeyValueStoreExt, MemoryStore};

use crate::session::{AppAction, AppState};
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// History and settings over one store
#[derive(Clone)]
pub struct AppStorage {
    pub history: HistoryRepository,
    pub settings: Settings,
}

impl AppStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            history: HistoryRepository::new(store.clone()),
            settings: Settings::new(store),
        }
    }

    /// Action that restores the persisted state on launch
    pub fn initialize_action(&self) -> Result<AppAction> {
        let history = self.history.list()?;
        let last_selections = self.settings.last_selections()?;
        info!("Restoring {} history items", history.len());
        Ok(AppAction::Initialize {
            history,
            last_selections,
        })
    }

    /// Write history and last selections from `state`
    pub fn persist(&self, state: &AppState) -> Result<()> {
        self.history.replace_all(&state.history)?;
        self.settings.save_last_selections(&state.last_selections)
    }
}
