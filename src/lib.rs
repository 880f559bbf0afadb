//! Guided-meditation playback engine
//!
//! A generated artifact (symbolic image, analysis, affirmation, narration and
//! background music) is played as a timed session: breathing, meditation with
//! narration over ducked music, conclusion, done.
//!
//! - **audio**: decoding, resampling, the mix graph and output backends
//! - **meditation**: phases, progress and the sequencer that drives them
//! - **session**: application state machine and artifact generation
//! - **storage**: history, settings, music library and image cache
//! - **config**: timing and gain configuration

pub mod audio;
pub mod config;
pub mod error;
pub mod meditation;
pub mod session;
pub mod storage;

pub use config::MeditationConfig;
pub use error::{ReverieError, Result};
pub use meditation::{MeditationPhase, MeditationSession, PhaseSequencer, SessionEvent};
pub use session::{AppAction, AppState, GeneratedArtifact, SharedAppState};
