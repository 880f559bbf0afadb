//! Timed playback of a generated meditation
//!
//! - **phase**: the four phases and their progress ranges
//! - **timer**: pause-aware phase clock
//! - **state**: observable session state, snapshots and events
//! - **sequencer**: the task that walks the phases and drives the mixer

pub mod phase;
pub mod sequencer;
pub mod state;
pub mod timer;

pub use phase::MeditationPhase;
pub use sequencer::PhaseSequencer;
pub use state::{MeditationSession, SessionEvent, SharedSession};
pub use timer::PhaseClock;
