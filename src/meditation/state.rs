//! Observable state of a meditation session
//!
//! The sequencer is the only writer. Readers get a snapshot through
//! `SharedSession` or the watch channel; events only signal that something
//! changed and carry the values needed for logging.

use super::phase::MeditationPhase;
use parking_lot::RwLock;
use std::sync::Arc;

/// Runtime state of one session
#[derive(Clone, Debug, PartialEq)]
pub struct MeditationSession {
    pub phase: MeditationPhase,
    /// 0 - 100, non-decreasing within a phase
    pub progress: f32,
    pub paused: bool,
    pub narrating: bool,
    /// Analysis text, present only while narrating
    pub subtitle: Option<String>,
    /// Shown whenever narration is inactive
    pub affirmation: String,
    pub narration_gain: f32,
    pub music_gain: f32,
    /// Audio waits for a user interaction
    pub audio_blocked: bool,
}

impl MeditationSession {
    pub fn new(affirmation: impl Into<String>, narration_gain: f32, music_gain: f32) -> Self {
        Self {
            phase: MeditationPhase::Breathing,
            progress: 0.0,
            paused: false,
            narrating: false,
            subtitle: None,
            affirmation: affirmation.into(),
            narration_gain,
            music_gain,
            audio_blocked: false,
        }
    }

    /// Move to `phase`, re-basing progress to its start value
    pub fn enter_phase(&mut self, phase: MeditationPhase) {
        self.phase = phase;
        self.progress = phase.start_progress();
    }

    /// Raise progress within the current phase range; never lowers it
    pub fn advance_progress(&mut self, value: f32) -> bool {
        let (start, end) = self.phase.progress_range();
        let value = value.clamp(start, end);
        if value > self.progress {
            self.progress = value;
            true
        } else {
            false
        }
    }

    pub fn start_narration(&mut self, subtitle: impl Into<String>) {
        self.narrating = true;
        self.subtitle = Some(subtitle.into());
    }

    pub fn finish_narration(&mut self) {
        self.narrating = false;
        self.subtitle = None;
    }

    /// Text to display right now
    pub fn display_text(&self) -> &str {
        match (&self.subtitle, self.narrating) {
            (Some(subtitle), true) => subtitle,
            _ => &self.affirmation,
        }
    }

    /// Terminal state; narration flags are cleared
    pub fn finish(&mut self, completed: bool) {
        self.phase = MeditationPhase::Done;
        if completed {
            self.progress = MeditationPhase::Done.start_progress();
        }
        self.finish_narration();
        self.paused = false;
    }
}

impl Default for MeditationSession {
    fn default() -> Self {
        Self::new(String::new(), 1.0, 0.5)
    }
}

/// Thread-safe shared session state
#[derive(Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<MeditationSession>>,
}

impl SharedSession {
    pub fn new(session: MeditationSession) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, MeditationSession> {
        self.inner.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, MeditationSession> {
        self.inner.write()
    }

    /// Copy of the current state (no lock held after return)
    pub fn snapshot(&self) -> MeditationSession {
        self.inner.read().clone()
    }

    pub fn phase(&self) -> MeditationPhase {
        self.inner.read().phase
    }

    pub fn progress(&self) -> f32 {
        self.inner.read().progress
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().paused
    }

    pub fn is_narrating(&self) -> bool {
        self.inner.read().narrating
    }
}

/// Notifications emitted by the sequencer
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    PhaseChanged(MeditationPhase),
    Progress { phase: MeditationPhase, value: f32 },
    NarrationStarted,
    NarrationFinished,
    Paused,
    Resumed,
    /// Audio start was refused until a user interaction
    AudioBlocked,
    AudioUnblocked,
    /// Terminal; emitted exactly once
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotone_and_clamped() {
        let mut session = MeditationSession::default();
        session.enter_phase(MeditationPhase::Meditation);
        assert_eq!(session.progress, 20.0);

        assert!(session.advance_progress(50.0));
        assert!(!session.advance_progress(40.0));
        assert_eq!(session.progress, 50.0);

        assert!(session.advance_progress(150.0));
        assert_eq!(session.progress, 90.0);
    }

    #[test]
    fn test_subtitle_only_while_narrating() {
        let mut session = MeditationSession::new("I am calm", 1.0, 0.5);
        assert_eq!(session.display_text(), "I am calm");

        session.start_narration("Your analysis");
        assert!(session.narrating);
        assert_eq!(session.display_text(), "Your analysis");

        session.finish_narration();
        assert_eq!(session.subtitle, None);
        assert_eq!(session.display_text(), "I am calm");
    }

    #[test]
    fn test_finish_clears_narration() {
        let mut session = MeditationSession::default();
        session.enter_phase(MeditationPhase::Meditation);
        session.start_narration("text");
        session.advance_progress(42.0);

        session.finish(false);
        assert_eq!(session.phase, MeditationPhase::Done);
        assert_eq!(session.progress, 42.0);
        assert!(!session.narrating);

        session.finish(true);
        assert_eq!(session.progress, 100.0);
    }

    #[test]
    fn test_shared_session_snapshot() {
        let shared = SharedSession::new(MeditationSession::default());
        shared.write().enter_phase(MeditationPhase::Conclusion);
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.phase, MeditationPhase::Conclusion);
        assert_eq!(shared.progress(), 90.0);
    }
}
