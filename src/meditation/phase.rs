use std::time::Duration;

/// Phase of a meditation session
///
/// Phases only move forward: breathing, meditation, conclusion, done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MeditationPhase {
    /// Guided breathing while the music starts
    #[default]
    Breathing,
    /// Narrated analysis over ducked music
    Meditation,
    /// Affirmation while the music fades
    Conclusion,
    /// Session finished or closed
    Done,
}

impl MeditationPhase {
    /// Progress range covered by this phase, in percent
    pub fn progress_range(&self) -> (f32, f32) {
        match self {
            MeditationPhase::Breathing => (0.0, 20.0),
            MeditationPhase::Meditation => (20.0, 90.0),
            MeditationPhase::Conclusion => (90.0, 100.0),
            MeditationPhase::Done => (100.0, 100.0),
        }
    }

    pub fn start_progress(&self) -> f32 {
        self.progress_range().0
    }

    pub fn end_progress(&self) -> f32 {
        self.progress_range().1
    }

    /// Progress after `elapsed` of a phase lasting `duration`
    pub fn progress_at(&self, elapsed: Duration, duration: Duration) -> f32 {
        let (start, end) = self.progress_range();
        let ratio = if duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0) as f32
        };
        start + ratio * (end - start)
    }

    pub fn next(&self) -> MeditationPhase {
        match self {
            MeditationPhase::Breathing => MeditationPhase::Meditation,
            MeditationPhase::Meditation => MeditationPhase::Conclusion,
            MeditationPhase::Conclusion | MeditationPhase::Done => MeditationPhase::Done,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, MeditationPhase::Done)
    }

    /// Heading shown for the phase
    pub fn headline(&self) -> &'static str {
        match self {
            MeditationPhase::Breathing => "Breathe in slowly... and let go",
            MeditationPhase::Meditation => "Listen to your inner self",
            MeditationPhase::Conclusion => "Carry this intention with you",
            MeditationPhase::Done => "Session complete",
        }
    }
}

impl std::fmt::Display for MeditationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeditationPhase::Breathing => write!(f, "Breathing"),
            MeditationPhase::Meditation => write!(f, "Meditation"),
            MeditationPhase::Conclusion => write!(f, "Conclusion"),
            MeditationPhase::Done => write!(f, "Done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut phase = MeditationPhase::default();
        let mut seen = vec![phase];
        while !phase.is_done() {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                MeditationPhase::Breathing,
                MeditationPhase::Meditation,
                MeditationPhase::Conclusion,
                MeditationPhase::Done,
            ]
        );
        assert_eq!(MeditationPhase::Done.next(), MeditationPhase::Done);
    }

    #[test]
    fn test_progress_interpolation() {
        let phase = MeditationPhase::Meditation;
        let duration = Duration::from_secs(10);
        assert_eq!(phase.progress_at(Duration::ZERO, duration), 20.0);
        assert!((phase.progress_at(Duration::from_secs(5), duration) - 55.0).abs() < 1e-4);
        assert_eq!(phase.progress_at(Duration::from_secs(30), duration), 90.0);
    }

    #[test]
    fn test_zero_duration_is_complete() {
        assert_eq!(
            MeditationPhase::Breathing.progress_at(Duration::ZERO, Duration::ZERO),
            20.0
        );
    }
}
