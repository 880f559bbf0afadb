use std::time::Duration;
use tokio::time::Instant;

/// Pause-aware stopwatch for one phase
///
/// Elapsed time stops accruing while paused, so progress derived from it
/// freezes and resumes from the same value.
#[derive(Clone, Copy, Debug)]
pub struct PhaseClock {
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PhaseClock {
    /// Start a clock at `now`, already paused if `paused`
    pub fn start(now: Instant, paused: bool) -> Self {
        Self {
            started: now,
            paused_at: paused.then_some(now),
            paused_total: Duration::ZERO,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(at);
        }
    }

    /// Un-paused time since the clock started
    pub fn elapsed(&self, now: Instant) -> Duration {
        let end = self.paused_at.unwrap_or(now);
        end.saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_excludes_pauses() {
        let t0 = Instant::now();
        let mut clock = PhaseClock::start(t0, false);
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(3)), Duration::from_secs(3));

        clock.pause(t0 + Duration::from_secs(3));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(8)), Duration::from_secs(3));

        clock.resume(t0 + Duration::from_secs(8));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(10)), Duration::from_secs(5));
    }

    #[test]
    fn test_repeated_pause_keeps_first_instant() {
        let t0 = Instant::now();
        let mut clock = PhaseClock::start(t0, false);
        clock.pause(t0 + Duration::from_secs(1));
        clock.pause(t0 + Duration::from_secs(2));
        clock.resume(t0 + Duration::from_secs(4));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(4)), Duration::from_secs(1));
        clock.resume(t0 + Duration::from_secs(5));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(5)), Duration::from_secs(2));
    }

    #[test]
    fn test_started_paused() {
        let t0 = Instant::now();
        let mut clock = PhaseClock::start(t0, true);
        assert!(clock.is_paused());
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(2)), Duration::ZERO);
        clock.resume(t0 + Duration::from_secs(2));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(3)), Duration::from_secs(1));
    }
}
