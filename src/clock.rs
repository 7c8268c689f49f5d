use std::time::Instant;

/// Elapsed seconds since the last (re)start, frozen while stopped.
///
/// The clock never reads the wall clock itself; every call takes the frame
/// timestamp the scheduler handed out, which keeps frames reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    started_at: Option<Instant>,
    frozen: f32,
    running: bool,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from zero at `now`.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.frozen = 0.0;
        self.running = true;
    }

    /// Freeze the elapsed time at its value at `now`.
    pub fn stop(&mut self, now: Instant) {
        if self.running {
            self.frozen = self.elapsed(now);
            self.running = false;
        }
    }

    /// Zero the elapsed time without changing whether the clock runs.
    pub fn reset(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.frozen = 0.0;
    }

    /// Seconds elapsed at `now`.
    pub fn elapsed(&self, now: Instant) -> f32 {
        match (self.running, self.started_at) {
            (true, Some(start)) => now.saturating_duration_since(start).as_secs_f32(),
            _ => self.frozen,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn counts_from_start() {
        let t0 = Instant::now();
        let mut clock = Clock::new();
        clock.start(t0);

        assert_eq!(clock.elapsed(t0), 0.0);
        assert!((clock.elapsed(t0 + Duration::from_millis(1500)) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn stop_freezes_and_start_restarts_from_zero() {
        let t0 = Instant::now();
        let mut clock = Clock::new();
        clock.start(t0);
        clock.stop(t0 + Duration::from_secs(2));

        assert!(!clock.is_running());
        assert!((clock.elapsed(t0 + Duration::from_secs(10)) - 2.0).abs() < 1e-6);

        clock.start(t0 + Duration::from_secs(10));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(10)), 0.0);
    }

    #[test]
    fn reset_zeroes_a_running_clock() {
        let t0 = Instant::now();
        let mut clock = Clock::new();
        clock.start(t0);
        clock.reset(t0 + Duration::from_secs(3));

        assert!(clock.is_running());
        assert!((clock.elapsed(t0 + Duration::from_secs(4)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn never_started_reads_zero() {
        assert_eq!(Clock::new().elapsed(Instant::now()), 0.0);
    }
}
