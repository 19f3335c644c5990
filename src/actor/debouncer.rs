use std::time::{Duration, Instant};

/// Sleep used while nothing is armed.
const IDLE: Duration = Duration::from_secs(86400);

/// Single delayed fire, pushed back by every new edit.
///
/// Pure timing: the queue itself is owned elsewhere, the debouncer only
/// knows when the last edit arrived.
pub(super) struct Debouncer {
    quiet: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_event: None,
        }
    }

    /// Applies from the next `arm`.
    pub(super) fn set_quiet(&mut self, quiet: Duration) {
        self.quiet = quiet;
    }

    /// Cancel any pending fire and restart the quiet period.
    pub(super) fn arm(&mut self) {
        self.last_event = Some(Instant::now());
    }

    pub(super) fn disarm(&mut self) {
        self.last_event = None;
    }

    pub(super) fn is_armed(&self) -> bool {
        self.last_event.is_some()
    }

    pub(super) fn is_ready(&self) -> bool {
        self.last_event
            .is_some_and(|last_event| last_event.elapsed() >= self.quiet)
    }

    /// Consume the pending fire if the quiet period elapsed.
    pub(super) fn take_if_ready(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.last_event = None;
        true
    }

    /// Precise sleep duration until next possible ready time.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return IDLE;
        };
        self.quiet
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_debouncer_never_fires() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        assert!(!debouncer.is_armed());
        assert!(!debouncer.take_if_ready());
        assert_eq!(debouncer.sleep_duration(), IDLE);
    }

    #[test]
    fn test_fires_once_after_quiet_period() {
        let mut debouncer = Debouncer::new(Duration::from_millis(5));
        debouncer.arm();
        assert!(!debouncer.is_ready());
        assert!(debouncer.sleep_duration() <= Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(10));
        assert!(debouncer.take_if_ready());
        assert!(!debouncer.take_if_ready());
    }

    #[test]
    fn test_rearm_pushes_deadline_back() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        debouncer.arm();
        std::thread::sleep(Duration::from_millis(120));
        debouncer.arm();
        std::thread::sleep(Duration::from_millis(120));
        // 240ms since first arm, only 120ms since the last one
        assert!(!debouncer.is_ready());

        debouncer.disarm();
        assert!(!debouncer.is_armed());
    }

    #[test]
    fn test_zero_quiet_still_sleeps() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        debouncer.arm();
        assert_eq!(debouncer.sleep_duration(), Duration::from_millis(1));
        assert!(debouncer.take_if_ready());
    }
}
