//! Trailing-edge debouncer with injected time.
//!
//! Every `submit` overwrites the pending value and restarts the window. The
//! value becomes due once the window has passed without another submit.
//! The debouncer never sleeps or performs I/O; the owner polls [`Debouncer::due`]
//! and sleeps until [`Debouncer::next_deadline`].

#![allow(missing_docs)]

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<Pending<T>>,
}

#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

impl<T> Debouncer<T> {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Replace the pending value and restart the quiet window at `now`.
    pub fn submit(&mut self, value: T, now: Instant) {
        self.pending = Some(Pending {
            value,
            deadline: now + self.window,
        });
    }

    /// Take the pending value if its window has elapsed by `now`.
    pub fn due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(p) if p.deadline <= now => self.pending.take().map(|p| p.value),
            _ => None,
        }
    }

    /// Take the pending value immediately, cancelling the timer.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn pending_value(&self) -> Option<&T> {
        self.pending.as_ref().map(|p| &p.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_millis(300);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn nothing_pending_means_no_write() {
        let mut d: Debouncer<i64> = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        assert_eq!(d.due(t0 + ms(10_000)), None);
        assert_eq!(d.flush(), None);
        assert_eq!(d.next_deadline(), None);
    }

    #[test]
    fn value_is_due_only_after_window() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.submit(40, t0);
        assert_eq!(d.due(t0 + ms(299)), None);
        assert_eq!(d.next_deadline(), Some(t0 + WINDOW));
        assert_eq!(d.due(t0 + WINDOW), Some(40));
        assert!(!d.is_pending());
        assert_eq!(d.due(t0 + ms(5_000)), None);
    }

    #[test]
    fn each_submit_restarts_window() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.submit(1, t0);
        d.submit(2, t0 + ms(200));
        assert_eq!(d.due(t0 + ms(350)), None);
        assert_eq!(d.pending_value(), Some(&2));
        assert_eq!(d.due(t0 + ms(500)), Some(2));
    }

    #[test]
    fn flush_writes_latest_and_cancels_timer() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.submit(7, t0);
        assert_eq!(d.flush(), Some(7));
        assert_eq!(d.next_deadline(), None);
        assert_eq!(d.due(t0 + ms(10_000)), None);
        assert_eq!(d.flush(), None);
    }

    #[test]
    fn submit_after_flush_writes_only_the_new_value() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.submit(30, t0);
        d.submit(35, t0 + ms(50));
        assert_eq!(d.flush(), Some(35));

        d.submit(80, t0 + ms(100));
        assert_eq!(d.pending_value(), Some(&80));
        // The flushed value's old deadline must not fire the new one early.
        assert_eq!(d.due(t0 + ms(350)), None);
        assert_eq!(d.due(t0 + ms(400)), Some(80));

        for later in [500, 1_000, 10_000] {
            assert_eq!(d.due(t0 + ms(later)), None);
        }
        assert_eq!(d.flush(), None);
    }

    proptest! {
        #[test]
        fn burst_then_silence_yields_one_write_of_last_value(
            values in proptest::collection::vec(0i64..=100, 1..40),
            gaps in proptest::collection::vec(0u64..300, 40),
        ) {
            let mut d = Debouncer::new(WINDOW);
            let mut now = Instant::now();
            let mut writes = Vec::new();
            for (value, gap) in values.iter().zip(gaps.iter()) {
                now += ms(*gap);
                if let Some(v) = d.due(now) {
                    writes.push(v);
                }
                d.submit(*value, now);
            }
            // Gaps are shorter than the window, so nothing fired mid-burst.
            prop_assert!(writes.is_empty());

            for step in 1..=10 {
                if let Some(v) = d.due(now + ms(step * 100)) {
                    writes.push(v);
                }
            }
            prop_assert_eq!(writes, vec![*values.last().unwrap_or(&0)]);
        }
    }
}
