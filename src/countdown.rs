//! Periodic "time until sale opens" reporting.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::clock::Clock;

/// Render a millisecond duration as `HH:MM:SS`. Hours are not capped at 24.
pub fn format_countdown(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Remaining time until `release_at_ms`, or `None` once it has passed.
pub fn remaining_ms<C: Clock + ?Sized>(clock: &C, release_at_ms: u64) -> Option<u64> {
    let now = clock.now_ms();
    (now < release_at_ms).then(|| release_at_ms - now)
}

/// Owns the reporter task; dropping it stops the reporting.
pub struct CountdownHandle {
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct CountdownReporter;

impl CountdownReporter {
    /// Log the remaining time every `period`, starting immediately.
    /// The task ends on its own once the release time is reached.
    pub fn spawn<C>(clock: Arc<C>, release_at_ms: u64, period: Duration) -> CountdownHandle
    where
        C: Clock + ?Sized + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match remaining_ms(clock.as_ref(), release_at_ms) {
                    Some(ms) => info!(remaining = %format_countdown(ms), "Until sale opens"),
                    None => break,
                }
            }
        });
        CountdownHandle { task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    struct PausedClock {
        origin_ms: u64,
        started: Instant,
    }

    impl Clock for PausedClock {
        fn now_ms(&self) -> u64 {
            self.origin_ms + self.started.elapsed().as_millis() as u64
        }
    }

    /// Counts how often the reporter reads the time.
    struct CountingClock {
        inner: PausedClock,
        reads: AtomicUsize,
    }

    impl Clock for CountingClock {
        fn now_ms(&self) -> u64 {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.now_ms()
        }
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "00:00:00");
        assert_eq!(format_countdown(999), "00:00:00");
        assert_eq!(format_countdown(61_000), "00:01:01");
        assert_eq!(format_countdown(3_600_000 + 23 * 60_000 + 45_500), "01:23:45");
        assert_eq!(format_countdown(100 * 3_600_000), "100:00:00");
    }

    #[test]
    fn test_remaining_ms() {
        let clock = PausedClock {
            origin_ms: 5_000,
            started: Instant::now(),
        };
        assert_eq!(remaining_ms(&clock, 5_000), None);
        assert_eq!(remaining_ms(&clock, 4_000), None);
        assert!(remaining_ms(&clock, 8_000).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_ends_after_release() {
        let clock = Arc::new(PausedClock {
            origin_ms: 0,
            started: Instant::now(),
        });
        let handle = CountdownReporter::spawn(clock, 150_000, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(!handle.is_finished());

        tokio::time::sleep(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_immediately_then_every_period() {
        let clock = Arc::new(CountingClock {
            inner: PausedClock {
                origin_ms: 0,
                started: Instant::now(),
            },
            reads: AtomicUsize::new(0),
        });
        let handle =
            CountdownReporter::spawn(Arc::clone(&clock), 3_600_000, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(clock.reads.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(clock.reads.load(Ordering::SeqCst), 2);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_task() {
        let clock = Arc::new(PausedClock {
            origin_ms: 0,
            started: Instant::now(),
        });
        let handle = CountdownReporter::spawn(clock, u64::MAX, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();
    }
}
