//! In-flight request tracking for the network-idle navigation condition.

use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;

/// Counts requests that have started but not yet finished or failed.
///
/// The current count is published on a watch channel so waiters can react
/// to changes without polling.
pub struct InflightTracker {
    pending: HashSet<String>,
    count_tx: watch::Sender<usize>,
}

impl InflightTracker {
    pub fn new() -> (Self, watch::Receiver<usize>) {
        let (count_tx, count_rx) = watch::channel(0);
        (
            Self {
                pending: HashSet::new(),
                count_tx,
            },
            count_rx,
        )
    }

    /// Record a request start. Redirects reuse the id and are not double counted.
    pub fn started(&mut self, request_id: &str) {
        if self.pending.insert(request_id.to_string()) {
            self.publish();
        }
    }

    /// Record a request finishing (successfully or not).
    pub fn finished(&mut self, request_id: &str) {
        if self.pending.remove(request_id) {
            self.publish();
        }
    }

    pub fn inflight(&self) -> usize {
        self.pending.len()
    }

    fn publish(&self) {
        self.count_tx.send_replace(self.pending.len());
    }
}

/// Wait until at most `max_inflight` requests stay pending for `quiet`.
///
/// Returns early if the tracker is dropped (the page went away).
pub async fn wait_for_idle(
    mut inflight: watch::Receiver<usize>,
    max_inflight: usize,
    quiet: Duration,
) {
    loop {
        if inflight.wait_for(|n| *n <= max_inflight).await.is_err() {
            return;
        }
        let burst = tokio::time::timeout(quiet, inflight.wait_for(|n| *n > max_inflight))
            .await
            .map(|changed| changed.is_ok());
        match burst {
            // Quiet window elapsed without exceeding the limit.
            Err(_) => return,
            Ok(false) => return,
            Ok(true) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn test_tracker_counts() {
        let (mut tracker, rx) = InflightTracker::new();
        tracker.started("1");
        tracker.started("2");
        tracker.started("2");
        assert_eq!(tracker.inflight(), 2);
        assert_eq!(*rx.borrow(), 2);

        tracker.finished("1");
        tracker.finished("unknown");
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_immediately_when_quiet() {
        let (_tracker, rx) = InflightTracker::new();
        let start = Instant::now();
        wait_for_idle(rx, 0, Duration::from_millis(500)).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500) && waited < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_waits_for_burst_to_drain() {
        let (tracker, rx) = InflightTracker::new();
        let tracker = Arc::new(Mutex::new(tracker));

        let t = Arc::clone(&tracker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            for id in ["a", "b", "c"] {
                t.lock().await.started(id);
            }
            tokio::time::sleep(Duration::from_millis(1000)).await;
            t.lock().await.finished("a");
        });

        let start = Instant::now();
        wait_for_idle(rx, 2, Duration::from_millis(500)).await;
        // Burst at 200ms interrupts the first window; drains at 1200ms; quiet until 1700ms.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1700) && waited < Duration::from_millis(1800));
        assert_eq!(tracker.lock().await.inflight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_returns_when_tracker_dropped() {
        let (mut tracker, rx) = InflightTracker::new();
        tracker.started("a");
        drop(tracker);
        wait_for_idle(rx, 0, Duration::from_secs(60)).await;
    }
}
