// crates/client/src/progress.rs
//! Transfer progress tracking

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Snapshot of one transfer's progress
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Total bytes expected (if known)
    pub expected_bytes: Option<u64>,
    /// Bytes transferred so far
    pub transferred_bytes: u64,
    /// Transfer speed in bytes per second
    pub bytes_per_second: f64,
    /// Start time of the current attempt
    started_at: Instant,
}

impl TransferProgress {
    /// Creates a new progress value
    pub fn new(expected_bytes: Option<u64>) -> Self {
        Self {
            expected_bytes,
            transferred_bytes: 0,
            bytes_per_second: 0.0,
            started_at: Instant::now(),
        }
    }

    /// Records additional transferred bytes
    ///
    /// The transferred count never exceeds `expected_bytes` when the total
    /// is known, so callbacks always observe `0 <= sent <= expected`.
    fn advance(&mut self, additional_bytes: u64) {
        self.transferred_bytes += additional_bytes;
        if let Some(total) = self.expected_bytes {
            self.transferred_bytes = self.transferred_bytes.min(total);
        }

        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.bytes_per_second = self.transferred_bytes as f64 / elapsed;
        }
    }

    /// Returns progress as a fraction in `0.0..=1.0`
    ///
    /// Returns 0.0 while the total is unknown.
    pub fn fraction(&self) -> f32 {
        match self.expected_bytes {
            Some(0) => 1.0,
            Some(total) => (self.transferred_bytes as f64 / total as f64).min(1.0) as f32,
            None => 0.0,
        }
    }

    /// Returns progress as an integer percentage `0..=100`
    pub fn percentage(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }

    /// Estimated time remaining, when the total and rate are known
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let total = self.expected_bytes?;
        if self.bytes_per_second <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.transferred_bytes);
        Some(Duration::from_secs_f64(remaining as f64 / self.bytes_per_second))
    }

    /// Returns true if the transfer is complete
    pub fn is_complete(&self) -> bool {
        match self.expected_bytes {
            Some(total) => self.transferred_bytes >= total,
            None => false,
        }
    }
}

/// Callback invoked with a fresh snapshot on every progress tick
pub type ProgressHandler = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Thread-safe progress tracker shared between an operation and its
/// transport stream
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<TransferProgress>>,
}

impl ProgressTracker {
    /// Creates a new tracker
    pub fn new(expected_bytes: Option<u64>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TransferProgress::new(expected_bytes))),
        }
    }

    /// Records transferred bytes and returns the updated snapshot
    pub fn advance(&self, bytes: u64) -> TransferProgress {
        let mut progress = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        progress.advance(bytes);
        progress.clone()
    }

    /// Restarts counting from zero with a new expected total
    ///
    /// Used when a transfer attempt starts over from the beginning.
    pub fn restart(&self, expected_bytes: Option<u64>) {
        let mut progress = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *progress = TransferProgress::new(expected_bytes);
    }

    /// Continues counting from an earlier position
    ///
    /// Used when a download resumes from a byte offset after a pause.
    pub fn resume_at(&self, transferred_bytes: u64, expected_bytes: Option<u64>) {
        let mut progress = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *progress = TransferProgress::new(expected_bytes);
        progress.transferred_bytes = transferred_bytes;
    }

    /// Gets the current snapshot
    pub fn snapshot(&self) -> TransferProgress {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Gets the current integer percentage
    pub fn percentage(&self) -> u8 {
        self.snapshot().percentage()
    }

    /// Checks if the transfer is complete
    pub fn is_complete(&self) -> bool {
        self.snapshot().is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_new() {
        let progress = TransferProgress::new(Some(1000));
        assert_eq!(progress.expected_bytes, Some(1000));
        assert_eq!(progress.transferred_bytes, 0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_progress_advance_and_percentage() {
        let tracker = ProgressTracker::new(Some(1000));

        let snap = tracker.advance(250);
        assert_eq!(snap.transferred_bytes, 250);
        assert_eq!(snap.percentage(), 25);

        let snap = tracker.advance(250);
        assert_eq!(snap.percentage(), 50);

        let snap = tracker.advance(500);
        assert_eq!(snap.percentage(), 100);
        assert!(snap.is_complete());
    }

    #[test]
    fn test_progress_clamped_to_expected() {
        let tracker = ProgressTracker::new(Some(100));
        let snap = tracker.advance(250);

        assert_eq!(snap.transferred_bytes, 100);
        assert_eq!(snap.percentage(), 100);
    }

    #[test]
    fn test_progress_monotonic() {
        let tracker = ProgressTracker::new(Some(1000));

        let mut last = 0;
        for _ in 0..10 {
            let snap = tracker.advance(100);
            assert!(snap.transferred_bytes >= last);
            assert!(snap.transferred_bytes <= 1000);
            last = snap.transferred_bytes;
        }
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_progress_unknown_size() {
        let tracker = ProgressTracker::new(None);
        let snap = tracker.advance(1000);

        assert_eq!(snap.fraction(), 0.0);
        assert_eq!(snap.percentage(), 0);
        assert!(!snap.is_complete());
    }

    #[test]
    fn test_progress_zero_total() {
        let progress = TransferProgress::new(Some(0));
        assert_eq!(progress.percentage(), 100);
    }

    #[test]
    fn test_restart_resets_count() {
        let tracker = ProgressTracker::new(Some(1000));
        tracker.advance(600);

        tracker.restart(Some(500));
        let snap = tracker.snapshot();
        assert_eq!(snap.transferred_bytes, 0);
        assert_eq!(snap.expected_bytes, Some(500));
    }

    #[test]
    fn test_resume_continues_from_offset() {
        let tracker = ProgressTracker::new(None);
        tracker.resume_at(400, Some(1000));

        let snap = tracker.advance(100);
        assert_eq!(snap.transferred_bytes, 500);
        assert_eq!(snap.percentage(), 50);
    }

    #[test]
    fn test_speed_calculation() {
        let tracker = ProgressTracker::new(Some(1000));
        std::thread::sleep(Duration::from_millis(10));
        let snap = tracker.advance(1000);

        assert!(snap.bytes_per_second > 0.0);
        assert!(snap.estimated_remaining().is_some());
    }
}
