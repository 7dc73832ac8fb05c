//! # Telemetry Buffer
//!
//! Fixed-capacity rolling window of telemetry samples.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::protocol::types::TelemetrySample;

/// Default window size: one hour at the firmware's one-second report rate
pub const DEFAULT_CAPACITY: usize = 3600;

/// Rolling telemetry window shared between the ingest loop and readers
///
/// Appends evict the oldest sample once `capacity` is reached. The lock is
/// held only for a push or for copying a snapshot.
#[derive(Debug)]
pub struct TelemetryBuffer {
    samples: Mutex<VecDeque<TelemetrySample>>,
    capacity: usize,
    appended: watch::Sender<u64>,
}

impl TelemetryBuffer {
    /// Create an empty window
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (appended, _) = watch::channel(0);

        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            appended,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TelemetrySample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample, evicting the oldest one if the window is full
    pub fn append(&self, sample: TelemetrySample) {
        {
            let mut samples = self.lock();
            if samples.len() >= self.capacity {
                samples.pop_front();
            }
            samples.push_back(sample);
        }

        self.appended.send_modify(|count| *count += 1);
    }

    /// Point-in-time copy of the window, oldest first
    pub fn snapshot(&self) -> Vec<TelemetrySample> {
        self.lock().iter().cloned().collect()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<TelemetrySample> {
        self.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Watch the running count of appended samples
    ///
    /// The receiver sees a change after every append; the value is the total
    /// appended since creation, evicted samples included.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.appended.subscribe()
    }
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn sample_at(second: i64) -> TelemetrySample {
        TelemetrySample {
            received_at: Utc.timestamp_opt(second, 0).unwrap(),
            air_temp: second as f64,
            bed_temp: 0.0,
            humidity: 0.0,
            status: String::new(),
            preset: String::new(),
        }
    }

    fn seconds(samples: &[TelemetrySample]) -> Vec<i64> {
        samples.iter().map(|s| s.received_at.timestamp()).collect()
    }

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer = TelemetryBuffer::new(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 3);
        assert!(buffer.latest().is_none());
        assert!(buffer.snapshot().is_empty());
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(TelemetryBuffer::default().capacity(), 3600);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let buffer = TelemetryBuffer::new(0);
        buffer.append(sample_at(1));
        buffer.append(sample_at(2));
        assert_eq!(seconds(&buffer.snapshot()), vec![2]);
    }

    #[test]
    fn test_append_evicts_oldest() {
        let buffer = TelemetryBuffer::new(3);
        for t in 1..=3 {
            buffer.append(sample_at(t));
        }
        assert_eq!(seconds(&buffer.snapshot()), vec![1, 2, 3]);

        buffer.append(sample_at(4));
        assert_eq!(seconds(&buffer.snapshot()), vec![2, 3, 4]);
        assert_eq!(buffer.latest().unwrap().received_at.timestamp(), 4);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let buffer = TelemetryBuffer::new(7);
        for t in 0..100 {
            buffer.append(sample_at(t));
            assert!(buffer.len() <= 7);

            let window = seconds(&buffer.snapshot());
            let oldest = (t - 6).max(0);
            assert_eq!(window, (oldest..=t).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let buffer = TelemetryBuffer::new(2);
        buffer.append(sample_at(1));

        let snapshot = buffer.snapshot();
        buffer.append(sample_at(2));
        buffer.append(sample_at(3));

        assert_eq!(seconds(&snapshot), vec![1]);
        assert_eq!(seconds(&buffer.snapshot()), vec![2, 3]);
    }

    #[test]
    fn test_subscribe_counts_appends() {
        let buffer = TelemetryBuffer::new(2);
        let mut rx = buffer.subscribe();
        assert_eq!(*rx.borrow_and_update(), 0);

        for t in 0..5 {
            buffer.append(sample_at(t));
        }

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 5);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_concurrent_readers_see_ordered_windows() {
        let buffer = Arc::new(TelemetryBuffer::new(50));

        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for t in 0..2000 {
                    buffer.append(sample_at(t));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let window = seconds(&buffer.snapshot());
                        assert!(window.len() <= 50);
                        assert!(window.windows(2).all(|pair| pair[1] == pair[0] + 1));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(seconds(&buffer.snapshot()), (1950..2000).collect::<Vec<_>>());
    }
}
