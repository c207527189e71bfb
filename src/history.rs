//! Rolling history buffers for graphing.
//!
//! `HistoryBuffer<T>` is a fixed-capacity circular buffer that evicts the
//! oldest sample once full. `MetricHistory<T>` wraps one behind its own lock
//! with a pause flag and the authoritative current value of the metric.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// Default number of samples kept per metric.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A circular buffer for storing samples with fixed capacity.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    entries: Vec<T>,
    capacity: usize,
    write_index: usize,
}

impl<T: Copy> HistoryBuffer<T> {
    /// Creates a new buffer with the specified capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            write_index: 0,
        }
    }

    /// Pushes a new sample. If the buffer is full, the oldest is overwritten.
    pub fn push(&mut self, value: T) {
        if self.entries.len() < self.capacity {
            self.entries.push(value);
        } else {
            self.entries[self.write_index] = value;
        }
        self.write_index = (self.write_index + 1) % self.capacity;
    }

    /// Returns all samples in chronological order (oldest to newest).
    pub fn to_vec(&self) -> Vec<T> {
        if self.entries.len() < self.capacity {
            return self.entries.clone();
        }
        // Full: oldest sample sits at write_index
        let mut result = Vec::with_capacity(self.capacity);
        result.extend_from_slice(&self.entries[self.write_index..]);
        result.extend_from_slice(&self.entries[..self.write_index]);
        result
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<T> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = (self.write_index + self.capacity - 1) % self.capacity;
        self.entries.get(idx).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.write_index = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An `f32` stored as its bit pattern for lock-free current values.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// History of one metric with pause control.
///
/// Pausing only stops samples being appended; the current value keeps
/// updating. The lock is held only to push or to copy out a snapshot.
#[derive(Debug)]
pub struct MetricHistory<T> {
    buffer: Mutex<HistoryBuffer<T>>,
    paused: AtomicBool,
}

impl<T: Copy> MetricHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(HistoryBuffer::new(capacity)),
            paused: AtomicBool::new(false),
        }
    }

    /// Appends unless paused. Returns whether the sample was recorded.
    pub fn record(&self, value: T) -> bool {
        if self.is_paused() {
            return false;
        }
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(value);
        true
    }

    /// Copies the samples out under the lock; callers render from the copy.
    pub fn snapshot(&self) -> Vec<T> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}
