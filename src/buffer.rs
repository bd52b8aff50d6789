//! Fixed-capacity circular buffer of timestamped sample rows.
//!
//! One writer (the acquisition thread) and occasional foreground readers
//! share the buffer; every operation is a single short critical section of
//! index arithmetic plus an O(chunk) copy. When full, the oldest sample is
//! silently overwritten — the device is real-time, the host-side consumer is
//! best-effort, and overflow is not an error.

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Upper bound on capture buffer capacity: one day of samples at 250 Hz.
pub const MAX_CAPTURE_SAMPLES: usize = 86_400 * 250;

struct Inner {
    timestamps: Vec<f64>,
    data: Vec<f64>,
    first_used: usize,
    first_free: usize,
    count: usize,
}

/// Bounded FIFO of `(timestamp, [f64; num_channels])` samples.
pub struct SampleBuffer {
    num_channels: usize,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl SampleBuffer {
    /// Allocate a buffer for `capacity` samples of `num_channels` each.
    ///
    /// `capacity` must be in `1..=MAX_CAPTURE_SAMPLES`.
    pub fn new(num_channels: usize, capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CAPTURE_SAMPLES {
            return Err(Error::InvalidBufferSize(capacity));
        }
        Ok(Self {
            num_channels,
            capacity,
            inner: Mutex::new(Inner {
                timestamps: vec![0.0; capacity],
                data: vec![0.0; capacity * num_channels],
                first_used: 0,
                first_free: 0,
                count: 0,
            }),
        })
    }

    /// Append one sample row, overwriting the oldest when full.
    ///
    /// `values` must hold exactly `num_channels` entries.
    pub fn add(&self, timestamp: f64, values: &[f64]) {
        debug_assert_eq!(values.len(), self.num_channels);
        let mut inner = self.inner.lock();
        let at = inner.first_free;
        inner.timestamps[at] = timestamp;
        let base = at * self.num_channels;
        inner.data[base..base + self.num_channels].copy_from_slice(values);
        inner.first_free = (at + 1) % self.capacity;
        if inner.count == self.capacity {
            // writer wins: the oldest sample is gone
            inner.first_used = (inner.first_used + 1) % self.capacity;
        } else {
            inner.count += 1;
        }
    }

    /// Remove up to `max` oldest samples, copying them out in insertion
    /// order. Returns the number of samples copied.
    ///
    /// `ts_out` must hold at least `min(max, len)` entries and `data_out`
    /// `num_channels` times that.
    pub fn drain(&self, max: usize, ts_out: &mut [f64], data_out: &mut [f64]) -> usize {
        let mut inner = self.inner.lock();
        let take = max.min(inner.count);
        let start = inner.first_used;
        self.copy_range(&inner, start, take, ts_out, data_out);
        inner.first_used = (start + take) % self.capacity;
        inner.count -= take;
        take
    }

    /// Copy out the most recent up-to-`max` samples without removing them,
    /// oldest of the tail first. Returns the number of samples copied.
    pub fn tail(&self, max: usize, ts_out: &mut [f64], data_out: &mut [f64]) -> usize {
        let inner = self.inner.lock();
        let take = max.min(inner.count);
        let skip = inner.count - take;
        let start = (inner.first_used + skip) % self.capacity;
        self.copy_range(&inner, start, take, ts_out, data_out);
        take
    }

    fn copy_range(
        &self,
        inner: &Inner,
        start: usize,
        n: usize,
        ts_out: &mut [f64],
        data_out: &mut [f64],
    ) {
        debug_assert!(ts_out.len() >= n && data_out.len() >= n * self.num_channels);
        for i in 0..n {
            let at = (start + i) % self.capacity;
            ts_out[i] = inner.timestamps[at];
            let src = at * self.num_channels;
            let dst = i * self.num_channels;
            data_out[dst..dst + self.num_channels]
                .copy_from_slice(&inner.data[src..src + self.num_channels]);
        }
    }

    /// Number of samples currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    /// True when no samples are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Channels per sample row.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Maximum number of samples the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CH: usize = 2;

    fn push(buf: &SampleBuffer, n: u64, from: u64) {
        for i in from..from + n {
            buf.add(i as f64, &[i as f64, i as f64 + 0.5]);
        }
    }

    fn drained(buf: &SampleBuffer, max: usize) -> Vec<f64> {
        let mut ts = vec![0.0; max];
        let mut data = vec![0.0; max * CH];
        let n = buf.drain(max, &mut ts, &mut data);
        ts.truncate(n);
        ts
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            SampleBuffer::new(CH, 0),
            Err(Error::InvalidBufferSize(0))
        ));
    }

    #[test]
    fn rejects_oversized_capacity() {
        assert!(matches!(
            SampleBuffer::new(CH, MAX_CAPTURE_SAMPLES + 1),
            Err(Error::InvalidBufferSize(_))
        ));
    }

    #[test]
    fn len_tracks_min_of_pushed_and_capacity() {
        let buf = SampleBuffer::new(CH, 8).unwrap();
        push(&buf, 3, 0);
        assert_eq!(buf.len(), 3);
        push(&buf, 10, 3);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn drain_returns_oldest_first_and_consumes() {
        let buf = SampleBuffer::new(CH, 8).unwrap();
        push(&buf, 5, 0);
        let mut ts = [0.0; 3];
        let mut data = [0.0; 3 * CH];
        let n = buf.drain(3, &mut ts, &mut data);
        assert_eq!(n, 3);
        assert_eq!(ts, [0.0, 1.0, 2.0]);
        assert_eq!(data, [0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
        assert_eq!(buf.len(), 2);
        assert_eq!(drained(&buf, 8), vec![3.0, 4.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overwrite_keeps_the_most_recent_window() {
        // capacity 4, push samples 1..=10: only 7..10 survive
        let buf = SampleBuffer::new(CH, 4).unwrap();
        push(&buf, 10, 1);
        assert_eq!(buf.len(), 4);
        assert_eq!(drained(&buf, 10), vec![7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn tail_is_non_destructive_and_ordered() {
        let buf = SampleBuffer::new(CH, 8).unwrap();
        push(&buf, 6, 0);
        let mut ts = [0.0; 4];
        let mut data = [0.0; 4 * CH];
        let n = buf.tail(4, &mut ts, &mut data);
        assert_eq!(n, 4);
        assert_eq!(ts, [2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buf.len(), 6);
        // tail larger than len clamps
        let mut ts = [0.0; 8];
        let mut data = [0.0; 8 * CH];
        assert_eq!(buf.tail(8, &mut ts, &mut data), 6);
        assert_eq!(&ts[..6], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn tail_after_wraparound() {
        let buf = SampleBuffer::new(CH, 4).unwrap();
        push(&buf, 7, 0);
        let mut ts = [0.0; 2];
        let mut data = [0.0; 2 * CH];
        assert_eq!(buf.tail(2, &mut ts, &mut data), 2);
        assert_eq!(ts, [5.0, 6.0]);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn drain_of_empty_buffer_returns_zero() {
        let buf = SampleBuffer::new(CH, 4).unwrap();
        let mut ts = [0.0; 4];
        let mut data = [0.0; 4 * CH];
        assert_eq!(buf.drain(4, &mut ts, &mut data), 0);
        assert_eq!(buf.tail(4, &mut ts, &mut data), 0);
    }
}
