//! Background acquisition loop.
//!
//! One reader thread per streaming session: receive a transaction, decode
//! it, hand each sample to the streamer sink and the capture buffer. The
//! loop only ever exits when the session clears the keep-alive flag; short
//! reads and socket timeouts are logged and skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::buffer::SampleBuffer;
use crate::clock;
use crate::frame::{self, TRANSACTION_SIZE};
use crate::socket::BoardSocket;
use crate::streamer::Streamer;

/// One-shot gate signalling the first received data transaction.
pub(crate) struct SyncGate {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl SyncGate {
    pub(crate) fn new() -> Self {
        SyncGate {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Mark the gate open and wake the start-stream waiter.
    pub(crate) fn open(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        drop(ready);
        self.cv.notify_one();
    }

    /// Wait until the gate opens or `timeout` elapses; true when open.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut ready = self.ready.lock();
        while !*ready {
            if self.cv.wait_until(&mut ready, deadline).timed_out() {
                break;
            }
        }
        *ready
    }

    /// Re-arm for the next streaming run.
    pub(crate) fn reset(&self) {
        *self.ready.lock() = false;
    }
}

/// Atomic counters kept by the acquisition loop.
#[derive(Default)]
pub(crate) struct ReaderStats {
    transactions: AtomicU64,
    samples: AtomicU64,
    short_reads: AtomicU64,
}

impl ReaderStats {
    pub(crate) fn snapshot(&self) -> AcquisitionStats {
        AcquisitionStats {
            transactions: self.transactions.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the acquisition counters since the session was created.
#[derive(Debug, Default, Clone)]
pub struct AcquisitionStats {
    /// Full transactions decoded.
    pub transactions: u64,
    /// Samples dispatched downstream.
    pub samples: u64,
    /// Receives that were not a full transaction (timeouts included).
    pub short_reads: u64,
}

/// State shared between the session and its acquisition thread.
pub(crate) struct ReaderShared {
    pub(crate) keep_alive: AtomicBool,
    pub(crate) gate: SyncGate,
    pub(crate) stats: ReaderStats,
}

impl ReaderShared {
    pub(crate) fn new() -> Self {
        ReaderShared {
            keep_alive: AtomicBool::new(false),
            gate: SyncGate::new(),
            stats: ReaderStats::default(),
        }
    }
}

/// Receive → decode → dispatch until `keep_alive` is cleared.
pub(crate) fn run(
    shared: Arc<ReaderShared>,
    socket: BoardSocket,
    buffer: Arc<SampleBuffer>,
    mut streamer: Box<dyn Streamer>,
    time_delay: f64,
) {
    let mut b = [0u8; TRANSACTION_SIZE];
    let mut synced = false;

    while shared.keep_alive.load(Ordering::SeqCst) {
        let res = socket.recv(&mut b);
        let recv_time = clock::now_seconds() - time_delay;
        match res {
            Ok(TRANSACTION_SIZE) => {
                if !synced {
                    synced = true;
                    info!("received first transaction, stream is live");
                    shared.gate.open();
                }
                frame::decode_transaction(&b, recv_time, |timestamp, channels| {
                    streamer.stream_data(channels, timestamp);
                    buffer.add(timestamp, channels);
                });
                shared.stats.transactions.fetch_add(1, Ordering::Relaxed);
                shared
                    .stats
                    .samples
                    .fetch_add(frame::NUM_PACKAGES as u64, Ordering::Relaxed);
            }
            Ok(n) => {
                shared.stats.short_reads.fetch_add(1, Ordering::Relaxed);
                trace!(read = n, expected = TRANSACTION_SIZE, "short read");
                if n > 0 {
                    // most likely an ASCII diagnostic from the device
                    warn!(
                        message = %String::from_utf8_lossy(&b[..n]),
                        "received text while streaming"
                    );
                }
            }
            Err(e) => {
                shared.stats.short_reads.fetch_add(1, Ordering::Relaxed);
                trace!(error = %e, "receive failed");
            }
        }
    }
    debug!("acquisition loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn gate_opened_before_wait_returns_immediately() {
        let gate = SyncGate::new();
        gate.open();
        assert!(gate.wait(Duration::from_millis(1)));
    }

    #[test]
    fn gate_wait_times_out_when_never_opened() {
        let gate = SyncGate::new();
        let started = Instant::now();
        assert!(!gate.wait(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn gate_wakes_a_parked_waiter() {
        let gate = Arc::new(SyncGate::new());
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.wait(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        gate.open();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn gate_reset_rearms() {
        let gate = SyncGate::new();
        gate.open();
        gate.reset();
        assert!(!gate.wait(Duration::from_millis(10)));
    }
}
