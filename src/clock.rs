//! Host timestamps and device latency estimation.
//!
//! Decoded samples are tagged with wall-clock seconds. Before streaming
//! starts, the session measures the one-way path delay with a short probe
//! exchange and subtracts it from every receive timestamp so that sample
//! times approximate the instant the device finished assembling the
//! transaction.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frame::TRANSACTION_SIZE;
use crate::socket::BoardSocket;

/// Latency probe opcode; the device answers with one dummy transaction.
const PROBE_OPCODE: &[u8] = b"F4";
/// Probe exchanges per estimate.
const NUM_PROBES: usize = 5;
/// Probe failures tolerated before the estimate is abandoned.
const MAX_PROBE_FAILURES: usize = 1;

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn now_seconds() -> f64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(_) => 0.0,
    }
}

/// Mean of the probe round trips (milliseconds), halved, in seconds.
///
/// An empty set yields `0.0`.
fn half_round_trip_seconds(durations_ms: &[f64]) -> f64 {
    if durations_ms.is_empty() {
        return 0.0;
    }
    let mean = durations_ms.iter().sum::<f64>() / durations_ms.len() as f64;
    mean / 2000.0
}

/// Estimate the one-way delay to the device, in seconds.
///
/// Runs up to [`NUM_PROBES`] probe exchanges; a probe fails on a short send
/// or a reply that is not exactly one transaction. More than
/// [`MAX_PROBE_FAILURES`] failures aborts with `BoardNotReady`.
pub(crate) fn measure_time_delay(socket: &BoardSocket) -> Result<f64> {
    let mut durations_ms = Vec::with_capacity(NUM_PROBES);
    let mut failures = 0;
    let mut reply = [0u8; TRANSACTION_SIZE];

    for _ in 0..NUM_PROBES {
        let started = Instant::now();
        match socket.send(PROBE_OPCODE) {
            Ok(n) if n == PROBE_OPCODE.len() => {}
            res => {
                warn!(?res, "failed to send latency probe");
                failures += 1;
                continue;
            }
        }
        match socket.recv(&mut reply) {
            Ok(TRANSACTION_SIZE) => {}
            res => {
                warn!(?res, "latency probe reply was not a full transaction");
                failures += 1;
                continue;
            }
        }
        durations_ms.push(started.elapsed().as_secs_f64() * 1e3);
    }

    if failures > MAX_PROBE_FAILURES {
        warn!(failures, "too many latency probes lost");
        return Err(Error::BoardNotReady);
    }
    let delay = half_round_trip_seconds(&durations_ms);
    debug!(delay_seconds = delay, "estimated host-device delay");
    Ok(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::thread;

    #[test]
    fn half_round_trip_is_mean_over_two_thousand() {
        let durations = [4.0, 6.0, 8.0];
        assert!((half_round_trip_seconds(&durations) - 6.0 / 2000.0).abs() < 1e-12);
    }

    #[test]
    fn empty_probe_set_yields_zero() {
        assert_eq!(half_round_trip_seconds(&[]), 0.0);
    }

    /// Loopback device answering `NUM_PROBES` probes with `reply_len` bytes.
    fn probe_responder(reply_len: usize) -> (std::net::SocketAddr, thread::JoinHandle<()>) {
        let device = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = device.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 16];
            for _ in 0..NUM_PROBES {
                let (n, from) = device.recv_from(&mut buf).unwrap();
                assert_eq!(&buf[..n], PROBE_OPCODE);
                let _ = device.send_to(&vec![0u8; reply_len], from);
            }
        });
        (addr, handle)
    }

    #[test]
    fn measures_delay_against_a_responsive_device() {
        let (addr, handle) = probe_responder(TRANSACTION_SIZE);
        let socket = BoardSocket::open(addr).unwrap();
        let delay = measure_time_delay(&socket).unwrap();
        assert!(delay > 0.0);
        assert!(delay < 0.5, "loopback delay should be tiny, got {delay}");
        handle.join().unwrap();
    }

    #[test]
    fn short_replies_fail_the_estimate() {
        let (addr, handle) = probe_responder(10);
        let socket = BoardSocket::open(addr).unwrap();
        assert!(matches!(
            measure_time_delay(&socket),
            Err(Error::BoardNotReady)
        ));
        handle.join().unwrap();
    }
}
