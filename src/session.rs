//! Session lifecycle for one headset.
//!
//! A session walks the device through prepare → start → stop → release:
//! prepare opens the UDP endpoint and forces known settings, start estimates
//! the transport delay and spawns the acquisition thread, stop joins it and
//! flushes whatever the kernel still buffered, release tears everything
//! down. Control commands can be sent at any point in between; while
//! streaming they are fire-and-forget because ACK bytes would mingle with
//! the sample stream.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::buffer::SampleBuffer;
use crate::clock;
use crate::error::{Error, Result};
use crate::frame::{NUM_CHANNELS, TRANSACTION_SIZE};
use crate::reader::{self, AcquisitionStats, ReaderShared};
use crate::socket::{BoardSocket, DEFAULT_TIMEOUT};
use crate::streamer::Streamer;

/// Device address when it runs its own access point.
pub const DEFAULT_IP_ADDRESS: &str = "192.168.4.1";
/// Device control/data UDP port.
pub const DEFAULT_PORT: u16 = 2390;

/// Deadline for the first data transaction after start.
const SYNC_DEADLINE: Duration = Duration::from_secs(5);
/// Shortened receive timeout while draining the kernel queue at stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Retry limit for the ACK read and the stop drain.
const MAX_ATTEMPTS: usize = 25;
/// Largest control response we accept.
const MAX_RESPONSE_SIZE: usize = 8192;

/// Transport selector; the headset only speaks UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpProtocol {
    /// Datagram transport, the only one the device supports.
    #[default]
    Udp,
    /// Rejected at prepare.
    Tcp,
}

/// Connection parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device IP address; empty selects [`DEFAULT_IP_ADDRESS`].
    pub ip_address: String,
    /// Transport protocol; only UDP is accepted.
    pub protocol: IpProtocol,
    /// Device UDP port.
    pub port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ip_address: String::new(),
            protocol: IpProtocol::Udp,
            port: DEFAULT_PORT,
        }
    }
}

/// Acquisition session for one device.
pub struct Session {
    config: SessionConfig,
    socket: Option<BoardSocket>,
    initialized: bool,
    is_streaming: bool,
    time_delay: f64,
    shared: Arc<ReaderShared>,
    reader: Option<JoinHandle<()>>,
    buffer: Option<Arc<SampleBuffer>>,
}

impl Session {
    /// Create an unprepared session.
    pub fn new(config: SessionConfig) -> Self {
        Session {
            config,
            socket: None,
            initialized: false,
            is_streaming: false,
            time_delay: 0.0,
            shared: Arc::new(ReaderShared::new()),
            reader: None,
            buffer: None,
        }
    }

    /// Open the device endpoint and force known settings.
    ///
    /// Sends the restore-defaults and 250 Hz sample-rate commands and
    /// requires both to ACK; on failure the socket is torn down again.
    pub fn prepare(&mut self) -> Result<()> {
        if self.initialized {
            info!("session is already prepared");
            return Ok(());
        }
        if self.config.ip_address.is_empty() {
            info!(address = DEFAULT_IP_ADDRESS, "using default device address");
            self.config.ip_address = DEFAULT_IP_ADDRESS.to_string();
        }
        if self.config.protocol == IpProtocol::Tcp {
            return Err(Error::InvalidArguments(
                "the device speaks UDP only".to_string(),
            ));
        }
        let ip: IpAddr = self.config.ip_address.parse().map_err(|_| {
            Error::InvalidArguments(format!("bad ip address {:?}", self.config.ip_address))
        })?;
        let socket = BoardSocket::open(SocketAddr::new(ip, self.config.port))?;
        self.socket = Some(socket);

        // The device may come up with stale settings from a previous run.
        for cmd in ["d", "~6"] {
            if let Err(e) = self.configure(cmd) {
                error!(command = cmd, error = %e, "settings handshake failed");
                self.socket = None;
                return Err(Error::BoardNotReady);
            }
        }
        self.initialized = true;
        Ok(())
    }

    /// Send a configuration command and return the device response.
    ///
    /// While streaming the command is sent without reading an ACK and the
    /// response is empty. Otherwise the ACK is read with a bounded retry
    /// loop that discards rogue data-sized frames; the first response byte
    /// decides the outcome: `'A'` accepted, `'I'` rejected (surfaced as
    /// `InvalidArguments` carrying the response), anything else is logged
    /// and treated as accepted.
    pub fn configure(&mut self, conf: &str) -> Result<String> {
        let socket = self.socket.as_ref().ok_or(Error::BoardNotCreated)?;
        debug!(command = conf, "sending configuration");
        match socket.send(conf.as_bytes()) {
            Ok(n) if n == conf.len() => {}
            Ok(n) => {
                error!(sent = n, expected = conf.len(), "short configuration write");
                return Err(Error::BoardWriteError);
            }
            Err(e) => {
                error!(error = %e, "configuration write failed");
                return Err(Error::BoardWriteError);
            }
        }
        if self.is_streaming {
            return Ok(String::new());
        }

        let mut b = [0u8; MAX_RESPONSE_SIZE];
        let mut len = TRANSACTION_SIZE;
        let mut attempts = 0;
        while len == TRANSACTION_SIZE {
            len = match socket.recv(&mut b) {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "failed to read configuration ACK");
                    return Err(Error::BoardWriteError);
                }
            };
            attempts += 1;
            if attempts == MAX_ATTEMPTS {
                error!("device is streaming data while it should not");
                return Err(Error::StreamAlreadyRunning);
            }
        }

        let response = String::from_utf8_lossy(&b[..len]).into_owned();
        match response.as_bytes().first() {
            Some(b'A') => Ok(response),
            Some(b'I') => {
                error!(response = %response, "device rejected the command");
                Err(Error::InvalidArguments(response))
            }
            Some(other) => {
                warn!(byte = *other, "unknown ACK byte, treating as accepted");
                Ok(response)
            }
            None => Ok(response),
        }
    }

    /// Begin streaming into a fresh capture buffer of `buffer_size` samples,
    /// forwarding every decoded sample to `streamer`.
    ///
    /// Estimates the transport delay, sends the begin opcode, spawns the
    /// acquisition thread and waits up to five seconds for the first data
    /// transaction; a timeout force-stops the stream and surfaces
    /// `SyncTimeout`.
    pub fn start_stream(&mut self, buffer_size: usize, streamer: Box<dyn Streamer>) -> Result<()> {
        if !self.initialized {
            return Err(Error::BoardNotCreated);
        }
        if self.is_streaming {
            warn!("streaming thread already running");
            return Err(Error::StreamAlreadyRunning);
        }
        let buffer = Arc::new(SampleBuffer::new(NUM_CHANNELS, buffer_size)?);

        let (time_delay, reader_socket) = {
            let socket = self.socket.as_ref().ok_or(Error::BoardNotCreated)?;
            let delay = clock::measure_time_delay(socket)?;
            match socket.send(b"b") {
                Ok(1) => {}
                res => {
                    error!(?res, "failed to send begin-stream command");
                    return Err(Error::BoardWriteError);
                }
            }
            (delay, socket.try_clone()?)
        };
        self.time_delay = time_delay;
        self.buffer = Some(buffer.clone());

        self.shared.gate.reset();
        self.shared.keep_alive.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("physiolink-reader".to_string())
            .spawn(move || reader::run(shared, reader_socket, buffer, streamer, time_delay))?;
        self.reader = Some(handle);

        if self.shared.gate.wait(SYNC_DEADLINE) {
            self.is_streaming = true;
            info!("streaming started");
            Ok(())
        } else {
            error!("no data within {:?}, stopping reader", SYNC_DEADLINE);
            // mark streaming so the forced stop is eligible
            self.is_streaming = true;
            let _ = self.stop_stream();
            Err(Error::SyncTimeout)
        }
    }

    /// Stop streaming: join the acquisition thread, send the stop opcode and
    /// drain whatever the kernel buffered while it was in flight.
    pub fn stop_stream(&mut self) -> Result<()> {
        if !self.is_streaming {
            return Err(Error::StreamThreadNotRunning);
        }
        self.shared.keep_alive.store(false, Ordering::SeqCst);
        self.is_streaming = false;
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        self.shared.gate.reset();

        let socket = self.socket.as_ref().ok_or(Error::BoardNotCreated)?;
        match socket.send(b"s") {
            Ok(1) => {}
            res => {
                error!(?res, "failed to send stop-stream command");
                return Err(Error::BoardWriteError);
            }
        }

        // Flush data frames queued between the stop command and the device
        // actually stopping.
        socket.set_timeout(DRAIN_TIMEOUT)?;
        let mut b = [0u8; TRANSACTION_SIZE];
        let mut attempts = 0;
        loop {
            let res = socket.recv(&mut b);
            attempts += 1;
            if attempts == MAX_ATTEMPTS {
                error!("stop command was sent but the device keeps streaming");
                socket.set_timeout(DEFAULT_TIMEOUT)?;
                return Err(Error::BoardWriteError);
            }
            if res.is_err() {
                break;
            }
        }
        socket.set_timeout(DEFAULT_TIMEOUT)?;
        debug!("stream stopped");
        Ok(())
    }

    /// Stop if streaming and close the endpoint; the session returns to the
    /// unprepared state. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if self.initialized {
            if self.is_streaming {
                let _ = self.stop_stream();
            }
            self.initialized = false;
            self.socket = None;
        }
        self.buffer = None;
        Ok(())
    }

    /// Number of captured samples currently buffered.
    pub fn data_count(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    /// Destructively read up to `max` oldest samples into the caller's
    /// slices; see [`SampleBuffer::drain`]. Returns 0 before the first
    /// start.
    pub fn drain(&self, max: usize, ts_out: &mut [f64], data_out: &mut [f64]) -> usize {
        self.buffer
            .as_ref()
            .map_or(0, |b| b.drain(max, ts_out, data_out))
    }

    /// Copy the most recent samples without consuming them; see
    /// [`SampleBuffer::tail`].
    pub fn tail(&self, max: usize, ts_out: &mut [f64], data_out: &mut [f64]) -> usize {
        self.buffer
            .as_ref()
            .map_or(0, |b| b.tail(max, ts_out, data_out))
    }

    /// Acquisition counters since the session was created.
    pub fn stats(&self) -> AcquisitionStats {
        self.shared.stats.snapshot()
    }

    /// Half round-trip delay measured at the last start, in seconds.
    pub fn time_delay(&self) -> f64 {
        self.time_delay
    }

    /// True between a successful prepare and release.
    pub fn is_prepared(&self) -> bool {
        self.initialized
    }

    /// True while the acquisition thread is running.
    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
