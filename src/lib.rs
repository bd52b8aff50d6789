//! Acquisition driver for wireless biosignal headsets.
//!
//! The headset streams fixed-size UDP transactions of multi-channel
//! physiological samples (EEG, EMG, PPG, EDA, temperature, battery) from its
//! access point. This crate commands the device, captures and decodes the
//! stream on a background thread, corrects timestamps with a measured
//! transport delay and exposes the result through a bounded capture buffer
//! plus a caller-supplied streamer sink.
//!
//! ```no_run
//! use physiolink::{NullStreamer, Session, SessionConfig, NUM_CHANNELS};
//!
//! # fn main() -> physiolink::Result<()> {
//! let mut session = Session::new(SessionConfig::default());
//! session.prepare()?;
//! session.start_stream(45_000, Box::new(NullStreamer))?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! session.stop_stream()?;
//!
//! let mut timestamps = [0.0; 250];
//! let mut data = [0.0; 250 * NUM_CHANNELS];
//! let n = session.drain(250, &mut timestamps, &mut data);
//! println!("captured {n} samples");
//! session.release()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod clock;
pub mod error;
pub mod frame;
pub mod session;
pub mod streamer;

mod reader;
mod socket;

pub use buffer::{SampleBuffer, MAX_CAPTURE_SAMPLES};
pub use error::{Error, Result};
pub use frame::{channel, NUM_CHANNELS, NUM_PACKAGES, PACKAGE_SIZE, TRANSACTION_SIZE};
pub use reader::AcquisitionStats;
pub use session::{IpProtocol, Session, SessionConfig, DEFAULT_IP_ADDRESS, DEFAULT_PORT};
pub use streamer::{FnStreamer, NullStreamer, Streamer};
