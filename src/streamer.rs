//! Downstream sample sinks.
//!
//! The acquisition thread hands every decoded sample to a [`Streamer`]
//! before it lands in the capture buffer. Concrete sinks (files, multicast,
//! IPC bridges) live outside the driver; [`NullStreamer`] discards
//! everything for callers that only read the capture buffer.

/// Consumer of decoded samples, driven by the acquisition thread.
///
/// Called once per sample in strictly increasing sub-package order; the
/// implementation must not block for long or it will back-pressure the
/// receive loop.
pub trait Streamer: Send {
    /// Handle one decoded sample row.
    fn stream_data(&mut self, channels: &[f64], timestamp: f64);
}

/// Sink that discards every sample.
pub struct NullStreamer;

impl Streamer for NullStreamer {
    fn stream_data(&mut self, _channels: &[f64], _timestamp: f64) {}
}

/// Adapter turning any `Send` closure into a sink.
pub struct FnStreamer<F>(pub F);

impl<F> Streamer for FnStreamer<F>
where
    F: FnMut(&[f64], f64) + Send,
{
    fn stream_data(&mut self, channels: &[f64], timestamp: f64) {
        (self.0)(channels, timestamp)
    }
}
