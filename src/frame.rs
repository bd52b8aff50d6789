//! Transaction decoding for the headset's binary sample format.
//!
//! The device streams fixed-size UDP datagrams ("transactions") of
//! [`TRANSACTION_SIZE`] bytes, each carrying [`NUM_PACKAGES`] sub-packages.
//! One sub-package decodes into a row of [`NUM_CHANNELS`] channel values and
//! a host timestamp corrected with the device-side clock.

/// Number of decoded channels per sample.
pub const NUM_CHANNELS: usize = 22;
/// Size of one sub-package in bytes.
pub const PACKAGE_SIZE: usize = 72;
/// Sub-packages per transaction.
pub const NUM_PACKAGES: usize = 19;
/// One UDP datagram worth of sample data.
pub const TRANSACTION_SIZE: usize = PACKAGE_SIZE * NUM_PACKAGES;

/// Channel indices with fixed meaning.
pub mod channel {
    /// Package counter (lower 8 bits of the device counter).
    pub const PACKAGE_COUNTER: usize = 0;
    /// First of eight main-board EEG channels (µV).
    pub const EEG_FIRST: usize = 1;
    /// First of eight mixed EMG / sister-board EEG channels (µV).
    pub const EMG_FIRST: usize = 9;
    /// PPG red (raw counts).
    pub const PPG_RED: usize = 17;
    /// PPG infrared (raw counts).
    pub const PPG_IR: usize = 18;
    /// Electrodermal activity (device units).
    pub const EDA: usize = 19;
    /// Skin temperature (°C).
    pub const TEMPERATURE: usize = 20;
    /// Battery level (raw byte).
    pub const BATTERY: usize = 21;
}

// Full-scale counts of the 24-bit front end (2^23 - 1).
const ADC_COUNTS: f64 = 8_388_607.0;
/// Main-board EEG scale in µV per count (4.5 V reference, gain 24).
pub const EEG_SCALE_MAIN_BOARD: f64 = 4.5 / ADC_COUNTS / 24.0 * 1e6;
/// Sister-board EEG scale in µV per count (2.5 V reference, gain 24).
pub const EEG_SCALE_SISTER_BOARD: f64 = 2.5 / ADC_COUNTS / 24.0 * 1e6;
/// EMG scale in µV per count (2.5 V reference, gain 12).
pub const EMG_SCALE: f64 = 2.5 / ADC_COUNTS / 12.0 * 1e6;

// Field offsets within one sub-package.
const OFF_COUNTER: usize = 0;
const OFF_EDA: usize = 1;
const OFF_EXG: usize = 5;
const OFF_BATTERY: usize = 53;
const OFF_TEMPERATURE: usize = 54;
const OFF_PPG_RED: usize = 56;
const OFF_PPG_IR: usize = 60;
const OFF_DEVICE_TIMESTAMP: usize = 64;

/// Sign-extend a 24-bit big-endian integer into an `i32`.
///
/// `b` must hold at least three bytes; only the first three are read.
pub fn cast_24bit_to_i32(b: &[u8]) -> i32 {
    let raw = (i32::from(b[0]) << 16) | (i32::from(b[1]) << 8) | i32::from(b[2]);
    (raw << 8) >> 8
}

fn read_u16_le(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

fn read_i32_le(b: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn read_f32_le(b: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn read_f64_le(b: &[u8], off: usize) -> f64 {
    f64::from_le_bytes([
        b[off],
        b[off + 1],
        b[off + 2],
        b[off + 3],
        b[off + 4],
        b[off + 5],
        b[off + 6],
        b[off + 7],
    ])
}

/// Decode one transaction into its sub-package samples.
///
/// `recv_time` is the host receive timestamp in seconds, already corrected
/// for the transport delay. Each decoded sample is handed to `emit` in
/// sub-package order as `(timestamp, channels)`. Performs no I/O and no
/// per-call heap allocation.
pub fn decode_transaction<F>(b: &[u8; TRANSACTION_SIZE], recv_time: f64, mut emit: F)
where
    F: FnMut(f64, &[f64; NUM_CHANNELS]),
{
    let off_last = (NUM_PACKAGES - 1) * PACKAGE_SIZE;
    let t_last = read_f64_le(b, off_last + OFF_DEVICE_TIMESTAMP) / 1e6;

    let mut package = [0.0f64; NUM_CHANNELS];
    for p in 0..NUM_PACKAGES {
        let off = p * PACKAGE_SIZE;
        decode_package(&b[off..off + PACKAGE_SIZE], &mut package);

        let t_cur = read_f64_le(b, off + OFF_DEVICE_TIMESTAMP) / 1e6;
        // micros() wraps in the firmware; a negative delta means the counter
        // overflowed inside this transaction.
        let delta = t_last - t_cur;
        let timestamp = if delta < 0.0 { recv_time } else { recv_time - delta };

        emit(timestamp, &package);
    }
}

fn decode_package(p: &[u8], out: &mut [f64; NUM_CHANNELS]) {
    out[channel::PACKAGE_COUNTER] = f64::from(p[OFF_COUNTER]);

    // 16 consecutive 24-bit big-endian signed samples: eight main-board EEG
    // slots, then the mixed EMG block with two sister-board EEG slots at 9
    // and 14.
    for slot in 0..16 {
        let scale = if slot < 8 {
            EEG_SCALE_MAIN_BOARD
        } else if slot == 9 || slot == 14 {
            EEG_SCALE_SISTER_BOARD
        } else {
            EMG_SCALE
        };
        let raw = cast_24bit_to_i32(&p[OFF_EXG + 3 * slot..]);
        out[channel::EEG_FIRST + slot] = scale * f64::from(raw);
    }

    out[channel::PPG_RED] = f64::from(read_i32_le(p, OFF_PPG_RED));
    out[channel::PPG_IR] = f64::from(read_i32_le(p, OFF_PPG_IR));
    out[channel::EDA] = f64::from(read_f32_le(p, OFF_EDA));
    out[channel::TEMPERATURE] = f64::from(read_u16_le(p, OFF_TEMPERATURE)) / 100.0;
    out[channel::BATTERY] = f64::from(p[OFF_BATTERY]);
}
