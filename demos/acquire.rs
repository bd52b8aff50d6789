//! Stream a few seconds of live data from a headset and print the newest
//! samples. Expects the device on its default access-point address; pass an
//! IP to override.

use std::time::Duration;

use physiolink::{NullStreamer, Session, SessionConfig, NUM_CHANNELS};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = SessionConfig {
        ip_address: std::env::args().nth(1).unwrap_or_default(),
        ..Default::default()
    };

    let mut session = Session::new(config);
    session.prepare()?;
    session.start_stream(45_000, Box::new(NullStreamer))?;
    std::thread::sleep(Duration::from_secs(5));
    session.stop_stream()?;

    let stats = session.stats();
    println!(
        "captured {} samples in {} transactions ({} short reads), delay {:.3} ms",
        stats.samples,
        stats.transactions,
        stats.short_reads,
        session.time_delay() * 1e3
    );

    let mut timestamps = [0.0; 10];
    let mut data = [0.0; 10 * NUM_CHANNELS];
    let n = session.tail(10, &mut timestamps, &mut data);
    for i in 0..n {
        let row = &data[i * NUM_CHANNELS..(i + 1) * NUM_CHANNELS];
        println!("{:.6}: {row:?}", timestamps[i]);
    }

    session.release()?;
    Ok(())
}
