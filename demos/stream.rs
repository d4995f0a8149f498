//! Stream - connect to a headset and print EEG for ten seconds.
//!
//! This example demonstrates:
//! - Scanning for the headset by advertised name
//! - Identifying it (serial number, battery)
//! - Streaming with the internal test signal
//! - Stopping and disconnecting cleanly
//!
//! ```text
//! RUST_LOG=neocore_client=debug cargo run --example stream --features ble
//! ```

use std::time::Duration;

use neocore_client::config::BleConfig;
use neocore_client::transport::ble::scan_and_connect;
use neocore_client::{Client, DeviceEvent};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const STREAM_DURATION: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (transport, notifications) = scan_and_connect(&BleConfig::default(), 256).await?;
    let (events_tx, mut events) = mpsc::channel(1024);

    let client = Client::builder()
        .sink(events_tx)
        .start(transport, notifications)
        .await?;

    let session = client.identify().await?;
    println!(
        "Serial: {}  Battery (raw 0-255): {}",
        session.serial_number.as_deref().unwrap_or("unknown"),
        session
            .battery_level
            .map(|level| level.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    client.start_streaming(true).await?;

    let deadline = tokio::time::sleep(STREAM_DURATION);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(DeviceEvent::Eeg(packet)) => println!(
                    "EEG idx={} ch1={:?} ch2={:?}",
                    packet.index, packet.channel1, packet.channel2
                ),
                Some(DeviceEvent::Disconnected) | None => break,
                Some(_) => {}
            },
        }
    }

    if client.session().streaming {
        client.stop_streaming().await?;
    }
    let stats = client.stats();
    println!(
        "Received {} EEG frames ({} missing, {} dropped)",
        stats.eeg_packets, stats.index_gaps, stats.dropped_frames
    );

    client.disconnect().await?;
    Ok(())
}
