//! Integration tests for neocore-client.
//!
//! A simulated headset sits on the device side of an in-memory link and
//! answers commands the way the hardware does.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;

use neocore_client::protocol::{feature, PduType};
use neocore_client::transport::memory::{memory_pair, MemoryDevice, MemoryTransport};
use neocore_client::transport::{BoxFuture, Transport};
use neocore_client::{Client, Command, DeviceEvent, NeocoreError, SessionState, SessionUpdate};

const SERIAL_REPLY: &[u8] = b"\x01\x01NC-00042";
const BATTERY_REPLY: &[u8] = &[0x07, 0x00, 0x5A];
const BATTERY_ERROR: &[u8] = &[0x07, 0x80, 0x01];

fn eeg_frame(index: u16, samples: &[(i32, i32)]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + samples.len() * 8);
    buf.put_u8(0x04);
    buf.put_u8((samples.len() * 8) as u8);
    buf.put_u16_le(index);
    for (ch1, ch2) in samples {
        buf.put_i32_le(*ch1);
        buf.put_i32_le(*ch2);
    }
    buf.freeze()
}

/// Run a device that answers each written command with `respond(command)`.
/// Returns the commands it saw, in order.
fn spawn_device<F>(mut device: MemoryDevice, respond: F) -> mpsc::UnboundedReceiver<Bytes>
where
    F: Fn(&[u8]) -> Vec<Bytes> + Send + 'static,
{
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(command) = device.next_command().await {
            for frame in respond(&command) {
                if device.notify(frame).await.is_err() {
                    return;
                }
            }
            let _ = seen_tx.send(command);
        }
    });
    seen_rx
}

/// Answers identification and emits three EEG frames on stream enable.
fn headset(command: &[u8]) -> Vec<Bytes> {
    match command {
        [0x00, 0x01] => vec![Bytes::from_static(SERIAL_REPLY)],
        [0x06, 0x00] => vec![Bytes::from_static(BATTERY_REPLY)],
        [0x02, 0x00, 0x01] => (0..3u16)
            .map(|i| eeg_frame(i, &[(i as i32, -(i as i32)), (100, -100)]))
            .collect(),
        _ => Vec::new(),
    }
}

async fn next_eeg(events: &mut mpsc::UnboundedReceiver<DeviceEvent>) -> neocore_client::protocol::EegPacket {
    loop {
        match events.recv().await {
            Some(DeviceEvent::Eeg(packet)) => return packet,
            Some(_) => continue,
            None => panic!("event stream ended before an EEG frame"),
        }
    }
}

fn drain(seen: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Ok(command) = seen.try_recv() {
        out.push(command.to_vec());
    }
    out
}

/// Connect, identify, stream with test signal, stop, disconnect.
#[tokio::test]
async fn test_full_session() {
    let (transport, notifications, device) = memory_pair(16);
    let mut seen = spawn_device(device, headset);
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let client = Client::builder()
        .command_pacing(Duration::ZERO)
        .sink(events_tx)
        .start(transport, notifications)
        .await
        .unwrap();

    let session = client.identify().await.unwrap();
    assert_eq!(session.state, SessionState::Idle);
    assert_eq!(session.serial_number.as_deref(), Some("NC-00042"));
    assert_eq!(session.battery_level, Some(90));

    client.start_streaming(true).await.unwrap();
    assert!(client.session().streaming);

    for expected in 0..3u16 {
        let packet = next_eeg(&mut events).await;
        assert_eq!(packet.index, expected);
        assert_eq!(packet.channel1, vec![expected as i32, 100]);
        assert_eq!(packet.channel2, vec![-(expected as i32), -100]);
    }

    client.stop_streaming().await.unwrap();
    assert_eq!(client.session().state, SessionState::Idle);

    // let the device task record the last write
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        drain(&mut seen),
        vec![
            vec![0x00, 0x01],
            vec![0x06, 0x00],
            vec![0x02, 0x01, 0x01],
            vec![0x02, 0x00, 0x01],
            vec![0x02, 0x00, 0x00],
            vec![0x02, 0x01, 0x00],
        ]
    );

    client.disconnect().await.unwrap();
    let last = client.wait_for_disconnect().await;
    assert_eq!(last.state, SessionState::Disconnected);
    assert_eq!(last.serial_number.as_deref(), Some("NC-00042"));
    assert_eq!(last.battery_level, Some(90));
}

#[tokio::test]
async fn test_identify_publishes_updates() {
    let (transport, notifications, device) = memory_pair(16);
    let _seen = spawn_device(device, headset);
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let client = Client::builder()
        .sink(events_tx)
        .start(transport, notifications)
        .await
        .unwrap();
    let mut watch = client.watch_session();

    client.identify().await.unwrap();
    assert!(watch.has_changed().unwrap());
    assert_eq!(watch.borrow_and_update().battery_level, Some(90));

    let mut updates = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DeviceEvent::SessionUpdated(update) = event {
            updates.push(update);
        }
    }
    assert_eq!(
        updates,
        vec![
            SessionUpdate::SerialNumber("NC-00042".to_string()),
            SessionUpdate::BatteryLevel(90),
        ]
    );
    assert_eq!(client.stats().responses, 2);
}

/// Battery never answers: identification still completes.
#[tokio::test(start_paused = true)]
async fn test_partial_identification() {
    let (transport, notifications, device) = memory_pair(16);
    let _seen = spawn_device(device, |command| match command {
        [0x00, 0x01] => vec![Bytes::from_static(SERIAL_REPLY)],
        _ => Vec::new(),
    });

    let client = Client::builder()
        .start(transport, notifications)
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let session = client.identify().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(2));

    assert_eq!(session.state, SessionState::Idle);
    assert_eq!(session.serial_number.as_deref(), Some("NC-00042"));
    assert_eq!(session.battery_level, None);

    // idle is enough to stream
    client.start_streaming(false).await.unwrap();
    assert_eq!(client.session().state, SessionState::Streaming);
}

#[tokio::test]
async fn test_device_error_reply() {
    let (transport, notifications, device) = memory_pair(16);
    let _seen = spawn_device(device, |command| match command {
        [0x00, 0x01] => vec![Bytes::from_static(SERIAL_REPLY)],
        [0x06, 0x00] => vec![Bytes::from_static(BATTERY_ERROR)],
        _ => Vec::new(),
    });
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let client = Client::builder()
        .sink(events_tx)
        .start(transport, notifications)
        .await
        .unwrap();

    let session = client.identify().await.unwrap();
    assert_eq!(session.battery_level, None);
    assert_eq!(session.serial_number.as_deref(), Some("NC-00042"));

    let err = client.request(&Command::GetBattery).await.unwrap_err();
    match err {
        NeocoreError::Device {
            feature_id,
            pdu_id,
            payload,
        } => {
            assert_eq!(feature_id, feature::BATTERY);
            assert_eq!(pdu_id, 0);
            assert_eq!(payload, vec![0x01]);
        }
        other => panic!("unexpected error {:?}", other),
    }

    let mut device_errors = 0;
    while let Ok(event) = events.try_recv() {
        if let DeviceEvent::DeviceError(reply) = event {
            assert_eq!(reply.pdu_type(), PduType::Error);
            device_errors += 1;
        }
    }
    assert_eq!(device_errors, 2);
    assert_eq!(client.stats().device_errors, 2);
}

/// Malformed frames are dropped; the session carries on.
#[tokio::test]
async fn test_bad_frames_do_not_end_session() {
    let (transport, notifications, device) = memory_pair(16);
    let _seen = spawn_device(device, |command| match command {
        [0x00, 0x01] => vec![
            Bytes::from_static(&[0x04, 0x01]),
            Bytes::from_static(&[0x00]),
            Bytes::new(),
            Bytes::from_static(SERIAL_REPLY),
        ],
        [0x06, 0x00] => vec![Bytes::from_static(BATTERY_REPLY)],
        _ => Vec::new(),
    });
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let client = Client::builder()
        .sink(events_tx)
        .start(transport, notifications)
        .await
        .unwrap();

    let session = client.identify().await.unwrap();
    assert_eq!(session.serial_number.as_deref(), Some("NC-00042"));
    assert_eq!(session.battery_level, Some(90));

    let dropped: Vec<Option<u8>> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            DeviceEvent::FrameDropped { packet_type, .. } => Some(packet_type),
            _ => None,
        })
        .collect();
    assert_eq!(dropped, vec![Some(0x04), Some(0x00)]);

    let stats = client.stats();
    assert_eq!(stats.frames, 5);
    assert_eq!(stats.dropped_frames, 2);
}

#[tokio::test]
async fn test_eeg_gaps_are_counted() {
    let (transport, notifications, device) = memory_pair(16);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = Client::builder()
        .sink(events_tx)
        .start(transport, notifications)
        .await
        .unwrap();
    let before = client.session();
    let watch = client.watch_session();

    for index in [0xFFFE, 0xFFFF, 0x0000, 0x0003] {
        device.notify(eeg_frame(index, &[(1, 2)])).await.unwrap();
    }
    for expected in [0xFFFE, 0xFFFF, 0x0000, 0x0003] {
        assert_eq!(next_eeg(&mut events).await.index, expected);
    }

    let stats = client.stats();
    assert_eq!(stats.eeg_packets, 4);
    assert_eq!(stats.index_gaps, 2);

    // EEG frames never touch the session
    assert_eq!(client.session(), before);
    assert!(!watch.has_changed().unwrap());
}

#[tokio::test]
async fn test_stop_streaming_rules() {
    let (transport, notifications, device) = memory_pair(16);
    let mut seen = spawn_device(device, headset);
    let client = Client::builder()
        .start(transport, notifications)
        .await
        .unwrap();

    let err = client.stop_streaming().await.unwrap_err();
    assert!(matches!(
        err,
        NeocoreError::InvalidState {
            state: SessionState::Connected,
            ..
        }
    ));

    client.identify().await.unwrap();
    drain(&mut seen);

    // idle: still sends both disables
    client.stop_streaming().await.unwrap();
    let mut commands = Vec::new();
    while commands.len() < 2 {
        commands.push(seen.recv().await.unwrap().to_vec());
    }
    assert_eq!(commands, vec![vec![0x02, 0x00, 0x00], vec![0x02, 0x01, 0x00]]);
    assert_eq!(client.session().state, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_test_signal_pacing() {
    let (transport, notifications, device) = memory_pair(16);
    let _seen = spawn_device(device, headset);
    let client = Client::builder()
        .command_pacing(Duration::from_millis(500))
        .start(transport, notifications)
        .await
        .unwrap();
    client.identify().await.unwrap();

    let started = tokio::time::Instant::now();
    client.start_streaming(true).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));

    let started = tokio::time::Instant::now();
    client.stop_streaming().await.unwrap();
    client.start_streaming(false).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_write_failure_during_identify() {
    let (transport, notifications, device) = memory_pair(16);
    device.set_fail_writes(true);
    let client = Client::builder()
        .start(transport, notifications)
        .await
        .unwrap();

    let err = client.identify().await.unwrap_err();
    assert!(matches!(err, NeocoreError::Transport(_)));
    assert_eq!(client.session().state, SessionState::Idle);

    // streaming rolls back when the enable write fails
    let err = client.start_streaming(false).await.unwrap_err();
    assert!(matches!(err, NeocoreError::Transport(_)));
    assert_eq!(client.session().state, SessionState::Idle);
    drop(device);
}

/// Rejects the stream-enable write, passes everything else through.
struct RejectStreamEnable(MemoryTransport);

impl Transport for RejectStreamEnable {
    fn write(&self, data: Bytes) -> BoxFuture<'_, neocore_client::Result<()>> {
        if data[..] == [0x02, 0x00, 0x01] {
            return Box::pin(async { Err(NeocoreError::Transport("stream enable rejected".into())) });
        }
        self.0.write(data)
    }

    fn disconnect(&self) -> BoxFuture<'_, neocore_client::Result<()>> {
        self.0.disconnect()
    }

    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }
}

#[tokio::test]
async fn test_failed_start_switches_test_signal_off() {
    let (transport, notifications, device) = memory_pair(16);
    let mut seen = spawn_device(device, headset);
    let client = Client::builder()
        .command_pacing(Duration::ZERO)
        .start(RejectStreamEnable(transport), notifications)
        .await
        .unwrap();
    client.identify().await.unwrap();
    drain(&mut seen);

    let err = client.start_streaming(true).await.unwrap_err();
    assert!(matches!(err, NeocoreError::Transport(_)));
    assert_eq!(client.session().state, SessionState::Idle);

    let mut commands = Vec::new();
    while commands.len() < 2 {
        commands.push(seen.recv().await.unwrap().to_vec());
    }
    assert_eq!(commands, vec![vec![0x02, 0x01, 0x01], vec![0x02, 0x01, 0x00]]);
}

#[tokio::test]
async fn test_link_lost() {
    let (transport, notifications, device) = memory_pair(16);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = Client::builder()
        .sink(events_tx)
        .start(transport, notifications)
        .await
        .unwrap();

    device.notify(Bytes::from_static(SERIAL_REPLY)).await.unwrap();
    device.drop_link();

    let last = client.wait_for_disconnect().await;
    assert_eq!(last.state, SessionState::Disconnected);
    assert_eq!(last.serial_number.as_deref(), Some("NC-00042"));

    let mut saw_disconnect = false;
    while let Ok(event) = events.try_recv() {
        saw_disconnect |= matches!(event, DeviceEvent::Disconnected);
    }
    assert!(saw_disconnect);
}
