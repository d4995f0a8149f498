//! Client builder and notification loop.
//!
//! The [`ClientBuilder`] collects configuration and the event sink. The
//! [`Client`] drives one device session:
//! 1. Take an already connected transport and its notification channel
//! 2. Spawn the writer task and the notification loop
//! 3. Identify (serial, battery) with a bounded wait per reply
//! 4. Start/stop streaming; EEG frames flow to the sink
//!
//! The notification loop is the only owner of the [`DeviceSession`]. Client
//! calls that change state send it a control message and wait for the answer;
//! everybody else reads [`SessionSnapshot`]s from a watch channel.
//!
//! # Example
//!
//! ```ignore
//! use neocore_client::{Client, DeviceEvent};
//!
//! let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
//! let client = Client::builder()
//!     .sink(events_tx)
//!     .start(transport, notifications)
//!     .await?;
//!
//! let session = client.identify().await?;
//! println!("serial={:?} battery={:?}", session.serial_number, session.battery_level);
//!
//! client.start_streaming(true).await?;
//! while let Some(DeviceEvent::Eeg(packet)) = events.recv().await {
//!     println!("EEG idx={} samples={}", packet.index, packet.len());
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::codec::Command;
use crate::config::ClientConfig;
use crate::error::{NeocoreError, Result};
use crate::protocol::{
    classify, decode_eeg_with, decode_response, DecodedResponse, IndexTracker, LengthPolicy,
    Notification,
};
use crate::session::{DeviceSession, SessionSnapshot};
use crate::sink::{DeviceEvent, EventSink, NullSink};
use crate::transport::Transport;
use crate::writer::{spawn_writer_task, OutboundCommand, WriterHandle};

/// Control queue depth between client calls and the notification loop.
const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// Builder for configuring and starting a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    sink: Box<dyn EventSink>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            sink: Box::new(NullSink),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Where decoded events go. Default: discarded.
    pub fn sink<S: EventSink>(mut self, sink: S) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Bounded wait for each identification reply.
    ///
    /// Default: 2 seconds
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Delay between test-signal enable and stream enable.
    ///
    /// Default: 500 ms
    pub fn command_pacing(mut self, pacing: Duration) -> Self {
        self.config.command_pacing_ms = pacing.as_millis() as u64;
        self
    }

    /// How the EEG length byte is treated.
    ///
    /// Default: [`LengthPolicy::Lenient`]
    pub fn eeg_length_policy(mut self, policy: LengthPolicy) -> Self {
        self.config.eeg_length_policy = policy;
        self
    }

    /// Set the maximum queued commands for backpressure.
    pub fn max_pending_commands(mut self, limit: usize) -> Self {
        self.config.max_pending_commands = limit;
        self
    }

    /// Set the command channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Start the session on a connected transport.
    ///
    /// `notifications` must be the channel the transport delivers frames on.
    /// The session moves `Disconnected → Connected`; call
    /// [`Client::identify`] next.
    pub async fn start<T: Transport>(
        self,
        transport: T,
        notifications: mpsc::Receiver<Bytes>,
    ) -> Result<Client> {
        Client::start(self.config, self.sink, Arc::new(transport), notifications).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters kept by the notification loop.
#[derive(Debug, Default)]
pub struct LinkStats {
    frames: AtomicU64,
    eeg_packets: AtomicU64,
    responses: AtomicU64,
    device_errors: AtomicU64,
    dropped_frames: AtomicU64,
    index_gaps: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatsSnapshot {
    /// Notifications received (empty ones included).
    pub frames: u64,
    /// EEG frames decoded.
    pub eeg_packets: u64,
    /// Generic replies decoded (errors included).
    pub responses: u64,
    /// PDU_ERROR replies.
    pub device_errors: u64,
    /// Frames that failed to decode.
    pub dropped_frames: u64,
    /// EEG frames missing according to the index.
    pub index_gaps: u64,
}

impl LinkStats {
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy out the counters.
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            eeg_packets: self.eeg_packets.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            index_gaps: self.index_gaps.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    BeginIdentification,
    FinishIdentification,
    BeginStreaming,
    EndStreaming,
    Disconnect,
}

enum Control {
    Transition {
        transition: Transition,
        reply: oneshot::Sender<Result<SessionSnapshot>>,
    },
    AwaitReply {
        feature_id: u8,
        pdu_id: u8,
        reply: oneshot::Sender<DecodedResponse>,
    },
}

struct Waiter {
    feature_id: u8,
    pdu_id: u8,
    reply: oneshot::Sender<DecodedResponse>,
}

/// Owns the session; processes one frame at a time in arrival order.
struct NotificationLoop {
    session: DeviceSession,
    sink: Box<dyn EventSink>,
    policy: LengthPolicy,
    tracker: IndexTracker,
    waiters: Vec<Waiter>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    stats: Arc<LinkStats>,
}

impl NotificationLoop {
    async fn run(
        mut self,
        mut notifications: mpsc::Receiver<Bytes>,
        mut control: mpsc::Receiver<Control>,
    ) {
        loop {
            tokio::select! {
                // Control first: a reply waiter is always registered before
                // the reply can be processed.
                biased;
                Some(msg) = control.recv() => self.handle_control(msg),
                frame = notifications.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => break,
                },
            }
        }

        tracing::info!("Notification stream closed");
        self.session.disconnect();
        self.publish();
        self.sink.on_event(DeviceEvent::Disconnected);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }

    fn handle_control(&mut self, msg: Control) {
        match msg {
            Control::Transition { transition, reply } => {
                let result = match transition {
                    Transition::BeginIdentification => self.session.begin_identification(),
                    Transition::FinishIdentification => self.session.finish_identification(),
                    Transition::BeginStreaming => self.session.begin_streaming(),
                    Transition::EndStreaming => self.session.end_streaming(),
                    Transition::Disconnect => {
                        self.session.disconnect();
                        self.tracker.reset();
                        Ok(())
                    }
                };
                self.publish();
                let _ = reply.send(result.map(|()| self.session.snapshot()));
            }
            Control::AwaitReply {
                feature_id,
                pdu_id,
                reply,
            } => {
                self.waiters.retain(|w| !w.reply.is_closed());
                self.waiters.push(Waiter {
                    feature_id,
                    pdu_id,
                    reply,
                });
            }
        }
    }

    fn handle_frame(&mut self, frame: Bytes) {
        LinkStats::bump(&self.stats.frames, 1);

        match classify(frame) {
            Notification::Empty => tracing::trace!("Empty notification"),
            Notification::Eeg(frame) => match decode_eeg_with(&frame, self.policy) {
                Ok(packet) => {
                    LinkStats::bump(&self.stats.eeg_packets, 1);
                    if let Some(missing) = self.tracker.observe(packet.index) {
                        LinkStats::bump(&self.stats.index_gaps, missing.into());
                        tracing::debug!("EEG index {} follows a gap of {}", packet.index, missing);
                    }
                    if !self.session.is_streaming() {
                        tracing::debug!("EEG frame {} while {}", packet.index, self.session.state());
                    }
                    tracing::trace!(
                        "EEG idx={} ch1={} samples ch2={} samples",
                        packet.index,
                        packet.channel1.len(),
                        packet.channel2.len()
                    );
                    self.sink.on_event(DeviceEvent::Eeg(packet));
                }
                Err(e) => self.drop_frame(&frame, e),
            },
            Notification::Generic(frame) => match decode_response(&frame) {
                Ok(response) => self.handle_response(response),
                Err(e) => self.drop_frame(&frame, e),
            },
        }
    }

    fn handle_response(&mut self, response: DecodedResponse) {
        LinkStats::bump(&self.stats.responses, 1);
        tracing::debug!(
            "Response {} payload={}",
            response.header,
            hex::encode(response.payload())
        );

        let mut i = 0;
        while i < self.waiters.len() {
            let waiter = &self.waiters[i];
            if response.header.answers(waiter.feature_id, waiter.pdu_id) {
                let waiter = self.waiters.swap_remove(i);
                let _ = waiter.reply.send(response.clone());
            } else {
                i += 1;
            }
        }

        if response.is_error() {
            LinkStats::bump(&self.stats.device_errors, 1);
            tracing::warn!(
                "Device error {} payload={}",
                response.header,
                hex::encode(response.payload())
            );
            self.sink.on_event(DeviceEvent::DeviceError(response));
            return;
        }

        let update = self.session.apply_response(&response);
        self.sink.on_event(DeviceEvent::Response(response));
        if let Some(update) = update {
            tracing::info!("Session updated: {:?}", update);
            self.publish();
            self.sink.on_event(DeviceEvent::SessionUpdated(update));
        }
    }

    fn drop_frame(&mut self, frame: &[u8], error: NeocoreError) {
        LinkStats::bump(&self.stats.dropped_frames, 1);
        tracing::warn!("Dropping frame ({} bytes): {}", frame.len(), error);
        self.sink.on_event(DeviceEvent::FrameDropped {
            packet_type: frame.first().copied(),
            error,
        });
    }
}

/// A running device session.
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    writer: WriterHandle,
    control: mpsc::Sender<Control>,
    session: watch::Receiver<SessionSnapshot>,
    stats: Arc<LinkStats>,
    loop_task: JoinHandle<()>,
    _writer_task: JoinHandle<()>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    async fn start(
        config: ClientConfig,
        sink: Box<dyn EventSink>,
        transport: Arc<dyn Transport>,
        notifications: mpsc::Receiver<Bytes>,
    ) -> Result<Self> {
        if !transport.is_connected() {
            return Err(NeocoreError::NotConnected);
        }

        let mut session = DeviceSession::new();
        session.connect()?;

        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let stats = Arc::new(LinkStats::default());

        let (writer, writer_task) = spawn_writer_task(transport.clone(), config.writer_config());

        let notification_loop = NotificationLoop {
            session,
            sink,
            policy: config.eeg_length_policy,
            tracker: IndexTracker::new(),
            waiters: Vec::new(),
            snapshot_tx,
            stats: stats.clone(),
        };
        let loop_task = tokio::spawn(notification_loop.run(notifications, control_rx));

        Ok(Client {
            config,
            transport,
            writer,
            control: control_tx,
            session: snapshot_rx,
            stats,
            loop_task,
            _writer_task: writer_task,
        })
    }

    /// Current session state.
    pub fn session(&self) -> SessionSnapshot {
        self.session.borrow().clone()
    }

    /// Subscribe to session changes.
    pub fn watch_session(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.clone()
    }

    /// Link counters.
    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Get the number of queued commands.
    pub fn pending_commands(&self) -> usize {
        self.writer.pending_count()
    }

    async fn transition(&self, transition: Transition) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Transition { transition, reply })
            .await
            .map_err(|_| NeocoreError::ConnectionClosed)?;
        rx.await.map_err(|_| NeocoreError::ConnectionClosed)?
    }

    /// Send a command without waiting for a reply (fire-and-forget).
    ///
    /// Resolves once the transport acknowledged the write.
    pub async fn send(&self, command: &Command) -> Result<()> {
        self.writer.send(OutboundCommand::from(command)).await
    }

    /// Send a command and wait for its reply.
    ///
    /// Returns `Ok(None)` if nothing arrived within the response timeout and
    /// [`NeocoreError::Device`] if the device answered with PDU_ERROR.
    pub async fn request(&self, command: &Command) -> Result<Option<DecodedResponse>> {
        let header = command.header();
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::AwaitReply {
                feature_id: header.feature_id(),
                pdu_id: header.pdu_id(),
                reply,
            })
            .await
            .map_err(|_| NeocoreError::ConnectionClosed)?;

        self.send(command).await?;

        match tokio::time::timeout(self.config.response_timeout(), rx).await {
            Ok(Ok(response)) if response.is_error() => Err(NeocoreError::Device {
                feature_id: response.feature_id(),
                pdu_id: response.pdu_id(),
                payload: response.payload().to_vec(),
            }),
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_)) => Err(NeocoreError::ConnectionClosed),
            Err(_) => {
                tracing::debug!(
                    "No reply to {} within {:?}",
                    header,
                    self.config.response_timeout()
                );
                Ok(None)
            }
        }
    }

    /// Query serial number and battery level, then go idle.
    ///
    /// Each query waits for its reply or the response timeout. Missing or
    /// failed replies leave that field unset; the session still ends up
    /// `Idle`. Transport failures are returned after the session went idle.
    pub async fn identify(&self) -> Result<SessionSnapshot> {
        self.transition(Transition::BeginIdentification).await?;
        let result = self.query_identity().await;
        let snapshot = self.transition(Transition::FinishIdentification).await?;
        result?;

        tracing::info!(
            "Identified: serial={:?} battery={:?}",
            snapshot.serial_number,
            snapshot.battery_level
        );
        Ok(snapshot)
    }

    async fn query_identity(&self) -> Result<()> {
        for command in [Command::GetSerial, Command::GetBattery] {
            match self.request(&command).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::warn!("No reply to {:?}, leaving it unset", command),
                Err(e @ NeocoreError::Device { .. }) => {
                    tracing::warn!("{:?} failed: {}", command, e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Enable streaming, optionally with the internal test signal.
    ///
    /// Only allowed while idle. Sends test-signal enable (if requested),
    /// waits the command pacing, then sends stream enable. If a write fails
    /// the test signal is switched off again (best effort) and the session
    /// returns to idle.
    pub async fn start_streaming(&self, use_test_signal: bool) -> Result<()> {
        self.transition(Transition::BeginStreaming).await?;

        let result = self.send_stream_enable(use_test_signal).await;
        if result.is_err() {
            if use_test_signal {
                if let Err(e) = self.send(&Command::TestSignalControl(false)).await {
                    tracing::warn!("Test signal left on after failed start: {}", e);
                }
            }
            let _ = self.transition(Transition::EndStreaming).await;
        }
        result
    }

    async fn send_stream_enable(&self, use_test_signal: bool) -> Result<()> {
        if use_test_signal {
            self.send(&Command::TestSignalControl(true)).await?;
            let pacing = self.config.command_pacing();
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }
        self.send(&Command::StreamControl(true)).await
    }

    /// Disable streaming and the test signal, in that order.
    ///
    /// Best effort: the session goes idle before the commands are written and
    /// no reply is awaited. Both commands are idempotent.
    pub async fn stop_streaming(&self) -> Result<()> {
        self.transition(Transition::EndStreaming).await?;
        self.send(&Command::StreamControl(false)).await?;
        self.send(&Command::TestSignalControl(false)).await
    }

    /// Tear the link down. Serial number and battery level stay readable.
    pub async fn disconnect(&self) -> Result<()> {
        self.transport.disconnect().await?;
        match self.transition(Transition::Disconnect).await {
            Ok(_) | Err(NeocoreError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Wait until the notification stream ends; returns the final session.
    pub async fn wait_for_disconnect(self) -> SessionSnapshot {
        if let Err(e) = self.loop_task.await {
            tracing::error!("Notification loop failed: {}", e);
        }
        let snapshot = self.session.borrow().clone();
        snapshot
    }
}
