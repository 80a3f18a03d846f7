use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;

use crate::scene::{parse_batch, PatchBatch};
use crate::util::endpoint_url;

// ── Events ──────────────────────────────────────────────────────────────────

/// Lifecycle of a single channel instance. There is no reconnecting state:
/// once Closed, an instance stays Closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelState {
    Closed = 0,
    Connecting = 1,
    Open = 2,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ChannelState::Connecting,
            2 => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "detail")]
pub enum CloseReason {
    /// The owner called [`DeltaChannel::close`] or dropped the channel.
    Requested,
    /// The server sent a close frame or ended the stream.
    Remote,
    ConnectFailed(String),
    Transport(String),
    /// No frame of any kind arrived within the idle timeout.
    IdleTimeout,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Batch(PatchBatch),
    Closed(CloseReason),
}

/// Liveness settings. The relay protocol has no application-level
/// heartbeat, so this uses websocket ping frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Heartbeat {
    pub ping_interval: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            ping_interval: Some(Duration::from_secs(15)),
            idle_timeout: Some(Duration::from_secs(45)),
        }
    }
}

impl Heartbeat {
    pub fn disabled() -> Self {
        Self {
            ping_interval: None,
            idle_timeout: None,
        }
    }

    /// A zero interval means no pings.
    fn ping_period(&self) -> Option<Duration> {
        self.ping_interval.filter(|period| !period.is_zero())
    }

    fn timer_period(&self) -> Option<Duration> {
        self.ping_period()
            .or_else(|| self.idle_timeout.map(|idle| idle / 2))
            .filter(|period| !period.is_zero())
    }
}

// ── State ───────────────────────────────────────────────────────────────────

struct Shared {
    state: AtomicU8,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Receive-only subscription to one organization's patch stream.
///
/// Batches are delivered in the order the relay sent them. The instance
/// cannot be restarted: after it closes, the owner opens a new one.
pub struct DeltaChannel {
    org: String,
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DeltaChannel {
    /// `{ws_base}/sub/{org}`
    pub fn subscribe_url(ws_base: &Url, org: &str) -> Result<Url, String> {
        endpoint_url(ws_base, "sub", org)
    }

    /// Starts connecting in the background. Must be called from within a
    /// Tokio runtime.
    pub fn open(ws_base: &Url, org: &str, heartbeat: Heartbeat) -> Result<Self, String> {
        let url = Self::subscribe_url(ws_base, org)?;
        Ok(Self::open_url(url, org, heartbeat))
    }

    pub fn open_url(url: Url, org: &str, heartbeat: Heartbeat) -> Self {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(ChannelState::Connecting as u8),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let (tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_channel(
            url,
            org.to_string(),
            heartbeat,
            shared.clone(),
            tx,
            shutdown_rx,
        ));

        Self {
            org: org.to_string(),
            shared,
            events,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Next buffered event, if any. Never waits.
    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Waits for the next event. `None` once the channel has closed and
    /// every event has been consumed.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Closes the connection. Events still buffered are discarded, so no
    /// batch is delivered after this returns.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            log::info!("Closing delta channel for org {}", self.org);
        }
        self.shared.set_state(ChannelState::Closed);
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }

    /// Text messages received, valid or not.
    pub fn received_messages(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    /// Messages dropped because they were not a valid patch batch.
    pub fn dropped_messages(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// True once the background task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for DeltaChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Connection task ─────────────────────────────────────────────────────────

/// Decodes one text message. Malformed messages are counted, logged and
/// dropped; they never end the connection.
fn decode_message(org: &str, text: &str, shared: &Shared) -> Option<PatchBatch> {
    shared.received.fetch_add(1, Ordering::Relaxed);
    match parse_batch(text) {
        Ok(batch) => Some(batch),
        Err(e) => {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("Dropping malformed message on channel {org}: {e}");
            None
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run_channel(
    url: Url,
    org: String,
    heartbeat: Heartbeat,
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    log::info!("Connecting delta channel for org {org} at {url}");

    let connect = tokio_tungstenite::connect_async(url.as_str());
    let ws = tokio::select! {
        _ = &mut shutdown_rx => {
            shared.set_state(ChannelState::Closed);
            return;
        }
        result = connect => match result {
            Ok((ws, _)) => ws,
            Err(e) => {
                log::warn!("Delta channel for org {org} failed to connect: {e}");
                shared.set_state(ChannelState::Closed);
                let _ = tx.send(ChannelEvent::Closed(CloseReason::ConnectFailed(e.to_string())));
                return;
            }
        }
    };

    // The owner may have closed while the handshake was in flight.
    if shared
        .state
        .compare_exchange(
            ChannelState::Connecting as u8,
            ChannelState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_err()
    {
        return;
    }
    log::info!("Delta channel for org {org} connected");
    let _ = tx.send(ChannelEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    let mut timer = heartbeat.timer_period().map(|period| {
        tokio::time::interval_at(Instant::now() + period, period)
    });
    let mut last_frame = Instant::now();

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                let _ = sink.send(Message::Close(None)).await;
                break CloseReason::Requested;
            }
            _ = next_tick(&mut timer) => {
                if let Some(idle) = heartbeat.idle_timeout {
                    if last_frame.elapsed() >= idle {
                        let _ = sink.send(Message::Close(None)).await;
                        break CloseReason::IdleTimeout;
                    }
                }
                if heartbeat.ping_period().is_some() {
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        break CloseReason::Transport(e.to_string());
                    }
                }
            }
            message = stream.next() => {
                last_frame = Instant::now();
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Some(batch) = decode_message(&org, &text, &shared) else {
                            continue;
                        };
                        if tx.send(ChannelEvent::Batch(batch)).is_err() {
                            // Owner is gone.
                            break CloseReason::Requested;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::debug!("Relay closed channel for org {org}: {frame:?}");
                        break CloseReason::Remote;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        log::debug!("Ignoring {} byte binary message on channel {org}", bytes.len());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseReason::Transport(e.to_string()),
                    None => break CloseReason::Remote,
                }
            }
        }
    };

    shared.set_state(ChannelState::Closed);
    log::info!("Delta channel for org {org} closed: {reason:?}");
    let _ = tx.send(ChannelEvent::Closed(reason));
}
