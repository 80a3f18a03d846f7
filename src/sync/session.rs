use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{FetchError, Result, SyncError};
use crate::scene::{Scene, SceneItem, WorkingCopy};
use crate::sync::backoff::{Backoff, ReconnectPolicy};
use crate::sync::channel::{ChannelEvent, ChannelState, CloseReason, DeltaChannel, Heartbeat};
use crate::sync::fetch::SnapshotFetcher;
use crate::sync::reconcile::{apply, ReconcileReport};
use crate::sync::render::{RenderBinder, Smoothing, TickReport, VisualScene};
use crate::util::websocket_base;

// ── Options ─────────────────────────────────────────────────────────────────

/// Where the snapshot endpoint and the delta channel live.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoints {
    pub http: Url,
    pub ws: Url,
}

impl Endpoints {
    /// Derives both endpoints from one relay base URL.
    pub fn from_server(server: &str) -> Result<Self> {
        let http = Url::parse(server)
            .map_err(|e| SyncError::Custom(format!("Invalid server URL {server}: {e}")))?;
        let ws = websocket_base(&http).map_err(SyncError::Custom)?;
        Ok(Self { http, ws })
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub endpoints: Endpoints,
    pub smoothing: Smoothing,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: Heartbeat,
}

impl SessionOptions {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            smoothing: Smoothing::default(),
            reconnect: ReconnectPolicy::default(),
            heartbeat: Heartbeat::default(),
        }
    }
}

// ── Events ──────────────────────────────────────────────────────────────────

/// Things that happened while pumping the session, for the UI layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    SnapshotLoaded { scene: String, items: usize },
    SnapshotFailed { message: String },
    ChannelOpened,
    ChannelClosed { reason: CloseReason },
    #[serde(rename_all = "camelCase")]
    ReconnectScheduled { attempt: u32, delay_ms: u64 },
    Reconnecting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// No scene yet: the snapshot is in flight or failed.
    Loading,
    Connecting,
    Live,
    /// Showing the last known state; no updates are arriving.
    Disconnected,
    Closed,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PumpReport {
    pub events: Vec<SessionEvent>,
    pub batches: usize,
    /// Batches that arrived before any snapshot was installed.
    pub discarded_batches: usize,
    pub reconciled: ReconcileReport,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub pump: PumpReport,
    pub render: TickReport,
}

type SnapshotResult = (u64, std::result::Result<Scene, FetchError>);

// ── Session ─────────────────────────────────────────────────────────────────

/// One client's subscription to an organization's live scene.
///
/// The session exclusively owns the working copy. Network results are only
/// folded in when the owner calls [`SceneSession::pump`] (or `tick`), so the
/// reconciler and the render binder never run concurrently.
pub struct SceneSession {
    org: String,
    options: SessionOptions,
    fetcher: SnapshotFetcher,
    /// Bumped on every (re)start; older snapshot results are discarded.
    generation: u64,
    snapshot: Option<oneshot::Receiver<SnapshotResult>>,
    working: Option<WorkingCopy>,
    channel: Option<DeltaChannel>,
    binder: RenderBinder,
    backoff: Backoff,
    retry_at: Option<Instant>,
    closed: bool,
}

impl SceneSession {
    /// Starts fetching the snapshot and opening the channel. Must be called
    /// from within a Tokio runtime.
    pub fn start(org: &str, options: SessionOptions) -> Result<Self> {
        let mut session = Self {
            org: org.to_string(),
            fetcher: SnapshotFetcher::new(options.endpoints.http.clone()),
            binder: RenderBinder::new(options.smoothing),
            backoff: Backoff::new(options.reconnect),
            options,
            generation: 0,
            snapshot: None,
            working: None,
            channel: None,
            retry_at: None,
            closed: false,
        };
        session.connect()?;
        Ok(session)
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn working_copy(&self) -> Option<&WorkingCopy> {
        self.working.as_ref()
    }

    /// Current items for the instantiation layer; empty until a snapshot
    /// has been installed.
    pub fn items(&self) -> &[SceneItem] {
        self.working.as_ref().map_or(&[], |working| working.items())
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel
            .as_ref()
            .map_or(ChannelState::Closed, DeltaChannel::state)
    }

    pub fn status(&self) -> SessionStatus {
        if self.closed {
            return SessionStatus::Closed;
        }
        if self.working.is_none() {
            return SessionStatus::Loading;
        }
        match self.channel_state() {
            ChannelState::Open => SessionStatus::Live,
            ChannelState::Connecting => SessionStatus::Connecting,
            ChannelState::Closed => SessionStatus::Disconnected,
        }
    }

    /// Malformed messages dropped by the current channel.
    pub fn dropped_messages(&self) -> u64 {
        self.channel.as_ref().map_or(0, DeltaChannel::dropped_messages)
    }

    /// Spawns the snapshot fetch and opens a fresh channel instance.
    fn connect(&mut self) -> Result<()> {
        self.generation += 1;
        let generation = self.generation;

        let (tx, rx) = oneshot::channel();
        let fetcher = self.fetcher.clone();
        let org = self.org.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch(&org).await;
            // The session may be gone already; nothing to do then.
            let _ = tx.send((generation, result));
        });
        self.snapshot = Some(rx);

        if let Some(mut previous) = self.channel.take() {
            previous.close();
        }
        let channel = DeltaChannel::open(&self.options.endpoints.ws, &self.org, self.options.heartbeat)
            .map_err(SyncError::Custom)?;
        self.channel = Some(channel);
        Ok(())
    }

    fn accept_snapshot(
        &mut self,
        generation: u64,
        result: std::result::Result<Scene, FetchError>,
        events: &mut Vec<SessionEvent>,
    ) {
        if generation != self.generation {
            log::debug!(
                "Discarding snapshot from generation {generation} (current {})",
                self.generation
            );
            return;
        }

        let scene = match result {
            Ok(scene) => scene,
            Err(e) => {
                log::warn!("Snapshot for org {} failed: {e}", self.org);
                events.push(SessionEvent::SnapshotFailed {
                    message: e.to_string(),
                });
                return;
            }
        };

        match WorkingCopy::from_scene(scene) {
            Ok(working) => {
                events.push(SessionEvent::SnapshotLoaded {
                    scene: working.name().to_string(),
                    items: working.len(),
                });
                self.working = Some(working);
            }
            Err(message) => {
                log::warn!("Snapshot for org {} rejected: {message}", self.org);
                events.push(SessionEvent::SnapshotFailed { message });
            }
        }
    }

    /// Folds every pending network result into the session: the snapshot if
    /// it arrived, then each channel event in arrival order. Also performs a
    /// due reconnect.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        if self.closed {
            return report;
        }

        if let Some(rx) = self.snapshot.as_mut() {
            match rx.try_recv() {
                Ok((generation, result)) => {
                    self.snapshot = None;
                    self.accept_snapshot(generation, result, &mut report.events);
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.snapshot = None;
                    report.events.push(SessionEvent::SnapshotFailed {
                        message: "snapshot task ended without a result".into(),
                    });
                }
            }
        }

        let mut closed_reason = None;
        if let Some(channel) = self.channel.as_mut() {
            while let Some(event) = channel.try_next() {
                match event {
                    ChannelEvent::Opened => {
                        self.backoff.reset();
                        report.events.push(SessionEvent::ChannelOpened);
                    }
                    ChannelEvent::Batch(batch) => {
                        report.batches += 1;
                        match self.working.as_mut() {
                            Some(working) => report.reconciled.merge(apply(working, &batch)),
                            None => report.discarded_batches += 1,
                        }
                    }
                    ChannelEvent::Closed(reason) => {
                        closed_reason = Some(reason);
                        break;
                    }
                }
            }
        }

        if let Some(reason) = closed_reason {
            report.events.push(SessionEvent::ChannelClosed {
                reason: reason.clone(),
            });
            if reason != CloseReason::Requested {
                self.schedule_reconnect(&mut report.events);
            }
        }

        if let Some(at) = self.retry_at {
            if Instant::now() >= at {
                self.retry_at = None;
                report.events.push(SessionEvent::Reconnecting);
                if let Err(e) = self.connect() {
                    log::warn!("Reconnect for org {} failed: {e}", self.org);
                }
            }
        }

        report
    }

    fn schedule_reconnect(&mut self, events: &mut Vec<SessionEvent>) {
        let Some(delay) = self.backoff.next_delay() else {
            return;
        };
        log::info!(
            "Reconnecting org {} in {} ms (attempt {})",
            self.org,
            delay.as_millis(),
            self.backoff.attempt()
        );
        self.retry_at = Some(Instant::now() + delay);
        events.push(SessionEvent::ReconnectScheduled {
            attempt: self.backoff.attempt(),
            delay_ms: delay.as_millis() as u64,
        });
    }

    /// One render frame: pump network results, then advance the visuals.
    pub fn tick<S: VisualScene + ?Sized>(&mut self, scene: &mut S, dt: Duration) -> FrameReport {
        let pump = self.pump();
        let render = match self.working.as_ref() {
            Some(working) => self.binder.tick(working, scene, dt),
            None => TickReport::default(),
        };
        FrameReport { pump, render }
    }

    /// Drops everything tied to the current organization and subscribes to
    /// another one. A snapshot still in flight for the old org is ignored.
    pub fn switch_org(&mut self, org: &str) -> Result<()> {
        log::info!("Switching session from org {} to {org}", self.org);
        self.release();
        self.org = org.to_string();
        self.closed = false;
        self.backoff.reset();
        self.connect()
    }

    /// Closes the channel and releases the working copy.
    pub fn close(&mut self) {
        self.release();
        self.closed = true;
    }

    fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.snapshot = None;
        self.working = None;
        self.retry_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MeshType;
    use crate::sync::channel::tests::{serve_ws, ServerCmd};
    use crate::sync::fetch::tests::{scene_json, serve_http};
    use crate::sync::render::HeadlessScene;
    use tokio::net::TcpListener;

    const FRAME: Duration = Duration::from_millis(16);

    fn options(endpoints: Endpoints) -> SessionOptions {
        SessionOptions {
            endpoints,
            smoothing: Smoothing::Disabled,
            reconnect: ReconnectPolicy::disabled(),
            heartbeat: Heartbeat::disabled(),
        }
    }

    async fn dead_url(scheme: &str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Url::parse(&format!("{scheme}://{addr}")).unwrap()
    }

    /// Pumps until `done` holds, collecting events.
    async fn pump_until(
        session: &mut SceneSession,
        mut done: impl FnMut(&SceneSession, &[SessionEvent]) -> bool,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            events.extend(session.pump().events);
            if done(session, &events) {
                return events;
            }
            assert!(Instant::now() < deadline, "gave up waiting; events: {events:?}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_endpoints_from_server() {
        let endpoints = Endpoints::from_server("https://relay.example.com").unwrap();
        assert_eq!(endpoints.http.scheme(), "https");
        assert_eq!(endpoints.ws.as_str(), "wss://relay.example.com/");
        assert!(Endpoints::from_server("not a url").is_err());
    }

    #[tokio::test]
    async fn test_patches_reach_visuals() {
        let (http, _requests) = serve_http("200 OK", scene_json()).await;
        let (ws, server, _paths) = serve_ws().await;
        let mut session = SceneSession::start("finn", options(Endpoints { http, ws })).unwrap();

        let events = pump_until(&mut session, |s, _| s.status() == SessionStatus::Live).await;
        assert!(events.contains(&SessionEvent::SnapshotLoaded {
            scene: "test scene".into(),
            items: 2,
        }));
        assert!(events.contains(&SessionEvent::ChannelOpened));

        let mut visuals = HeadlessScene::new();
        visuals.instantiate(session.items());
        server
            .send(ServerCmd::Send(r#"[{"id":"0","position":[5,5,5]},{"id":"ghost","color":"red"}]"#.into()))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reconciled = ReconcileReport::default();
        while visuals.get("0").unwrap().position != [5.0, 5.0, 5.0] {
            assert!(Instant::now() < deadline, "patch never applied");
            tokio::time::sleep(Duration::from_millis(10)).await;
            reconciled.merge(session.tick(&mut visuals, FRAME).pump.reconciled);
        }

        assert_eq!(reconciled, ReconcileReport { applied: 1, unknown: 1 });
        let item = session.working_copy().unwrap().get("0").unwrap();
        assert_eq!(item.color.as_deref(), Some("#af00f0"));
        assert_eq!(item.rotation, [1.0, 0.0, 1.0]);
        assert_eq!(item.mesh_type, MeshType::Cube);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_discarded() {
        let endpoints = Endpoints {
            http: dead_url("http").await,
            ws: dead_url("ws").await,
        };
        let mut session = SceneSession::start("old", options(endpoints)).unwrap();
        let old_generation = session.generation();
        session.switch_org("new").unwrap();
        assert_eq!(session.generation(), old_generation + 1);

        let scene: Scene = serde_json::from_str(&scene_json()).unwrap();
        let mut events = Vec::new();
        session.accept_snapshot(old_generation, Ok(scene.clone()), &mut events);
        assert!(session.working_copy().is_none());
        assert!(events.is_empty());

        session.accept_snapshot(session.generation(), Ok(scene), &mut events);
        assert_eq!(session.items().len(), 2);
        assert_eq!(session.org(), "new");
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_no_scene() {
        let (http, _requests) = serve_http("404 Not Found", "{}".into()).await;
        let endpoints = Endpoints {
            http,
            ws: dead_url("ws").await,
        };
        let mut session = SceneSession::start("finn", options(endpoints)).unwrap();

        let events = pump_until(&mut session, |_, events| {
            events
                .iter()
                .any(|e| matches!(e, SessionEvent::SnapshotFailed { .. }))
        })
        .await;

        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SnapshotFailed { message } if message.contains("404"))));
        assert_eq!(session.status(), SessionStatus::Loading);
        assert!(session.items().is_empty());

        let mut visuals = HeadlessScene::new();
        assert_eq!(session.tick(&mut visuals, FRAME).render, TickReport::default());
    }

    #[tokio::test]
    async fn test_close_releases_working_copy() {
        let (http, _requests) = serve_http("200 OK", scene_json()).await;
        let (ws, server, _paths) = serve_ws().await;
        let mut session = SceneSession::start("finn", options(Endpoints { http, ws })).unwrap();
        pump_until(&mut session, |s, _| s.status() == SessionStatus::Live).await;

        session.close();
        let _ = server.send(ServerCmd::Send(r#"[{"id":"0","position":[1,1,1]}]"#.into()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(session.items().is_empty());
        assert_eq!(session.pump(), PumpReport::default());
    }

    #[tokio::test]
    async fn test_remote_close_schedules_fresh_channel() {
        let (http, _requests) = serve_http("200 OK", scene_json()).await;
        let (ws, server, _paths) = serve_ws().await;
        let mut opts = options(Endpoints { http, ws });
        opts.reconnect = ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
            jitter: 0.0,
        };
        let mut session = SceneSession::start("finn", opts).unwrap();
        pump_until(&mut session, |s, _| s.status() == SessionStatus::Live).await;
        let generation = session.generation();

        server.send(ServerCmd::Close).unwrap();

        // The test server only accepts one client, so the fresh channel fails
        // to connect and the next attempt backs off further.
        let events = pump_until(&mut session, |_, events| {
            events.iter().any(|e| {
                matches!(e, SessionEvent::ReconnectScheduled { attempt: 2, .. })
            })
        })
        .await;

        assert!(events.contains(&SessionEvent::ChannelClosed {
            reason: CloseReason::Remote
        }));
        let delays: Vec<(u32, u64)> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ReconnectScheduled { attempt, delay_ms } => Some((*attempt, *delay_ms)),
                _ => None,
            })
            .collect();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[0].0, 1);
        assert!((19..=20).contains(&delays[0].1), "{delays:?}");
        assert_eq!(delays[1].0, 2);
        assert!((39..=40).contains(&delays[1].1), "{delays:?}");
        assert!(events.contains(&SessionEvent::Reconnecting));
        assert!(session.generation() > generation);
        // Last known state stays visible while disconnected.
        assert_eq!(session.items().len(), 2);
    }

    #[test]
    fn test_session_event_json_shape() {
        let event = SessionEvent::ReconnectScheduled {
            attempt: 3,
            delay_ms: 400,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "reconnectScheduled");
        assert_eq!(json["data"]["delayMs"], 400);

        let closed = SessionEvent::ChannelClosed {
            reason: CloseReason::Transport("reset".into()),
        };
        let json = serde_json::to_value(&closed).unwrap();
        assert_eq!(json["data"]["reason"]["reason"], "transport");
        assert_eq!(json["data"]["reason"]["detail"], "reset");
    }
}
