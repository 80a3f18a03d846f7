use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use crate::commands::logs::SessionLogger;
use crate::error::Result;
use crate::sync::{
    CloseReason, HeadlessScene, ReconcileReport, SceneSession, SessionEvent,
    SessionOptions, SessionStatus,
};

pub const MAX_FPS: u32 = 1_000;

/// Time between frames, with `fps` clamped to `1..=MAX_FPS`.
pub fn frame_period(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.clamp(1, MAX_FPS)
}

pub struct WatchOptions {
    pub org: String,
    pub session: SessionOptions,
    pub fps: u32,
    /// Run until Ctrl-C when `None`.
    pub duration: Option<Duration>,
    pub journal: Option<PathBuf>,
    pub json: bool,
}

/// Once-per-second digest of the render loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSummary {
    pub frames: u64,
    pub status: Option<SessionStatus>,
    pub items: usize,
    /// Items with no visual yet.
    pub pending: usize,
    pub moving: usize,
    pub batches: usize,
    pub applied: usize,
    pub unknown: usize,
    pub dropped_messages: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
enum Digest<'a> {
    Frame(&'a FrameSummary),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WatchOutcome {
    pub frames: u64,
    pub snapshot_loaded: bool,
    pub status: SessionStatus,
    pub items: usize,
}

pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::SnapshotLoaded { scene, items } => {
            format!("Loaded scene \"{scene}\" with {items} items")
        }
        SessionEvent::SnapshotFailed { message } => format!("Snapshot failed: {message}"),
        SessionEvent::ChannelOpened => "Live updates connected".to_string(),
        SessionEvent::ChannelClosed { reason } => match reason {
            CloseReason::Requested => "Live updates closed".to_string(),
            CloseReason::Remote => "Server closed the live updates".to_string(),
            CloseReason::ConnectFailed(e) => format!("Could not connect live updates: {e}"),
            CloseReason::Transport(e) => format!("Live updates lost: {e}"),
            CloseReason::IdleTimeout => "Live updates went silent".to_string(),
        },
        SessionEvent::ReconnectScheduled { attempt, delay_ms } => {
            format!("Reconnecting in {delay_ms} ms (attempt {attempt})")
        }
        SessionEvent::Reconnecting => "Reconnecting...".to_string(),
    }
}

fn describe_frame(summary: &FrameSummary) -> String {
    let status = summary
        .status
        .map(|s| format!("{s:?}").to_lowercase())
        .unwrap_or_default();
    format!(
        "[{status}] {} items, {} still moving, {} awaiting visuals, {} patches applied, {} unknown ids, {} dropped messages",
        summary.items,
        summary.moving,
        summary.pending,
        summary.applied,
        summary.unknown,
        summary.dropped_messages
    )
}

fn emit<W: Write, T: Serialize>(out: &mut W, json: bool, value: &T, human: &str) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(value)?)?;
    } else {
        writeln!(out, "{human}")?;
    }
    Ok(())
}

/// Runs a session against a headless visual scene at a fixed frame rate,
/// writing events and per-second digests to `out`.
pub async fn watch<W: Write>(options: WatchOptions, out: &mut W) -> Result<WatchOutcome> {
    let journal = match &options.journal {
        Some(dir) => Some(SessionLogger::new(dir).await?),
        None => None,
    };
    if let Some(journal) = &journal {
        log::info!("Journaling to {}", journal.path().display());
        journal.log("session", &format!("watching org {}", options.org));
    }

    let mut session = SceneSession::start(&options.org, options.session.clone())?;
    let mut visuals = HeadlessScene::new();

    let fps = options.fps.clamp(1, MAX_FPS);
    let mut ticker = tokio::time::interval(frame_period(fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let deadline = options.duration.map(|d| started + d);
    let mut last_frame = started;
    let mut frames = 0u64;
    let mut snapshot_loaded = false;
    let mut window = FrameSummary::default();
    let mut reconciled = ReconcileReport::default();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            }
        }

        let now = Instant::now();
        let dt = now - last_frame;
        last_frame = now;

        visuals.instantiate(session.items());
        let frame = session.tick(&mut visuals, dt);
        frames += 1;

        for event in &frame.pump.events {
            if matches!(event, SessionEvent::SnapshotLoaded { .. }) {
                snapshot_loaded = true;
            }
            let line = describe(event);
            if let Some(journal) = &journal {
                journal.log("session", &line);
            }
            emit(out, options.json, event, &line)?;
        }

        window.batches += frame.pump.batches;
        reconciled.merge(frame.pump.reconciled);

        if frames % u64::from(fps) == 0 {
            window.frames = frames;
            window.status = Some(session.status());
            window.items = session.items().len();
            window.pending = frame.render.pending;
            window.moving = frame.render.moving;
            window.applied = reconciled.applied;
            window.unknown = reconciled.unknown;
            window.dropped_messages = session.dropped_messages();
            emit(out, options.json, &Digest::Frame(&window), &describe_frame(&window))?;
            window = FrameSummary::default();
            reconciled = ReconcileReport::default();
        }

        if deadline.is_some_and(|d| now >= d) {
            break;
        }
    }

    let outcome = WatchOutcome {
        frames,
        snapshot_loaded,
        status: session.status(),
        items: session.items().len(),
    };
    session.close();

    if !options.json {
        for object in visuals.objects() {
            writeln!(
                out,
                "  {} {:?} position {:?} rotation {:?} color {}",
                object.name,
                object.mesh_type,
                object.position,
                object.rotation,
                object.color.as_deref().unwrap_or("default")
            )?;
        }
    }

    if let Some(journal) = journal {
        journal.log("session", &format!("stopped after {frames} frames"));
        journal.finish().await;
    }
    out.flush()?;
    Ok(outcome)
}
