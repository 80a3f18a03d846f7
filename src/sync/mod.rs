pub mod backoff;
pub mod channel;
pub mod damping;
pub mod fetch;
pub mod reconcile;
pub mod render;
pub mod session;

pub use backoff::{Backoff, ReconnectPolicy};
pub use channel::{ChannelEvent, ChannelState, CloseReason, DeltaChannel, Heartbeat};
pub use fetch::SnapshotFetcher;
pub use reconcile::{apply, ReconcileReport};
pub use render::{
    ColorMode, HeadlessScene, RenderBinder, Smoothing, TickReport, VisualObject, VisualScene,
};
pub use session::{
    Endpoints, FrameReport, PumpReport, SceneSession, SessionEvent, SessionOptions, SessionStatus,
};
