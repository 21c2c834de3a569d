//! Host-side session management for an embedded guest frame.
//!
//! This is the layer applications use. Mount a frame, complete the
//! handshake under a deadline, then keep navigation, title and auth state
//! in sync between host and guest.

pub mod connection;
pub mod error;
pub mod guest;
pub mod host;
pub mod monitor;
pub mod navigation;
pub mod orchestrator;
pub mod payload;
pub mod timer;

pub use connection::{
    Channels, ConnectFuture, Connection, ConnectionConfig, ConnectionEvents, ConnectionState,
    FrameLink,
};
pub use error::{ConnectionError, Result};
pub use guest::{GuestBuilder, GuestPeer};
pub use host::{
    channel_from_frame_url, frame_url_with_channel, AuthResolution, FrameRequest, HistoryMode,
    HostEnvironment, LoginRequest,
};
pub use monitor::{ElapsedCallback, MonitorConfig, MonitorState, TimeoutMonitor};
pub use navigation::{
    guest_path_from_host, host_location_for, normalize_path, NavigationPath, NextRequest,
    PathKind,
};
pub use orchestrator::{FrameOrchestrator, OrchestratorConfig, Overlay, RenderObserver, RenderState};
#[cfg(feature = "async")]
pub use timer::TokioScheduler;
pub use timer::{ManualScheduler, Scheduler, Task, TimerId};
