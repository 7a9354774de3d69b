//! sora-sample: a Sora call client.
//!
//! ```text
//! main thread                    "sora-session" thread
//! ─────────────────────────      ─────────────────────────────────────────
//! WindowRenderer (eframe)  ◄──── CallClient ── SoraSignaling ── WebSocket
//!   close ──Dispatch──────────►   │   event loop (current_thread tokio)
//!                                 ├─ camera / pipe capture ─► VideoTrack
//!                                 └─ WebRtcBinPeer (GStreamer webrtcbin)
//! ```
//!
//! Without a window (`--role sendonly` and no `--show-me`) the session runs
//! on the main thread.

pub mod cli;
pub mod client;
pub mod devices;
pub mod event_loop;

pub use cli::{Cli, LogLevel, SessionConfig, VideoSource};
pub use client::{run, CallClient};
pub use devices::{MediaDevices, PeerHandle, SystemDevices};
pub use event_loop::{EventLoop, LoopHandle};
