pub mod state;
pub mod window;

pub use state::{grid_dimensions, RendererState, SharedState};
pub use window::{WindowOptions, WindowRenderer};

use std::sync::Arc;

use sora_core::VideoTrack;
use thiserror::Error;

/// Work posted from the renderer onto the session's event loop.
pub type Job = Box<dyn FnOnce() + Send>;

/// Posts a [`Job`] onto the event loop. Jobs posted after the loop has
/// stopped are dropped.
pub type Dispatch = Arc<dyn Fn(Job) + Send + Sync>;

// MARK: - Renderer trait

/// Displays a set of video tracks.
///
/// Track add/remove calls come from the event loop; frames arrive on capture
/// or decoder threads through each track's sinks.
pub trait Renderer: Send + Sync {
    fn add_track(&self, track: Arc<VideoTrack>);

    fn remove_track(&self, track_id: &str);

    /// Route renderer-originated work (e.g. the window being closed) through
    /// `dispatch`.
    fn set_dispatch(&self, dispatch: Dispatch);

    /// Handler dispatched when the user closes the window.
    fn set_close_handler(&self, handler: Arc<dyn Fn() + Send + Sync>);

    /// Close the window and drop all tracks.
    fn shutdown(&self);
}

// MARK: - RendererError

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Failed to initialize renderer: {0}")]
    InitializationFailed(String),
}
