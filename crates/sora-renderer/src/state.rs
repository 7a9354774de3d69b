use std::sync::{Arc, Mutex, PoisonError};

use sora_core::{I420Frame, VideoSink, VideoTrack};

// ── FrameSlot ─────────────────────────────────────────────────────────────────

/// Sink that keeps only the most recent frame of a track.
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<I420Frame>>,
}

impl FrameSlot {
    /// Take the frame received since the last call, if any.
    pub fn take(&self) -> Option<I420Frame> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl VideoSink for FrameSlot {
    fn on_frame(&self, frame: &I420Frame) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.clone());
    }
}

// ── RendererState ─────────────────────────────────────────────────────────────

pub struct TrackView {
    pub track: Arc<VideoTrack>,
    pub slot: Arc<FrameSlot>,
}

impl TrackView {
    pub fn id(&self) -> &str {
        self.track.id()
    }
}

#[derive(Default)]
pub struct RendererState {
    pub tracks: Vec<TrackView>,
    /// Set by `shutdown`; the window closes on its next repaint.
    pub closing: bool,
}

impl RendererState {
    /// Start showing `track`. Adding the same track twice is a no-op.
    pub fn add(&mut self, track: Arc<VideoTrack>) {
        if self.tracks.iter().any(|view| view.id() == track.id()) {
            return;
        }
        let slot = Arc::new(FrameSlot::default());
        track.add_sink(slot.clone());
        self.tracks.push(TrackView { track, slot });
    }

    /// Stop showing the track with `track_id` and detach from its frames.
    pub fn remove(&mut self, track_id: &str) -> bool {
        let Some(index) = self.tracks.iter().position(|view| view.id() == track_id) else {
            return false;
        };
        let view = self.tracks.remove(index);
        let sink: Arc<dyn VideoSink> = view.slot;
        view.track.remove_sink(&sink);
        true
    }

    pub fn clear(&mut self) {
        let ids: Vec<String> = self.tracks.iter().map(|view| view.id().to_owned()).collect();
        for id in ids {
            self.remove(&id);
        }
    }
}

/// Shared handle passed between the event loop and the window thread.
pub type SharedState = Arc<Mutex<RendererState>>;

// ── Layout ────────────────────────────────────────────────────────────────────

/// Columns and rows of the smallest near-square grid holding `count` tiles.
pub fn grid_dimensions(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let mut cols = 1;
    while cols * cols < count {
        cols += 1;
    }
    let rows = count.div_ceil(cols);
    (cols, rows)
}

/// Largest `width × height` box with the frame's aspect ratio that fits in
/// a `cell_w × cell_h` cell.
pub fn fit_size(frame_w: u32, frame_h: u32, cell_w: f32, cell_h: f32) -> (f32, f32) {
    if frame_w == 0 || frame_h == 0 || cell_w <= 0.0 || cell_h <= 0.0 {
        return (0.0, 0.0);
    }
    let scale = (cell_w / frame_w as f32).min(cell_h / frame_h as f32);
    (frame_w as f32 * scale, frame_h as f32 * scale)
}
