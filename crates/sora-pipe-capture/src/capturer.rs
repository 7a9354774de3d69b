//! Pipe-backed video capturer.
//!
//! ```text
//!  writer ──► FIFO / stdin ──► [pipe-capture thread] ──► VideoSink::on_frame
//!                               poll ─ lock ─ read ─ deliver ─ unlock ─ yield
//! ```
//!
//! The capture state lives behind one mutex. `start_capture`,
//! `stop_capture` and frame delivery all take it, so a sink never observes a
//! frame from a session that has already been stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use sora_core::{monotonic_us, CaptureDevice, I420Frame, Resolution, VideoSink};
use tracing::{debug, info, warn};

use crate::pipe::{FrameRead, InputPipe, Readiness, STDIN_PATH};
use crate::CaptureError;

/// How long the reader waits for the pipe to become readable before it
/// re-checks for cancellation.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(1);

const THREAD_NAME: &str = "pipe-capture";

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeCaptureConfig {
    /// FIFO path, or `"-"` for standard input.
    pub video_fifo: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub ready_timeout: Duration,
}

impl Default for PipeCaptureConfig {
    fn default() -> Self {
        Self {
            video_fifo: STDIN_PATH.to_owned(),
            width: Resolution::VGA.width,
            height: Resolution::VGA.height,
            framerate: 30,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

// ── Cancellation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct Worker {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CaptureState {
    /// Path given to `init`, remembered so a restart can reopen it.
    path: Option<String>,
    pipe: Option<Arc<InputPipe>>,
    width: u32,
    height: u32,
    framerate: u32,
    buffer: Option<Vec<u8>>,
    started: bool,
}

// ── PipeVideoCapturer ─────────────────────────────────────────────────────────

/// Reads raw I420 frames from a named pipe (or stdin) on a dedicated thread
/// and hands them to a [`VideoSink`].
pub struct PipeVideoCapturer {
    state: Arc<Mutex<CaptureState>>,
    sink: Arc<dyn VideoSink>,
    worker: Option<Worker>,
    ready_timeout: Duration,
}

impl PipeVideoCapturer {
    pub fn new(sink: Arc<dyn VideoSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::default())),
            sink,
            worker: None,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Open `config.video_fifo` and start capturing at the configured size.
    pub fn create(config: &PipeCaptureConfig, sink: Arc<dyn VideoSink>) -> Result<Self, CaptureError> {
        let mut capturer = Self::new(sink).with_ready_timeout(config.ready_timeout);
        if let Err(e) = capturer.init(&config.video_fifo) {
            warn!("Failed to initialize pipe capturer: {}", e);
            return Err(e);
        }
        if let Err(e) = capturer.start_capture(config.width, config.height, config.framerate) {
            warn!("Failed to start pipe capture: {}", e);
            return Err(e);
        }
        Ok(capturer)
    }

    /// Open the input. `"-"` selects standard input.
    pub fn init(&mut self, path: &str) -> Result<(), CaptureError> {
        let pipe = InputPipe::open(path)?;
        info!("Pipe capturer opened {}", path);
        let mut state = self.lock();
        state.path = Some(path.to_owned());
        state.pipe = Some(Arc::new(pipe));
        Ok(())
    }

    /// Begin delivering `width × height` frames.
    ///
    /// Calling again with the same dimensions while running does nothing.
    /// Different dimensions stop the current session first and reopen the
    /// input.
    pub fn start_capture(&mut self, width: u32, height: u32, framerate: u32) -> Result<(), CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidSize { width, height });
        }
        let size = I420Frame::packed_size(width, height)
            .ok_or(CaptureError::InvalidSize { width, height })?;

        {
            let state = self.lock();
            if state.started && state.width == width && state.height == height {
                return Ok(());
            }
            if state.path.is_none() {
                return Err(CaptureError::NotInitialized);
            }
        }

        self.stop_capture();

        // Reopening a FIFO blocks until a writer appears; keep the lock free
        // meanwhile.
        let (current, path) = {
            let state = self.lock();
            (state.pipe.clone(), state.path.clone())
        };
        let pipe = match current {
            Some(pipe) => pipe,
            None => {
                let path = path.ok_or(CaptureError::NotInitialized)?;
                let pipe = Arc::new(InputPipe::open(&path)?);
                debug!("Reopened {} for {}x{}", path, width, height);
                pipe
            }
        };

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| CaptureError::Allocation { bytes: size })?;
        buffer.resize(size, 0);

        {
            let mut state = self.lock();
            state.pipe = Some(Arc::clone(&pipe));
            state.buffer = Some(buffer);
            state.width = width;
            state.height = height;
            state.framerate = framerate;
            state.started = true;
        }

        if self.worker.is_none() {
            self.spawn_worker(pipe)?;
        }
        info!("Pipe capture started: {}x{} @ {}fps", width, height, framerate);
        Ok(())
    }

    /// Stop the reader thread and release the buffer and descriptor.
    /// Standard input stays open.
    pub fn stop_capture(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.token.cancel();
            if worker.handle.join().is_err() {
                warn!("Pipe capture thread panicked");
            }
        }

        let mut state = self.lock();
        if !state.started {
            return;
        }
        state.started = false;
        state.buffer = None;
        if state.pipe.as_ref().is_some_and(|p| !p.is_stdin()) {
            state.pipe = None;
        }
        debug!("Pipe capture stopped");
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn resolution(&self) -> Resolution {
        let state = self.lock();
        Resolution { width: state.width, height: state.height }
    }

    pub fn framerate(&self) -> u32 {
        self.lock().framerate
    }

    /// Id of the running reader thread, if any.
    pub fn capture_thread_id(&self) -> Option<ThreadId> {
        self.worker.as_ref().map(|w| w.handle.thread().id())
    }

    #[cfg(test)]
    fn buffer_addr(&self) -> Option<usize> {
        self.lock().buffer.as_ref().map(|b| b.as_ptr() as usize)
    }

    fn spawn_worker(&mut self, pipe: Arc<InputPipe>) -> Result<(), CaptureError> {
        let token = CancellationToken::default();
        let reader = Reader {
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.sink),
            pipe,
            token: token.clone(),
            ready_timeout: self.ready_timeout,
        };
        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || reader.run())
            .map_err(CaptureError::Spawn)?;
        self.worker = Some(Worker { handle, token });
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureDevice for PipeVideoCapturer {
    fn stop(&mut self) {
        self.stop_capture();
    }
}

impl Drop for PipeVideoCapturer {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

// ── Reader thread ─────────────────────────────────────────────────────────────

struct Reader {
    state: Arc<Mutex<CaptureState>>,
    sink: Arc<dyn VideoSink>,
    pipe: Arc<InputPipe>,
    token: CancellationToken,
    ready_timeout: Duration,
}

impl Reader {
    fn run(self) {
        debug!("Pipe reader running on {}", self.pipe.path());
        loop {
            let readiness = self.pipe.wait_readable(self.ready_timeout);

            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if self.token.is_cancelled() {
                break;
            }

            match readiness {
                Ok(Readiness::Readable) => {}
                Ok(Readiness::TimedOut) | Ok(Readiness::Interrupted) => continue,
                Err(e) => {
                    warn!("Waiting on {} failed: {}", self.pipe.path(), e);
                    break;
                }
            }

            let state = &mut *guard;
            let Some(buffer) = state.buffer.as_mut() else {
                break;
            };
            match self.pipe.read_frame(buffer) {
                Ok(FrameRead::Complete) => {
                    let frame =
                        I420Frame::from_contiguous(state.width, state.height, buffer, monotonic_us());
                    self.sink.on_frame(&frame);
                }
                Ok(FrameRead::Incomplete { bytes }) => {
                    debug!("Discarding incomplete frame ({} of {} bytes)", bytes, buffer.len());
                }
                Ok(FrameRead::EndOfStream) => {
                    debug!("Writer closed {}", self.pipe.path());
                    break;
                }
                Err(e) => {
                    warn!("Reading {} failed: {}", self.pipe.path(), e);
                    break;
                }
            }
            drop(guard);

            thread::yield_now();
        }
        debug!("Pipe reader exiting");
    }
}
