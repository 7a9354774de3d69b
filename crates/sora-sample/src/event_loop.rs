//! The session's event loop.
//!
//! ```text
//!   window thread ──Dispatcher::post──┐
//!                                      ▼
//!   SIGINT / SIGTERM ──► EventLoop::run (current_thread runtime)
//!                                      ▲         │
//!   signaling task ──LoopHandle::stop──┘         └─► jobs run in order
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sora_renderer::{Dispatch, Job};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

/// Cloneable handle used to stop the loop and to post work onto it.
#[derive(Clone)]
pub struct LoopHandle {
    jobs: mpsc::UnboundedSender<Job>,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl LoopHandle {
    /// Run `job` on the loop. Dropped if the loop has already stopped.
    pub fn post(&self, job: Job) {
        if self.is_stopped() || self.jobs.send(job).is_err() {
            debug!("Event loop stopped; dropping job");
        }
    }

    /// Make `run` return after the job it is currently running.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.stop.notify_one();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// The handle as a renderer [`Dispatch`].
    pub fn dispatcher(&self) -> Dispatch {
        let handle = self.clone();
        Arc::new(move |job| handle.post(job))
    }
}

pub struct EventLoop {
    handle: LoopHandle,
    jobs: mpsc::UnboundedReceiver<Job>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        let (jobs_tx, jobs) = mpsc::unbounded_channel();
        let handle = LoopHandle {
            jobs: jobs_tx,
            stop: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        Self { handle, jobs }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Run until [`LoopHandle::stop`]. SIGINT and SIGTERM call
    /// `on_signal`, which is expected to start a disconnect that ends in
    /// `stop`.
    pub async fn run(mut self, on_signal: impl Fn()) -> std::io::Result<()> {
        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        loop {
            #[cfg(unix)]
            let sigterm = terminate.recv();
            #[cfg(not(unix))]
            let sigterm = std::future::pending::<Option<()>>();

            tokio::select! {
                biased;
                _ = self.handle.stop.notified() => break,
                Some(job) = self.jobs.recv() => job(),
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("SIGINT received, disconnecting");
                    on_signal();
                }
                _ = sigterm => {
                    info!("SIGTERM received, disconnecting");
                    on_signal();
                }
            }
        }

        self.jobs.close();
        info!("Event loop stopped");
        Ok(())
    }
}
