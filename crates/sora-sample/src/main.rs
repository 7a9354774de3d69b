use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use sora_renderer::{Renderer, WindowRenderer};
use sora_sample::{Cli, LogLevel, SessionConfig, SystemDevices};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging ───────────────────────────────────────────────────────────
    init_logging(cli.log_level);
    info!("sora-sample v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.into_session();
    if !config.wants_renderer() {
        return run_session(config, None);
    }

    // ── Window on the main thread, session beside it ─────────────────────
    let window = WindowRenderer::new(config.window.clone());
    let renderer: Arc<dyn Renderer> = window.clone();
    let session = std::thread::Builder::new()
        .name("sora-session".into())
        .spawn(move || {
            let result = run_session(config, Some(Arc::clone(&renderer)));
            renderer.shutdown();
            result
        })
        .context("Failed to spawn session thread")?;

    window.run().context("Renderer failed")?;
    session.join().map_err(|_| anyhow!("Session thread panicked"))?
}

fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.filter_directive())),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();
}

fn run_session(config: SessionConfig, renderer: Option<Arc<dyn Renderer>>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(sora_sample::run(config, Arc::new(SystemDevices), renderer));
    if let Err(e) = &result {
        error!("Session failed: {:#}", e);
    }
    result
}
