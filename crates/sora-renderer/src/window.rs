//! Native window showing every attached track in a grid.
//!
//! The window must run on the main thread (`WindowRenderer::run`); the
//! session event loop drives [`Renderer`] from another thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use egui::{Color32, ColorImage, Rect, TextureHandle, TextureOptions, Vec2};
use sora_core::VideoTrack;
use tracing::{debug, info};

use crate::state::{fit_size, grid_dimensions, RendererState, SharedState};
use crate::{Dispatch, Renderer, RendererError};

const REPAINT_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self { title: "Sora Sample".into(), width: 640, height: 480, fullscreen: false }
    }
}

#[derive(Default)]
struct Hooks {
    dispatch: Option<Dispatch>,
    on_close: Option<Arc<dyn Fn() + Send + Sync>>,
    ctx: Option<egui::Context>,
}

// ── WindowRenderer ────────────────────────────────────────────────────────────

pub struct WindowRenderer {
    options: WindowOptions,
    state: SharedState,
    hooks: Mutex<Hooks>,
}

impl WindowRenderer {
    pub fn new(options: WindowOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            state: Arc::new(Mutex::new(RendererState::default())),
            hooks: Mutex::new(Hooks::default()),
        })
    }

    pub fn options(&self) -> &WindowOptions {
        &self.options
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.lock_state().tracks.iter().map(|view| view.id().to_owned()).collect()
    }

    /// Open the window and block until it is closed.
    pub fn run(self: Arc<Self>) -> Result<(), RendererError> {
        let viewport = egui::ViewportBuilder::default()
            .with_title(self.options.title.clone())
            .with_inner_size([self.options.width as f32, self.options.height as f32])
            .with_fullscreen(self.options.fullscreen)
            .with_resizable(true);
        let native_options = eframe::NativeOptions { viewport, ..Default::default() };

        let title = self.options.title.clone();
        let renderer = self;
        eframe::run_native(
            &title,
            native_options,
            Box::new(move |cc| {
                renderer.lock_hooks().ctx = Some(cc.egui_ctx.clone());
                Ok(Box::new(RendererApp { renderer, textures: HashMap::new(), close_sent: false }))
            }),
        )
        .map_err(|e| RendererError::InitializationFailed(e.to_string()))?;

        info!("Renderer window closed");
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, RendererState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_hooks(&self) -> MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn repaint(&self) {
        if let Some(ctx) = &self.lock_hooks().ctx {
            ctx.request_repaint();
        }
    }

    /// The user closed the window: hand the close handler to the event loop.
    fn dispatch_close(&self) {
        let hooks = self.lock_hooks();
        let (Some(dispatch), Some(on_close)) = (hooks.dispatch.clone(), hooks.on_close.clone())
        else {
            return;
        };
        drop(hooks);
        dispatch(Box::new(move || on_close()));
    }
}

impl Renderer for WindowRenderer {
    fn add_track(&self, track: Arc<VideoTrack>) {
        debug!("Renderer: add track {}", track.id());
        self.lock_state().add(track);
        self.repaint();
    }

    fn remove_track(&self, track_id: &str) {
        if self.lock_state().remove(track_id) {
            debug!("Renderer: removed track {}", track_id);
        }
        self.repaint();
    }

    fn set_dispatch(&self, dispatch: Dispatch) {
        self.lock_hooks().dispatch = Some(dispatch);
    }

    fn set_close_handler(&self, handler: Arc<dyn Fn() + Send + Sync>) {
        self.lock_hooks().on_close = Some(handler);
    }

    fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            state.clear();
            state.closing = true;
        }
        if let Some(ctx) = &self.lock_hooks().ctx {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

// ── eframe::App ───────────────────────────────────────────────────────────────

struct RendererApp {
    renderer: Arc<WindowRenderer>,
    textures: HashMap<String, (TextureHandle, [usize; 2])>,
    close_sent: bool,
}

impl eframe::App for RendererApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let closing = self.renderer.lock_state().closing;
        if closing {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        if ctx.input(|i| i.viewport().close_requested()) && !self.close_sent {
            self.close_sent = true;
            self.renderer.dispatch_close();
        }

        self.upload_frames(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let area = ui.max_rect();
                let ids = self.renderer.track_ids();
                let (cols, rows) = grid_dimensions(ids.len());
                if cols == 0 {
                    return;
                }
                let cell = Vec2::new(area.width() / cols as f32, area.height() / rows as f32);

                for (index, id) in ids.iter().enumerate() {
                    let Some((texture, [w, h])) = self.textures.get(id) else {
                        continue;
                    };
                    let origin = area.min
                        + Vec2::new((index % cols) as f32 * cell.x, (index / cols) as f32 * cell.y);
                    let cell_rect = Rect::from_min_size(origin, cell);
                    let (fw, fh) = fit_size(*w as u32, *h as u32, cell.x, cell.y);
                    let rect = Rect::from_center_size(cell_rect.center(), Vec2::new(fw, fh));
                    ui.painter().image(
                        texture.id(),
                        rect,
                        Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
            });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}

impl RendererApp {
    /// Convert each track's newest frame to a texture.
    fn upload_frames(&mut self, ctx: &egui::Context) {
        let pending: Vec<_> = {
            let state = self.renderer.lock_state();
            self.textures.retain(|id, _| state.tracks.iter().any(|view| view.id() == id));
            state
                .tracks
                .iter()
                .filter_map(|view| view.slot.take().map(|frame| (view.id().to_owned(), frame)))
                .collect()
        };

        for (id, frame) in pending {
            let size = [frame.width() as usize, frame.height() as usize];
            let image = ColorImage::from_rgba_unmultiplied(size, &frame.to_rgba());
            match self.textures.get_mut(&id) {
                Some((texture, current)) => {
                    texture.set(image, TextureOptions::LINEAR);
                    *current = size;
                }
                None => {
                    let texture = ctx.load_texture(id.clone(), image, TextureOptions::LINEAR);
                    self.textures.insert(id, (texture, size));
                }
            }
        }
    }
}
