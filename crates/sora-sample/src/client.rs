//! The call client: local tracks, signaling, and the renderer glued to the
//! event loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::Result;
use sora_core::{
    random_id, AudioTrack, CaptureDevice, LocalTrack, RemoteTrack, TrackKind, VideoTrack,
};
use sora_renderer::Renderer;
use sora_signaling::{Signaling, SignalingErrorCode, SignalingObserver};
use tracing::{debug, info, warn};

use crate::cli::{SessionConfig, VideoSource};
use crate::devices::MediaDevices;
use crate::event_loop::{EventLoop, LoopHandle};

#[derive(Default)]
struct Session {
    signaling: Option<Arc<dyn Signaling>>,
    audio: Option<Arc<AudioTrack>>,
    video: Option<Arc<VideoTrack>>,
    capturer: Option<Box<dyn CaptureDevice>>,
}

pub struct CallClient {
    this: Weak<CallClient>,
    config: SessionConfig,
    devices: Arc<dyn MediaDevices>,
    renderer: Option<Arc<dyn Renderer>>,
    event_loop: LoopHandle,
    session: Mutex<Session>,
}

impl CallClient {
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn MediaDevices>,
        renderer: Option<Arc<dyn Renderer>>,
        event_loop: LoopHandle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            devices,
            renderer,
            event_loop,
            session: Mutex::new(Session::default()),
        })
    }

    /// Build the local tracks, create the peer connection and start
    /// signaling. The outcome is reported through the observer callbacks.
    pub fn connect(&self) -> Result<()> {
        if self.config.role.sends() {
            self.create_local_tracks()?;
        }

        if let Some(renderer) = &self.renderer {
            renderer.set_dispatch(self.event_loop.dispatcher());
            let client = self.this.clone();
            renderer.set_close_handler(Arc::new(move || {
                if let Some(client) = client.upgrade() {
                    info!("Window closed, disconnecting");
                    client.disconnect();
                }
            }));
        }

        let peer = self.devices.create_peer(self.config.peer_config())?;
        let observer: Weak<dyn SignalingObserver> = self.this.clone();
        let signaling =
            self.devices.create_signaling(self.config.signaling_config(), peer, observer);
        self.lock().signaling = Some(Arc::clone(&signaling));

        info!(
            "Connecting to {:?} channel={} role={}",
            self.config.signaling_urls, self.config.channel_id, self.config.role
        );
        signaling.connect();
        Ok(())
    }

    /// Ask signaling to close; `on_disconnect` follows.
    pub fn disconnect(&self) {
        let signaling = self.lock().signaling.clone();
        match signaling {
            Some(signaling) => signaling.disconnect(),
            None => self.event_loop.stop(),
        }
    }

    fn create_local_tracks(&self) -> Result<()> {
        let mut session = self.lock();

        if let Some(options) = self.config.audio {
            info!("Audio options: {}", options);
            session.audio = Some(Arc::new(AudioTrack::new(random_id(), options)));
        }

        if self.config.video != VideoSource::Disabled {
            let track = Arc::new(VideoTrack::new(random_id()));
            let capturer =
                self.devices.open_video(&self.config, &self.config.video, track.clone())?;
            if self.config.show_me {
                if let Some(renderer) = &self.renderer {
                    renderer.add_track(Arc::clone(&track));
                }
            }
            session.video = Some(track);
            session.capturer = Some(capturer);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignalingObserver for CallClient {
    fn on_set_offer(&self) {
        let session = self.lock();
        let Some(signaling) = &session.signaling else {
            return;
        };
        let peer = signaling.peer_connection();
        let stream_id = random_id();

        let tracks = session
            .audio
            .iter()
            .map(|track| LocalTrack::Audio(Arc::clone(track)))
            .chain(session.video.iter().map(|track| LocalTrack::Video(Arc::clone(track))));
        for track in tracks {
            let (kind, id) = (track.kind(), track.id().to_owned());
            match peer.add_track(track, std::slice::from_ref(&stream_id)) {
                Ok(()) => debug!("Added local {:?} track {} to stream {}", kind, id, stream_id),
                Err(e) => warn!("Failed to add local {:?} track {}: {}", kind, id, e),
            }
        }
    }

    fn on_disconnect(&self, code: SignalingErrorCode, message: String) {
        info!("Disconnected: code={} message={}", code, message);
        let capturer = self.lock().capturer.take();
        if let Some(mut capturer) = capturer {
            capturer.stop();
        }
        if let Some(renderer) = &self.renderer {
            renderer.shutdown();
        }
        self.event_loop.stop();
    }

    fn on_track(&self, track: RemoteTrack) {
        if track.kind != TrackKind::Video {
            return;
        }
        if let (Some(renderer), Some(video)) = (&self.renderer, track.video) {
            renderer.add_track(video);
        }
    }

    fn on_remove_track(&self, track_id: &str) {
        if let Some(renderer) = &self.renderer {
            renderer.remove_track(track_id);
        }
    }
}

/// Run one call on the current (single-threaded) runtime until it ends.
pub async fn run(
    config: SessionConfig,
    devices: Arc<dyn MediaDevices>,
    renderer: Option<Arc<dyn Renderer>>,
) -> Result<()> {
    let event_loop = EventLoop::new();
    let client = CallClient::new(config, devices, renderer, event_loop.handle());
    client.connect()?;

    let on_signal = Arc::clone(&client);
    event_loop.run(move || on_signal.disconnect()).await?;
    Ok(())
}
