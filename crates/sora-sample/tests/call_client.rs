//! Drives `sora_sample::run` end to end with fake devices, peer, signaling
//! and renderer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use sora_core::{
    CaptureDevice, IceServer, LocalTrack, PeerConnection, PeerError, RemoteTrack, TrackKind,
    VideoSink, VideoTrack,
};
use sora_media::PeerConfig;
use sora_renderer::{Dispatch, Renderer};
use sora_sample::{Cli, MediaDevices, PeerHandle, SessionConfig, VideoSource};
use sora_signaling::{Signaling, SignalingConfig, SignalingErrorCode, SignalingObserver};
use tokio::sync::mpsc;

// ── Fakes ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakePeer {
    added: Mutex<Vec<(TrackKind, Vec<String>)>>,
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn configure_ice_servers(&self, _servers: &[IceServer]) {}

    async fn set_remote_offer(&self, _sdp: &str) -> Result<(), PeerError> {
        Ok(())
    }

    async fn create_answer(&self) -> Result<String, PeerError> {
        Ok("answer".into())
    }

    fn add_track(&self, track: LocalTrack, stream_ids: &[String]) -> Result<(), PeerError> {
        self.added.lock().unwrap().push((track.kind(), stream_ids.to_vec()));
        Ok(())
    }

    fn close(&self) {}
}

#[derive(Clone, Copy)]
enum Script {
    /// Offer, then the server closes.
    OfferThenClose,
    /// Offer, a remote video track comes and goes, then the server closes.
    RemoteTrack,
    /// Offer, then stay up until `disconnect()`.
    StayConnected,
}

struct FakeSignaling {
    script: Script,
    peer: Arc<FakePeer>,
    observer: Weak<dyn SignalingObserver>,
    done: AtomicBool,
}

impl FakeSignaling {
    fn observer(&self) -> Arc<dyn SignalingObserver> {
        self.observer.upgrade().expect("client alive")
    }

    fn finish(&self, code: SignalingErrorCode) {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.observer().on_disconnect(code, "done".into());
        }
    }
}

impl Signaling for FakeSignaling {
    fn connect(&self) {
        let observer = self.observer();
        observer.on_set_offer();
        match self.script {
            Script::OfferThenClose => self.finish(SignalingErrorCode::WebsocketOnClose),
            Script::RemoteTrack => {
                observer.on_track(RemoteTrack {
                    id: "remote-audio".into(),
                    kind: TrackKind::Audio,
                    video: None,
                });
                observer.on_track(RemoteTrack {
                    id: "remote-video".into(),
                    kind: TrackKind::Video,
                    video: Some(Arc::new(VideoTrack::new("remote-video"))),
                });
                observer.on_remove_track("remote-video");
                self.finish(SignalingErrorCode::WebsocketOnClose);
            }
            Script::StayConnected => {}
        }
    }

    fn disconnect(&self) {
        self.finish(SignalingErrorCode::CloseSucceeded);
    }

    fn peer_connection(&self) -> Arc<dyn PeerConnection> {
        self.peer.clone()
    }
}

struct FakeCapture {
    stopped: Arc<AtomicBool>,
}

impl CaptureDevice for FakeCapture {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct FakeDevices {
    script: Script,
    peer: Arc<FakePeer>,
    opened: Mutex<Vec<VideoSource>>,
    capture_stopped: Arc<AtomicBool>,
}

impl FakeDevices {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            peer: Arc::new(FakePeer::default()),
            opened: Mutex::new(Vec::new()),
            capture_stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    fn added_kinds(&self) -> Vec<TrackKind> {
        self.peer.added.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }
}

impl MediaDevices for FakeDevices {
    fn open_video(
        &self,
        _config: &SessionConfig,
        source: &VideoSource,
        _sink: Arc<dyn VideoSink>,
    ) -> Result<Box<dyn CaptureDevice>> {
        self.opened.lock().unwrap().push(source.clone());
        Ok(Box::new(FakeCapture { stopped: Arc::clone(&self.capture_stopped) }))
    }

    fn create_peer(&self, _config: PeerConfig) -> Result<PeerHandle> {
        let (_events_tx, events) = mpsc::unbounded_channel();
        let peer: Arc<dyn PeerConnection> = self.peer.clone();
        Ok((peer, events))
    }

    fn create_signaling(
        &self,
        _config: SignalingConfig,
        _peer: PeerHandle,
        observer: Weak<dyn SignalingObserver>,
    ) -> Arc<dyn Signaling> {
        Arc::new(FakeSignaling {
            script: self.script,
            peer: Arc::clone(&self.peer),
            observer,
            done: AtomicBool::new(false),
        })
    }
}

#[derive(Default)]
struct RecordingRenderer {
    events: Mutex<Vec<String>>,
    dispatch: Mutex<Option<Dispatch>>,
    on_close: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl RecordingRenderer {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// What the window does when the user closes it.
    fn close_window(&self) {
        let dispatch = self.dispatch.lock().unwrap().clone().expect("dispatch set");
        let on_close = self.on_close.lock().unwrap().clone().expect("close handler set");
        dispatch(Box::new(move || on_close()));
    }
}

impl Renderer for RecordingRenderer {
    fn add_track(&self, track: Arc<VideoTrack>) {
        self.events.lock().unwrap().push(format!("add:{}", track.id()));
    }

    fn remove_track(&self, track_id: &str) {
        self.events.lock().unwrap().push(format!("remove:{track_id}"));
    }

    fn set_dispatch(&self, dispatch: Dispatch) {
        *self.dispatch.lock().unwrap() = Some(dispatch);
    }

    fn set_close_handler(&self, handler: Arc<dyn Fn() + Send + Sync>) {
        *self.on_close.lock().unwrap() = Some(handler);
    }

    fn shutdown(&self) {
        self.events.lock().unwrap().push("shutdown".into());
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn session(args: &[&str]) -> SessionConfig {
    let base = ["sora-sample", "--signaling-url", "ws://127.0.0.1:1/signaling", "--channel-id", "c"];
    Cli::try_parse_from(base.iter().chain(args)).unwrap().into_session()
}

async fn run(
    config: SessionConfig,
    devices: Arc<FakeDevices>,
    renderer: Option<Arc<dyn Renderer>>,
) {
    tokio::time::timeout(Duration::from_secs(5), sora_sample::run(config, devices, renderer))
        .await
        .expect("session ended")
        .unwrap();
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sendonly_with_video_device_publishes_only_video() {
    let device = tempfile::NamedTempFile::new().unwrap();
    let config = session(&[
        "--role",
        "sendonly",
        "--no-audio-device",
        "--video-device",
        device.path().to_str().unwrap(),
    ]);
    assert!(!config.wants_renderer());

    let devices = FakeDevices::new(Script::OfferThenClose);
    run(config, Arc::clone(&devices), None).await;

    assert_eq!(devices.added_kinds(), vec![TrackKind::Video]);
    assert_eq!(
        *devices.opened.lock().unwrap(),
        vec![VideoSource::Camera { device: Some(device.path().to_str().unwrap().to_owned()) }]
    );
    assert!(devices.capture_stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn sendrecv_adds_audio_then_video_under_one_stream() {
    let config = session(&["--role", "sendrecv", "--video-fifo", "-"]);
    let devices = FakeDevices::new(Script::OfferThenClose);
    let renderer = Arc::new(RecordingRenderer::default());
    run(config, Arc::clone(&devices), Some(renderer.clone())).await;

    let added = devices.peer.added.lock().unwrap().clone();
    assert_eq!(added.len(), 2);
    assert_eq!(added[0].0, TrackKind::Audio);
    assert_eq!(added[1].0, TrackKind::Video);
    assert_eq!(added[0].1, added[1].1);
    assert_eq!(added[0].1[0].len(), 32);
    assert_eq!(*devices.opened.lock().unwrap(), vec![VideoSource::Fifo { path: "-".into() }]);
    assert_eq!(renderer.events(), vec!["shutdown".to_owned()]);
}

#[tokio::test]
async fn recvonly_publishes_nothing() {
    let config = session(&["--role", "recvonly"]);
    let devices = FakeDevices::new(Script::OfferThenClose);
    let renderer = Arc::new(RecordingRenderer::default());
    run(config, Arc::clone(&devices), Some(renderer)).await;

    assert!(devices.added_kinds().is_empty());
    assert!(devices.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn remote_video_reaches_the_renderer_and_leaves_again() {
    let config = session(&["--role", "recvonly"]);
    let devices = FakeDevices::new(Script::RemoteTrack);
    let renderer = Arc::new(RecordingRenderer::default());
    run(config, devices, Some(renderer.clone())).await;

    assert_eq!(
        renderer.events(),
        vec!["add:remote-video".to_owned(), "remove:remote-video".to_owned(), "shutdown".to_owned()]
    );
}

#[tokio::test]
async fn show_me_renders_the_local_track() {
    let config = session(&["--role", "sendonly", "--no-audio-device", "--show-me"]);
    let devices = FakeDevices::new(Script::OfferThenClose);
    let renderer = Arc::new(RecordingRenderer::default());
    run(config, devices, Some(renderer.clone())).await;

    let events = renderer.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].starts_with("add:"));
    assert_eq!(events[1], "shutdown");
}

#[cfg(unix)]
#[tokio::test]
async fn sigterm_disconnects_and_ends_the_session() {
    // Keep SIGTERM from killing the test process before the loop listens.
    let _guard =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).unwrap();

    let config = session(&["--role", "recvonly"]);
    let devices = FakeDevices::new(Script::StayConnected);
    let renderer = Arc::new(RecordingRenderer::default());

    let ended = Arc::new(AtomicBool::new(false));
    let sender = {
        let ended = Arc::clone(&ended);
        std::thread::spawn(move || {
            while !ended.load(Ordering::SeqCst) {
                unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
                std::thread::sleep(Duration::from_millis(50));
            }
        })
    };

    run(config, devices, Some(renderer.clone())).await;
    ended.store(true, Ordering::SeqCst);
    sender.join().unwrap();

    assert_eq!(renderer.events(), vec!["shutdown".to_owned()]);
}

#[tokio::test]
async fn closing_the_window_disconnects() {
    let config = session(&["--role", "recvonly"]);
    let devices = FakeDevices::new(Script::StayConnected);
    let renderer = Arc::new(RecordingRenderer::default());

    let window = Arc::clone(&renderer);
    std::thread::spawn(move || {
        while window.dispatch.lock().unwrap().is_none() || window.on_close.lock().unwrap().is_none() {
            std::thread::sleep(Duration::from_millis(5));
        }
        window.close_window();
    });

    run(config, devices, Some(renderer.clone())).await;
    assert_eq!(renderer.events(), vec!["shutdown".to_owned()]);
}
