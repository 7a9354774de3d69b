use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use sora_core::{PeerConnection, PeerEvent, RemoteTrack, Role, VideoCodecType};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::message::{ClientMessage, ServerMessage, VideoSetting};
use crate::SignalingError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// How long to wait for the server's close frame after sending ours.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── Error codes ───────────────────────────────────────────────────────────────

/// Why a signaling session ended, delivered with `on_disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingErrorCode {
    CloseSucceeded,
    CloseFailed,
    InternalError,
    InvalidParameter,
    WebsocketHandshakeFailed,
    WebsocketOnClose,
    WebsocketOnError,
    PeerConnectionStateFailed,
}

impl std::fmt::Display for SignalingErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CloseSucceeded => "CLOSE_SUCCEEDED",
            Self::CloseFailed => "CLOSE_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::WebsocketHandshakeFailed => "WEBSOCKET_HANDSHAKE_FAILED",
            Self::WebsocketOnClose => "WEBSOCKET_ONCLOSE",
            Self::WebsocketOnError => "WEBSOCKET_ONERROR",
            Self::PeerConnectionStateFailed => "PEER_CONNECTION_STATE_FAILED",
        };
        f.write_str(s)
    }
}

type Ending = (SignalingErrorCode, String);

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Tried in order until one accepts the WebSocket handshake.
    pub signaling_urls: Vec<String>,
    pub channel_id: String,
    pub role: Role,
    pub multistream: bool,
    pub video_codec_type: Option<VideoCodecType>,
    pub metadata: Option<serde_json::Value>,
    pub sora_client: String,
}

impl SignalingConfig {
    pub fn new(signaling_url: impl Into<String>, channel_id: impl Into<String>, role: Role) -> Self {
        Self {
            signaling_urls: vec![signaling_url.into()],
            channel_id: channel_id.into(),
            role,
            multistream: false,
            video_codec_type: None,
            metadata: None,
            sora_client: format!("sora-sample {}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn connect_message(&self, redirect: bool) -> ClientMessage {
        ClientMessage::Connect {
            role: self.role,
            channel_id: self.channel_id.clone(),
            multistream: self.multistream,
            metadata: self.metadata.clone(),
            video: VideoSetting::from_codec(self.video_codec_type),
            audio: true,
            sora_client: self.sora_client.clone(),
            redirect: redirect.then_some(true),
        }
    }
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Session notifications. All callbacks run on the task driving the session.
pub trait SignalingObserver: Send + Sync {
    /// The remote offer was applied; local tracks may be added now.
    fn on_set_offer(&self);
    /// The session ended. Called exactly once per connection.
    fn on_disconnect(&self, code: SignalingErrorCode, message: String);
    fn on_track(&self, track: RemoteTrack);
    fn on_remove_track(&self, track_id: &str);
}

pub trait Signaling: Send + Sync {
    fn connect(&self);
    fn disconnect(&self);
    fn peer_connection(&self) -> Arc<dyn PeerConnection>;
}

// ── SoraSignaling ─────────────────────────────────────────────────────────────

enum Command {
    Disconnect,
}

enum Flow {
    Continue,
    Redirect(String),
}

/// Receivers handed to the session task on `connect`.
struct Pending {
    commands: mpsc::UnboundedReceiver<Command>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
}

/// Sora signaling over a WebSocket, driving a [`PeerConnection`] as the
/// answering side.
pub struct SoraSignaling {
    this: Weak<SoraSignaling>,
    config: SignalingConfig,
    peer: Arc<dyn PeerConnection>,
    observer: Weak<dyn SignalingObserver>,
    commands: mpsc::UnboundedSender<Command>,
    pending: Mutex<Option<Pending>>,
    disconnected: AtomicBool,
}

impl SoraSignaling {
    pub fn new(
        config: SignalingConfig,
        peer: Arc<dyn PeerConnection>,
        peer_events: mpsc::UnboundedReceiver<PeerEvent>,
        observer: Weak<dyn SignalingObserver>,
    ) -> Arc<Self> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            peer,
            observer,
            commands,
            pending: Mutex::new(Some(Pending { commands: command_rx, peer_events })),
            disconnected: AtomicBool::new(false),
        })
    }

    fn take_pending(&self) -> Option<Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn observer(&self) -> Option<Arc<dyn SignalingObserver>> {
        self.observer.upgrade()
    }

    fn finish(&self, code: SignalingErrorCode, message: String) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Signaling closed: code={} message={}", code, message);
        if let Some(observer) = self.observer() {
            observer.on_disconnect(code, message);
        }
    }

    async fn run(&self, pending: Pending) {
        let (code, message) = self.session(pending).await;
        self.peer.close();
        self.finish(code, message);
    }

    async fn session(&self, mut pending: Pending) -> Ending {
        if self.config.signaling_urls.is_empty() {
            return (SignalingErrorCode::InvalidParameter, "no signaling url".into());
        }

        let mut ws = match open_unless_disconnected(&mut pending, &self.config.signaling_urls).await {
            Ok(ws) => ws,
            Err(ending) => return ending,
        };
        if let Err(e) = send(&mut ws, &self.config.connect_message(false)).await {
            return (SignalingErrorCode::WebsocketOnError, e.to_string());
        }

        loop {
            tokio::select! {
                command = pending.commands.recv() => match command {
                    Some(Command::Disconnect) | None => return close(ws).await,
                },

                Some(event) = pending.peer_events.recv() => {
                    if let Err(ending) = self.handle_peer_event(&mut ws, event).await {
                        return ending;
                    }
                }

                frame = ws.next() => match frame {
                    None => {
                        return (SignalingErrorCode::WebsocketOnClose, "connection closed".into())
                    }
                    Some(Err(e)) => return (SignalingErrorCode::WebsocketOnError, e.to_string()),
                    Some(Ok(Message::Text(text))) => match self.handle_text(&mut ws, &text).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Redirect(location)) => {
                            info!("Redirected to {}", location);
                            let _ = ws.close(None).await;
                            let urls = std::slice::from_ref(&location);
                            ws = match open_unless_disconnected(&mut pending, urls).await {
                                Ok(ws) => ws,
                                Err(ending) => return ending,
                            };
                            if let Err(e) = send(&mut ws, &self.config.connect_message(true)).await {
                                return (SignalingErrorCode::WebsocketOnError, e.to_string());
                            }
                        }
                        Err(ending) => return ending,
                    },
                    Some(Ok(Message::Close(frame))) => {
                        return (SignalingErrorCode::WebsocketOnClose, describe_close(frame.as_ref()))
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    async fn handle_text(&self, ws: &mut WsStream, text: &str) -> Result<Flow, Ending> {
        let msg = match ServerMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring unparsable signaling message: {}", e);
                return Ok(Flow::Continue);
            }
        };

        match msg {
            ServerMessage::Offer { sdp, client_id, connection_id, config } => {
                info!(
                    "Received offer: client_id={} connection_id={}",
                    client_id.as_deref().unwrap_or("-"),
                    connection_id.as_deref().unwrap_or("-")
                );
                if let Some(config) = config {
                    self.peer.configure_ice_servers(&config.ice_servers);
                }
                self.peer.set_remote_offer(&sdp).await.map_err(internal)?;
                if let Some(observer) = self.observer() {
                    observer.on_set_offer();
                }
                let answer = self.peer.create_answer().await.map_err(internal)?;
                send(ws, &ClientMessage::Answer { sdp: answer }).await.map_err(on_error)?;
            }
            ServerMessage::ReOffer { sdp } => {
                debug!("Received re-offer");
                self.peer.set_remote_offer(&sdp).await.map_err(internal)?;
                let answer = self.peer.create_answer().await.map_err(internal)?;
                send(ws, &ClientMessage::ReAnswer { sdp: answer }).await.map_err(on_error)?;
            }
            ServerMessage::Ping { .. } => {
                send(ws, &ClientMessage::Pong).await.map_err(on_error)?;
            }
            ServerMessage::Notify { event_type } => {
                info!("Notify: {}", event_type.as_deref().unwrap_or("(none)"));
            }
            ServerMessage::Redirect { location } => return Ok(Flow::Redirect(location)),
            ServerMessage::Switched { ignore_disconnect_websocket } => {
                info!("Switched (ignore_disconnect_websocket={:?})", ignore_disconnect_websocket);
            }
            ServerMessage::Unknown => debug!("Ignoring unknown signaling message"),
        }
        Ok(Flow::Continue)
    }

    async fn handle_peer_event(&self, ws: &mut WsStream, event: PeerEvent) -> Result<(), Ending> {
        match event {
            PeerEvent::IceCandidate { candidate, .. } => {
                send(ws, &ClientMessage::Candidate { candidate }).await.map_err(on_error)?;
            }
            PeerEvent::Track(track) => {
                info!("Remote {:?} track added: {}", track.kind, track.id);
                if let Some(observer) = self.observer() {
                    observer.on_track(track);
                }
            }
            PeerEvent::RemoveTrack { track_id } => {
                info!("Remote track removed: {}", track_id);
                if let Some(observer) = self.observer() {
                    observer.on_remove_track(&track_id);
                }
            }
            PeerEvent::ConnectionFailed { reason } => {
                return Err((SignalingErrorCode::PeerConnectionStateFailed, reason));
            }
        }
        Ok(())
    }
}

impl Signaling for SoraSignaling {
    /// Start the session on the current tokio runtime.
    fn connect(&self) {
        let Some(pending) = self.take_pending() else {
            warn!("connect() called twice");
            return;
        };
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let _ = rustls::crypto::ring::default_provider().install_default();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { this.run(pending).await });
            }
            Err(e) => self.finish(SignalingErrorCode::InternalError, e.to_string()),
        }
    }

    fn disconnect(&self) {
        if self.take_pending().is_some() {
            self.finish(SignalingErrorCode::CloseSucceeded, "not connected".into());
            return;
        }
        if self.commands.send(Command::Disconnect).is_err() {
            debug!("disconnect() after session ended");
        }
    }

    fn peer_connection(&self) -> Arc<dyn PeerConnection> {
        Arc::clone(&self.peer)
    }
}

// ── WebSocket helpers ─────────────────────────────────────────────────────────

async fn open(urls: &[String]) -> Result<WsStream, SignalingError> {
    let mut last_error = String::from("no signaling url");
    for url in urls {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _response)) => {
                info!("Connected to {}", url);
                return Ok(ws);
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", url, e);
                last_error = e.to_string();
            }
        }
    }
    Err(SignalingError::Connect(last_error))
}

/// [`open`], abandoned as soon as a disconnect is requested so a stalled
/// handshake cannot hold up shutdown.
async fn open_unless_disconnected(
    pending: &mut Pending,
    urls: &[String],
) -> Result<WsStream, Ending> {
    tokio::select! {
        result = open(urls) => {
            result.map_err(|e| (SignalingErrorCode::WebsocketHandshakeFailed, e.to_string()))
        }
        _ = pending.commands.recv() => {
            info!("Disconnect requested while connecting");
            Err((SignalingErrorCode::CloseSucceeded, "disconnected while connecting".into()))
        }
    }
}

async fn send(ws: &mut WsStream, msg: &ClientMessage) -> Result<(), SignalingError> {
    let json = msg.to_json()?;
    ws.send(Message::Text(json.into()))
        .await
        .map_err(|e| SignalingError::Send(e.to_string()))?;
    debug!("Sent {}", msg.kind());
    Ok(())
}

async fn close(mut ws: WsStream) -> Ending {
    if let Err(e) = send(&mut ws, &ClientMessage::Disconnect).await {
        return (SignalingErrorCode::CloseFailed, e.to_string());
    }
    if let Err(e) = ws.close(None).await {
        return (SignalingErrorCode::CloseFailed, e.to_string());
    }
    // Drain until the server acknowledges the close.
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    (SignalingErrorCode::CloseSucceeded, "Succeeded to close websocket".into())
}

fn describe_close(frame: Option<&CloseFrame>) -> String {
    match frame {
        Some(frame) => format!("code={} reason={}", u16::from(frame.code), frame.reason),
        None => "closed without frame".into(),
    }
}

fn internal(e: sora_core::PeerError) -> Ending {
    (SignalingErrorCode::InternalError, e.to_string())
}

fn on_error(e: SignalingError) -> Ending {
    (SignalingErrorCode::WebsocketOnError, e.to_string())
}
