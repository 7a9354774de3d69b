//! Sora signaling wire messages (JSON text frames, `type` discriminator).

use serde::{Deserialize, Serialize};
use sora_core::{IceServer, Role, VideoCodecType};

// ── Client → server ───────────────────────────────────────────────────────────

/// `video` field of `connect`: either a codec selection or a plain switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VideoSetting {
    Enabled(bool),
    Codec { codec_type: VideoCodecType },
}

impl VideoSetting {
    pub fn from_codec(codec: Option<VideoCodecType>) -> Self {
        match codec {
            Some(codec_type) => Self::Codec { codec_type },
            None => Self::Enabled(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect {
        role: Role,
        channel_id: String,
        multistream: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
        video: VideoSetting,
        audio: bool,
        sora_client: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        redirect: Option<bool>,
    },
    Answer {
        sdp: String,
    },
    #[serde(rename = "re-answer")]
    ReAnswer {
        sdp: String,
    },
    Candidate {
        candidate: String,
    },
    Pong,
    Disconnect,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Answer { .. } => "answer",
            Self::ReAnswer { .. } => "re-answer",
            Self::Candidate { .. } => "candidate",
            Self::Pong => "pong",
            Self::Disconnect => "disconnect",
        }
    }
}

// ── Server → client ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OfferConfig {
    #[serde(rename = "iceServers", default)]
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Offer {
        sdp: String,
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        connection_id: Option<String>,
        #[serde(default)]
        config: Option<OfferConfig>,
    },
    #[serde(rename = "re-offer")]
    ReOffer {
        sdp: String,
    },
    Ping {
        #[serde(default)]
        stats: Option<bool>,
    },
    Notify {
        #[serde(default)]
        event_type: Option<String>,
    },
    Redirect {
        location: String,
    },
    Switched {
        #[serde(default)]
        ignore_disconnect_websocket: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn as_value(msg: &ClientMessage) -> Value {
        serde_json::from_str(&msg.to_json().unwrap()).unwrap()
    }

    #[test]
    fn connect_with_codec_and_metadata() {
        let msg = ClientMessage::Connect {
            role: Role::SendRecv,
            channel_id: "sora".into(),
            multistream: true,
            metadata: Some(json!({"access_token": "xyz"})),
            video: VideoSetting::from_codec(Some(VideoCodecType::Vp9)),
            audio: true,
            sora_client: "sora-sample 0.1.0".into(),
            redirect: None,
        };
        assert_eq!(
            as_value(&msg),
            json!({
                "type": "connect",
                "role": "sendrecv",
                "channel_id": "sora",
                "multistream": true,
                "metadata": {"access_token": "xyz"},
                "video": {"codec_type": "VP9"},
                "audio": true,
                "sora_client": "sora-sample 0.1.0",
            })
        );
    }

    #[test]
    fn connect_without_codec_sends_video_true() {
        let msg = ClientMessage::Connect {
            role: Role::RecvOnly,
            channel_id: "c".into(),
            multistream: false,
            metadata: None,
            video: VideoSetting::from_codec(None),
            audio: true,
            sora_client: "x".into(),
            redirect: Some(true),
        };
        let value = as_value(&msg);
        assert_eq!(value["video"], json!(true));
        assert_eq!(value["redirect"], json!(true));
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn simple_client_messages() {
        assert_eq!(as_value(&ClientMessage::Pong), json!({"type": "pong"}));
        assert_eq!(as_value(&ClientMessage::Disconnect), json!({"type": "disconnect"}));
        assert_eq!(
            as_value(&ClientMessage::Answer { sdp: "v=0".into() }),
            json!({"type": "answer", "sdp": "v=0"})
        );
        assert_eq!(
            as_value(&ClientMessage::ReAnswer { sdp: "v=0".into() }),
            json!({"type": "re-answer", "sdp": "v=0"})
        );
        assert_eq!(
            as_value(&ClientMessage::Candidate { candidate: "candidate:1 1 udp".into() }),
            json!({"type": "candidate", "candidate": "candidate:1 1 udp"})
        );
    }

    #[test]
    fn parses_offer_with_ice_servers() {
        let text = r#"{
            "type": "offer",
            "sdp": "v=0\r\n",
            "client_id": "C1",
            "connection_id": "K1",
            "config": {"iceServers": [
                {"urls": ["turn:turn.example.com:3478"], "username": "u", "credential": "p"}
            ]},
            "mid": {"video": "0"}
        }"#;
        let ServerMessage::Offer { sdp, client_id, config, .. } = ServerMessage::parse(text).unwrap()
        else {
            panic!("not an offer");
        };
        assert_eq!(sdp, "v=0\r\n");
        assert_eq!(client_id.as_deref(), Some("C1"));
        let servers = config.unwrap().ice_servers;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["turn:turn.example.com:3478".to_owned()]);
        assert_eq!(servers[0].username.as_deref(), Some("u"));
    }

    #[test]
    fn parses_control_messages() {
        assert_eq!(
            ServerMessage::parse(r#"{"type":"ping","stats":false}"#).unwrap(),
            ServerMessage::Ping { stats: Some(false) }
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type":"notify","event_type":"connection.created","role":"sendonly"}"#)
                .unwrap(),
            ServerMessage::Notify { event_type: Some("connection.created".into()) }
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type":"redirect","location":"wss://b.example.com/signaling"}"#)
                .unwrap(),
            ServerMessage::Redirect { location: "wss://b.example.com/signaling".into() }
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type":"re-offer","sdp":"v=0"}"#).unwrap(),
            ServerMessage::ReOffer { sdp: "v=0".into() }
        );
    }

    #[test]
    fn unknown_types_are_tolerated() {
        assert_eq!(
            ServerMessage::parse(r#"{"type":"push","data":{}}"#).unwrap(),
            ServerMessage::Unknown
        );
        assert!(ServerMessage::parse("not json").is_err());
    }
}
