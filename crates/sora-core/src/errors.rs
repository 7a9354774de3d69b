use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("Negotiation failed: {reason}")]
    NegotiationFailed { reason: String },

    #[error("Media pipeline error: {0}")]
    Pipeline(String),

    #[error("Peer connection closed")]
    Closed,
}
