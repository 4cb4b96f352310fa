use thiserror::Error;

/// Which device acquisition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Camera + microphone capture.
    UserMedia,
    /// Screen capture.
    DisplayMedia,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::UserMedia => write!(f, "camera/microphone"),
            MediaKind::DisplayMedia => write!(f, "screen capture"),
        }
    }
}

/// Everything that can go wrong during a call.
///
/// Teardown paths never return these; they are reported once at the point of
/// the failing async operation and converted into user-visible notices by the
/// embedder.
#[derive(Debug, Error)]
pub enum CallError {
    /// The host environment refused the capture permission. Fatal for the
    /// action that requested it; the call does not proceed on user media
    /// denial, screen share simply does not start on display denial.
    #[error("permission denied for {0}")]
    PermissionDenied(MediaKind),

    /// The requested capture device does not exist or failed to open.
    #[error("media device unavailable: {0}")]
    MediaUnavailable(String),

    /// The call configuration cannot be used as given.
    #[error("invalid call configuration: {0}")]
    InvalidConfig(String),

    /// The signaling channel could not be opened, or dropped mid-call.
    /// Unrecoverable for the current call; no reconnect is attempted.
    #[error("signaling channel unavailable: {0}")]
    SignalingUnavailable(String),

    /// Recording was requested before local media was acquired.
    #[error("no local media stream available")]
    NoLocalStream,

    /// The external payment-capture call failed after the call ended.
    /// Reported to the user, never undoes the completed teardown.
    #[error("session billing failed: {0}")]
    Billing(String),

    /// SDP exchange reached a state it cannot proceed from.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("webrtc error: {0}")]
    Webrtc(#[from] webrtc::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
