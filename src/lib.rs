//! Client-side call engine for two-party mentorship video sessions.
//!
//! One [`CallSession`] per call: it opens the signaling channel for a booking,
//! negotiates a peer connection (offer/answer + trickled ICE), manages local
//! media (mute toggles, screen-share track replacement), records the local
//! stream, and tears everything down when either side hangs up. UI concerns
//! stay in the embedding application, which consumes [`CallEvent`]s and
//! supplies capture devices behind the [`MediaDevices`] trait.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use mentorcall::{CallConfig, CallSession, NoBilling, Role};
//! # async fn run(devices: Arc<dyn mentorcall::MediaDevices>) -> Result<(), mentorcall::CallError> {
//! let config = CallConfig::new("booking-42", Role::Initiator, "ws://localhost:8000");
//! let (session, mut events) = CallSession::connect(config, devices, Arc::new(NoBilling)).await?;
//! session.start_call().await?;
//! while let Some(event) = events.recv().await {
//!     // drive the UI
//! }
//! # Ok(())
//! # }
//! ```

mod call;
mod config;
mod error;
mod events;
mod media;
mod peer;
mod recorder;
mod signaling;
mod utils;

pub use call::{CallSession, NoBilling, SessionBilling};
pub use config::{CallConfig, ServerConfig};
pub use error::{CallError, MediaKind};
pub use events::CallEvent;
pub use media::{
    audio_track, screen_track, video_track, DisplayMedia, LocalTrack, MediaController,
    MediaDevices, UserMedia,
};
pub use peer::{CallStatus, CandidatePayload, NegotiationState, PeerSession, PendingCandidates, Role};
pub use recorder::{Recorder, RecorderState};
pub use signaling::{SignalMessage, SignalingTransport, WsTransport};
