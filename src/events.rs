use crate::peer::state::CallStatus;
use crate::peer::types::Role;
use std::sync::Arc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

/// Notifications for the embedding UI, delivered over an unbounded mpsc
/// channel. None of these require a response; dropping the receiver simply
/// mutes them.
pub enum CallEvent {
    /// Waiting → InCall → Completed.
    StatusChanged(CallStatus),
    /// One tick per second while the call is running; payload is total
    /// elapsed seconds.
    Tick(u64),
    /// Remote media arrived; attach it to the remote display sink.
    RemoteTrack(Arc<TrackRemote>),
    /// Underlying peer connection state, for diagnostics display.
    ConnectionState(RTCPeerConnectionState),
    /// Microphone enabled/disabled after a toggle.
    MicToggled(bool),
    /// Camera enabled/disabled after a toggle.
    CamToggled(bool),
    /// Screen share started (true) or stopped (false); the local preview
    /// should switch source accordingly.
    ScreenShare(bool),
    /// Local recording started (true) or stopped (false).
    RecordingChanged(bool),
    /// The remote party started or stopped recording (advisory).
    PeerRecording { recording: bool, sender: Role },
    /// The remote party ended the session; local teardown already ran.
    RemoteEnded,
    /// The payment-capture call failed after the call ended. The call stays
    /// Completed.
    BillingFailed(String),
    /// The signaling channel dropped. Mid-call this is treated as a remote
    /// hangup and arrives after the matching `RemoteEnded`.
    SignalingClosed,
}

impl std::fmt::Debug for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallEvent::StatusChanged(s) => write!(f, "StatusChanged({s:?})"),
            CallEvent::Tick(t) => write!(f, "Tick({t})"),
            CallEvent::RemoteTrack(track) => write!(f, "RemoteTrack({})", track.id()),
            CallEvent::ConnectionState(s) => write!(f, "ConnectionState({s:?})"),
            CallEvent::MicToggled(on) => write!(f, "MicToggled({on})"),
            CallEvent::CamToggled(on) => write!(f, "CamToggled({on})"),
            CallEvent::ScreenShare(on) => write!(f, "ScreenShare({on})"),
            CallEvent::RecordingChanged(on) => write!(f, "RecordingChanged({on})"),
            CallEvent::PeerRecording { recording, sender } => {
                write!(f, "PeerRecording({recording}, {sender})")
            }
            CallEvent::RemoteEnded => write!(f, "RemoteEnded"),
            CallEvent::BillingFailed(e) => write!(f, "BillingFailed({e})"),
            CallEvent::SignalingClosed => write!(f, "SignalingClosed"),
        }
    }
}
