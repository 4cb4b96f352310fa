use crate::config::CallConfig;
use crate::error::CallError;
use crate::events::CallEvent;
use crate::media::UserMedia;
use crate::peer::ice::PendingCandidates;
use crate::peer::state::NegotiationState;
use crate::peer::types::CandidatePayload;
use crate::signaling::{SignalMessage, SignalingTransport};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

/// Media negotiation state machine for one call: owns the single
/// `RTCPeerConnection`, wires local tracks in and remote tracks out, and
/// exchanges SDP/ICE over the signaling transport.
///
/// Locally gathered candidates are trickled out as soon as they are
/// discovered, regardless of negotiation phase. Inbound candidates that beat
/// the remote description are buffered by the caller in
/// [`PendingCandidates`] and drained here once the description is set.
pub struct PeerSession {
    pc: Arc<RTCPeerConnection>,
    state: Mutex<NegotiationState>,
    transport: Arc<dyn SignalingTransport>,
}

impl PeerSession {
    pub async fn new(
        config: &CallConfig,
        transport: Arc<dyn SignalingTransport>,
        events: mpsc::UnboundedSender<CallEvent>,
    ) -> Result<Self, CallError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        let pc = Arc::new(api.new_peer_connection(config.rtc_config()).await?);

        let candidate_transport = transport.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let transport = candidate_transport.clone();
            Box::pin(async move {
                let Some(c) = cand else {
                    // null candidate marks the end of gathering
                    tracing::debug!(target: "call", "ICE candidate gathering completed");
                    return;
                };
                match c.to_json() {
                    Ok(init) => {
                        let candidate = CandidatePayload {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        };
                        let _ = transport
                            .send(SignalMessage::IceCandidate { candidate })
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(target: "call", error = %e, "failed to serialize local candidate");
                    }
                }
            })
        }));

        let track_events = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            tracing::info!(target: "call", id = %track.id(), kind = ?track.kind(), "remote track arrived");
            let _ = track_events.send(CallEvent::RemoteTrack(track));
            Box::pin(async {})
        }));

        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            tracing::debug!(target: "call", state = ?st, "peer connection state changed");
            let _ = events.send(CallEvent::ConnectionState(st));
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            state: Mutex::new(NegotiationState::Idle),
            transport,
        })
    }

    pub fn state(&self) -> NegotiationState {
        *self.state.lock().unwrap()
    }

    fn advance(&self, next: NegotiationState) {
        let mut state = self.state.lock().unwrap();
        if state.can_advance(next) {
            tracing::debug!(target: "call", from = ?*state, to = ?next, "negotiation state");
            *state = next;
        } else if *state != next {
            debug_assert!(false, "illegal negotiation transition {:?} -> {next:?}", *state);
            tracing::warn!(target: "call", from = ?*state, to = ?next, "ignoring illegal negotiation transition");
        }
    }

    /// Attach the local audio and video tracks; returns the video sender so
    /// screen share can replace its track later.
    pub async fn add_local_tracks(&self, user: &UserMedia) -> Result<Arc<RTCRtpSender>, CallError> {
        let audio: Arc<dyn TrackLocal + Send + Sync> = user.audio.track();
        self.pc.add_track(audio).await?;
        let video: Arc<dyn TrackLocal + Send + Sync> = user.video.track();
        let video_sender = self.pc.add_track(video).await?;
        Ok(video_sender)
    }

    /// Initiator path: create the offer, publish it as local description and
    /// send it out. The session stays in Negotiating until the answer comes
    /// back; no timeout applies.
    pub async fn start_negotiation(&self) -> Result<(), CallError> {
        self.advance(NegotiationState::Negotiating);
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        let desc = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| CallError::Negotiation("local description missing after offer".into()))?;
        self.transport
            .send(SignalMessage::Offer { sdp: desc.sdp })
            .await
    }

    /// Responder path: accept the remote offer, drain any candidates queued
    /// ahead of it, then answer. A second offer arriving when a remote
    /// description exists loses the race and is ignored (first-writer-wins).
    pub async fn handle_offer(
        &self,
        sdp: String,
        pending: &PendingCandidates,
    ) -> Result<(), CallError> {
        if self.pc.remote_description().await.is_some() {
            tracing::debug!(target: "call", "remote description already set, ignoring offer");
            return Ok(());
        }
        self.advance(NegotiationState::Negotiating);

        let offer = RTCSessionDescription::offer(sdp)?;
        self.pc.set_remote_description(offer).await?;
        pending.apply_to(&self.pc).await;

        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer).await?;
        let desc = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| CallError::Negotiation("local description missing after answer".into()))?;
        self.transport
            .send(SignalMessage::Answer { sdp: desc.sdp })
            .await?;

        self.advance(NegotiationState::Connected);
        Ok(())
    }

    /// Initiator path: apply the answer. Skipped when a remote description is
    /// already present, so duplicate or late answers are a silent no-op.
    pub async fn handle_answer(
        &self,
        sdp: String,
        pending: &PendingCandidates,
    ) -> Result<(), CallError> {
        if self.pc.remote_description().await.is_some() {
            tracing::debug!(target: "call", "remote description already set, ignoring answer");
            return Ok(());
        }
        let answer = RTCSessionDescription::answer(sdp)?;
        self.pc.set_remote_description(answer).await?;
        pending.apply_to(&self.pc).await;
        self.advance(NegotiationState::Connected);
        Ok(())
    }

    /// Apply a remote candidate now, or queue it until the remote description
    /// exists. Application failures are logged, never fatal.
    pub async fn add_remote_candidate(
        &self,
        candidate: CandidatePayload,
        pending: &PendingCandidates,
    ) {
        if self.pc.remote_description().await.is_some() {
            if let Err(e) = self.pc.add_ice_candidate(candidate.into_init()).await {
                tracing::warn!(target: "call", error = %e, "failed to add remote candidate");
            }
        } else {
            tracing::debug!(target: "call", "remote description not set yet, queuing candidate");
            pending.push(candidate);
        }
    }

    pub async fn remote_description_set(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.pc.connection_state()
    }

    /// Terminal teardown. Safe to call once per session; errors from the
    /// underlying close are logged and swallowed.
    pub async fn close(&self) {
        self.advance(NegotiationState::Closed);
        if let Err(e) = self.pc.close().await {
            tracing::warn!(target: "call", error = %e, "error closing peer connection");
        }
    }
}
