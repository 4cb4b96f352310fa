//! Call lifecycle: one [`CallSession`] per call, owning the signaling
//! transport, the peer connection, local media and the recorder, with
//! explicit `start_call`/`end_call` lifecycle methods.
//!
//! Every inbound signaling message maps to exactly one transition here;
//! teardown is idempotent from both the local and the remote path.

use crate::config::CallConfig;
use crate::error::CallError;
use crate::events::CallEvent;
use crate::media::{MediaController, MediaDevices};
use crate::peer::ice::PendingCandidates;
use crate::peer::state::CallStatus;
use crate::peer::types::Role;
use crate::peer::PeerSession;
use crate::recorder::Recorder;
use crate::signaling::{SignalMessage, SignalingTransport, WsTransport};
use crate::utils::random_id;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// External payment capture, invoked by the initiator's hangup so the session
/// gets billed. Opaque to the call core: it may fail, the failure is surfaced
/// once, and it is never retried or allowed to reopen the call.
#[async_trait]
pub trait SessionBilling: Send + Sync {
    async fn capture(&self, session_id: &str) -> Result<(), CallError>;
}

/// Billing disabled (free sessions, tests).
pub struct NoBilling;

#[async_trait]
impl SessionBilling for NoBilling {
    async fn capture(&self, _session_id: &str) -> Result<(), CallError> {
        Ok(())
    }
}

/// One two-party call. Independently constructible and disposable; nothing
/// here outlives the session object.
pub struct CallSession {
    config: CallConfig,
    call_id: String,
    transport: Arc<dyn SignalingTransport>,
    events: mpsc::UnboundedSender<CallEvent>,
    status: Mutex<CallStatus>,
    peer: AsyncMutex<Option<Arc<PeerSession>>>,
    pending: PendingCandidates,
    media: AsyncMutex<MediaController>,
    recorder: Recorder,
    billing: Arc<dyn SessionBilling>,
    elapsed: AtomicU64,
    timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CallSession {
    /// Open the signaling channel for `config.session_id` and build the
    /// session around it. Fails with `SignalingUnavailable` when the relay
    /// cannot be reached, in which case the call cannot proceed.
    pub async fn connect(
        config: CallConfig,
        devices: Arc<dyn MediaDevices>,
        billing: Arc<dyn SessionBilling>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<CallEvent>), CallError> {
        config.validate()?;
        let (transport, inbound) = WsTransport::connect(&config.signaling_endpoint()).await?;
        Ok(Self::with_transport(
            config, transport, inbound, devices, billing,
        ))
    }

    /// Build the session on an already-open transport. This is the seam the
    /// integration tests use to substitute an in-memory channel.
    pub fn with_transport(
        config: CallConfig,
        transport: Arc<dyn SignalingTransport>,
        inbound: mpsc::UnboundedReceiver<SignalMessage>,
        devices: Arc<dyn MediaDevices>,
        billing: Arc<dyn SessionBilling>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<CallEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            call_id: random_id(),
            config,
            transport,
            events,
            status: Mutex::new(CallStatus::Waiting),
            peer: AsyncMutex::new(None),
            pending: PendingCandidates::new(),
            media: AsyncMutex::new(MediaController::new(devices)),
            recorder: Recorder::new(),
            billing,
            elapsed: AtomicU64::new(0),
            timer: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        let dispatch = tokio::spawn(dispatch_loop(Arc::downgrade(&session), inbound));
        session.tasks.lock().unwrap().push(dispatch);
        (session, events_rx)
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn status(&self) -> CallStatus {
        *self.status.lock().unwrap()
    }

    /// Seconds since the call entered InCall; 0 outside a call.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::SeqCst)
    }

    /// Acquire local media, wire it into the peer connection, and (as
    /// initiator) kick off the offer. Permission denial fails loudly and
    /// leaves the call in Waiting.
    pub async fn start_call(self: &Arc<Self>) -> Result<(), CallError> {
        if self.status() != CallStatus::Waiting {
            tracing::debug!(target: "call", call_id = %self.call_id, "start_call ignored, not in Waiting");
            return Ok(());
        }

        let user = self.media.lock().await.acquire().await?;
        let peer = self.ensure_peer().await?;
        let video_sender = peer.add_local_tracks(&user).await?;
        self.media.lock().await.set_video_sender(video_sender);

        if self.config.role.is_initiator() {
            peer.start_negotiation().await?;
        }

        self.set_status(CallStatus::InCall);
        self.start_timer();
        tracing::info!(target: "call", call_id = %self.call_id, role = %self.config.role, "call started");
        Ok(())
    }

    /// Tear the call down. Idempotent: a second call (or one racing a remote
    /// completion) is a no-op. The initiator additionally broadcasts
    /// `end-session` and triggers payment capture; a capture failure is
    /// surfaced as an event but the call stays Completed.
    pub async fn end_call(&self) -> Result<(), CallError> {
        if !self.begin_completed() {
            return Ok(());
        }
        self.teardown().await;
        tracing::info!(target: "call", call_id = %self.call_id, "call ended locally");

        if self.config.role.is_initiator() {
            let _ = self.transport.send(SignalMessage::EndSession).await;
            if let Err(e) = self.billing.capture(&self.config.session_id).await {
                tracing::warn!(target: "call", call_id = %self.call_id, error = %e, "payment capture failed");
                self.emit(CallEvent::BillingFailed(e.to_string()));
            }
        }
        self.transport.close().await;
        Ok(())
    }

    /// Flip the microphone track in place (no renegotiation). `None` when no
    /// media is held yet.
    pub async fn toggle_mic(&self) -> Option<bool> {
        let enabled = self.media.lock().await.toggle_mic();
        if let Some(on) = enabled {
            self.emit(CallEvent::MicToggled(on));
        }
        enabled
    }

    /// Flip the camera track in place.
    pub async fn toggle_cam(&self) -> Option<bool> {
        let enabled = self.media.lock().await.toggle_cam();
        if let Some(on) = enabled {
            self.emit(CallEvent::CamToggled(on));
        }
        enabled
    }

    /// Swap the outgoing video track for a screen capture. Returns false
    /// when a share was already running. Display-capture denial surfaces as
    /// an error and the share simply does not start.
    pub async fn start_screen_share(self: &Arc<Self>) -> Result<bool, CallError> {
        let ended = { self.media.lock().await.start_screen_share().await? };
        let Some(ended) = ended else {
            return Ok(false);
        };
        self.emit(CallEvent::ScreenShare(true));

        // stop automatically when the host environment ends the capture
        let weak = Arc::downgrade(self);
        let watcher = tokio::spawn(async move {
            let _ = ended.await;
            if let Some(session) = weak.upgrade() {
                let _ = session.stop_screen_share().await;
            }
        });
        self.tasks.lock().unwrap().push(watcher);
        Ok(true)
    }

    /// Restore the camera track on the sender. No-op when not sharing.
    pub async fn stop_screen_share(&self) -> Result<bool, CallError> {
        let changed = self.media.lock().await.stop_screen_share().await?;
        if changed {
            self.emit(CallEvent::ScreenShare(false));
        }
        Ok(changed)
    }

    pub async fn is_screen_sharing(&self) -> bool {
        self.media.lock().await.is_screen_sharing()
    }

    /// Track currently feeding the outgoing video sender (camera XOR screen).
    pub async fn outgoing_video(&self) -> Option<Arc<TrackLocalStaticSample>> {
        self.media.lock().await.outgoing_video()
    }

    /// Begin buffering the local stream and tell the peer. Fails when local
    /// media is not ready; starting twice is a no-op.
    pub async fn start_recording(&self) -> Result<(), CallError> {
        if self.media.lock().await.user().is_none() {
            return Err(CallError::NoLocalStream);
        }
        if self.recorder.is_recording() {
            return Ok(());
        }
        self.recorder.start();
        self.emit(CallEvent::RecordingChanged(true));
        self.transport
            .send(SignalMessage::RecordingStatus {
                is_recording: true,
                sender: self.config.role,
            })
            .await
    }

    /// Finalize the recording and tell the peer. No-op when not recording.
    pub async fn stop_recording(&self) -> Result<(), CallError> {
        if !self.recorder.is_recording() {
            return Ok(());
        }
        self.recorder.stop();
        self.emit(CallEvent::RecordingChanged(false));
        self.transport
            .send(SignalMessage::RecordingStatus {
                is_recording: false,
                sender: self.config.role,
            })
            .await
    }

    /// The chunk sink for the embedder's capture pipeline.
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Write the recorded chunks to `dir`. `None` when nothing was recorded.
    pub fn save_recording(&self, dir: &Path) -> Result<Option<PathBuf>, CallError> {
        self.recorder.save_to(dir)
    }

    /// Buffered remote candidates awaiting the remote description.
    pub fn pending_candidates(&self) -> &PendingCandidates {
        &self.pending
    }

    /// Negotiation phase of the peer connection, `None` before one exists.
    pub async fn negotiation_state(&self) -> Option<crate::peer::NegotiationState> {
        let peer = self.peer.lock().await.clone();
        peer.map(|p| p.state())
    }

    /// Dispatch one inbound control message to its transition.
    async fn handle_signal(self: &Arc<Self>, message: SignalMessage) {
        match message {
            SignalMessage::Offer { sdp } => {
                if self.config.role.is_initiator() {
                    // glare: this side offers, first remote description wins
                    tracing::debug!(target: "call", call_id = %self.call_id, "initiator ignoring inbound offer");
                    return;
                }
                // The answer only carries local media when start_call already
                // attached the tracks; an offer handled before start_call
                // yields a receive-only answer and nothing renegotiates later.
                // Callers start the call before the relay delivers the offer.
                let peer = match self.ensure_peer().await {
                    Ok(peer) => peer,
                    Err(e) => {
                        tracing::warn!(target: "call", call_id = %self.call_id, error = %e, "failed to create peer for offer");
                        return;
                    }
                };
                if let Err(e) = peer.handle_offer(sdp, &self.pending).await {
                    tracing::warn!(target: "call", call_id = %self.call_id, error = %e, "error handling offer");
                }
            }
            SignalMessage::Answer { sdp } => {
                if !self.config.role.is_initiator() {
                    tracing::debug!(target: "call", call_id = %self.call_id, "responder ignoring inbound answer");
                    return;
                }
                let peer = self.peer.lock().await.clone();
                if let Some(peer) = peer {
                    if let Err(e) = peer.handle_answer(sdp, &self.pending).await {
                        tracing::warn!(target: "call", call_id = %self.call_id, error = %e, "error handling answer");
                    }
                }
            }
            SignalMessage::IceCandidate { candidate } => {
                let peer = self.peer.lock().await.clone();
                match peer {
                    Some(peer) => peer.add_remote_candidate(candidate, &self.pending).await,
                    None => {
                        tracing::debug!(target: "call", call_id = %self.call_id, "no peer connection yet, queuing candidate");
                        self.pending.push(candidate);
                    }
                }
            }
            SignalMessage::EndSession | SignalMessage::SessionCompleted => {
                self.complete_from_remote().await;
            }
            SignalMessage::RecordingStatus {
                is_recording,
                sender,
            } => {
                self.emit(CallEvent::PeerRecording {
                    recording: is_recording,
                    sender,
                });
            }
        }
    }

    /// Remote party ended the session: forced teardown, identical to
    /// `end_call` except that no `end-session` is sent and payment capture
    /// is never triggered on this side.
    async fn complete_from_remote(&self) {
        if !self.begin_completed() {
            return;
        }
        self.teardown().await;
        self.emit(CallEvent::RemoteEnded);
        self.transport.close().await;
        tracing::info!(target: "call", call_id = %self.call_id, "remote party ended the session");
    }

    async fn ensure_peer(&self) -> Result<Arc<PeerSession>, CallError> {
        let mut guard = self.peer.lock().await;
        if let Some(peer) = guard.as_ref() {
            return Ok(peer.clone());
        }
        let peer = Arc::new(
            PeerSession::new(&self.config, self.transport.clone(), self.events.clone()).await?,
        );
        *guard = Some(peer.clone());
        Ok(peer)
    }

    /// Move to Completed exactly once; the loser of a local/remote teardown
    /// race backs off.
    fn begin_completed(&self) -> bool {
        let mut status = self.status.lock().unwrap();
        if *status == CallStatus::Completed {
            return false;
        }
        *status = CallStatus::Completed;
        drop(status);
        self.emit(CallEvent::StatusChanged(CallStatus::Completed));
        true
    }

    /// Release everything the call holds: ticker, recording, media tracks,
    /// peer connection. Never double-releases.
    async fn teardown(&self) {
        if let Some(timer) = self.timer.lock().unwrap().take() {
            timer.abort();
        }
        self.elapsed.store(0, Ordering::SeqCst);
        if self.recorder.is_recording() {
            self.recorder.stop();
            self.emit(CallEvent::RecordingChanged(false));
        }
        self.media.lock().await.release();
        let peer = self.peer.lock().await.take();
        if let Some(peer) = peer {
            peer.close().await;
        }
    }

    fn set_status(&self, next: CallStatus) {
        let mut status = self.status.lock().unwrap();
        debug_assert!(status.can_advance(next), "illegal status transition");
        *status = next;
        drop(status);
        self.emit(CallEvent::StatusChanged(next));
    }

    fn start_timer(self: &Arc<Self>) {
        self.elapsed.store(0, Ordering::SeqCst);
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                let Some(session) = weak.upgrade() else { break };
                let secs = session.elapsed.fetch_add(1, Ordering::SeqCst) + 1;
                session.emit(CallEvent::Tick(secs));
            }
        });
        *self.timer.lock().unwrap() = Some(handle);
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.lock().unwrap().take() {
            timer.abort();
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// Forward inbound signaling into the session until the channel ends. The
/// channel ending mid-call is a remote hangup; before or after a call it is
/// just the relay going away.
async fn dispatch_loop(
    session: Weak<CallSession>,
    mut inbound: mpsc::UnboundedReceiver<SignalMessage>,
) {
    while let Some(message) = inbound.recv().await {
        let Some(session) = session.upgrade() else {
            return;
        };
        session.handle_signal(message).await;
    }
    let Some(session) = session.upgrade() else {
        return;
    };
    if session.status() == CallStatus::InCall {
        session.complete_from_remote().await;
    }
    session.emit(CallEvent::SignalingClosed);
}
