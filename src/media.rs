//! Local media: device acquisition, per-track enable toggles and the
//! screen-share track swap.
//!
//! Capture itself (cameras, microphones, screen grabbing, encoding) lives in
//! the embedding application behind the [`MediaDevices`] trait; this module
//! only owns the track handles and the rule that exactly one video track
//! feeds the outgoing sender at a time.

use crate::error::CallError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// A local track plus its mute flag. Toggling flips the flag in place; the
/// capture pipeline checks it before writing samples, so no renegotiation
/// happens.
#[derive(Clone)]
pub struct LocalTrack {
    track: Arc<TrackLocalStaticSample>,
    enabled: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            track,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the flag, returning the new value.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }
}

/// Camera + microphone pair acquired together.
#[derive(Clone)]
pub struct UserMedia {
    pub audio: LocalTrack,
    pub video: LocalTrack,
}

/// Screen-capture track. `ended` fires when the user stops sharing from the
/// host environment's own UI, which must stop the share as if
/// `stop_screen_share` had been called.
pub struct DisplayMedia {
    pub video: LocalTrack,
    pub ended: oneshot::Receiver<()>,
}

/// Device access supplied by the embedding application. Denied permission is
/// reported as [`CallError::PermissionDenied`] and is never retried here.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn user_media(&self) -> Result<UserMedia, CallError>;
    async fn display_media(&self) -> Result<DisplayMedia, CallError>;
}

/// VP8 camera track handle for a capture pipeline to feed.
pub fn video_track(stream_id: &str) -> LocalTrack {
    LocalTrack::new(Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            ..Default::default()
        },
        "video".to_owned(),
        stream_id.to_owned(),
    )))
}

/// Opus microphone track handle.
pub fn audio_track(stream_id: &str) -> LocalTrack {
    LocalTrack::new(Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            ..Default::default()
        },
        "audio".to_owned(),
        stream_id.to_owned(),
    )))
}

/// VP8 screen-capture track handle.
pub fn screen_track(stream_id: &str) -> LocalTrack {
    LocalTrack::new(Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            ..Default::default()
        },
        "screen".to_owned(),
        stream_id.to_owned(),
    )))
}

/// Which source currently feeds the outgoing video sender.
enum Outgoing {
    Camera,
    Screen(LocalTrack),
}

/// Owns the local media for one call: acquisition, toggles and the
/// camera-or-screen sender swap. Destroyed with the call.
pub struct MediaController {
    devices: Arc<dyn MediaDevices>,
    user: Option<UserMedia>,
    outgoing: Outgoing,
    video_sender: Option<Arc<RTCRtpSender>>,
}

impl MediaController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            user: None,
            outgoing: Outgoing::Camera,
            video_sender: None,
        }
    }

    /// Acquire camera + microphone. Idempotent; a second call returns the
    /// already-held tracks.
    pub async fn acquire(&mut self) -> Result<UserMedia, CallError> {
        if let Some(user) = &self.user {
            return Ok(user.clone());
        }
        let user = self.devices.user_media().await?;
        self.user = Some(user.clone());
        Ok(user)
    }

    pub fn user(&self) -> Option<&UserMedia> {
        self.user.as_ref()
    }

    /// Remember the negotiated video sender so screen share can swap tracks
    /// on it later.
    pub fn set_video_sender(&mut self, sender: Arc<RTCRtpSender>) {
        self.video_sender = Some(sender);
    }

    /// Flip the microphone track. `None` when no media is held.
    pub fn toggle_mic(&self) -> Option<bool> {
        self.user.as_ref().map(|user| user.audio.toggle())
    }

    /// Flip the camera track. `None` when no media is held.
    pub fn toggle_cam(&self) -> Option<bool> {
        self.user.as_ref().map(|user| user.video.toggle())
    }

    pub fn is_screen_sharing(&self) -> bool {
        matches!(self.outgoing, Outgoing::Screen(_))
    }

    /// The track currently feeding the video sender.
    pub fn outgoing_video(&self) -> Option<Arc<TrackLocalStaticSample>> {
        match &self.outgoing {
            Outgoing::Screen(screen) => Some(screen.track()),
            Outgoing::Camera => self.user.as_ref().map(|user| user.video.track()),
        }
    }

    /// Acquire a screen track and substitute it for the camera on the
    /// existing sender, a track replacement rather than a renegotiation. Returns
    /// the `ended` hook for the caller to watch, or `None` when a share is
    /// already running.
    pub async fn start_screen_share(
        &mut self,
    ) -> Result<Option<oneshot::Receiver<()>>, CallError> {
        if self.is_screen_sharing() {
            return Ok(None);
        }
        let sender = self
            .video_sender
            .clone()
            .ok_or(CallError::NoLocalStream)?;
        let display = self.devices.display_media().await?;

        let track: Arc<dyn TrackLocal + Send + Sync> = display.video.track();
        sender.replace_track(Some(track)).await?;
        self.outgoing = Outgoing::Screen(display.video);
        Ok(Some(display.ended))
    }

    /// Stop sharing and put the camera track back on the sender. A no-op
    /// when not sharing; returns whether anything changed.
    pub async fn stop_screen_share(&mut self) -> Result<bool, CallError> {
        let screen = match std::mem::replace(&mut self.outgoing, Outgoing::Camera) {
            Outgoing::Screen(screen) => screen,
            Outgoing::Camera => return Ok(false),
        };
        screen.set_enabled(false);

        if let (Some(sender), Some(user)) = (&self.video_sender, &self.user) {
            let track: Arc<dyn TrackLocal + Send + Sync> = user.video.track();
            sender.replace_track(Some(track)).await?;
        }
        Ok(true)
    }

    /// Stop and drop everything. Called exactly once per teardown path but
    /// safe to repeat.
    pub fn release(&mut self) {
        if let Outgoing::Screen(screen) = std::mem::replace(&mut self.outgoing, Outgoing::Camera) {
            screen.set_enabled(false);
        }
        if let Some(user) = self.user.take() {
            user.audio.set_enabled(false);
            user.video.set_enabled(false);
        }
        self.video_sender = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDevices;

    #[async_trait]
    impl MediaDevices for FakeDevices {
        async fn user_media(&self) -> Result<UserMedia, CallError> {
            Ok(UserMedia {
                audio: audio_track("fake"),
                video: video_track("fake"),
            })
        }

        async fn display_media(&self) -> Result<DisplayMedia, CallError> {
            let (_tx, ended) = oneshot::channel();
            Ok(DisplayMedia {
                video: screen_track("fake"),
                ended,
            })
        }
    }

    #[tokio::test]
    async fn toggles_flip_in_place() {
        let mut controller = MediaController::new(Arc::new(FakeDevices));
        assert_eq!(controller.toggle_mic(), None);

        controller.acquire().await.unwrap();
        assert_eq!(controller.toggle_mic(), Some(false));
        assert_eq!(controller.toggle_mic(), Some(true));
        assert_eq!(controller.toggle_cam(), Some(false));
        assert!(!controller.user().unwrap().video.enabled());
    }

    #[tokio::test]
    async fn acquire_is_idempotent() {
        let mut controller = MediaController::new(Arc::new(FakeDevices));
        let first = controller.acquire().await.unwrap();
        let second = controller.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first.video.track(), &second.video.track()));
    }

    #[tokio::test]
    async fn stop_share_without_share_is_noop() {
        let mut controller = MediaController::new(Arc::new(FakeDevices));
        controller.acquire().await.unwrap();
        assert!(!controller.stop_screen_share().await.unwrap());
        assert!(!controller.is_screen_sharing());
    }

    #[tokio::test]
    async fn share_without_sender_fails() {
        let mut controller = MediaController::new(Arc::new(FakeDevices));
        controller.acquire().await.unwrap();
        assert!(matches!(
            controller.start_screen_share().await,
            Err(CallError::NoLocalStream)
        ));
    }

    #[tokio::test]
    async fn release_mutes_all_tracks() {
        let mut controller = MediaController::new(Arc::new(FakeDevices));
        let user = controller.acquire().await.unwrap();
        controller.release();
        assert!(!user.audio.enabled());
        assert!(!user.video.enabled());
        assert!(controller.user().is_none());
    }
}
