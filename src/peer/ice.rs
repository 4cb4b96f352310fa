use crate::peer::types::CandidatePayload;
use std::sync::Mutex;
use webrtc::peer_connection::RTCPeerConnection;

/// Buffer for remote ICE candidates that arrive before the remote description
/// is set. Candidates cannot be applied until a remote description exists, so
/// they queue here in arrival order and are drained exactly once.
#[derive(Default)]
pub struct PendingCandidates {
    queue: Mutex<Vec<CandidatePayload>>,
}

impl PendingCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, candidate: CandidatePayload) {
        self.queue.lock().unwrap().push(candidate);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything buffered so far, FIFO.
    pub fn drain(&self) -> Vec<CandidatePayload> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    /// Apply all buffered candidates against `pc` in arrival order and clear
    /// the buffer. A candidate that fails to apply is logged and skipped; it
    /// never aborts the rest of the drain.
    pub async fn apply_to(&self, pc: &RTCPeerConnection) {
        for candidate in self.drain() {
            tracing::debug!(target: "call", candidate = %candidate.candidate, "applying queued candidate");
            if let Err(e) = pc.add_ice_candidate(candidate.into_init()).await {
                tracing::warn!(target: "call", error = %e, "failed to apply queued candidate");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(n: u32) -> CandidatePayload {
        CandidatePayload {
            candidate: format!("candidate:{n} 1 UDP 2122252543 192.0.2.{n} 50000 typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }
    }

    #[test]
    fn drains_in_arrival_order() {
        let pending = PendingCandidates::new();
        pending.push(cand(1));
        pending.push(cand(2));
        pending.push(cand(3));

        let drained = pending.drain();
        assert_eq!(drained, vec![cand(1), cand(2), cand(3)]);
        assert!(pending.is_empty());
    }

    #[test]
    fn drain_is_one_shot() {
        let pending = PendingCandidates::new();
        pending.push(cand(1));
        assert_eq!(pending.drain().len(), 1);
        assert!(pending.drain().is_empty());
    }
}
