//! Signaling channel: the JSON control-message schema shared with the relay
//! and a WebSocket transport for it.
//!
//! The relay is dumb fan-out keyed by session id; both peers connect to
//! `<base>/ws/signaling/<session_id>/` and every message one side sends is
//! delivered to the other. Delivery is FIFO per channel; no reconnect is
//! attempted when the channel drops.

use crate::error::CallError;
use crate::peer::types::{CandidatePayload, Role};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Control messages exchanged over the signaling channel.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Initiator's session description.
    Offer { sdp: String },
    /// Responder's session description.
    Answer { sdp: String },
    /// Trickled ICE candidate, sent as soon as it is discovered.
    IceCandidate { candidate: CandidatePayload },
    /// Sent by the ending side so the peer tears down too.
    EndSession,
    /// Emitted by the relay once the booking is closed out.
    SessionCompleted,
    /// Advisory notice that the sender started or stopped recording.
    RecordingStatus {
        #[serde(rename = "isRecording")]
        is_recording: bool,
        sender: Role,
    },
}

/// Outbound half of the signaling channel. Inbound messages are delivered on
/// the mpsc receiver returned at connect time; the receiver ending mid-call
/// means the peer (or the relay) went away.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Enqueue a control message. A no-op once the channel is closed.
    async fn send(&self, message: SignalMessage) -> Result<(), CallError>;

    /// Close the channel. Safe to call more than once.
    async fn close(&self);

    fn is_open(&self) -> bool;
}

/// `SignalingTransport` over a WebSocket connection to the relay.
pub struct WsTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<SignalMessage>>>,
    open: Arc<AtomicBool>,
    writer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WsTransport {
    /// Open the channel for `endpoint`. Returns the transport plus the stream
    /// of inbound messages. Failure to connect means the call cannot proceed.
    pub async fn connect(
        endpoint: &str,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SignalMessage>), CallError> {
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| CallError::SignalingUnavailable(format!("{endpoint}: {e}")))?;
        tracing::debug!(target: "signaling", url = %endpoint, "signaling websocket connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<SignalMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<SignalMessage>();
        let open = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(target: "signaling", error = %e, "failed to encode message");
                        continue;
                    }
                };
                if ws_write.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.send(Message::Close(None)).await;
        });

        let reader_open = open.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(target: "signaling", error = %e, "unrecognized signaling message");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(target: "signaling", error = %e, "signaling websocket error");
                        break;
                    }
                }
            }
            // dropping inbound_tx ends the dispatch loop on the call side
            reader_open.store(false, Ordering::SeqCst);
        });

        let transport = Arc::new(Self {
            outbound: Mutex::new(Some(outbound)),
            open,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        });
        Ok((transport, inbound_rx))
    }
}

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn send(&self, message: SignalMessage) -> Result<(), CallError> {
        if !self.is_open() {
            tracing::debug!(target: "signaling", "channel closed, dropping outbound message");
            return Ok(());
        }
        let delivered = match self.outbound.lock().unwrap().as_ref() {
            Some(outbound) => outbound.send(message).is_ok(),
            None => false,
        };
        if !delivered {
            self.open.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Drains the writer before shutting down: dropping the sender lets the
    /// writer task flush every queued message plus the Close frame and exit on
    /// its own; only the reader is aborted.
    async fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        self.outbound.lock().unwrap().take();
        let writer = self.writer.lock().unwrap().take();
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        if let Some(reader) = self.reader.lock().unwrap().take() {
            reader.abort();
        }
        tracing::debug!(target: "signaling", "signaling websocket closed");
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        for slot in [&self.writer, &self.reader] {
            if let Ok(mut task) = slot.lock() {
                if let Some(task) = task.take() {
                    task.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offer_wire_shape() {
        let msg = SignalMessage::Offer {
            sdp: "v=0...".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "offer", "sdp": "v=0..."})
        );
    }

    #[test]
    fn recording_status_uses_browser_field_names() {
        let msg = SignalMessage::RecordingStatus {
            is_recording: true,
            sender: Role::Initiator,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "recording-status", "isRecording": true, "sender": "initiator"})
        );
    }

    #[test]
    fn parses_candidate_message() {
        let raw = json!({
            "type": "ice-candidate",
            "candidate": {
                "candidate": "candidate:1 1 UDP 2122252543 192.0.2.1 50000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        });
        let msg: SignalMessage = serde_json::from_value(raw).unwrap();
        match msg {
            SignalMessage::IceCandidate { candidate } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_flushes_queued_messages() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut texts = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => texts.push(text.to_string()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            texts
        });

        let endpoint = format!("ws://{addr}/ws/signaling/booking-1/");
        let (transport, _inbound) = WsTransport::connect(&endpoint).await.unwrap();
        transport.send(SignalMessage::EndSession).await.unwrap();
        // close right behind the send: the message must still go out
        transport.close().await;

        let texts = relay.await.unwrap();
        assert!(
            texts.iter().any(|t| t.contains("end-session")),
            "relay never saw end-session: {texts:?}"
        );
        assert!(!transport.is_open());
    }

    #[test]
    fn unit_kinds_round_trip() {
        for raw in ["{\"type\":\"end-session\"}", "{\"type\":\"session-completed\"}"] {
            let msg: SignalMessage = serde_json::from_str(raw).unwrap();
            assert_eq!(serde_json::to_string(&msg).unwrap(), raw);
        }
    }
}
