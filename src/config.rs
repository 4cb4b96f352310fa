use crate::error::CallError;
use crate::peer::types::Role;
use crate::utils::add_ice_url_scheme;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;

/// ICE server entry as configured by the embedding application.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl ServerConfig {
    /// TURN servers require credentials; every server needs a URL.
    pub fn validate(&self) -> Result<(), CallError> {
        if self.url.is_empty() {
            return Err(CallError::InvalidConfig(
                "ICE server URL cannot be empty".into(),
            ));
        }
        if self.r#type == "turn" && (self.username.is_none() || self.credential.is_none()) {
            return Err(CallError::InvalidConfig(
                "TURN servers require username and credential".into(),
            ));
        }
        Ok(())
    }
}

static DEFAULT_ICE_SERVERS: Lazy<Vec<RTCIceServer>> = Lazy::new(|| {
    vec![RTCIceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".into(),
            "stun:stun1.l.google.com:19302".into(),
        ],
        ..Default::default()
    }]
});

/// Static configuration of a single call. Immutable once the session is
/// constructed.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Opaque identifier correlating the call to a booking record; also keys
    /// the signaling channel address.
    pub session_id: String,
    /// Initiator creates the offer, responder answers.
    pub role: Role,
    /// Base URL of the signaling relay, e.g. `ws://localhost:8000`.
    pub signaling_base: String,
    /// Custom ICE servers; the Google STUN defaults apply when empty.
    pub ice_servers: Vec<ServerConfig>,
}

impl CallConfig {
    pub fn new(
        session_id: impl Into<String>,
        role: Role,
        signaling_base: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            signaling_base: signaling_base.into(),
            ice_servers: Vec::new(),
        }
    }

    pub fn with_ice_servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn validate(&self) -> Result<(), CallError> {
        let base = url::Url::parse(&self.signaling_base)
            .map_err(|e| CallError::InvalidConfig(format!("bad signaling base URL: {e}")))?;
        if base.scheme() != "ws" && base.scheme() != "wss" {
            return Err(CallError::InvalidConfig(format!(
                "signaling base URL must be ws:// or wss://, got {}",
                base.scheme()
            )));
        }
        for server in &self.ice_servers {
            server.validate()?;
        }
        Ok(())
    }

    /// WebSocket endpoint of the signaling channel for this session.
    pub fn signaling_endpoint(&self) -> String {
        format!(
            "{}/ws/signaling/{}/",
            self.signaling_base.trim_end_matches('/'),
            self.session_id
        )
    }

    /// Peer connection configuration for this call.
    pub fn rtc_config(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            DEFAULT_ICE_SERVERS.clone()
        } else {
            self.ice_servers
                .iter()
                .map(|config| RTCIceServer {
                    urls: vec![add_ice_url_scheme(config)],
                    username: config.username.clone().unwrap_or_default(),
                    credential: config.credential.clone().unwrap_or_default(),
                })
                .collect()
        };

        RTCConfiguration {
            ice_servers,
            ice_candidate_pool_size: 10,
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_embeds_session_id() {
        let config = CallConfig::new("booking-42", Role::Initiator, "ws://localhost:8000/");
        assert_eq!(
            config.signaling_endpoint(),
            "ws://localhost:8000/ws/signaling/booking-42/"
        );
    }

    #[test]
    fn default_ice_servers_when_none_configured() {
        let config = CallConfig::new("s", Role::Responder, "ws://relay");
        let rtc = config.rtc_config();
        assert_eq!(rtc.ice_servers.len(), 1);
        assert!(rtc.ice_servers[0].urls[0].starts_with("stun:"));
    }

    #[test]
    fn http_signaling_base_is_rejected() {
        let config = CallConfig::new("s", Role::Initiator, "http://localhost:8000");
        assert!(matches!(
            config.validate(),
            Err(CallError::InvalidConfig(_))
        ));
    }

    #[test]
    fn turn_without_credentials_is_rejected() {
        let config = CallConfig::new("s", Role::Initiator, "ws://relay").with_ice_servers(vec![
            ServerConfig {
                id: "t1".into(),
                r#type: "turn".into(),
                url: "turn.example.org:3478".into(),
                username: None,
                credential: None,
            },
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_servers_get_schemes() {
        let config = CallConfig::new("s", Role::Initiator, "ws://relay").with_ice_servers(vec![
            ServerConfig {
                id: "s1".into(),
                r#type: "stun".into(),
                url: "stun.example.org:3478".into(),
                username: None,
                credential: None,
            },
        ]);
        let rtc = config.rtc_config();
        assert_eq!(rtc.ice_servers[0].urls[0], "stun:stun.example.org:3478");
    }
}
