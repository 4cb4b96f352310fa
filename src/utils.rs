use crate::config::ServerConfig;
use rand::Rng;

/// Short random id used to tag a call instance in logs.
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Prepend the protocol scheme to an ICE server URL when it is missing.
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    // Already schemed URLs pass through untouched
    if config.url.starts_with("turn:") || config.url.starts_with("stun:") {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(kind: &str, url: &str) -> ServerConfig {
        ServerConfig {
            id: "s1".into(),
            r#type: kind.into(),
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    #[test]
    fn keeps_existing_scheme() {
        assert_eq!(
            add_ice_url_scheme(&server("stun", "stun:stun.example.org:3478")),
            "stun:stun.example.org:3478"
        );
    }

    #[test]
    fn adds_scheme_by_server_type() {
        assert_eq!(
            add_ice_url_scheme(&server("turn", "turn.example.org:3478")),
            "turn:turn.example.org:3478"
        );
        assert_eq!(
            add_ice_url_scheme(&server("stun", "stun.example.org")),
            "stun:stun.example.org"
        );
    }

    #[test]
    fn random_id_is_hex_of_eight_bytes() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
