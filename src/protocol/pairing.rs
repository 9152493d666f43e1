use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde::{Deserialize, Serialize};

use crate::core::ProfileSnapshot;
use crate::utils;

pub const PAIRING_LINK_PREFIX: &str = "polyhub://pair/";

const LINK_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Identity carried inside a pairing link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingInvite {
    pub name: String,
    pub ip: String,
    /// Milliseconds since the Unix epoch when the link was generated
    pub timestamp: u64,
}

impl PairingInvite {
    pub fn profile(&self) -> ProfileSnapshot {
        ProfileSnapshot::new(self.name.clone(), self.ip.clone())
    }
}

/// `polyhub://pair/<base64url JSON>` for the given profile
pub fn generate_pairing_link(profile: &ProfileSnapshot) -> String {
    let invite = PairingInvite {
        name: profile.name.clone(),
        ip: profile.ip.clone(),
        timestamp: utils::now_millis(),
    };
    // Serializing two strings and an integer cannot fail
    let json = serde_json::to_vec(&invite).unwrap_or_default();
    format!("{}{}", PAIRING_LINK_PREFIX, LINK_ENGINE.encode(json))
}

/// Parse a pairing link; anything malformed yields `None`
pub fn parse_pairing_link(link: &str) -> Option<PairingInvite> {
    let start = link.find(PAIRING_LINK_PREFIX)? + PAIRING_LINK_PREFIX.len();
    let encoded = link[start..].trim();
    if encoded.is_empty() {
        return None;
    }
    let decoded = LINK_ENGINE.decode(encoded).ok()?;
    serde_json::from_slice(&decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_roundtrip() {
        let profile = ProfileSnapshot::new("Alice", "100.1.1.1");
        let link = generate_pairing_link(&profile);
        assert!(link.starts_with(PAIRING_LINK_PREFIX));
        assert!(!link.ends_with('='));

        let invite = parse_pairing_link(&link).unwrap();
        assert_eq!(invite.profile(), profile);
        assert!(invite.timestamp > 0);
    }

    #[test]
    fn test_link_embedded_in_text() {
        let link = generate_pairing_link(&ProfileSnapshot::new("Bob", "100.2.2.2"));
        let message = format!("join me: {}  ", link);
        assert_eq!(parse_pairing_link(&message).unwrap().name, "Bob");
    }

    #[test]
    fn test_invalid_links() {
        assert!(parse_pairing_link("https://example.com").is_none());
        assert!(parse_pairing_link("polyhub://pair/").is_none());
        assert!(parse_pairing_link("polyhub://pair/!!!").is_none());
        // valid base64url, not an invite
        assert!(parse_pairing_link("polyhub://pair/aGVsbG8").is_none());
    }
}
