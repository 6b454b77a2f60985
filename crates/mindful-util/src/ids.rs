//! Strongly-typed identifiers for mindful

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::MindfulError;

/// Opaque identifier for something that can be blocked.
///
/// The host hands out tokens as raw bytes; they are carried around as their
/// canonical base64 encoding, which is also the stable key used by the store
/// and the name cache. Two tokens are the same item iff their bytes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemToken(String);

impl ItemToken {
    /// Wrap raw token bytes handed out by the host.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.is_empty() {
            return Err(MindfulError::decode("empty token"));
        }
        Ok(Self(STANDARD.encode(bytes)))
    }

    /// Reconstruct a token from its encoded form.
    pub fn decode(encoded: &str) -> crate::Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| MindfulError::decode(format!("invalid token encoding: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Raw token bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        // The inner string is always produced by `STANDARD.encode`
        STANDARD.decode(&self.0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ItemToken {
    type Error = MindfulError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::decode(&s)
    }
}

impl From<ItemToken> for String {
    fn from(token: ItemToken) -> Self {
        token.0
    }
}

/// Unique identifier for a grant record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId(Uuid);

impl GrantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name that ties an OS-scheduled trigger back to its grant.
///
/// Also used as the grant's key in the store, so it must be safe to embed in
/// file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationName(String);

impl CorrelationName {
    const PREFIX: &'static str = "reblock-";

    /// Fresh name for a new grant
    pub fn for_grant() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Parse a name delivered by a lifecycle callback
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(MindfulError::validation(format!(
                "invalid correlation name: {:?}",
                raw
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a pending unlock request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_equality_follows_bytes() {
        let a = ItemToken::from_bytes(b"app-a").unwrap();
        let b = ItemToken::decode(a.as_str()).unwrap();
        let c = ItemToken::from_bytes(b"app-c").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(b.to_bytes(), b"app-a".to_vec());
    }

    #[test]
    fn token_decode_rejects_garbage() {
        assert!(matches!(
            ItemToken::decode("not base64 !!"),
            Err(MindfulError::Decode(_))
        ));
        assert!(matches!(ItemToken::decode(""), Err(MindfulError::Decode(_))));
        assert!(ItemToken::from_bytes(&[]).is_err());
    }

    #[test]
    fn token_deserialize_validates() {
        let token = ItemToken::from_bytes(b"maps").unwrap();
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{}\"", token.as_str()));

        let parsed: ItemToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);

        let bad: Result<ItemToken, _> = serde_json::from_str("\"%%%\"");
        assert!(bad.is_err());
    }

    #[test]
    fn correlation_names_are_unique_and_parseable() {
        let a = CorrelationName::for_grant();
        let b = CorrelationName::for_grant();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("reblock-"));
        assert_eq!(CorrelationName::parse(a.as_str()).unwrap(), a);
        assert!(CorrelationName::parse("../etc/passwd").is_err());
        assert!(CorrelationName::parse("").is_err());
    }

    #[test]
    fn grant_id_uniqueness() {
        assert_ne!(GrantId::new(), GrantId::new());
    }
}
