//! Persisted layout

use mindful_util::CorrelationName;
use std::fmt;

/// Prefix of grant records
pub const GRANT_PREFIX: &str = "grant/";

/// Prefix of claim markers
pub const CLAIM_PREFIX: &str = "claim/";

/// Every record kind the store knows about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// One active grant
    Grant(CorrelationName),
    /// Marker left by whoever reconciled a grant
    Claim(CorrelationName),
    /// The single pending-request slot
    PendingRequest,
    /// Items under management
    Universe,
    /// Items that are never blocked
    Exemptions,
    /// Token to display name annotations
    NameCache,
    /// Past approval decisions
    History,
}

impl StoreKey {
    pub fn as_key(&self) -> String {
        match self {
            StoreKey::Grant(name) => format!("{}{}", GRANT_PREFIX, name),
            StoreKey::Claim(name) => format!("{}{}", CLAIM_PREFIX, name),
            StoreKey::PendingRequest => "pending_request".into(),
            StoreKey::Universe => "universe".into(),
            StoreKey::Exemptions => "exemptions".into(),
            StoreKey::NameCache => "name_cache".into(),
            StoreKey::History => "history".into(),
        }
    }

    /// All single-record keys, for diagnostics
    pub fn singletons() -> [StoreKey; 5] {
        [
            StoreKey::PendingRequest,
            StoreKey::Universe,
            StoreKey::Exemptions,
            StoreKey::NameCache,
            StoreKey::History,
        ]
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_path_like() {
        let name = CorrelationName::parse("reblock-abc").unwrap();
        assert_eq!(StoreKey::Grant(name.clone()).as_key(), "grant/reblock-abc");
        assert_eq!(StoreKey::Claim(name).as_key(), "claim/reblock-abc");
        assert_eq!(StoreKey::PendingRequest.as_key(), "pending_request");
    }
}
