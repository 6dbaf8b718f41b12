//! Peer and address identifiers shared by every crate in the workspace.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Opaque, comparable, hashable identifier for a participant in the overlay.
///
/// The distinguished value returned by [`PeerId::is_self`]-style comparisons
/// is supplied by the caller (there is no reserved literal) — components are
/// always constructed with the local id explicitly, never inferred.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque, transport-understood location string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the trailing `/p2p/<id>` segment used by bootstrap address
    /// strings, if present.
    pub fn trailing_peer_id(&self) -> Option<PeerId> {
        self.0
            .rsplit_once("/p2p/")
            .map(|(_, id)| PeerId::new(id.to_string()))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a peer was first learned about.
///
/// Determines the bootstrap score assigned before any real measurement
/// exists; see [`DiscoveryMethod::initial_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Mdns,
    Dht,
    Bootstrap,
    Pubsub,
    Manual,
}

impl DiscoveryMethod {
    pub fn initial_score(self) -> f64 {
        match self {
            DiscoveryMethod::Bootstrap => 0.8,
            DiscoveryMethod::Manual => 0.9,
            DiscoveryMethod::Mdns => 0.7,
            DiscoveryMethod::Dht => 0.6,
            DiscoveryMethod::Pubsub => 0.5,
        }
    }
}

impl Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryMethod::Mdns => "mdns",
            DiscoveryMethod::Dht => "dht",
            DiscoveryMethod::Bootstrap => "bootstrap",
            DiscoveryMethod::Pubsub => "pubsub",
            DiscoveryMethod::Manual => "manual",
        };
        write!(f, "{s}")
    }
}
