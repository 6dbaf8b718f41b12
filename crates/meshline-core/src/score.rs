//! The seam between routing and peer-quality tracking.
//!
//! `meshline-routing` needs a peer's composite score and measured latency to
//! rank relay candidates, but must not depend on `meshline-peers` directly,
//! so the routing table is generic over this trait rather than naming a
//! concrete peer-tracking crate.

use crate::identity::PeerId;

pub trait PeerScoreSource: Send + Sync {
    /// Composite score in `[0, 1]`, or `None` if the peer is unknown.
    fn score(&self, peer: &PeerId) -> Option<f64>;

    /// Last-measured latency in milliseconds, or `None` if unmeasured.
    fn latency_hint(&self, peer: &PeerId) -> Option<u64>;

    /// Ranked (best-first) relay candidates for reaching `destination`,
    /// drawn from relay-capable known peers — mirrors
    /// `PeerCatalog::routing_candidates`. The default implementation
    /// returns no candidates, which is the right behaviour for a score
    /// source that doesn't track relay capability at all.
    fn relay_candidates(&self, _destination: &PeerId) -> Vec<PeerId> {
        Vec::new()
    }
}
