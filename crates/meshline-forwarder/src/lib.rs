//! Frame-level forwarding: dedup, TTL/hop enforcement, route learning,
//! and the decision surface consumed by the transport layer.

pub mod dedup;
pub mod forwarder;

pub use dedup::DedupLedger;
pub use forwarder::{Forwarder, ForwarderStats, IngestOutcome};
