//! Scored catalogue of known overlay peers, fed by discovery and consulted
//! by routing and forwarding.

pub mod catalog;
pub mod config;
pub mod error;

pub use catalog::{PeerCatalog, PeerRecord, PeerRecordInput, ScoreFactors, ScoreFactorsUpdate};
pub use config::DiscoveryConfig;
pub use error::CatalogError;
