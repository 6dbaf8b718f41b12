//! Shared vocabulary for the overlay's routing and peer-quality subsystem:
//! identifiers, the forwarded-message wire format, the peer/routing seam
//! trait, and the typed signal stream.

pub mod error;
pub mod identity;
pub mod message;
pub mod score;
pub mod signal;

pub use error::CoreError;
pub use identity::{Address, DiscoveryMethod, PeerId};
pub use message::{generate_message_id, parse_message_id_millis, ForwardedMessage};
pub use score::PeerScoreSource;
pub use signal::{signal_channel, Signal, DEFAULT_SIGNAL_CHANNEL_CAPACITY};
