//! The typed, observable signal stream emitted by the forwarder.
//!
//! State changes are reported on a [`tokio::sync::broadcast`] channel
//! alongside the `tracing` events emitted at the same call sites, so tests
//! can assert on the typed stream without scraping log output.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::identity::PeerId;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Initialized {
        at: DateTime<Utc>,
    },
    MessageRouted {
        message_id: String,
        destination: PeerId,
        next_hop: PeerId,
        at: DateTime<Utc>,
    },
    RouteNotFound {
        destination: PeerId,
        at: DateTime<Utc>,
    },
    MessageDelivered {
        message_id: String,
        hop_count: u32,
        at: DateTime<Utc>,
    },
    MessageExpired {
        message_id: String,
        at: DateTime<Utc>,
    },
    MessageMaxHops {
        message_id: String,
        at: DateTime<Utc>,
    },
}

/// Default capacity for the broadcast channel backing a [`Signal`] stream.
///
/// Lagging subscribers drop the oldest signals rather than stalling the
/// forwarder; diagnostics are best-effort by design (see the propagation
/// policy this crate's callers document).
pub const DEFAULT_SIGNAL_CHANNEL_CAPACITY: usize = 256;

pub fn signal_channel() -> (broadcast::Sender<Signal>, broadcast::Receiver<Signal>) {
    broadcast::channel(DEFAULT_SIGNAL_CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_emitted_signal() {
        let (tx, mut rx) = signal_channel();
        let at = Utc::now();
        tx.send(Signal::Initialized { at }).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Signal::Initialized { at });
    }
}
