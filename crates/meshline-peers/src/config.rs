//! Discovery configuration: a `Default` impl matching the documented
//! defaults plus `with_*` setters that overwrite exactly one field and
//! leave everything else untouched.

use meshline_core::Address;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enable_mdns: bool,
    pub enable_dht: bool,
    pub enable_bootstrap: bool,
    pub enable_pubsub: bool,
    pub bootstrap_peers: Vec<Address>,
    pub discovery_interval_ms: u64,
    pub peer_timeout_ms: u64,
    pub max_peers: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enable_mdns: true,
            enable_dht: true,
            enable_bootstrap: true,
            enable_pubsub: true,
            bootstrap_peers: Vec::new(),
            discovery_interval_ms: 30_000,
            peer_timeout_ms: 120_000,
            max_peers: 1000,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_enable_mdns(mut self, enable: bool) -> Self {
        self.enable_mdns = enable;
        self
    }

    pub fn with_enable_dht(mut self, enable: bool) -> Self {
        self.enable_dht = enable;
        self
    }

    pub fn with_enable_bootstrap(mut self, enable: bool) -> Self {
        self.enable_bootstrap = enable;
        self
    }

    pub fn with_enable_pubsub(mut self, enable: bool) -> Self {
        self.enable_pubsub = enable;
        self
    }

    pub fn with_bootstrap_peers(mut self, peers: Vec<Address>) -> Self {
        self.bootstrap_peers = peers;
        self
    }

    pub fn with_discovery_interval_ms(mut self, ms: u64) -> Self {
        self.discovery_interval_ms = ms;
        self
    }

    pub fn with_peer_timeout_ms(mut self, ms: u64) -> Self {
        self.peer_timeout_ms = ms;
        self
    }

    pub fn with_max_peers(mut self, max: usize) -> Self {
        self.max_peers = max;
        self
    }
}
