//! `RouterConfig`: a `Default` impl matching the documented defaults plus
//! `with_*` setters that overwrite exactly one field.

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub max_hops: u32,
    pub message_ttl_ms: i64,
    pub route_cache_size: usize,
    pub route_cache_ttl_ms: i64,
    pub enable_relay_routing: bool,
    /// Declared for parity with the surrounding configuration surface; the
    /// selection algorithm already prefers `hop_count == 1` routes through
    /// scoring regardless of this flag.
    pub prefer_direct_routes: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_hops: 5,
            message_ttl_ms: 60_000,
            route_cache_size: 1000,
            route_cache_ttl_ms: 300_000,
            enable_relay_routing: true,
            prefer_direct_routes: true,
        }
    }
}

impl RouterConfig {
    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_message_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.message_ttl_ms = ttl_ms;
        self
    }

    pub fn with_route_cache_size(mut self, size: usize) -> Self {
        self.route_cache_size = size;
        self
    }

    pub fn with_route_cache_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.route_cache_ttl_ms = ttl_ms;
        self
    }

    pub fn with_enable_relay_routing(mut self, enable: bool) -> Self {
        self.enable_relay_routing = enable;
        self
    }

    pub fn with_prefer_direct_routes(mut self, prefer: bool) -> Self {
        self.prefer_direct_routes = prefer;
        self
    }
}
