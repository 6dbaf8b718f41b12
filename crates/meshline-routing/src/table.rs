//! The learned destination -> next-hop cache.
//!
//! A `DashMap` keyed by destination, each entry timestamped for staleness
//! and pruning, layered with a composite score, a freshness state machine,
//! and path-learning from observed message traversals.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, instrument};

use meshline_core::{PeerId, PeerScoreSource};

use crate::config::RouterConfig;

fn clip(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Fresh,
    Degraded,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub target_peer: PeerId,
    pub next_hop: PeerId,
    pub hop_count: u32,
    pub latency_ms: f64,
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl Route {
    /// `0.30*(1 - hops/maxHops) + 0.20*(1 - min(1, latency/1000)) +
    /// 0.40*successRate + 0.10*(1 - min(1, age_since_last_used/cacheTtl))`
    pub fn score(&self, max_hops: u32, route_cache_ttl_ms: i64, now: DateTime<Utc>) -> f64 {
        let hop_term = 1.0 - (self.hop_count as f64 / max_hops.max(1) as f64);
        let latency_term = 1.0 - (self.latency_ms / 1000.0).min(1.0);
        let age_ms = (now - self.last_used).num_milliseconds().max(0) as f64;
        let freshness_term = 1.0 - (age_ms / route_cache_ttl_ms.max(1) as f64).min(1.0);
        0.30 * hop_term + 0.20 * latency_term + 0.40 * self.success_rate + 0.10 * freshness_term
    }

    pub fn state(&self, connected: &HashSet<PeerId>, route_cache_ttl_ms: i64, now: DateTime<Utc>) -> RouteState {
        let age_ms = (now - self.created_at).num_milliseconds();
        if age_ms > route_cache_ttl_ms || !connected.contains(&self.next_hop) || self.success_rate < 0.2 {
            return RouteState::Invalid;
        }
        if self.success_rate < 0.5 {
            return RouteState::Degraded;
        }
        RouteState::Fresh
    }

    fn is_valid(&self, connected: &HashSet<PeerId>, route_cache_ttl_ms: i64, now: DateTime<Utc>) -> bool {
        self.state(connected, route_cache_ttl_ms, now) != RouteState::Invalid
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteTableStats {
    pub route_count: usize,
    pub routable_destinations: usize,
}

pub struct RouteTable<C: PeerScoreSource> {
    routes: DashMap<PeerId, Route>,
    connected: DashMap<PeerId, ()>,
    config: RouterConfig,
    scores: Arc<C>,
}

impl<C: PeerScoreSource> RouteTable<C> {
    pub fn new(config: RouterConfig, scores: Arc<C>) -> Self {
        Self {
            routes: DashMap::new(),
            connected: DashMap::new(),
            config,
            scores,
        }
    }

    fn connected_set(&self) -> HashSet<PeerId> {
        self.connected.iter().map(|e| e.key().clone()).collect()
    }

    #[instrument(skip(self, peers))]
    pub fn set_connected_peers(&self, peers: HashSet<PeerId>) {
        self.connected.clear();
        for peer in &peers {
            self.connected.insert(peer.clone(), ());
        }
        let now = Utc::now();
        for peer in peers {
            if self.routes.contains_key(&peer) {
                continue;
            }
            let latency = self
                .scores
                .latency_hint(&peer)
                .map(|ms| ms as f64)
                .unwrap_or(100.0);
            self.routes.insert(
                peer.clone(),
                Route {
                    target_peer: peer.clone(),
                    next_hop: peer,
                    hop_count: 1,
                    latency_ms: latency,
                    success_rate: 1.0,
                    created_at: now,
                    last_used: now,
                },
            );
        }
    }

    pub fn update_peer_latency(&self, peer: &PeerId, latency_ms: f64) {
        if let Some(mut route) = self.routes.get_mut(peer) {
            if route.hop_count == 1 {
                route.latency_ms = latency_ms;
            }
        }
    }

    pub fn find(&self, destination: &PeerId) -> Option<Route> {
        let connected = self.connected_set();
        if connected.contains(destination) {
            if let Some(route) = self.routes.get(destination) {
                return Some(route.value().clone());
            }
        }
        if let Some(route) = self.routes.get(destination) {
            let now = Utc::now();
            if route.is_valid(&connected, self.config.route_cache_ttl_ms, now) {
                return Some(route.value().clone());
            }
        }
        if let Some(route) = self.find_relay(destination) {
            self.routes.insert(destination.clone(), route.clone());
            return Some(route);
        }
        debug!(destination = %destination, "route cache miss");
        None
    }

    /// Scans for a cached relay (a route whose target is `destination` and
    /// whose next hop is currently connected), preferring the
    /// highest-scoring candidate; falls back to a speculative 2-hop route
    /// through the best ranked relay candidate (per the score source) that
    /// is also currently connected, when relay routing is enabled and no
    /// cached relay exists.
    pub fn find_relay(&self, destination: &PeerId) -> Option<Route> {
        if !self.config.enable_relay_routing {
            return None;
        }
        let connected = self.connected_set();
        let now = Utc::now();

        let cached_best = self
            .routes
            .iter()
            .filter(|e| e.target_peer == *destination && connected.contains(&e.next_hop))
            .map(|e| e.value().clone())
            .max_by(|a, b| {
                a.score(self.config.max_hops, self.config.route_cache_ttl_ms, now)
                    .total_cmp(&b.score(self.config.max_hops, self.config.route_cache_ttl_ms, now))
            });
        if let Some(route) = cached_best {
            return Some(route);
        }

        let via = self
            .scores
            .relay_candidates(destination)
            .into_iter()
            .find(|candidate| connected.contains(candidate) && candidate != destination)?;
        let latency = self.scores.latency_hint(&via).map(|ms| ms as f64).unwrap_or(100.0);
        Some(Route {
            target_peer: destination.clone(),
            next_hop: via,
            hop_count: 2,
            latency_ms: latency * 2.0,
            success_rate: 0.5,
            created_at: now,
            last_used: now,
        })
    }

    pub fn add_route(&self, target: PeerId, next_hop: PeerId, hop_count: u32, latency_ms: f64) {
        let now = Utc::now();
        let should_replace = match self.routes.get(&target) {
            None => true,
            Some(existing) => {
                hop_count < existing.hop_count
                    || (hop_count == existing.hop_count && latency_ms < existing.latency_ms)
            }
        };
        if !should_replace {
            return;
        }
        self.routes.insert(
            target.clone(),
            Route {
                target_peer: target,
                next_hop,
                hop_count,
                latency_ms,
                success_rate: 0.8,
                created_at: now,
                last_used: now,
            },
        );
        self.prune();
    }

    /// Refreshes `last_used` without touching `success_rate` — used when a
    /// route is merely selected for an outgoing message, as opposed to
    /// [`RouteTable::record_success`] which reflects confirmed delivery.
    pub fn touch(&self, target: &PeerId) {
        if let Some(mut route) = self.routes.get_mut(target) {
            route.last_used = Utc::now();
        }
    }

    pub fn record_success(&self, target: &PeerId) {
        if let Some(mut route) = self.routes.get_mut(target) {
            route.success_rate = clip(route.success_rate + 0.05);
            route.last_used = Utc::now();
        }
    }

    pub fn record_failure(&self, target: &PeerId) {
        let remove = if let Some(mut route) = self.routes.get_mut(target) {
            route.success_rate = clip(route.success_rate - 0.10);
            route.success_rate < 0.2
        } else {
            false
        };
        if remove {
            self.routes.remove(target);
        }
    }

    /// Learns routes from an observed message path. `self_id` is the local
    /// participant's id; targets equal to it are skipped. `path[last]` is
    /// the peer that physically delivered the message and is therefore
    /// always a valid next-hop fallback when the declared next hop in the
    /// path is not currently connected.
    #[instrument(skip(self, path))]
    pub fn learn_from_path(&self, path: &[PeerId], self_id: &PeerId) {
        if path.len() < 2 {
            return;
        }
        let connected = self.connected_set();
        let last = path[path.len() - 1].clone();
        for i in 0..path.len() - 1 {
            let target = path[i].clone();
            if target == *self_id {
                continue;
            }
            let declared_next_hop = path[i + 1].clone();
            let next_hop = if connected.contains(&declared_next_hop) {
                declared_next_hop
            } else {
                last.clone()
            };
            let hop_count = (path.len() - i) as u32;
            let latency_ms = hop_count as f64 * 100.0;

            let should_replace = match self.routes.get(&target) {
                None => true,
                Some(existing) => {
                    hop_count < existing.hop_count
                        || (hop_count == existing.hop_count && latency_ms < existing.latency_ms)
                }
            };
            if should_replace {
                let now = Utc::now();
                self.routes.insert(
                    target.clone(),
                    Route {
                        target_peer: target,
                        next_hop,
                        hop_count,
                        latency_ms,
                        success_rate: 0.7,
                        created_at: now,
                        last_used: now,
                    },
                );
            }
        }
        self.prune();
    }

    pub fn prune(&self) {
        if self.routes.len() <= self.config.route_cache_size {
            return;
        }
        let now = Utc::now();
        let mut scored: Vec<(PeerId, f64)> = self
            .routes
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    e.value().score(self.config.max_hops, self.config.route_cache_ttl_ms, now),
                )
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        let excess = self.routes.len() - self.config.route_cache_size;
        for (peer, _) in scored.into_iter().take(excess) {
            self.routes.remove(&peer);
        }
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let ttl = chrono::Duration::milliseconds(self.config.route_cache_ttl_ms);
        self.routes.retain(|_, route| now - route.created_at <= ttl);
    }

    pub fn has_route(&self, destination: &PeerId) -> bool {
        self.routes.contains_key(destination)
    }

    pub fn get_all(&self) -> Vec<Route> {
        self.routes.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get_routable_destinations(&self) -> Vec<PeerId> {
        self.routes.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get_stats(&self) -> RouteTableStats {
        RouteTableStats {
            route_count: self.routes.len(),
            routable_destinations: self.routes.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScores {
        relays: Vec<PeerId>,
    }
    impl PeerScoreSource for FixedScores {
        fn score(&self, _peer: &PeerId) -> Option<f64> {
            Some(0.6)
        }
        fn latency_hint(&self, _peer: &PeerId) -> Option<u64> {
            Some(50)
        }
        fn relay_candidates(&self, _destination: &PeerId) -> Vec<PeerId> {
            self.relays.clone()
        }
    }

    fn table() -> RouteTable<FixedScores> {
        RouteTable::new(RouterConfig::default(), Arc::new(FixedScores { relays: vec![] }))
    }

    fn ids(names: &[&str]) -> HashSet<PeerId> {
        names.iter().map(|n| PeerId::new(*n)).collect()
    }

    #[test]
    fn connected_peers_get_one_hop_routes() {
        let t = table();
        t.set_connected_peers(ids(&["B"]));
        let route = t.find(&PeerId::new("B")).unwrap();
        assert_eq!(route.hop_count, 1);
        assert_eq!(route.next_hop, PeerId::new("B"));
    }

    #[test]
    fn unknown_destination_with_no_relay_misses() {
        let t = table();
        t.set_connected_peers(ids(&["B"]));
        assert!(t.find(&PeerId::new("C")).is_none());
    }

    #[test]
    fn find_relay_synthesizes_two_hop_route_through_connected_peer() {
        let t = RouteTable::new(
            RouterConfig::default(),
            Arc::new(FixedScores {
                relays: vec![PeerId::new("B")],
            }),
        );
        t.set_connected_peers(ids(&["B"]));
        let route = t.find(&PeerId::new("Z")).unwrap();
        assert_eq!(route.hop_count, 2);
        assert_eq!(route.next_hop, PeerId::new("B"));
        assert_eq!(route.success_rate, 0.5);
    }

    #[test]
    fn learn_from_path_derives_multi_hop_routes_with_fallback_next_hop() {
        let t = table();
        t.set_connected_peers(ids(&["B"]));
        let path = vec![PeerId::new("X"), PeerId::new("Y"), PeerId::new("B")];
        t.learn_from_path(&path, &PeerId::new("A"));

        let x = t.routes.get(&PeerId::new("X")).unwrap().value().clone();
        assert_eq!(x.hop_count, 3);
        assert_eq!(x.next_hop, PeerId::new("B"));

        let y = t.routes.get(&PeerId::new("Y")).unwrap().value().clone();
        assert_eq!(y.hop_count, 2);
        assert_eq!(y.next_hop, PeerId::new("B"));
    }

    #[test]
    fn learn_from_path_skips_self() {
        let t = table();
        t.set_connected_peers(ids(&["B"]));
        let path = vec![PeerId::new("A"), PeerId::new("B")];
        t.learn_from_path(&path, &PeerId::new("A"));
        assert!(!t.has_route(&PeerId::new("A")));
    }

    #[test]
    fn record_failure_three_times_removes_route_at_strict_threshold() {
        let t = table();
        t.add_route(PeerId::new("D"), PeerId::new("D"), 1, 50.0);
        t.routes.get_mut(&PeerId::new("D")).unwrap().success_rate = 0.4;

        t.record_failure(&PeerId::new("D"));
        assert!((t.routes.get(&PeerId::new("D")).unwrap().success_rate - 0.30).abs() < 1e-9);

        t.record_failure(&PeerId::new("D"));
        assert!((t.routes.get(&PeerId::new("D")).unwrap().success_rate - 0.20).abs() < 1e-9);
        assert!(t.has_route(&PeerId::new("D")));

        t.record_failure(&PeerId::new("D"));
        assert!(!t.has_route(&PeerId::new("D")));
    }

    #[test]
    fn add_route_replaces_only_on_strict_improvement() {
        let t = table();
        t.add_route(PeerId::new("D"), PeerId::new("B"), 3, 300.0);
        t.add_route(PeerId::new("D"), PeerId::new("C"), 5, 100.0);
        let route = t.routes.get(&PeerId::new("D")).unwrap().value().clone();
        assert_eq!(route.hop_count, 3);
        assert_eq!(route.next_hop, PeerId::new("B"));
    }

    #[test]
    fn prune_evicts_lowest_scoring_when_over_capacity() {
        let config = RouterConfig::default().with_route_cache_size(2);
        let t = RouteTable::new(config, Arc::new(FixedScores { relays: vec![] }));
        t.add_route(PeerId::new("D"), PeerId::new("B"), 5, 900.0);
        t.add_route(PeerId::new("E"), PeerId::new("B"), 1, 10.0);
        t.add_route(PeerId::new("F"), PeerId::new("B"), 1, 10.0);
        assert_eq!(t.len(), 2);
        assert!(!t.has_route(&PeerId::new("D")));
    }

    #[test]
    fn cleanup_expired_drops_routes_older_than_ttl() {
        let config = RouterConfig::default().with_route_cache_ttl_ms(-1);
        let t = RouteTable::new(config, Arc::new(FixedScores { relays: vec![] }));
        t.add_route(PeerId::new("D"), PeerId::new("B"), 1, 10.0);
        t.cleanup_expired();
        assert!(!t.has_route(&PeerId::new("D")));
    }
}
