//! The scored catalogue of reachable peers.
//!
//! A `DashMap` of known peers behind a periodic staleness sweep and an
//! idempotent start/stop lifecycle driven by a `running` flag, covering
//! multiple discovery feeds and a composite quality score per peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use meshline_core::{Address, DiscoveryMethod, PeerId, PeerScoreSource};

use crate::config::DiscoveryConfig;
use crate::error::CatalogError;

const MAX_ADDRESSES_PER_PEER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub latency: f64,
    pub uptime: f64,
    pub message_success: f64,
    pub relay_capability: f64,
}

impl Default for ScoreFactors {
    fn default() -> Self {
        Self {
            latency: 0.5,
            uptime: 0.5,
            message_success: 0.5,
            relay_capability: 0.5,
        }
    }
}

impl ScoreFactors {
    pub fn composite(&self) -> f64 {
        0.30 * self.latency + 0.25 * self.uptime + 0.35 * self.message_success
            + 0.10 * self.relay_capability
    }
}

/// Partial update to a peer's [`ScoreFactors`]; `None` fields are left
/// untouched by [`PeerCatalog::update_score`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreFactorsUpdate {
    pub latency: Option<f64>,
    pub uptime: Option<f64>,
    pub message_success: Option<f64>,
    pub relay_capability: Option<f64>,
}

fn clip(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub addresses: Vec<Address>,
    pub capabilities: Vec<String>,
    pub version: String,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub discovery_method: DiscoveryMethod,
    pub score: f64,
    pub metadata: HashMap<String, String>,
}

/// Caller-supplied fields for [`PeerCatalog::add_or_update`]. Fields left at
/// their default are treated as "not provided" for merge purposes, except
/// `addresses`/`capabilities`, which are always merged additively.
#[derive(Debug, Clone, Default)]
pub struct PeerRecordInput {
    pub addresses: Vec<Address>,
    pub capabilities: Vec<String>,
    pub version: Option<String>,
    pub discovery_method: Option<DiscoveryMethod>,
    pub metadata: HashMap<String, String>,
}

fn merge_dedup(existing: &mut Vec<String>, incoming: &[String]) {
    for item in incoming {
        if !existing.contains(item) {
            existing.push(item.clone());
        }
    }
}

fn merge_addresses(existing: &mut Vec<Address>, incoming: &[Address]) {
    for addr in incoming {
        if !existing.contains(addr) {
            existing.push(addr.clone());
        }
    }
    if existing.len() > MAX_ADDRESSES_PER_PEER {
        let overflow = existing.len() - MAX_ADDRESSES_PER_PEER;
        existing.drain(0..overflow);
    }
}

pub struct PeerCatalog {
    config: DiscoveryConfig,
    self_id: Mutex<Option<PeerId>>,
    records: DashMap<PeerId, PeerRecord>,
    factors: DashMap<PeerId, ScoreFactors>,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerCatalog {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            self_id: Mutex::new(None),
            records: DashMap::new(),
            factors: DashMap::new(),
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts the periodic discovery cycle and staleness sweep. Idempotent:
    /// a second call while already running is a no-op.
    #[instrument(skip(self, self_id), fields(self_id = %self_id))]
    pub fn start(self: &Arc<Self>, self_id: PeerId) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.self_id.lock().unwrap() = Some(self_id);

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::new();

        {
            let catalog = Arc::clone(self);
            let mut shutdown_rx = shutdown_tx.subscribe();
            let interval_ms = self.config.discovery_interval_ms;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = ticker.tick() => catalog.run_discovery_cycle(),
                    }
                }
            }));
        }

        {
            let catalog = Arc::clone(self);
            let mut shutdown_rx = shutdown_tx.subscribe();
            let sweep_ms = self.config.peer_timeout_ms / 2;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_millis(sweep_ms.max(1)));
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = ticker.tick() => catalog.cleanup_stale(),
                    }
                }
            }));
        }

        *self.shutdown_tx.lock().unwrap() = Some(shutdown_tx);
        *self.tasks.lock().unwrap() = handles;
        info!("peer catalog started");
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        info!("peer catalog stopped");
    }

    fn run_discovery_cycle(&self) {
        if !self.config.enable_bootstrap {
            return;
        }
        let self_id = self.self_id.lock().unwrap().clone();
        for addr in &self.config.bootstrap_peers {
            let Some(peer_id) = addr.trailing_peer_id() else {
                continue;
            };
            if Some(&peer_id) == self_id.as_ref() {
                continue;
            }
            self.add_or_update(
                peer_id,
                PeerRecordInput {
                    addresses: vec![addr.clone()],
                    discovery_method: Some(DiscoveryMethod::Bootstrap),
                    ..Default::default()
                },
            );
        }
    }

    fn cleanup_stale(&self) {
        let now = Utc::now();
        let timeout = chrono::Duration::milliseconds(self.config.peer_timeout_ms as i64);
        let stale: Vec<PeerId> = self
            .records
            .iter()
            .filter(|entry| now - entry.value().last_seen > timeout)
            .map(|entry| entry.key().clone())
            .collect();
        for peer_id in stale {
            self.remove(&peer_id);
            debug!(peer = %peer_id, "peer timed out");
        }
    }

    #[instrument(skip(self, input), fields(peer = %peer_id))]
    pub fn add_or_update(&self, peer_id: PeerId, input: PeerRecordInput) {
        if Some(&peer_id) == self.self_id.lock().unwrap().as_ref() {
            warn!("refusing to catalog self");
            return;
        }
        let now = Utc::now();

        if let Some(mut entry) = self.records.get_mut(&peer_id) {
            merge_addresses(&mut entry.addresses, &input.addresses);
            merge_dedup(&mut entry.capabilities, &input.capabilities);
            if let Some(version) = input.version {
                entry.version = version;
            }
            for (k, v) in input.metadata {
                entry.metadata.insert(k, v);
            }
            entry.last_seen = now;
            return;
        }

        if self.records.len() >= self.config.max_peers {
            self.evict_lowest_scoring_non_bootstrap();
        }

        let method = input.discovery_method.unwrap_or(DiscoveryMethod::Manual);
        let record = PeerRecord {
            addresses: input.addresses,
            capabilities: input.capabilities,
            version: input.version.unwrap_or_else(|| "unknown".to_string()),
            discovered_at: now,
            last_seen: now,
            discovery_method: method,
            score: method.initial_score(),
            metadata: input.metadata,
        };
        self.records.insert(peer_id.clone(), record);
        self.factors.insert(peer_id.clone(), ScoreFactors::default());
        info!(peer = %peer_id, method = %method, "peer discovered");
    }

    fn evict_lowest_scoring_non_bootstrap(&self) {
        let candidate = self
            .records
            .iter()
            .filter(|e| e.value().discovery_method != DiscoveryMethod::Bootstrap)
            .min_by(|a, b| a.value().score.total_cmp(&b.value().score))
            .map(|e| e.key().clone());
        if let Some(peer_id) = candidate {
            self.remove(&peer_id);
        }
    }

    pub fn remove(&self, peer_id: &PeerId) {
        self.records.remove(peer_id);
        self.factors.remove(peer_id);
    }

    fn recompute_score(&self, peer_id: &PeerId) {
        let Some(factors) = self.factors.get(peer_id) else {
            return;
        };
        let composite = factors.composite();
        if let Some(mut record) = self.records.get_mut(peer_id) {
            record.score = composite;
        }
    }

    pub fn update_score(&self, peer_id: &PeerId, update: ScoreFactorsUpdate) {
        {
            let mut factors = self.factors.entry(peer_id.clone()).or_default();
            if let Some(v) = update.latency {
                factors.latency = clip(v);
            }
            if let Some(v) = update.uptime {
                factors.uptime = clip(v);
            }
            if let Some(v) = update.message_success {
                factors.message_success = clip(v);
            }
            if let Some(v) = update.relay_capability {
                factors.relay_capability = clip(v);
            }
        }
        self.recompute_score(peer_id);
    }

    pub fn record_latency(&self, peer_id: &PeerId, millis: u64) {
        let factor = clip(1.0 - (millis as f64 / 5000.0));
        self.update_score(
            peer_id,
            ScoreFactorsUpdate {
                latency: Some(factor),
                ..Default::default()
            },
        );
    }

    pub fn record_message_success(&self, peer_id: &PeerId, success: bool) {
        let delta = if success { 0.05 } else { -0.10 };
        let current = self
            .factors
            .get(peer_id)
            .map(|f| f.message_success)
            .unwrap_or(0.5);
        self.update_score(
            peer_id,
            ScoreFactorsUpdate {
                message_success: Some(current + delta),
                ..Default::default()
            },
        );
    }

    pub fn record_uptime(&self, peer_id: &PeerId, connected: bool) {
        let delta = if connected { 0.01 } else { -0.05 };
        let current = self.factors.get(peer_id).map(|f| f.uptime).unwrap_or(0.5);
        self.update_score(
            peer_id,
            ScoreFactorsUpdate {
                uptime: Some(current + delta),
                ..Default::default()
            },
        );
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.records.get(peer_id).map(|e| e.value().clone())
    }

    pub fn by_capability(&self, capability: &str) -> Vec<(PeerId, PeerRecord)> {
        self.records
            .iter()
            .filter(|e| e.value().capabilities.iter().any(|c| c.contains(capability)))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn by_min_score(&self, min_score: f64) -> Vec<(PeerId, PeerRecord)> {
        let mut results: Vec<_> = self
            .records
            .iter()
            .filter(|e| e.value().score >= min_score)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        results.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        results
    }

    pub fn top_n(&self, n: usize) -> Vec<(PeerId, PeerRecord)> {
        let mut results: Vec<_> = self
            .records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        results.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        results.truncate(n);
        results
    }

    pub fn relay_peers(&self) -> Vec<(PeerId, PeerRecord)> {
        self.by_capability("relay")
    }

    /// Routing candidates for a destination: a single high-confidence direct
    /// record if one exists, otherwise up to 5 relay-capable peers above the
    /// relay-quality floor.
    pub fn routing_candidates(&self, destination: &PeerId) -> Vec<PeerId> {
        if let Some(record) = self.get(destination) {
            if record.score > 0.5 {
                return vec![destination.clone()];
            }
        }
        let mut relays = self.relay_peers();
        relays.retain(|(_, record)| record.score > 0.3);
        relays.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        relays.into_iter().take(5).map(|(id, _)| id).collect()
    }

    pub fn export(&self) -> Result<String, CatalogError> {
        #[derive(Serialize)]
        struct ExportedPeer {
            id: PeerId,
            addresses: Vec<Address>,
            capabilities: Vec<String>,
            score: f64,
        }
        let entries: Vec<ExportedPeer> = self
            .records
            .iter()
            .map(|e| ExportedPeer {
                id: e.key().clone(),
                addresses: e.value().addresses.clone(),
                capabilities: e.value().capabilities.clone(),
                score: e.value().score,
            })
            .collect();
        serde_json::to_string(&entries).map_err(|e| CatalogError::SerializationFailed(e.to_string()))
    }

    pub fn import(&self, json: &str) -> Result<(), CatalogError> {
        #[derive(Deserialize)]
        struct ImportedPeer {
            id: PeerId,
            addresses: Vec<Address>,
            capabilities: Vec<String>,
        }
        let entries: Vec<ImportedPeer> =
            serde_json::from_str(json).map_err(|e| CatalogError::DeserializationFailed(e.to_string()))?;
        for entry in entries {
            self.add_or_update(
                entry.id,
                PeerRecordInput {
                    addresses: entry.addresses,
                    capabilities: entry.capabilities,
                    discovery_method: Some(DiscoveryMethod::Manual),
                    ..Default::default()
                },
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PeerScoreSource for PeerCatalog {
    fn score(&self, peer: &PeerId) -> Option<f64> {
        self.records.get(peer).map(|r| r.score)
    }

    fn latency_hint(&self, peer: &PeerId) -> Option<u64> {
        self.factors
            .get(peer)
            .map(|f| ((1.0 - f.latency) * 5000.0) as u64)
    }

    fn relay_candidates(&self, destination: &PeerId) -> Vec<PeerId> {
        self.routing_candidates(destination)
            .into_iter()
            .filter(|id| id != destination)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Arc<PeerCatalog> {
        Arc::new(PeerCatalog::new(DiscoveryConfig::default()))
    }

    #[test]
    fn composite_score_matches_weighted_formula() {
        let factors = ScoreFactors {
            latency: 1.0,
            uptime: 1.0,
            message_success: 1.0,
            relay_capability: 1.0,
        };
        assert!((factors.composite() - 1.0).abs() < 1e-9);

        let factors = ScoreFactors::default();
        assert!((factors.composite() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn add_or_update_assigns_discovery_method_initial_score() {
        let cat = catalog();
        cat.add_or_update(
            PeerId::new("B"),
            PeerRecordInput {
                discovery_method: Some(DiscoveryMethod::Bootstrap),
                ..Default::default()
            },
        );
        assert_eq!(cat.get(&PeerId::new("B")).unwrap().score, 0.8);
    }

    #[test]
    fn add_or_update_merges_addresses_and_caps_at_ten() {
        let cat = catalog();
        for i in 0..12 {
            cat.add_or_update(
                PeerId::new("B"),
                PeerRecordInput {
                    addresses: vec![Address::new(format!("addr{i}"))],
                    ..Default::default()
                },
            );
        }
        let record = cat.get(&PeerId::new("B")).unwrap();
        assert_eq!(record.addresses.len(), 10);
        assert_eq!(record.addresses.last().unwrap().as_str(), "addr11");
    }

    #[test]
    fn self_is_never_cataloged() {
        let cat = catalog();
        *cat.self_id.lock().unwrap() = Some(PeerId::new("A"));
        cat.add_or_update(PeerId::new("A"), PeerRecordInput::default());
        assert!(cat.get(&PeerId::new("A")).is_none());
    }

    #[test]
    fn record_message_success_increments_and_decrements() {
        let cat = catalog();
        cat.add_or_update(PeerId::new("B"), PeerRecordInput::default());
        cat.record_message_success(&PeerId::new("B"), true);
        let score_up = cat.factors.get(&PeerId::new("B")).unwrap().message_success;
        assert!((score_up - 0.55).abs() < 1e-9);
        cat.record_message_success(&PeerId::new("B"), false);
        let score_down = cat.factors.get(&PeerId::new("B")).unwrap().message_success;
        assert!((score_down - 0.45).abs() < 1e-9);
    }

    #[test]
    fn routing_candidates_prefers_direct_high_score_peer() {
        let cat = catalog();
        cat.add_or_update(
            PeerId::new("B"),
            PeerRecordInput {
                discovery_method: Some(DiscoveryMethod::Manual),
                ..Default::default()
            },
        );
        let candidates = cat.routing_candidates(&PeerId::new("B"));
        assert_eq!(candidates, vec![PeerId::new("B")]);
    }

    #[test]
    fn export_import_roundtrips_addresses_and_capabilities() {
        let cat = catalog();
        cat.add_or_update(
            PeerId::new("B"),
            PeerRecordInput {
                addresses: vec![Address::new("addr0")],
                capabilities: vec!["relay".to_string()],
                ..Default::default()
            },
        );
        let json = cat.export().unwrap();

        let cat2 = catalog();
        cat2.import(&json).unwrap();
        let record = cat2.get(&PeerId::new("B")).unwrap();
        assert_eq!(record.addresses, vec![Address::new("addr0")]);
        assert_eq!(record.capabilities, vec!["relay".to_string()]);
        assert_eq!(record.discovery_method, DiscoveryMethod::Manual);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_halts_tasks() {
        let cat = catalog();
        cat.start(PeerId::new("A"));
        cat.start(PeerId::new("A"));
        assert!(cat.running.load(Ordering::SeqCst));
        cat.stop();
        assert!(!cat.running.load(Ordering::SeqCst));
    }
}
