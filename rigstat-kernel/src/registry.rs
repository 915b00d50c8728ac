/**
 * REGISTRE DES REPORTERS - Dernier état connu de chaque rig
 *
 * RÔLE : Map ordonnée (ordre d'insertion) wallet → ReporterRecord, bornée en
 * taille et purgée des reporters silencieux.
 *
 * ÉVICTION (à la demande, pas de timer obligatoire) :
 * - ingest   : au-delà de `max_entries`, on retire les plus anciens (FIFO)
 * - snapshot : les entrées dont `now - server_timestamp >= stale_threshold`
 *              sont exclues ET supprimées du registre
 *
 * CONCURRENCE : un seul Mutex couvre ingest et snapshot, chaque appel est
 * une section critique atomique. Aucune I/O sous le verrou.
 */

use crate::config::RegistryConf;
use crate::models::{Report, ReporterRecord};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::debug;

pub type ReportersMap = IndexMap<String, ReporterRecord>;

pub const MAX_ENTRIES: usize = 100;
pub const STALE_THRESHOLD_SECS: i64 = 600;

/// Horloge serveur en secondes epoch.
pub fn epoch_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[derive(Clone)]
pub struct ReporterRegistry {
    reporters: Arc<Mutex<ReportersMap>>,
    max_entries: usize,
    stale_threshold_secs: i64,
}

impl Default for ReporterRegistry {
    fn default() -> Self {
        Self::new(MAX_ENTRIES, STALE_THRESHOLD_SECS)
    }
}

impl ReporterRegistry {
    pub fn new(max_entries: usize, stale_threshold_secs: i64) -> Self {
        Self {
            // le cap vient de la config : on ne préalloue jamais au-delà du défaut
            reporters: Arc::new(Mutex::new(IndexMap::with_capacity(max_entries.min(MAX_ENTRIES) + 1))),
            max_entries,
            stale_threshold_secs,
        }
    }

    pub fn from_config(conf: &RegistryConf) -> Self {
        Self::new(conf.max_entries, conf.stale_threshold_secs)
    }

    /// Enregistre un rapport horodaté par l'horloge serveur.
    pub fn ingest(&self, report: Report) {
        self.ingest_at(report, epoch_now());
    }

    /// Met à jour en place (position conservée) ou ajoute en fin, puis
    /// applique le cap. Retourne le nombre d'entrées évincées.
    pub fn ingest_at(&self, report: Report, server_timestamp: i64) -> usize {
        let (identifier, record) = report.into_record(server_timestamp);
        let mut map = self.reporters.lock();

        // IndexMap::insert garde l'index d'une clé existante
        map.insert(identifier, record);

        let mut evicted = 0;
        while map.len() > self.max_entries {
            if let Some((wallet, _)) = map.shift_remove_index(0) {
                debug!(%wallet, "evicted oldest reporter (cap {})", self.max_entries);
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }

    /// Purge les entrées périmées puis retourne une copie ordonnée des
    /// entrées fraîches. Attention : mute le registre.
    pub fn snapshot(&self, now: i64) -> ReportersMap {
        let mut map = self.reporters.lock();
        let removed = retain_fresh(&mut map, now, self.stale_threshold_secs);
        if removed > 0 {
            debug!(removed, remaining = map.len(), "evicted stale reporters on snapshot");
        }
        map.clone()
    }

    /// Passe d'éviction explicite, utilisée par le sweeper optionnel.
    pub fn evict_stale(&self, now: i64) -> usize {
        let mut map = self.reporters.lock();
        retain_fresh(&mut map, now, self.stale_threshold_secs)
    }

    pub fn len(&self) -> usize {
        self.reporters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, identifier: &str) -> Option<ReporterRecord> {
        self.reporters.lock().get(identifier).cloned()
    }

    /// Lance une purge périodique des reporters inactifs.
    pub fn spawn_stale_sweeper(&self, interval_secs: u64) -> JoinHandle<()> {
        let registry = self.clone();
        tracing::info!("starting stale reporter sweeper (every {}s)", interval_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            loop {
                interval.tick().await;
                let removed = registry.evict_stale(epoch_now());
                if removed > 0 {
                    tracing::info!(removed, "swept stale reporters");
                }
            }
        })
    }
}

// Un server_timestamp dans le futur (âge négatif) reste frais.
fn retain_fresh(map: &mut ReportersMap, now: i64, stale_threshold_secs: i64) -> usize {
    let before = map.len();
    map.retain(|_, r| now.saturating_sub(r.server_timestamp) < stale_threshold_secs);
    before - map.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, cpu: f64, uptime: u64, ts: i64) -> Report {
        Report {
            identifier: id.to_string(),
            cpu_usage: cpu,
            uptime,
            client_timestamp: ts,
        }
    }

    fn keys(map: &ReportersMap) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_snapshot_returns_insertion_order() {
        let registry = ReporterRegistry::default();
        for (i, id) in ["c", "a", "b"].iter().enumerate() {
            registry.ingest_at(report(id, i as f64, 10, 1), 1000 + i as i64);
        }

        let snap = registry.snapshot(1010);
        assert_eq!(keys(&snap), vec!["c", "a", "b"]);
        assert_eq!(snap["a"].server_timestamp, 1001);
        assert_eq!(snap["b"].cpu_usage, 2.0);
    }

    #[test]
    fn test_reingest_updates_in_place() {
        let registry = ReporterRegistry::default();
        registry.ingest_at(report("a", 1.0, 10, 1), 100);
        registry.ingest_at(report("b", 2.0, 20, 2), 101);
        registry.ingest_at(report("c", 3.0, 30, 3), 102);

        registry.ingest_at(report("a", 99.0, 11, 4), 200);

        let snap = registry.snapshot(200);
        assert_eq!(keys(&snap), vec!["a", "b", "c"]);
        assert_eq!(
            snap["a"],
            ReporterRecord { cpu_usage: 99.0, uptime: 11, client_timestamp: 4, server_timestamp: 200 }
        );
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let registry = ReporterRegistry::default();
        for i in 0..=MAX_ENTRIES {
            registry.ingest_at(report(&format!("rig-{i}"), 1.0, 1, 1), 1000);
        }

        assert_eq!(registry.len(), MAX_ENTRIES);
        assert!(registry.get("rig-0").is_none());
        let snap = registry.snapshot(1000);
        assert_eq!(snap.keys().next().map(String::as_str), Some("rig-1"));
        assert_eq!(snap.keys().last().map(String::as_str), Some("rig-100"));
    }

    #[test]
    fn test_cap_counts_evictions() {
        let registry = ReporterRegistry::new(2, STALE_THRESHOLD_SECS);
        assert_eq!(registry.ingest_at(report("a", 1.0, 1, 1), 1), 0);
        assert_eq!(registry.ingest_at(report("b", 1.0, 1, 1), 1), 0);
        // mise à jour : pas de croissance, pas d'éviction
        assert_eq!(registry.ingest_at(report("a", 2.0, 1, 1), 2), 0);
        assert_eq!(registry.ingest_at(report("c", 1.0, 1, 1), 3), 1);
        assert_eq!(keys(&registry.snapshot(3)), vec!["b", "c"]);
    }

    #[test]
    fn test_huge_configured_cap() {
        let registry = ReporterRegistry::new(usize::MAX, STALE_THRESHOLD_SECS);
        for i in 0..=MAX_ENTRIES {
            assert_eq!(registry.ingest_at(report(&format!("rig-{i}"), 1.0, 1, 1), 1), 0);
        }
        assert_eq!(registry.len(), MAX_ENTRIES + 1);

        let registry = ReporterRegistry::new(1_000_000_000, STALE_THRESHOLD_SECS);
        registry.ingest_at(report("a", 1.0, 1, 1), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_sweeper_evicts_in_background() {
        let registry = ReporterRegistry::new(10, 60);
        let now = epoch_now();
        registry.ingest_at(report("old", 1.0, 1, 1), now - 3600);
        registry.ingest_at(report("fresh", 1.0, 1, 1), now + 3600);

        let sweeper = registry.spawn_stale_sweeper(5);
        for _ in 0..10 {
            if registry.get("old").is_none() {
                break;
            }
            tokio::time::advance(std::time::Duration::from_secs(5)).await;
            tokio::task::yield_now().await;
        }
        sweeper.abort();

        assert!(registry.get("old").is_none());
        assert!(registry.get("fresh").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let registry = ReporterRegistry::new(0, STALE_THRESHOLD_SECS);
        assert_eq!(registry.ingest_at(report("a", 1.0, 1, 1), 1), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_removes_stale_permanently() {
        let registry = ReporterRegistry::default();
        registry.ingest_at(report("old", 1.0, 1, 1), 1000);
        registry.ingest_at(report("edge", 1.0, 1, 1), 1400);
        registry.ingest_at(report("new", 1.0, 1, 1), 1500);

        // old: 600s → périmé, edge: 600s pile → périmé aussi, new: 500s → frais
        let snap = registry.snapshot(2000);
        assert_eq!(keys(&snap), vec!["new"]);
        assert_eq!(registry.len(), 1);

        let again = registry.snapshot(2000);
        assert_eq!(keys(&again), vec!["new"]);
        assert!(registry.get("old").is_none());
    }

    #[test]
    fn test_future_server_timestamp_is_fresh() {
        let registry = ReporterRegistry::default();
        registry.ingest_at(report("a", 1.0, 1, 1), 5000);
        assert_eq!(registry.snapshot(4000).len(), 1);
    }

    #[test]
    fn test_reference_scenario() {
        let registry = ReporterRegistry::default();
        registry.ingest_at(report("A", 12.5, 100, 1000), 5000);

        let snap = registry.snapshot(5000);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"A": {"cpu_usage": 12.5, "uptime": 100, "client_timestamp": 1000, "server_timestamp": 5000}})
        );

        assert!(registry.snapshot(5700).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_stale_pass() {
        let registry = ReporterRegistry::new(10, 60);
        registry.ingest_at(report("a", 1.0, 1, 1), 0);
        registry.ingest_at(report("b", 1.0, 1, 1), 50);
        assert_eq!(registry.evict_stale(100), 1);
        assert_eq!(registry.evict_stale(100), 0);
        assert!(registry.get("b").is_some());
    }

    #[test]
    fn test_concurrent_ingest_respects_cap() {
        let registry = ReporterRegistry::new(50, STALE_THRESHOLD_SECS);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.ingest_at(report(&format!("t{t}-{i}"), 1.0, 1, 1), 1000);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 50);
        assert_eq!(registry.snapshot(1000).len(), 50);
    }

    #[test]
    fn test_ingest_uses_server_clock() {
        let registry = ReporterRegistry::default();
        let before = epoch_now();
        registry.ingest(report("a", 1.0, 1, 42));
        let after = epoch_now();

        let record = registry.get("a").unwrap();
        assert!(record.server_timestamp >= before && record.server_timestamp <= after);
        assert_eq!(record.client_timestamp, 42);
    }
}
