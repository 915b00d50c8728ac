use crate::registry::{MAX_ENTRIES, STALE_THRESHOLD_SECS};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub registry: RegistryConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub bind: SocketAddr,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RegistryConf {
    pub max_entries: usize,
    pub stale_threshold_secs: i64,
    pub sweep_interval_secs: Option<u64>, // None = éviction uniquement sur snapshot
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: SocketAddr::from(([0, 0, 0, 0], 5000)) }
    }
}

impl Default for RegistryConf {
    fn default() -> Self {
        Self {
            max_entries: MAX_ENTRIES,
            stale_threshold_secs: STALE_THRESHOLD_SECS,
            sweep_interval_secs: None,
        }
    }
}

impl KernelConfig {
    /// Un seuil <= 0 rendrait tout reporter périmé au premier snapshot.
    pub fn validated(mut self) -> Self {
        if self.registry.stale_threshold_secs <= 0 {
            warn!(
                "[config] registry.stale_threshold_secs={} ignored, using {}",
                self.registry.stale_threshold_secs, STALE_THRESHOLD_SECS
            );
            self.registry.stale_threshold_secs = STALE_THRESHOLD_SECS;
        }
        self
    }

    /// `PORT` (plateformes d'hébergement) remplace le port de `http.bind`.
    pub fn apply_port_override(&mut self, port: Option<&str>) {
        let Some(raw) = port else { return };
        match raw.trim().parse::<u16>() {
            Ok(p) => self.http.bind.set_port(p),
            Err(_) => warn!("[config] PORT={raw:?} ignored, not a valid port"),
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("RIGSTAT_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = load_config_from(&path).await;
    cfg.apply_port_override(std::env::var("PORT").ok().as_deref());
    cfg
}

pub async fn load_config_from<P: AsRef<Path>>(path: P) -> KernelConfig {
    let path = path.as_ref();
    if !path.exists() {
        info!("[config] no {}, using defaults", path.display());
        return KernelConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    let cfg: KernelConfig = serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("[config] invalid {}: {e}", path.display());
        KernelConfig::default()
    });
    cfg.validated()
}
