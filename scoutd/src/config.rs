use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Restrict mDNS to one interface; all interfaces when unset
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_oui_db_path")]
    pub oui_db_path: PathBuf,
    /// IEEE oui.txt or Wireshark manuf file used to (re)build the vendor table
    #[serde(default = "default_oui_source")]
    pub oui_source: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Discovery lines are printed for this long after startup, then muted
    #[serde(default = "default_initial_scan")]
    pub initial_scan_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportConfig {
    /// Write a JSON snapshot here on shutdown
    #[serde(default)]
    pub on_shutdown: Option<PathBuf>,
}

fn default_resolve_timeout_ms() -> u64 {
    2500
}

fn default_event_buffer() -> usize {
    256
}

fn default_workers() -> usize {
    8
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_oui_db_path() -> PathBuf {
    PathBuf::from("/var/lib/iotscout/oui.db")
}

fn default_oui_source() -> PathBuf {
    PathBuf::from("/usr/share/ieee-data/oui.txt")
}

fn default_true() -> bool {
    true
}

fn default_initial_scan() -> u64 {
    12
}

fn default_listen() -> String {
    "127.0.0.1:8054".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interface: None,
            resolve_timeout_ms: default_resolve_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            probe_timeout_secs: default_probe_timeout(),
            cache_capacity: default_cache_capacity(),
            oui_db_path: default_oui_db_path(),
            oui_source: default_oui_source(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            initial_scan_secs: default_initial_scan(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl DiscoveryConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

impl EnrichmentConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.enrichment.workers > 0, "enrichment.workers must be at least 1");
        anyhow::ensure!(
            self.enrichment.cache_capacity > 0,
            "enrichment.cache_capacity must be at least 1"
        );
        anyhow::ensure!(
            (1..10).contains(&self.enrichment.probe_timeout_secs),
            "enrichment.probe_timeout_secs must be between 1 and 9"
        );
        anyhow::ensure!(
            self.discovery.resolve_timeout_ms > 0 && self.discovery.resolve_timeout_ms < 10_000,
            "discovery.resolve_timeout_ms must be between 1 and 9999"
        );
        anyhow::ensure!(self.discovery.event_buffer > 0, "discovery.event_buffer must be at least 1");
        Ok(())
    }
}
