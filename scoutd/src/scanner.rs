use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use shared::types::Device;
use crate::config::Config;
use crate::discovery::{InstanceResolver, Orchestrator, ServiceBrowser};
use crate::enrichment::EnrichmentPipeline;
use crate::handlers::dispatch::{self, Outcome};
use crate::handlers::{HandlerEntry, HandlerInfo, HandlerRegistry};
use crate::identity::probe::HardwareAddressSource;
use crate::identity::vendor::VendorDatabase;
use crate::identity::IdentityCache;
use crate::notify::Notifier;
use crate::store::{export, hash, DeviceStore};

/// Owns the device store, registries and pipelines of one scanner.
/// Independent scanners share nothing.
pub struct Scanner {
    store: Arc<DeviceStore>,
    notifier: Arc<Notifier>,
    handlers: HandlerRegistry,
    enrichment: EnrichmentPipeline,
    orchestrator: Orchestrator,
    /// Bumped by every scan window; only the newest window mutes on exit
    scan_windows: AtomicU64,
}

impl Scanner {
    pub fn new(
        config: &Config,
        browser: Arc<dyn ServiceBrowser>,
        resolver: Arc<dyn InstanceResolver>,
        probe: Arc<dyn HardwareAddressSource>,
        vendors: Arc<dyn VendorDatabase>,
        notifier: Notifier,
    ) -> Self {
        let store = Arc::new(DeviceStore::new());
        let notifier = Arc::new(notifier);
        let identity = Arc::new(IdentityCache::new(
            probe,
            vendors,
            config.enrichment.cache_capacity,
        ));
        let enrichment = EnrichmentPipeline::new(
            store.clone(),
            identity,
            notifier.clone(),
            config.enrichment.workers,
        );
        let orchestrator = Orchestrator::new(
            browser,
            resolver,
            store.clone(),
            enrichment.clone(),
            notifier.clone(),
            config.discovery.resolve_timeout(),
        );

        Self {
            store,
            notifier,
            handlers: HandlerRegistry::new(),
            enrichment,
            orchestrator,
            scan_windows: AtomicU64::new(0),
        }
    }

    /// Ordered snapshot of every device
    pub fn list_devices(&self) -> Vec<Device> {
        self.store.snapshot()
    }

    pub fn device(&self, index: usize) -> Option<Device> {
        self.store.get(index)
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.notifier.set_enabled(enabled);
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifier.is_enabled()
    }

    /// Show discovery lines for `window`, then mute them again unless a newer scan
    /// window is still open. Returns the device count at the end of the window.
    pub async fn scan(&self, window: Duration) -> usize {
        let this_window = self.scan_windows.fetch_add(1, Ordering::SeqCst) + 1;
        self.notifier.set_enabled(true);
        tokio::time::sleep(window).await;

        if self.scan_windows.load(Ordering::SeqCst) == this_window {
            self.notifier.set_enabled(false);
        }
        let count = self.store.len();
        tracing::info!("Scan window of {:?} finished with {} devices", window, count);
        count
    }

    /// Write the current snapshot as JSON. Returns the number of records written.
    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<usize> {
        export::write_json(&self.store.snapshot(), path)
    }

    pub fn register_handler(&self, key: impl Into<String>, entry: HandlerEntry) {
        self.handlers.register(key, entry);
    }

    pub fn list_handlers(&self) -> Vec<HandlerInfo> {
        self.handlers.list()
    }

    pub fn find_handler(&self, device: &Device) -> Option<(String, HandlerEntry)> {
        self.handlers.find(device)
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Run the matching handler for the device at `index`; `None` if there is no such device
    pub async fn interact(&self, index: usize) -> Option<Outcome> {
        let device = self.store.get(index)?;
        Some(dispatch::interact(&self.handlers, device).await)
    }

    /// SHA-256 over the stable fields of the current snapshot
    pub fn snapshot_hash(&self) -> String {
        hash::compute_hash(&self.store.snapshot())
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn enrichment(&self) -> &EnrichmentPipeline {
        &self.enrichment
    }

    /// Wait for in-flight resolutions, then for the enrichment they queued
    pub async fn quiesce(&self) {
        self.orchestrator.quiesce().await;
        self.enrichment.quiesce().await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::IpAddr;
    use std::sync::Arc;
    use shared::types::DedupKey;
    use crate::config::Config;
    use crate::discovery::testing::{RecordingBrowser, Script, ScriptedResolver};
    use crate::discovery::ResolvedInstance;
    use crate::identity::testing::{ScriptedProbe, ScriptedVendors};
    use crate::notify::Notifier;
    use super::Scanner;

    pub fn instance(addresses: &[&str], hostname: &str) -> Script {
        Script::Found(ResolvedInstance {
            addresses: addresses.iter().map(|a| a.parse::<IpAddr>().unwrap()).collect(),
            hostname: hostname.to_string(),
            ..Default::default()
        })
    }

    /// Scanner over scripted seams with notifications on a channel
    pub fn scanner(
        resolver: ScriptedResolver,
        probe: ScriptedProbe,
        vendors: ScriptedVendors,
    ) -> (Scanner, flume::Receiver<String>) {
        let (notifier, lines) = Notifier::channel(true);
        let scanner = Scanner::new(
            &Config::default(),
            Arc::new(RecordingBrowser::default()),
            Arc::new(resolver),
            Arc::new(probe),
            Arc::new(vendors),
            notifier,
        );
        (scanner, lines)
    }

    pub fn key(service_type: &str, name: &str) -> DedupKey {
        DedupKey::new(service_type, format!("{}.{}", name, service_type))
    }
}
