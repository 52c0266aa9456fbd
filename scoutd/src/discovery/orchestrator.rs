use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use shared::names::friendly_name;
use shared::protocol::normalize_service_type;
use shared::types::{DedupKey, Device};
use crate::discovery::events::{DiscoveryEvent, InstanceResolver, ResolvedInstance, ServiceBrowser};
use crate::discovery::registry::{DedupKeys, ServiceTypeRegistry, Settle};
use crate::enrichment::EnrichmentPipeline;
use crate::error::ResolveError;
use crate::notify::Notifier;
use crate::store::{DeviceStore, Upsert};

/// Turns protocol events into device records.
///
/// Type announcements start a browse, instance events are resolved on their own task so
/// a slow instance never holds up the rest, and every new record with an address is
/// handed to the enrichment pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) browser: Arc<dyn ServiceBrowser>,
    pub(crate) resolver: Arc<dyn InstanceResolver>,
    pub(crate) types: Arc<ServiceTypeRegistry>,
    pub(crate) keys: Arc<DedupKeys>,
    pub(crate) store: Arc<DeviceStore>,
    pub(crate) enrichment: EnrichmentPipeline,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) resolve_timeout: Duration,
    pub(crate) tasks: TaskTracker,
}

impl Orchestrator {
    pub fn new(
        browser: Arc<dyn ServiceBrowser>,
        resolver: Arc<dyn InstanceResolver>,
        store: Arc<DeviceStore>,
        enrichment: EnrichmentPipeline,
        notifier: Arc<Notifier>,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            resolver,
            types: Arc::new(ServiceTypeRegistry::new()),
            keys: Arc::new(DedupKeys::new()),
            store,
            enrichment,
            notifier,
            resolve_timeout,
            tasks: TaskTracker::new(),
        }
    }

    pub fn service_types(&self) -> Vec<String> {
        self.types.list()
    }

    /// Event loop: runs until the channel closes or `cancel` fires
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<DiscoveryEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::info!("Discovery orchestrator started");

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        tracing::info!("Discovery event channel closed");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    tracing::info!("Discovery orchestrator shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle one event without waiting for instance resolution. Claims are taken here,
    /// in event order, so a remove always sees the claim of an earlier add.
    pub fn dispatch(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::TypeFound(service_type) => {
                self.on_type_found(&service_type);
            }
            DiscoveryEvent::Added(key) => match self.keys.claim(&key) {
                Some(generation) => self.spawn_resolve(key, generation),
                None => tracing::debug!("Ignoring duplicate add of {}", key),
            },
            DiscoveryEvent::Updated(key) => match self.keys.reclaim(&key) {
                Some(generation) => self.spawn_resolve(key, generation),
                None => tracing::debug!("Ignoring refresh of tracked instance {}", key),
            },
            DiscoveryEvent::Removed(key) => self.on_removed(&key),
        }
    }

    fn spawn_resolve(&self, key: DedupKey, generation: u64) {
        let orchestrator = self.clone();
        self.tasks.spawn(async move {
            orchestrator.resolve_claimed(key, generation).await;
        });
    }

    /// Start browsing a newly announced type. Returns true if a browse was requested.
    pub fn on_type_found(&self, service_type: &str) -> bool {
        let service_type = normalize_service_type(service_type);
        if !self.types.claim(&service_type) {
            return false;
        }

        tracing::info!("Discovered new service type: {}", service_type);
        if let Err(e) = self.browser.browse(&service_type) {
            tracing::error!("Failed to browse {}: {:#}", service_type, e);
        }
        true
    }

    /// Resolve and record an instance. Returns `None` when the event was a refresh of a
    /// tracked instance or the resolve failed.
    pub async fn on_instance(&self, key: DedupKey) -> Option<Upsert> {
        match self.keys.claim(&key) {
            Some(generation) => self.resolve_claimed(key, generation).await,
            None => {
                tracing::debug!("Ignoring refresh of tracked instance {}", key);
                None
            }
        }
    }

    async fn resolve_claimed(&self, key: DedupKey, generation: u64) -> Option<Upsert> {
        let details = loop {
            match self.resolve(&key).await {
                Ok(details) => match self.keys.settle(&key, generation, details.is_some()) {
                    Settle::Current => break details,
                    Settle::Recheck => {
                        tracing::debug!("Updated while resolving {}, resolving again", key);
                    }
                    Settle::Stale => {
                        tracing::debug!("Discarding stale resolve of {}", key);
                        return None;
                    }
                },
                Err(e) => {
                    tracing::debug!("Dropping {}: {}", key, e);
                    self.keys.release(&key, generation);
                    return None;
                }
            }
        };

        let device = match details {
            Some(details) => device_from_details(&key, details),
            None => {
                tracing::debug!("No record for {}, keeping a minimal entry", key);
                Device::new(
                    key.service_type.clone(),
                    key.instance_name.clone(),
                    friendly_name(&key.service_type, &BTreeMap::new()),
                )
            }
        };

        let has_address = device.primary_address().is_some();
        let Some(upsert) = self.store.apply_discovery(device, generation) else {
            tracing::debug!("{} was removed while resolving", key);
            return None;
        };
        let index = upsert.index();
        tracing::debug!("Recorded {} as device {} ({:?})", key, index, upsert);

        if let Some(snapshot) = self.store.get(index) {
            self.notifier.device(index, &snapshot);
        }
        if has_address {
            self.enrichment.submit(index);
        }
        Some(upsert)
    }

    /// Forget the instance so a later announcement is treated as new. A resolve still in
    /// flight for it is discarded.
    pub fn on_removed(&self, key: &DedupKey) {
        let generation = self.keys.retire(key);
        tracing::debug!("Instance removed: {}", key);
        self.store.apply_removal(key, generation);
    }

    async fn resolve(&self, key: &DedupKey) -> Result<Option<ResolvedInstance>, ResolveError> {
        let resolver = self.resolver.clone();
        let timeout = self.resolve_timeout;
        let service_type = key.service_type.clone();
        let instance_name = key.instance_name.clone();

        tokio::task::spawn_blocking(move || {
            resolver.resolve_instance(&service_type, &instance_name, timeout)
        })
        .await
        .map_err(|e| ResolveError::Daemon(e.to_string()))?
    }

    /// Wait for every in-flight instance resolution to finish
    pub async fn quiesce(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

fn device_from_details(key: &DedupKey, details: ResolvedInstance) -> Device {
    let mut device = Device::new(
        key.service_type.clone(),
        key.instance_name.clone(),
        friendly_name(&key.service_type, &details.metadata),
    );
    device.hostname = details.hostname.trim_end_matches('.').to_string();
    device.ipv4 = details.addresses.iter().find_map(|addr| match addr {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    });
    device.ipv6 = details.addresses.iter().find_map(|addr| match addr {
        IpAddr::V6(v6) => Some(*v6),
        IpAddr::V4(_) => None,
    });
    device.metadata = details.metadata;
    device.raw_service_info = details.raw;
    device
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::sync::atomic::Ordering;
    use crate::discovery::testing::{RecordingBrowser, Script, ScriptedResolver};
    use crate::identity::testing::{ScriptedProbe, ScriptedVendors};
    use crate::identity::IdentityCache;

    const HUE: &str = "_hue._tcp.local.";

    struct Harness {
        orchestrator: Orchestrator,
        browser: Arc<RecordingBrowser>,
        resolver: Arc<ScriptedResolver>,
        store: Arc<DeviceStore>,
        lines: flume::Receiver<String>,
    }

    fn harness(resolver: ScriptedResolver) -> Harness {
        let browser = Arc::new(RecordingBrowser::default());
        let resolver = Arc::new(resolver);
        let store = Arc::new(DeviceStore::new());
        let (notifier, lines) = Notifier::channel(true);
        let notifier = Arc::new(notifier);
        let identity = Arc::new(IdentityCache::new(
            Arc::new(ScriptedProbe::default()),
            Arc::new(ScriptedVendors::default()),
            16,
        ));
        let enrichment = EnrichmentPipeline::new(store.clone(), identity, notifier.clone(), 2);
        let orchestrator = Orchestrator::new(
            browser.clone(),
            resolver.clone(),
            store.clone(),
            enrichment,
            notifier,
            Duration::from_millis(100),
        );
        Harness { orchestrator, browser, resolver, store, lines }
    }

    fn key(name: &str) -> DedupKey {
        DedupKey::new(HUE, format!("{}.{}", name, HUE))
    }

    fn found(addresses: Vec<IpAddr>) -> Script {
        let mut metadata = BTreeMap::new();
        metadata.insert("bridgeid".to_string(), "001788fffe010203".to_string());
        Script::Found(ResolvedInstance {
            addresses,
            hostname: "hue-bridge.local.".to_string(),
            metadata,
            raw: None,
        })
    }

    #[tokio::test]
    async fn test_type_browsed_once() {
        let h = harness(ScriptedResolver::default());

        assert!(h.orchestrator.on_type_found("_hue._tcp.local."));
        assert!(!h.orchestrator.on_type_found("_hue._tcp.local"));
        assert!(h.orchestrator.on_type_found("_ssh._tcp"));

        assert_eq!(
            *h.browser.browsed.lock(),
            vec!["_hue._tcp.local.".to_string(), "_ssh._tcp.local.".to_string()]
        );
        assert_eq!(h.orchestrator.service_types().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_events_record_once() {
        let resolver = ScriptedResolver {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        resolver.script(&key("a").instance_name, vec![found(vec!["10.0.0.7".parse().unwrap()])]);
        let h = harness(resolver);

        h.orchestrator.dispatch(DiscoveryEvent::Added(key("a")));
        h.orchestrator.dispatch(DiscoveryEvent::Updated(key("a")));
        h.orchestrator.dispatch(DiscoveryEvent::Added(key("a")));
        h.orchestrator.quiesce().await;
        h.orchestrator.dispatch(DiscoveryEvent::Updated(key("a")));
        h.orchestrator.quiesce().await;
        h.orchestrator.enrichment.quiesce().await;

        assert_eq!(h.store.len(), 1);
        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 1);
        let first = h.lines.try_recv().unwrap();
        assert!(first.starts_with("[1] Philips Hue Bridge | IP: 10.0.0.7 | Host: hue-bridge.local |"));
        assert!(h.lines.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_record_gives_minimal_device() {
        let resolver = ScriptedResolver::default();
        resolver.script(&key("gone").instance_name, vec![Script::Missing]);
        let h = harness(resolver);

        let upsert = h.orchestrator.on_instance(key("gone")).await;
        assert_eq!(upsert, Some(Upsert::Appended(0)));

        let device = h.store.get(0).unwrap();
        assert_eq!(device.friendly_name, "Philips Hue Bridge");
        assert!(device.ipv4.is_none() && device.ipv6.is_none());
        assert!(device.hostname.is_empty());
        assert!(device.metadata.is_empty());
        assert_eq!(h.orchestrator.enrichment.pending(), 0);
        assert!(h.lines.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_failed_resolve_is_dropped_and_retried() {
        let resolver = ScriptedResolver::default();
        resolver.script(
            &key("slow").instance_name,
            vec![Script::Timeout, found(vec!["10.0.0.9".parse().unwrap()])],
        );
        let h = harness(resolver);

        assert_eq!(h.orchestrator.on_instance(key("slow")).await, None);
        assert!(h.store.is_empty());
        assert!(!h.orchestrator.keys.contains(&key("slow")));
        assert!(h.lines.try_recv().is_err());

        assert_eq!(h.orchestrator.on_instance(key("slow")).await, Some(Upsert::Appended(0)));
        h.orchestrator.enrichment.quiesce().await;
        assert_eq!(h.store.get(0).unwrap().ipv4, Some(Ipv4Addr::new(10, 0, 0, 9)));
    }

    #[tokio::test]
    async fn test_remove_then_rediscover_refreshes_in_place() {
        let resolver = ScriptedResolver::default();
        resolver.script(
            &key("a").instance_name,
            vec![
                found(vec!["10.0.0.7".parse().unwrap()]),
                found(vec!["10.0.0.8".parse().unwrap()]),
            ],
        );
        let h = harness(resolver);

        h.orchestrator.on_instance(key("b")).await;
        assert_eq!(h.orchestrator.on_instance(key("a")).await, Some(Upsert::Appended(1)));
        h.orchestrator.enrichment.quiesce().await;
        h.store.apply_enrichment(1, None, Some("Signify".to_string()));

        h.orchestrator.dispatch(DiscoveryEvent::Removed(key("a")));
        assert!(!h.store.get(1).unwrap().alive);
        assert!(!h.orchestrator.keys.contains(&key("a")));

        assert_eq!(h.orchestrator.on_instance(key("a")).await, Some(Upsert::Refreshed(1)));
        h.orchestrator.enrichment.quiesce().await;

        assert_eq!(h.store.len(), 2);
        let device = h.store.get(1).unwrap();
        assert!(device.alive);
        assert_eq!(device.ipv4, Some(Ipv4Addr::new(10, 0, 0, 8)));
        assert_eq!(device.vendor.as_deref(), Some("Signify"));
    }

    #[tokio::test]
    async fn test_ipv4_preferred_and_ipv6_kept() {
        let resolver = ScriptedResolver::default();
        resolver.script(
            &key("dual").instance_name,
            vec![found(vec![
                "fe80::1".parse().unwrap(),
                "10.0.0.7".parse().unwrap(),
                "10.0.0.8".parse().unwrap(),
            ])],
        );
        let h = harness(resolver);

        h.orchestrator.on_instance(key("dual")).await;
        h.orchestrator.enrichment.quiesce().await;

        let device = h.store.get(0).unwrap();
        assert_eq!(device.ipv4, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(device.ipv6, Some("fe80::1".parse::<Ipv6Addr>().unwrap()));
        assert_eq!(device.primary_address(), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
        assert_eq!(device.hostname, "hue-bridge.local");
        assert_eq!(device.metadata.get("bridgeid").map(String::as_str), Some("001788fffe010203"));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness(ScriptedResolver::default());
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.orchestrator.clone().run(rx, cancel.clone()));

        tx.send(DiscoveryEvent::TypeFound("_ipp._tcp".to_string())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(*h.browser.browsed.lock(), vec!["_ipp._tcp.local.".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remove_during_resolve_discards_result() {
        let resolver = ScriptedResolver {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        resolver.script(
            &key("a").instance_name,
            vec![Script::Missing, found(vec!["10.0.0.7".parse().unwrap()])],
        );
        let h = harness(resolver);

        h.orchestrator.dispatch(DiscoveryEvent::Added(key("a")));
        h.orchestrator.dispatch(DiscoveryEvent::Removed(key("a")));
        h.orchestrator.quiesce().await;

        assert!(!h.orchestrator.keys.contains(&key("a")));
        assert!(h.store.is_empty());
        assert!(h.lines.try_recv().is_err());

        h.orchestrator.dispatch(DiscoveryEvent::Added(key("a")));
        h.orchestrator.quiesce().await;
        h.orchestrator.enrichment.quiesce().await;

        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 2);
        let device = h.store.get(0).unwrap();
        assert!(device.alive);
        assert_eq!(device.ipv4, Some(Ipv4Addr::new(10, 0, 0, 7)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_update_during_resolve_fills_missing_details() {
        let resolver = ScriptedResolver {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        resolver.script(
            &key("a").instance_name,
            vec![Script::Missing, found(vec!["10.0.0.7".parse().unwrap()])],
        );
        let h = harness(resolver);

        h.orchestrator.dispatch(DiscoveryEvent::Added(key("a")));
        h.orchestrator.dispatch(DiscoveryEvent::Updated(key("a")));
        h.orchestrator.quiesce().await;
        h.orchestrator.enrichment.quiesce().await;

        assert_eq!(h.store.len(), 1);
        let device = h.store.get(0).unwrap();
        assert!(device.alive);
        assert_eq!(device.ipv4, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert!(h.lines.try_recv().unwrap().contains("IP: 10.0.0.7"));
        assert!(h.lines.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_adds_and_removes_settle_on_last_event() {
        let resolver = ScriptedResolver {
            delay: Duration::from_millis(5),
            ..Default::default()
        };
        for name in ["a", "b", "c", "d"] {
            resolver.script(&key(name).instance_name, vec![found(vec!["10.0.0.7".parse().unwrap()])]);
        }
        let h = harness(resolver);

        for _ in 0..10 {
            for name in ["a", "b", "c", "d"] {
                h.orchestrator.dispatch(DiscoveryEvent::Added(key(name)));
                h.orchestrator.dispatch(DiscoveryEvent::Removed(key(name)));
            }
        }
        h.orchestrator.dispatch(DiscoveryEvent::Added(key("a")));
        h.orchestrator.dispatch(DiscoveryEvent::Added(key("b")));
        h.orchestrator.quiesce().await;
        h.orchestrator.enrichment.quiesce().await;

        assert!(h.orchestrator.keys.contains(&key("a")));
        assert!(h.orchestrator.keys.contains(&key("b")));
        assert!(!h.orchestrator.keys.contains(&key("c")));
        assert!(!h.orchestrator.keys.contains(&key("d")));
        let alive: Vec<String> = h
            .store
            .snapshot()
            .into_iter()
            .filter(|device| device.alive)
            .map(|device| device.instance_name)
            .collect();
        assert_eq!(alive.len(), 2);
        assert!(alive.contains(&key("a").instance_name));
        assert!(alive.contains(&key("b").instance_name));
    }
}
