use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use crate::identity::IdentityCache;
use crate::notify::Notifier;
use crate::store::DeviceStore;

/// Background hardware-address and vendor enrichment. `submit` never waits: each
/// request queues on a semaphore sized to the worker count, then runs the blocking
/// identity lookup on the blocking pool.
#[derive(Clone)]
pub struct EnrichmentPipeline {
    store: Arc<DeviceStore>,
    identity: Arc<IdentityCache>,
    notifier: Arc<Notifier>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<DeviceStore>,
        identity: Arc<IdentityCache>,
        notifier: Arc<Notifier>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            identity,
            notifier,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Queue enrichment of the device at `index`. Must be called within a Tokio runtime.
    pub fn submit(&self, index: usize) {
        let pipeline = self.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = pipeline.permits.clone().acquire_owned().await else {
                return;
            };
            pipeline.enrich(index).await;
        });
    }

    /// Enrich one device now. Does nothing if the device has no address.
    pub async fn enrich(&self, index: usize) {
        let Some(ip) = self.store.address_of(index) else {
            tracing::debug!("Skipping enrichment of device {}: no address", index);
            return;
        };

        let identity = self.identity.clone();
        let resolved = match tokio::task::spawn_blocking(move || identity.resolve(ip)).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("Enrichment of {} failed: {}", ip, e);
                return;
            }
        };

        if let Some(device) =
            self.store
                .apply_enrichment(index, resolved.hardware_address, resolved.vendor)
        {
            tracing::debug!(
                "Enriched {}: mac={:?} vendor={:?}",
                device.instance_name,
                device.hardware_address,
                device.vendor
            );
            self.notifier.device(index, &device);
        }
    }

    /// Tasks submitted and not yet finished
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task submitted so far has finished
    pub async fn quiesce(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
