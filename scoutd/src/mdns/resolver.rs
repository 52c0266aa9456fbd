use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use std::sync::Arc;
use parking_lot::{Condvar, Mutex};
use mdns_sd::ServiceInfo;
use shared::types::{DedupKey, RawServiceInfo};
use crate::discovery::events::{InstanceResolver, ResolvedInstance};
use crate::error::ResolveError;

enum RecordState {
    Resolved(ResolvedInstance),
    Removed,
}

#[derive(Default)]
struct Records {
    by_key: HashMap<DedupKey, RecordState>,
    closed: bool,
}

/// Latest resolved record per instance, fed by the browser pump.
/// Resolvers block on `changed` until their instance appears.
#[derive(Default)]
pub struct ResolvedRecords {
    records: Mutex<Records>,
    changed: Condvar,
}

impl ResolvedRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// An instance (re)appeared: forget any earlier removal
    pub fn found(&self, key: &DedupKey) {
        let mut records = self.records.lock();
        if matches!(records.by_key.get(key), Some(RecordState::Removed)) {
            records.by_key.remove(key);
        }
    }

    pub fn resolved(&self, key: DedupKey, instance: ResolvedInstance) {
        self.records.lock().by_key.insert(key, RecordState::Resolved(instance));
        self.changed.notify_all();
    }

    pub fn removed(&self, key: DedupKey) {
        self.records.lock().by_key.insert(key, RecordState::Removed);
        self.changed.notify_all();
    }

    /// The pump has stopped; waiting resolvers fail with `Disconnected`
    pub fn close(&self) {
        self.records.lock().closed = true;
        self.changed.notify_all();
    }

    /// Wait up to `timeout` for a record for `key`
    pub fn wait_for(
        &self,
        key: &DedupKey,
        timeout: Duration,
    ) -> Result<Option<ResolvedInstance>, ResolveError> {
        let deadline = Instant::now() + timeout;
        let mut records = self.records.lock();

        loop {
            match records.by_key.get(key) {
                Some(RecordState::Resolved(instance)) => return Ok(Some(instance.clone())),
                Some(RecordState::Removed) => return Ok(None),
                None if records.closed => return Err(ResolveError::Disconnected),
                None => {}
            }

            if self.changed.wait_until(&mut records, deadline).timed_out() {
                return match records.by_key.get(key) {
                    Some(RecordState::Resolved(instance)) => Ok(Some(instance.clone())),
                    Some(RecordState::Removed) => Ok(None),
                    None => Err(ResolveError::Timeout {
                        instance_name: key.instance_name.clone(),
                        timeout,
                    }),
                };
            }
        }
    }
}

/// `InstanceResolver` backed by the records the mDNS daemon has delivered
#[derive(Clone)]
pub struct MdnsResolver {
    records: Arc<ResolvedRecords>,
}

impl MdnsResolver {
    pub fn new(records: Arc<ResolvedRecords>) -> Self {
        Self { records }
    }
}

impl InstanceResolver for MdnsResolver {
    fn resolve_instance(
        &self,
        service_type: &str,
        instance_name: &str,
        timeout: Duration,
    ) -> Result<Option<ResolvedInstance>, ResolveError> {
        self.records
            .wait_for(&DedupKey::new(service_type, instance_name), timeout)
    }
}

/// Convert an mdns-sd ServiceInfo into instance details, keeping the original as raw info
pub fn convert_service_info(info: &ServiceInfo) -> ResolvedInstance {
    // IPv4 first so the first address is the display address
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort_by_key(|addr| (addr.is_ipv6(), *addr));

    let metadata: BTreeMap<String, String> = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    ResolvedInstance {
        addresses,
        hostname: info.get_hostname().to_string(),
        metadata,
        raw: Some(RawServiceInfo::new(info.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DedupKey {
        DedupKey::new("_ipp._tcp.local.", "Printer._ipp._tcp.local.")
    }

    fn instance() -> ResolvedInstance {
        ResolvedInstance {
            addresses: vec!["10.0.0.5".parse().unwrap()],
            hostname: "printer.local.".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_available_immediately() {
        let records = ResolvedRecords::new();
        records.resolved(key(), instance());
        let found = records.wait_for(&key(), Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(found.hostname, "printer.local.");
    }

    #[test]
    fn test_waits_for_late_record() {
        let records = Arc::new(ResolvedRecords::new());
        let resolver = MdnsResolver::new(records.clone());

        let writer = {
            let records = records.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                records.resolved(key(), instance());
            })
        };

        let found = resolver
            .resolve_instance("_ipp._tcp.local.", "Printer._ipp._tcp.local.", Duration::from_secs(2))
            .unwrap();
        writer.join().unwrap();
        assert_eq!(found.unwrap().addresses.len(), 1);
    }

    #[test]
    fn test_timeout_and_removal() {
        let records = ResolvedRecords::new();
        let err = records.wait_for(&key(), Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ResolveError::Timeout { .. }));

        records.removed(key());
        assert!(records.wait_for(&key(), Duration::from_millis(20)).unwrap().is_none());

        records.found(&key());
        assert!(records.wait_for(&key(), Duration::from_millis(5)).is_err());
    }

    #[test]
    fn test_closed_reports_disconnected() {
        let records = ResolvedRecords::new();
        records.close();
        assert!(matches!(
            records.wait_for(&key(), Duration::from_secs(1)),
            Err(ResolveError::Disconnected)
        ));
    }
}
