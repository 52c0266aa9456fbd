pub mod cache;
pub mod mac;
pub mod probe;
pub mod vendor;

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use parking_lot::Mutex;
use self::cache::BoundedCache;
use self::mac::format_mac;
use self::probe::HardwareAddressSource;
use self::vendor::VendorDatabase;

/// Result of resolving one address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub hardware_address: Option<String>,
    pub vendor: Option<String>,
}

/// Memoized hardware-address and vendor resolution. Every lookup degrades to `None`
/// on failure, and negative results are cached like positive ones.
pub struct IdentityCache {
    probe: Arc<dyn HardwareAddressSource>,
    vendors: Arc<dyn VendorDatabase>,
    hardware_addresses: BoundedCache<IpAddr, Option<String>>,
    vendor_names: BoundedCache<String, Option<String>>,
    /// One gate per address with a probe in flight
    in_flight: Mutex<HashMap<IpAddr, Arc<Mutex<()>>>>,
    /// Hardware addresses that already triggered a vendor database refresh
    refreshed_for: Mutex<HashSet<String>>,
}

impl IdentityCache {
    pub fn new(
        probe: Arc<dyn HardwareAddressSource>,
        vendors: Arc<dyn VendorDatabase>,
        capacity: usize,
    ) -> Self {
        Self {
            probe,
            vendors,
            hardware_addresses: BoundedCache::new(capacity),
            vendor_names: BoundedCache::new(capacity),
            in_flight: Mutex::new(HashMap::new()),
            refreshed_for: Mutex::new(HashSet::new()),
        }
    }

    /// Hardware address and vendor for `ip`. Blocking.
    pub fn resolve(&self, ip: IpAddr) -> Identity {
        let hardware_address = self.hardware_address(ip);
        let vendor = hardware_address.as_deref().and_then(|mac| self.vendor(mac));
        Identity {
            hardware_address,
            vendor,
        }
    }

    /// Active probe, then the neighbor table, then one ping and a second table read.
    /// Concurrent callers for the same address wait for a single probe.
    pub fn hardware_address(&self, ip: IpAddr) -> Option<String> {
        if let Some(cached) = self.hardware_addresses.get(&ip) {
            return cached;
        }

        let gate = self.in_flight.lock().entry(ip).or_default().clone();
        let _guard = gate.lock();

        // Another caller may have finished the probe while we waited
        if let Some(cached) = self.hardware_addresses.get(&ip) {
            return cached;
        }

        let found = self
            .probe
            .active_probe(ip)
            .and_then(|raw| format_mac(&raw))
            .or_else(|| self.probe.neighbor_table(ip).and_then(|raw| format_mac(&raw)))
            .or_else(|| {
                self.probe.reachability_probe(ip);
                self.probe.neighbor_table(ip).and_then(|raw| format_mac(&raw))
            });

        tracing::debug!("Hardware address for {}: {:?}", ip, found);
        self.hardware_addresses.insert(ip, found.clone());

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&ip).is_some_and(|current| Arc::ptr_eq(current, &gate)) {
            in_flight.remove(&ip);
        }
        found
    }

    /// Vendor for a normalized hardware address. A miss refreshes the database and
    /// retries, at most once per address.
    pub fn vendor(&self, mac: &str) -> Option<String> {
        if let Some(cached) = self.vendor_names.get(&mac.to_string()) {
            return cached;
        }

        let mut found = self.lookup_vendor(mac);
        if found.is_none() && self.refreshed_for.lock().insert(mac.to_string()) {
            tracing::debug!("Vendor miss for {}, refreshing vendor database", mac);
            match self.vendors.refresh() {
                Ok(()) => found = self.lookup_vendor(mac),
                Err(e) => tracing::warn!("Vendor database refresh failed: {:#}", e),
            }
        }

        self.vendor_names.insert(mac.to_string(), found.clone());
        found
    }

    fn lookup_vendor(&self, mac: &str) -> Option<String> {
        match self.vendors.lookup(mac) {
            Ok(vendor) => vendor.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::debug!("Vendor lookup for {} failed: {:#}", mac, e);
                None
            }
        }
    }
}
