pub mod export;
pub mod hash;

use std::collections::HashMap;
use std::net::IpAddr;
use parking_lot::Mutex;
use shared::types::{DedupKey, Device};

/// Outcome of [`DeviceStore::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new record was appended at this index
    Appended(usize),
    /// An earlier record for the same key was refreshed in place
    Refreshed(usize),
}

impl Upsert {
    pub fn index(self) -> usize {
        match self {
            Upsert::Appended(index) | Upsert::Refreshed(index) => index,
        }
    }
}

#[derive(Default)]
struct Inner {
    devices: Vec<Device>,
    by_key: HashMap<DedupKey, usize>,
    /// Newest discovery or removal generation applied per key
    generations: HashMap<DedupKey, u64>,
}

impl Inner {
    /// Whether an event at `generation` is older than one already applied for `key`.
    /// Records `generation` otherwise.
    fn advance(&mut self, key: &DedupKey, generation: u64) -> bool {
        match self.generations.get(key) {
            Some(&applied) if applied > generation => true,
            _ => {
                self.generations.insert(key.clone(), generation);
                false
            }
        }
    }

    fn upsert(&mut self, device: Device) -> Upsert {
        let key = device.key();

        if let Some(&index) = self.by_key.get(&key) {
            let existing = &mut self.devices[index];
            existing.friendly_name = device.friendly_name;
            existing.hostname = device.hostname;
            existing.ipv4 = device.ipv4;
            existing.ipv6 = device.ipv6;
            existing.metadata = device.metadata;
            existing.raw_service_info = device.raw_service_info;
            existing.alive = true;
            if existing.hardware_address.is_none() {
                existing.hardware_address = device.hardware_address;
            }
            if existing.vendor.is_none() {
                existing.vendor = device.vendor;
            }
            return Upsert::Refreshed(index);
        }

        let index = self.devices.len();
        self.devices.push(device);
        self.by_key.insert(key, index);
        Upsert::Appended(index)
    }
}

/// Insertion-ordered store of discovered devices. Indices are stable for the life of
/// the store: records are never removed or reordered, only updated in place.
#[derive(Default)]
pub struct DeviceStore {
    inner: Mutex<Inner>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device, or refresh the existing record with the same key.
    ///
    /// A refresh replaces addresses, hostname, metadata and the friendly name, marks the
    /// record alive, and keeps a hardware address or vendor that is already set.
    pub fn upsert(&self, device: Device) -> Upsert {
        self.inner.lock().upsert(device)
    }

    /// Upsert a resolved device unless a newer discovery or removal of the same key was
    /// applied first. Returns `None` for a stale result.
    pub fn apply_discovery(&self, device: Device, generation: u64) -> Option<Upsert> {
        let mut inner = self.inner.lock();
        if inner.advance(&device.key(), generation) {
            return None;
        }
        Some(inner.upsert(device))
    }

    /// Point-in-time copy of one record
    pub fn get(&self, index: usize) -> Option<Device> {
        self.inner.lock().devices.get(index).cloned()
    }

    pub fn index_of(&self, key: &DedupKey) -> Option<usize> {
        self.inner.lock().by_key.get(key).copied()
    }

    /// Point-in-time copy of every record, in insertion order
    pub fn snapshot(&self) -> Vec<Device> {
        self.inner.lock().devices.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn address_of(&self, index: usize) -> Option<IpAddr> {
        self.inner
            .lock()
            .devices
            .get(index)
            .and_then(Device::primary_address)
    }

    /// Fill in enrichment results without overwriting values already present.
    /// Returns a copy of the record when at least one field changed.
    pub fn apply_enrichment(
        &self,
        index: usize,
        hardware_address: Option<String>,
        vendor: Option<String>,
    ) -> Option<Device> {
        let mut inner = self.inner.lock();
        let device = inner.devices.get_mut(index)?;
        let mut changed = false;

        if let Some(mac) = hardware_address.filter(|m| !m.is_empty()) {
            if device.hardware_address.is_none() {
                device.hardware_address = Some(mac);
                changed = true;
            }
        }
        if let Some(vendor) = vendor.filter(|v| !v.is_empty()) {
            if device.vendor.is_none() {
                device.vendor = Some(vendor);
                changed = true;
            }
        }

        changed.then(|| device.clone())
    }

    /// Flag the record for `key` as gone, unless a newer discovery already refreshed it.
    /// Returns its index when a record was flagged.
    pub fn apply_removal(&self, key: &DedupKey, generation: u64) -> Option<usize> {
        let mut inner = self.inner.lock();
        if inner.advance(key, generation) {
            return None;
        }
        let index = *inner.by_key.get(key)?;
        inner.devices[index].alive = false;
        Some(index)
    }
}
