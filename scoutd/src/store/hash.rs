use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::Device;

/// Fields that represent meaningful device state. `discovered_at` and the raw protocol
/// record are left out so a rediscovery with identical data hashes the same.
#[derive(Serialize)]
struct HashView<'a> {
    service_type: &'a str,
    instance_name: &'a str,
    friendly_name: &'a str,
    hostname: &'a str,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
    hardware_address: Option<&'a str>,
    vendor: Option<&'a str>,
    metadata: &'a BTreeMap<String, String>,
    alive: bool,
}

/// SHA-256 over the snapshot, in store order. Lets pollers detect changes cheaply.
pub fn compute_hash(devices: &[Device]) -> String {
    let views: Vec<HashView<'_>> = devices
        .iter()
        .map(|d| HashView {
            service_type: &d.service_type,
            instance_name: &d.instance_name,
            friendly_name: &d.friendly_name,
            hostname: &d.hostname,
            ipv4: d.ipv4,
            ipv6: d.ipv6,
            hardware_address: d.hardware_address.as_deref(),
            vendor: d.vendor.as_deref(),
            metadata: &d.metadata,
            alive: d.alive,
        })
        .collect();

    let mut hasher = Sha256::new();
    for view in &views {
        // Only plain strings, maps and addresses: serialization cannot fail.
        if let Ok(json) = serde_json::to_vec(view) {
            hasher.update(&json);
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
