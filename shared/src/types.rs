use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Identity of one advertised instance: `(service_type, instance_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub service_type: String,
    pub instance_name: String,
}

impl DedupKey {
    pub fn new(service_type: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            instance_name: instance_name.into(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.instance_name, self.service_type)
    }
}

/// Opaque handle to the protocol library's own record for a device.
/// Never serialized.
#[derive(Clone)]
pub struct RawServiceInfo(Arc<dyn Any + Send + Sync>);

impl RawServiceInfo {
    pub fn new<T: Any + Send + Sync>(info: T) -> Self {
        Self(Arc::new(info))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for RawServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawServiceInfo(..)")
    }
}

/// A discovered service instance.
/// This is the record held by the device store, returned by the API and written by export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Raw service type, e.g. "_hue._tcp.local."
    pub service_type: String,

    /// Full DNS-SD instance name, e.g. "Hue Bridge - 1A2B3C._hue._tcp.local."
    pub instance_name: String,

    /// Human label derived from the type and metadata
    pub friendly_name: String,

    /// Hostname without the trailing dot, empty when unknown
    pub hostname: String,

    pub ipv4: Option<Ipv4Addr>,

    pub ipv6: Option<Ipv6Addr>,

    /// Upper-case colon-separated MAC, set once by enrichment
    pub hardware_address: Option<String>,

    /// Organization owning the MAC prefix, set once by enrichment
    pub vendor: Option<String>,

    /// TXT record key-value pairs
    pub metadata: BTreeMap<String, String>,

    /// Time the record was first appended
    pub discovered_at: DateTime<Utc>,

    /// False once a remove event was seen, until the instance is advertised again
    pub alive: bool,

    #[serde(skip)]
    pub raw_service_info: Option<RawServiceInfo>,
}

impl Device {
    /// A record with only identity fields filled in.
    pub fn new(
        service_type: impl Into<String>,
        instance_name: impl Into<String>,
        friendly_name: impl Into<String>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            instance_name: instance_name.into(),
            friendly_name: friendly_name.into(),
            hostname: String::new(),
            ipv4: None,
            ipv6: None,
            hardware_address: None,
            vendor: None,
            metadata: BTreeMap::new(),
            discovered_at: Utc::now(),
            alive: true,
            raw_service_info: None,
        }
    }

    pub fn key(&self) -> DedupKey {
        DedupKey::new(self.service_type.clone(), self.instance_name.clone())
    }

    /// Address used for display and enrichment: IPv4 first, then IPv6.
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.ipv4
            .map(IpAddr::V4)
            .or_else(|| self.ipv6.map(IpAddr::V6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_address_prefers_ipv4() {
        let mut device = Device::new("_http._tcp.local.", "web._http._tcp.local.", "HTTP Web Service");
        assert_eq!(device.primary_address(), None);

        device.ipv6 = Some("fe80::1".parse().unwrap());
        assert_eq!(device.primary_address(), Some("fe80::1".parse().unwrap()));

        device.ipv4 = Some(Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(device.primary_address(), Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
    }

    #[test]
    fn test_raw_service_info_not_serialized() {
        let mut device = Device::new("_ssh._tcp.local.", "nas._ssh._tcp.local.", "SSH Service");
        device.raw_service_info = Some(RawServiceInfo::new(42u32));

        let json = serde_json::to_value(&device).unwrap();
        assert!(json.get("raw_service_info").is_none());
        assert_eq!(json["instance_name"], "nas._ssh._tcp.local.");

        let raw = device.raw_service_info.as_ref().unwrap();
        assert_eq!(raw.downcast_ref::<u32>(), Some(&42));
        assert!(raw.downcast_ref::<String>().is_none());
    }
}
