use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use anyhow::Result;
use shared::types::{DedupKey, RawServiceInfo};
use crate::error::ResolveError;

/// Events delivered by the protocol layer, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// The meta query announced a service type
    TypeFound(String),
    /// An instance appeared
    Added(DedupKey),
    /// An instance was refreshed or re-announced
    Updated(DedupKey),
    /// An instance said goodbye or expired
    Removed(DedupKey),
}

/// Details of one instance
#[derive(Debug, Clone, Default)]
pub struct ResolvedInstance {
    pub addresses: Vec<IpAddr>,
    pub hostname: String,
    pub metadata: BTreeMap<String, String>,
    pub raw: Option<RawServiceInfo>,
}

/// Starts browsing one service type. Events for it arrive on the orchestrator's channel.
pub trait ServiceBrowser: Send + Sync {
    fn browse(&self, service_type: &str) -> Result<()>;
}

/// Blocking, bounded resolve of an instance.
///
/// `Ok(None)` means the instance has no record at all (it was withdrawn before it
/// resolved); a timeout is an error.
pub trait InstanceResolver: Send + Sync {
    fn resolve_instance(
        &self,
        service_type: &str,
        instance_name: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<ResolvedInstance>, ResolveError>;
}
