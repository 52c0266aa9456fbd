pub mod browser;
pub mod resolver;

use anyhow::{Context, Result};
use mdns_sd::ServiceDaemon;

/// Start the mDNS daemon, optionally pinned to a single interface
pub fn start_daemon(interface: Option<&str>) -> Result<ServiceDaemon> {
    let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;

    if let Some(interface) = interface {
        daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        daemon
            .enable_interface(interface)
            .with_context(|| format!("Failed to enable interface {}", interface))?;
        tracing::info!("mDNS bound to interface {}", interface);
    }

    Ok(daemon)
}
