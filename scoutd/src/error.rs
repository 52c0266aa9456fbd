use std::time::Duration;
use thiserror::Error;

/// Failure to resolve an instance's details. Always non-fatal to discovery.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The instance did not resolve within the bound
    #[error("resolve of '{instance_name}' timed out after {timeout:?}")]
    Timeout {
        instance_name: String,
        timeout: Duration,
    },

    /// The protocol daemon has shut down
    #[error("mDNS daemon disconnected")]
    Disconnected,

    /// Any other protocol-level failure
    #[error("mDNS daemon error: {0}")]
    Daemon(String),
}

/// Failure reported by an interaction handler mid-session.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The device lacks something the handler needs (address, hostname, ...)
    #[error("device is missing {0}")]
    MissingField(&'static str),

    /// Writing session output failed
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
