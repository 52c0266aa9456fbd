pub mod builtin;
pub mod dispatch;

use std::io::Write;
use std::sync::Arc;
use parking_lot::RwLock;
use serde::Serialize;
use shared::names::short_service_name;
use shared::types::Device;
use crate::error::HandlerError;

/// One interactive session with a device. Output goes to `out`.
pub trait Interact: Send + Sync {
    fn interact(&self, device: &Device, out: &mut dyn Write) -> Result<(), HandlerError>;
}

impl<F> Interact for F
where
    F: Fn(&Device, &mut dyn Write) -> Result<(), HandlerError> + Send + Sync,
{
    fn interact(&self, device: &Device, out: &mut dyn Write) -> Result<(), HandlerError> {
        self(device, out)
    }
}

#[derive(Clone)]
pub struct HandlerEntry {
    pub display_name: String,
    pub interact: Arc<dyn Interact>,
}

impl HandlerEntry {
    pub fn new(display_name: impl Into<String>, interact: impl Interact + 'static) -> Self {
        Self {
            display_name: display_name.into(),
            interact: Arc::new(interact),
        }
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// `(key, display_name)` as listed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerInfo {
    pub key: String,
    pub display_name: String,
}

/// Handlers in registration order. Re-registering a key replaces the entry in place.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<Vec<(String, HandlerEntry)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: impl Into<String>, entry: HandlerEntry) {
        let key = key.into();
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = entry,
            None => entries.push((key, entry)),
        }
    }

    /// Registered handlers sorted by key
    pub fn list(&self) -> Vec<HandlerInfo> {
        let mut handlers: Vec<HandlerInfo> = self
            .entries
            .read()
            .iter()
            .map(|(key, entry)| HandlerInfo {
                key: key.clone(),
                display_name: entry.display_name.clone(),
            })
            .collect();
        handlers.sort_by(|a, b| a.key.cmp(&b.key));
        handlers
    }

    pub fn get(&self, key: &str) -> Option<HandlerEntry> {
        self.entries
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, entry)| entry.clone())
    }

    /// Find the handler for `device`: exact short name, then metadata markers, then a
    /// registered key inside the friendly or instance name.
    pub fn find(&self, device: &Device) -> Option<(String, HandlerEntry)> {
        let entries = self.entries.read();
        let lookup = |key: &str| {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(k, entry)| (k.clone(), entry.clone()))
        };

        let short = short_service_name(&device.service_type);
        if let Some(found) = lookup(&short) {
            return Some(found);
        }

        for (key, value) in &device.metadata {
            let pair = format!("{}{}", key, value).to_lowercase();
            if pair.contains("matter") {
                if let Some(found) = lookup("matter") {
                    return Some(found);
                }
            }
            if pair.contains("homeassistant") || pair.contains("hass") {
                if let Some(found) = lookup("home-assistant") {
                    return Some(found);
                }
            }
        }

        let friendly = device.friendly_name.to_lowercase();
        let name = device.instance_name.to_lowercase();
        entries
            .iter()
            .find(|(key, _)| friendly.contains(key.as_str()) || name.contains(key.as_str()))
            .map(|(key, entry)| (key.clone(), entry.clone()))
    }
}
