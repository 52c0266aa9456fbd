use std::io::Write;
use parking_lot::Mutex;
use shared::names::short_service_name;
use shared::types::Device;

/// Where notification lines go
pub enum NotificationSink {
    Stdout,
    Channel(flume::Sender<String>),
}

pub struct Notifier {
    /// Held while a line is written so lines never interleave
    enabled: Mutex<bool>,
    sink: NotificationSink,
}

impl Notifier {
    pub fn stdout(enabled: bool) -> Self {
        Self {
            enabled: Mutex::new(enabled),
            sink: NotificationSink::Stdout,
        }
    }

    /// Notifier that delivers lines to a channel instead of the terminal
    pub fn channel(enabled: bool) -> (Self, flume::Receiver<String>) {
        let (tx, rx) = flume::unbounded();
        let notifier = Self {
            enabled: Mutex::new(enabled),
            sink: NotificationSink::Channel(tx),
        };
        (notifier, rx)
    }

    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.lock() = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    /// Emit the line for the device at store `index`, if notifications are enabled.
    pub fn device(&self, index: usize, device: &Device) {
        let enabled = self.enabled.lock();
        if !*enabled {
            return;
        }

        let line = format_line(index + 1, device);
        match &self.sink {
            NotificationSink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
                let _ = stdout.flush();
            }
            NotificationSink::Channel(tx) => {
                let _ = tx.send(line);
            }
        }
    }
}

/// One-line summary of a device, numbered from 1.
pub fn format_line(number: usize, device: &Device) -> String {
    let friendly = if device.friendly_name.is_empty() {
        short_service_name(&device.service_type)
    } else {
        device.friendly_name.clone()
    };

    let mut parts = vec![format!("[{}] {}", number, friendly)];
    if let Some(ip) = device.primary_address() {
        parts.push(format!("IP: {}", ip));
    }
    if !device.hostname.is_empty() {
        parts.push(format!("Host: {}", device.hostname));
    }
    if let Some(mac) = &device.hardware_address {
        parts.push(format!("MAC: {}", mac));
    }
    if let Some(vendor) = &device.vendor {
        parts.push(format!("Vendor: {}", vendor));
    }
    parts.push(format!("Service: {}", device.service_type));
    parts.push(format!("Name: {}", device.instance_name));
    parts.join(" | ")
}
