use std::io::Write;
use shared::types::Device;
use crate::error::HandlerError;
use crate::handlers::{HandlerEntry, HandlerRegistry};

/// Address or hostname a user would connect to
fn target(device: &Device) -> Result<String, HandlerError> {
    if let Some(ip) = device.primary_address() {
        return Ok(ip.to_string());
    }
    if !device.hostname.is_empty() {
        return Ok(device.hostname.clone());
    }
    Err(HandlerError::MissingField("address or hostname"))
}

fn ssh(device: &Device, out: &mut dyn Write) -> Result<(), HandlerError> {
    let target = target(device)?;
    writeln!(out, "SSH service detected for {}. To connect use: ssh <user>@{}", target, target)?;
    Ok(())
}

fn web(device: &Device, out: &mut dyn Write, scheme: &str) -> Result<(), HandlerError> {
    let target = target(device)?;
    let host = if target.contains(':') {
        format!("[{}]", target)
    } else {
        target
    };
    let path = device
        .metadata
        .get("path")
        .filter(|p| p.starts_with('/'))
        .map(String::as_str)
        .unwrap_or("/");
    writeln!(out, "Web interface: {}://{}{}", scheme, host, path)?;
    Ok(())
}

fn http(device: &Device, out: &mut dyn Write) -> Result<(), HandlerError> {
    web(device, out, "http")
}

fn https(device: &Device, out: &mut dyn Write) -> Result<(), HandlerError> {
    web(device, out, "https")
}

fn matter(_: &Device, out: &mut dyn Write) -> Result<(), HandlerError> {
    writeln!(
        out,
        "Matter device discovered. Matter interactions require a Matter controller."
    )?;
    Ok(())
}

fn home_assistant(device: &Device, out: &mut dyn Write) -> Result<(), HandlerError> {
    writeln!(out, "Home Assistant device discovered:")?;
    for (key, value) in &device.metadata {
        writeln!(out, "  {}: {}", key, value)?;
    }
    Ok(())
}

/// Register the informational handlers available to every scanner
pub fn register_builtin(registry: &HandlerRegistry) {
    registry.register("ssh", HandlerEntry::new("SSH Service", ssh));
    registry.register("http", HandlerEntry::new("HTTP Service", http));
    registry.register("https", HandlerEntry::new("HTTP Service (HTTPS)", https));
    registry.register("matter", HandlerEntry::new("Matter Device", matter));
    registry.register("home-assistant", HandlerEntry::new("Home Assistant", home_assistant));
}
