use std::io::{BufWriter, Write};
use std::path::Path;
use anyhow::{Context, Result};
use shared::types::Device;

/// Write devices as a pretty-printed JSON array of flat records.
/// The raw protocol record is never part of the output.
pub fn write_json(devices: &[Device], path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, devices)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;

    tracing::info!("Exported {} devices to {}", devices.len(), path.display());
    Ok(devices.len())
}
