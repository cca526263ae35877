/// Output archive extraction
///
/// Pulls named files out of a tar-style output archive. The archive is
/// produced inside the VM, so any entry may legitimately be missing:
/// `extract_file` surfaces that as an error for callers that require the
/// entry, `try_extract_file` maps every failure to `None` with the
/// documented "absence is empty" contract applied at the bundle boundary.
use crate::types::{Result, SandboxError};
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;

/// Extract one named entry from a tar archive as text.
pub fn extract_file(tar_path: &Path, entry_name: &str) -> Result<String> {
    let file = File::open(tar_path).map_err(|e| {
        SandboxError::Process(format!(
            "Cannot open output archive {}: {}",
            tar_path.display(),
            e
        ))
    })?;

    let mut archive = Archive::new(file);
    let entries = archive.entries().map_err(|e| {
        SandboxError::Process(format!(
            "Cannot read output archive {}: {}",
            tar_path.display(),
            e
        ))
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| {
            SandboxError::Process(format!(
                "Corrupt entry in output archive {}: {}",
                tar_path.display(),
                e
            ))
        })?;

        let matches = entry
            .path()
            .map(|p| {
                p.to_string_lossy() == entry_name
                    || p.strip_prefix("./").map(|s| s == Path::new(entry_name)).unwrap_or(false)
            })
            .unwrap_or(false);
        if !matches {
            continue;
        }

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(|e| {
            SandboxError::Process(format!(
                "Failed to extract {} from {}: {}",
                entry_name,
                tar_path.display(),
                e
            ))
        })?;
        return Ok(String::from_utf8_lossy(&buf).into_owned());
    }

    Err(SandboxError::Process(format!(
        "No entry {} in output archive {}",
        entry_name,
        tar_path.display()
    )))
}

/// Extract one named entry, mapping any failure to `None`. Optional
/// instrumentation may legitimately not have run inside the VM.
pub fn try_extract_file(tar_path: &Path, entry_name: &str) -> Option<String> {
    match extract_file(tar_path, entry_name) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("Optional output entry {} unavailable: {}", entry_name, e);
            None
        }
    }
}
