/// Disk-role name grammar and lock mode derivation
///
/// Every disk presented to the VM is keyed by a role name of the form
/// `ubd<device>[c][r][c]`: the `ubd` mnemonic, one device character, an
/// optional copy-on-write marker and an optional `r` requesting a shared
/// (read) lock. No `r` means the disk is locked exclusively. Names outside
/// this grammar are rejected before any process is spawned.
use crate::types::{Result, SandboxError};

/// Role name of the read-only root filesystem image.
pub const ROOT_DISK: &str = "ubdarc";
/// Role name of the task input archive.
pub const TASK_DISK: &str = "ubdbr";
/// Role name of the output archive.
pub const OUTPUT_DISK: &str = "ubdc";

/// Advisory lock mode requested for a disk image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Concurrent readers allowed, serialized behind exclusive holders.
    Shared,
    /// Single writer.
    Exclusive,
}

/// Parsed disk-role name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskName {
    /// Device character following the `ubd` mnemonic.
    pub device: char,
    /// Copy-on-write marker was present.
    pub cow: bool,
    /// `r` suffix was present, requesting a shared lock.
    pub shared: bool,
}

impl DiskName {
    /// Parse a disk-role name, or fail with a configuration error.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || SandboxError::Config(format!("Invalid disk image name: {}", name));

        let rest = name.strip_prefix("ubd").ok_or_else(invalid)?;
        let mut chars = rest.chars();
        let device = chars.next().ok_or_else(invalid)?;

        let tail: Vec<char> = chars.collect();
        let mut cow = false;
        let mut shared = false;
        let mut i = 0;
        if i < tail.len() && tail[i] == 'c' {
            cow = true;
            i += 1;
        }
        if i < tail.len() && tail[i] == 'r' {
            shared = true;
            i += 1;
        }
        if i < tail.len() && tail[i] == 'c' {
            cow = true;
            i += 1;
        }
        if i != tail.len() {
            return Err(invalid());
        }

        Ok(DiskName {
            device,
            cow,
            shared,
        })
    }

    pub fn lock_mode(&self) -> LockMode {
        if self.shared {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        }
    }
}
