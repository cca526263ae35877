/// Launch options for one VM run
use crate::net::tap::TapDevice;
use crate::vm::disk::LockMode;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the VM layer needs to launch one run: the composed disk set,
/// the advisory locks derived from it, resource limits, network devices,
/// the hard timeout and the log destination.
#[derive(Clone, Debug)]
pub struct VmOptions {
    /// VM launcher binary.
    pub vm_command: PathBuf,
    /// Disk-role name to host path, in attach order.
    pub disks: Vec<(String, PathBuf)>,
    /// Locks acquired before the process is spawned, held for the run.
    pub file_locks: Vec<(PathBuf, LockMode)>,
    /// Memory limit passed through verbatim (e.g. "96M").
    pub mem: String,
    pub network: Vec<TapDevice>,
    pub timeout: Duration,
    pub vm_log: PathBuf,
}

impl VmOptions {
    /// Render the VM command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.disks.len() + 1 + self.network.len());
        for (name, path) in &self.disks {
            args.push(format!("{}={}", name, path.display()));
        }
        args.push(format!("mem={}", self.mem));
        for device in &self.network {
            args.push(device.vm_arg());
        }
        args
    }
}
