/// Sandbox slot lifecycle management
///
/// A `SandboxSlot` owns one numbered execution context: it composes the
/// fixed and plugin-contributed disk images, provisions the slot's network
/// identity, starts the VM process and classifies the run's outcome once
/// the machine exits. One run at a time; outcomes are delivered through a
/// `RunHandle` exactly once per accepted `start()`.
use crate::archive;
use crate::config::Settings;
use crate::net::tap;
use crate::plugin::{HookContext, PluginRegistry};
use crate::slot::cooldown::CooldownTracker;
use crate::slot::workdir::{self, WorkArea};
use crate::types::{ExecutionOutcome, OutputBundle, Result, RunStatus, SandboxError};
use crate::vm::disk::{self, DiskName, LockMode};
use crate::vm::instance::{ProcessOutcome, VmInstance};
use crate::vm::options::VmOptions;
use crossbeam_channel::{bounded, Receiver};
use log::{debug, error, warn};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Receiving end of one run's completion protocol.
///
/// The completion hook runs on the VM monitor thread; this handle is the
/// synchronization boundary back to the caller.
#[derive(Debug)]
pub struct RunHandle {
    rx: Receiver<ExecutionOutcome>,
}

impl RunHandle {
    /// Block until the run's outcome arrives. Consumes the handle: the
    /// outcome of one run is delivered exactly once.
    pub fn wait(self) -> ExecutionOutcome {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Run ended without delivering an outcome");
                ExecutionOutcome {
                    status: RunStatus::Failed,
                    exit_code: None,
                    output: OutputBundle::default(),
                }
            }
        }
    }

    /// Non-blocking probe for the outcome.
    pub fn try_wait(&self) -> Option<ExecutionOutcome> {
        self.rx.try_recv().ok()
    }
}

pub struct SandboxSlot {
    index: usize,
    settings: Settings,
    plugins: Arc<PluginRegistry>,
    work: WorkArea,
    cooldown: Arc<CooldownTracker>,
    vm: VmInstance,
}

impl SandboxSlot {
    /// Construct the slot for `index`. Wipes and recreates the slot's work
    /// area; any artifact of a previous process's runs is gone afterwards.
    /// The cooldown marker is read before the wipe so restarts still honor
    /// the interval.
    pub fn new(
        index: usize,
        settings: Settings,
        work_root: &Path,
        plugins: Arc<PluginRegistry>,
    ) -> Result<Self> {
        let work = WorkArea::new(work_root, index);
        let cooldown = Arc::new(CooldownTracker::new(Duration::from_secs(
            settings.cooldown_secs,
        )));
        // Pick up a previous process's completion stamp before the work
        // area is wiped, so restarts still honor the cooldown.
        cooldown.prime_from_marker(&work.cooldown_marker());
        work.reset()?;

        Ok(SandboxSlot {
            index,
            settings,
            plugins,
            work,
            cooldown,
            vm: VmInstance::new(index),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn work_dir(&self) -> &Path {
        self.work.dir()
    }

    /// Accept one task archive for execution.
    ///
    /// Synchronous failures: `Busy` when a run is already active (the
    /// archive is left untouched), `Config` for an invalid plugin disk
    /// name or network range (no process spawned, no outcome delivered).
    /// On acceptance the archive is moved into the work area — the original
    /// path is no longer valid — and the returned handle delivers the
    /// classified outcome exactly once.
    pub fn start(&mut self, task_archive: &Path) -> Result<RunHandle> {
        if self.busy() {
            return Err(SandboxError::Busy);
        }

        self.cooldown.prime_from_marker(&self.work.cooldown_marker());
        self.work.reset()?;

        let task_path = self.work.task_archive();
        workdir::move_file(task_archive, &task_path)?;

        let ctx = HookContext {
            slot_index: self.index,
            work_dir: self.work.dir(),
            task_archive: &task_path,
        };
        let plugin_images = self.plugins.extra_images(&ctx);
        self.plugins.before_exec(&ctx);

        let options = self.build_options(plugin_images)?;

        let (tx, rx) = bounded(1);
        let index = self.index;

        let prep_cooldown = Arc::clone(&self.cooldown);
        let output_disk = self.work.output_archive();
        let max_output_size = self.settings.max_output_size;
        let pre_launch = move || {
            prep_cooldown.wait_remaining(index);
            if let Err(e) = presize_output_disk(&output_disk, max_output_size) {
                warn!("Slot {}: failed to pre-size output disk: {}", index, e);
            }
        };

        let done_cooldown = Arc::clone(&self.cooldown);
        let marker = self.work.cooldown_marker();
        let output_tar = self.work.output_archive();
        let vm_log = self.work.vm_log();
        let on_done = move |process: ProcessOutcome| {
            done_cooldown.record_completion(&marker);
            let outcome = classify(index, process, &output_tar, &vm_log);
            let _ = tx.send(outcome);
        };

        self.vm.start(options, pre_launch, on_done)?;
        Ok(RunHandle { rx })
    }

    pub fn idle(&self) -> bool {
        !self.busy()
    }

    pub fn busy(&self) -> bool {
        self.vm.running()
    }

    /// Block until the current run's completion hook has fired.
    pub fn wait(&self) {
        self.vm.wait();
    }

    /// Request forced termination of the current run; the completion hook
    /// still fires and classifies the result. Safe no-op while idle.
    pub fn kill(&self) {
        self.vm.kill();
    }

    /// Combine the fixed disks with validated plugin disks into launch
    /// options. Fails fast on a plugin disk name outside the grammar.
    fn build_options(&self, plugin_images: HashMap<String, PathBuf>) -> Result<VmOptions> {
        let task_path = self.work.task_archive();
        let output_path = self.work.output_archive();

        let mut file_locks = vec![
            (self.settings.rootfs_path.clone(), LockMode::Shared),
            (task_path.clone(), LockMode::Exclusive),
            (output_path.clone(), LockMode::Exclusive),
        ];

        // Deterministic attach order regardless of hash-map iteration.
        let mut plugin_disks: Vec<(String, PathBuf)> = plugin_images.into_iter().collect();
        plugin_disks.sort_by(|a, b| a.0.cmp(&b.0));

        let mut disks = vec![
            (disk::ROOT_DISK.to_string(), self.settings.rootfs_path.clone()),
            (disk::TASK_DISK.to_string(), task_path),
            (disk::OUTPUT_DISK.to_string(), output_path),
        ];

        for (name, path) in plugin_disks {
            let parsed = DiskName::parse(&name)?;
            if disks.iter().any(|(fixed, _)| *fixed == name) {
                warn!(
                    "Slot {}: plugin disk {} shadows a fixed disk, ignoring",
                    self.index, name
                );
                continue;
            }
            file_locks.push((path.clone(), parsed.lock_mode()));
            disks.push((name, path));
        }

        Ok(VmOptions {
            vm_command: self.settings.vm_command.clone(),
            disks,
            file_locks,
            mem: self.settings.instance_ram.clone(),
            network: tap::devices_for_slot(self.index, &self.settings.network)?,
            timeout: Duration::from_secs(self.settings.timeout_secs),
            vm_log: self.work.vm_log(),
        })
    }
}

/// Pre-size the output disk so the VM sees a zeroed image of the
/// configured maximum size.
fn presize_output_disk(path: &Path, size: u64) -> std::io::Result<()> {
    let file = File::create(path)?;
    file.set_len(size)?;
    Ok(())
}

/// Deterministic outcome classification.
///
/// Timeout reported by the process layer wins over anything in the output
/// archive. A clean process exit is only `finished` when the archive's
/// exit code extracts to zero. The VM log is required: an unreadable log
/// degrades the run to `failed` but never escapes the completion context.
fn classify(
    index: usize,
    process: ProcessOutcome,
    output_tar: &Path,
    vm_log: &Path,
) -> ExecutionOutcome {
    let (mut status, exit_code) = match process {
        ProcessOutcome::Timeout => (RunStatus::Timeout, None),
        ProcessOutcome::Exited(st) if st.success() => {
            let extracted = archive::extract_file(output_tar, "exit_code.txt")
                .ok()
                .and_then(|s| s.trim().parse::<i32>().ok());
            match extracted {
                Some(0) => (RunStatus::Finished, Some(0)),
                Some(code) => (RunStatus::Failed, Some(code)),
                None => {
                    warn!("Slot {}: failed to extract exit_code.txt", index);
                    (RunStatus::Failed, None)
                }
            }
        }
        ProcessOutcome::Exited(st) => {
            warn!("Slot {}: VM process failed with {}", index, st);
            (RunStatus::Failed, None)
        }
        ProcessOutcome::LaunchFailed(reason) => {
            error!("Slot {}: VM launch failed: {}", index, reason);
            (RunStatus::Failed, None)
        }
    };

    let vm_log_text = match std::fs::read_to_string(vm_log) {
        Ok(text) => text,
        Err(e) => {
            error!(
                "Slot {}: cannot read VM log {}: {}",
                index,
                vm_log.display(),
                e
            );
            status = RunStatus::Failed;
            String::new()
        }
    };

    debug!(
        "Slot {}: status {}, exit code {:?}",
        index, status, exit_code
    );

    ExecutionOutcome {
        status,
        exit_code,
        output: OutputBundle {
            test_output: archive::try_extract_file(output_tar, "test_output.txt")
                .unwrap_or_default(),
            stdout: archive::try_extract_file(output_tar, "stdout.txt").unwrap_or_default(),
            stderr: archive::try_extract_file(output_tar, "stderr.txt").unwrap_or_default(),
            valgrind: archive::try_extract_file(output_tar, "valgrind.log").unwrap_or_default(),
            validations: archive::try_extract_file(output_tar, "validations.json")
                .unwrap_or_default(),
            vm_log: vm_log_text,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use tar::{Builder, Header};

    fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = Builder::new(file);
        for (name, content) in entries {
            let mut header = Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.finish().unwrap();
    }

    fn run_dir() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let output_tar = dir.path().join("output.tar");
        let vm_log = dir.path().join("vm.log");
        fs::write(&vm_log, "console output\n").unwrap();
        (dir, output_tar, vm_log)
    }

    fn exited(raw: i32) -> ProcessOutcome {
        ProcessOutcome::Exited(ExitStatus::from_raw(raw))
    }

    #[test]
    fn test_clean_exit_with_zero_code_is_finished() {
        let (_dir, output_tar, vm_log) = run_dir();
        write_archive(&output_tar, &[("exit_code.txt", "0"), ("stdout.txt", "ok")]);

        let outcome = classify(0, exited(0), &output_tar, &vm_log);
        assert_eq!(outcome.status, RunStatus::Finished);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.output.stdout, "ok");
        // Missing optional entry becomes empty, not an error.
        assert_eq!(outcome.output.stderr, "");
        assert_eq!(outcome.output.vm_log, "console output\n");
    }

    #[test]
    fn test_nonzero_exit_code_is_failed_with_code() {
        let (_dir, output_tar, vm_log) = run_dir();
        write_archive(&output_tar, &[("exit_code.txt", "17")]);

        let outcome = classify(0, exited(0), &output_tar, &vm_log);
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.exit_code, Some(17));
    }

    #[test]
    fn test_timeout_wins_over_archive_contents() {
        let (_dir, output_tar, vm_log) = run_dir();
        write_archive(&output_tar, &[("exit_code.txt", "0")]);

        let outcome = classify(0, ProcessOutcome::Timeout, &output_tar, &vm_log);
        assert_eq!(outcome.status, RunStatus::Timeout);
        assert_eq!(outcome.exit_code, None);
    }

    #[test]
    fn test_unextractable_exit_code_is_failed_without_code() {
        let (_dir, output_tar, vm_log) = run_dir();
        write_archive(&output_tar, &[("stdout.txt", "partial")]);

        let outcome = classify(0, exited(0), &output_tar, &vm_log);
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.output.stdout, "partial");
    }

    #[test]
    fn test_process_failure_is_failed_without_code() {
        let (_dir, output_tar, vm_log) = run_dir();
        write_archive(&output_tar, &[("exit_code.txt", "0")]);

        // Raw wait status 9: killed by SIGKILL.
        let outcome = classify(0, exited(9), &output_tar, &vm_log);
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.exit_code, None);
    }

    #[test]
    fn test_launch_failure_is_failed() {
        let (_dir, output_tar, vm_log) = run_dir();
        let outcome = classify(
            0,
            ProcessOutcome::LaunchFailed("spawn failed".to_string()),
            &output_tar,
            &vm_log,
        );
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.output.vm_log, "");
    }

    #[test]
    fn test_unreadable_vm_log_degrades_to_failed() {
        let dir = tempfile::tempdir().unwrap();
        let output_tar = dir.path().join("output.tar");
        write_archive(&output_tar, &[("exit_code.txt", "0")]);
        let missing_log = dir.path().join("vm.log");

        let outcome = classify(0, exited(0), &output_tar, &missing_log);
        assert_eq!(outcome.status, RunStatus::Failed);
        // Remaining fields are still populated.
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.output.vm_log, "");
    }

    fn test_slot(dir: &Path) -> SandboxSlot {
        let rootfs = dir.join("rootfs.img");
        fs::write(&rootfs, b"rootfs").unwrap();
        let settings = Settings {
            work_dir: dir.join("work"),
            rootfs_path: rootfs,
            vm_command: PathBuf::from("/bin/true"),
            instance_ram: "96M".to_string(),
            timeout_secs: 5,
            cooldown_secs: 0,
            max_output_size: 1024,
            network: Default::default(),
        };
        let work_root = settings.work_dir.clone();
        SandboxSlot::new(0, settings, &work_root, Arc::new(PluginRegistry::new())).unwrap()
    }

    #[test]
    fn test_build_options_rejects_invalid_plugin_disk_name() {
        let dir = tempfile::tempdir().unwrap();
        let slot = test_slot(dir.path());

        let mut images = HashMap::new();
        images.insert("foo".to_string(), PathBuf::from("/images/foo.img"));
        let err = slot.build_options(images).unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
    }

    #[test]
    fn test_build_options_lock_modes_follow_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let slot = test_slot(dir.path());

        let mut images = HashMap::new();
        images.insert("ubdd".to_string(), PathBuf::from("/images/rw.img"));
        images.insert("ubder".to_string(), PathBuf::from("/images/ro.img"));
        let options = slot.build_options(images).unwrap();

        let mode_of = |path: &str| {
            options
                .file_locks
                .iter()
                .find(|(p, _)| p == Path::new(path))
                .map(|(_, m)| *m)
                .unwrap()
        };
        assert_eq!(mode_of("/images/rw.img"), LockMode::Exclusive);
        assert_eq!(mode_of("/images/ro.img"), LockMode::Shared);
        // Root filesystem is always locked shared.
        let rootfs_mode = options.file_locks[0].1;
        assert_eq!(rootfs_mode, LockMode::Shared);
    }

    #[test]
    fn test_build_options_plugin_cannot_shadow_fixed_disk() {
        let dir = tempfile::tempdir().unwrap();
        let slot = test_slot(dir.path());

        let mut images = HashMap::new();
        images.insert("ubdc".to_string(), PathBuf::from("/images/evil.img"));
        let options = slot.build_options(images).unwrap();

        let output_entries: Vec<_> = options
            .disks
            .iter()
            .filter(|(name, _)| name == disk::OUTPUT_DISK)
            .collect();
        assert_eq!(output_entries.len(), 1);
        assert_ne!(output_entries[0].1, PathBuf::from("/images/evil.img"));
    }
}
