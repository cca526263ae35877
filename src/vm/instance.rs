/// VM process lifecycle
///
/// One `VmInstance` drives one VM process at a time: a monitor thread runs
/// the caller's pre-launch hook, acquires the advisory disk locks, spawns
/// the VM with its console redirected to the VM log, then polls the child
/// against the hard timeout and the kill switch. The completion hook runs
/// on the monitor thread, so it must not assume the caller's context.
use crate::types::{Result, SandboxError};
use crate::vm::locks;
use crate::vm::options::VmOptions;
use log::{debug, error, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How the VM process ended, before outcome classification.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The hard wall-clock timeout fired and the process was killed.
    Timeout,
    /// The process exited on its own or after an explicit kill.
    Exited(ExitStatus),
    /// The run never got a usable process (lock, log or spawn failure).
    LaunchFailed(String),
}

pub struct VmInstance {
    index: usize,
    running: Arc<AtomicBool>,
    kill_requested: Arc<AtomicBool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl VmInstance {
    pub fn new(index: usize) -> Self {
        VmInstance {
            index,
            running: Arc::new(AtomicBool::new(false)),
            kill_requested: Arc::new(AtomicBool::new(false)),
            monitor: Mutex::new(None),
        }
    }

    /// Start one run. `pre_launch` runs on the monitor thread before the
    /// process is spawned; `on_done` fires exactly once with the raw
    /// process outcome. The instance stays `running()` until `on_done`
    /// has returned.
    pub fn start<P, D>(&self, options: VmOptions, pre_launch: P, on_done: D) -> Result<()>
    where
        P: FnOnce() + Send + 'static,
        D: FnOnce(ProcessOutcome) + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SandboxError::Busy);
        }
        self.kill_requested.store(false, Ordering::SeqCst);

        let index = self.index;
        let running = Arc::clone(&self.running);
        let kill_requested = Arc::clone(&self.kill_requested);

        let handle = thread::spawn(move || {
            pre_launch();
            let outcome = run_vm(index, &options, &kill_requested);
            on_done(outcome);
            running.store(false, Ordering::SeqCst);
        });

        // A previous handle can only belong to a finished run here.
        *self.monitor.lock().unwrap() = Some(handle);
        Ok(())
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Block until the current run's completion hook has returned.
    /// Returns immediately when idle.
    pub fn wait(&self) {
        let handle = self.monitor.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Instance {}: monitor thread panicked", self.index);
            }
        }
    }

    /// Request forced termination of the current run. Safe no-op when idle.
    pub fn kill(&self) {
        if self.running() {
            debug!("Instance {}: kill requested", self.index);
            self.kill_requested.store(true, Ordering::SeqCst);
        }
    }
}

/// Spawn the VM process and supervise it to completion.
fn run_vm(index: usize, options: &VmOptions, kill_requested: &AtomicBool) -> ProcessOutcome {
    let _locks = match locks::acquire_all(&options.file_locks) {
        Ok(held) => held,
        Err(e) => return ProcessOutcome::LaunchFailed(e.to_string()),
    };

    let log_out = match File::create(&options.vm_log) {
        Ok(f) => f,
        Err(e) => {
            return ProcessOutcome::LaunchFailed(format!(
                "Cannot create VM log {}: {}",
                options.vm_log.display(),
                e
            ))
        }
    };
    let log_err = match log_out.try_clone() {
        Ok(f) => f,
        Err(e) => return ProcessOutcome::LaunchFailed(format!("Cannot clone VM log handle: {}", e)),
    };

    let mut child = match Command::new(&options.vm_command)
        .args(options.to_args())
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_out))
        .stderr(Stdio::from(log_err))
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return ProcessOutcome::LaunchFailed(format!(
                "Failed to start VM process {}: {}",
                options.vm_command.display(),
                e
            ))
        }
    };

    let pid = child.id();
    debug!("Instance {}: VM process started (pid {})", index, pid);

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return ProcessOutcome::Exited(status),
            Ok(None) => {
                if kill_requested.load(Ordering::SeqCst) {
                    warn!("Instance {}: killing VM process on request", index);
                    terminate(pid);
                    return match child.wait() {
                        Ok(status) => ProcessOutcome::Exited(status),
                        Err(e) => {
                            ProcessOutcome::LaunchFailed(format!("Wait after kill failed: {}", e))
                        }
                    };
                }

                if started.elapsed() >= options.timeout {
                    warn!(
                        "Instance {}: VM process exceeded {}s timeout",
                        index,
                        options.timeout.as_secs()
                    );
                    terminate(pid);
                    let _ = child.wait();
                    return ProcessOutcome::Timeout;
                }

                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                terminate(pid);
                let _ = child.wait();
                return ProcessOutcome::LaunchFailed(format!("Process monitoring error: {}", e));
            }
        }
    }
}

/// Terminate a process gracefully then forcefully
fn terminate(pid: u32) {
    let pid = Pid::from_raw(pid as i32);
    let _ = signal::kill(pid, Signal::SIGTERM);
    thread::sleep(Duration::from_millis(100));
    let _ = signal::kill(pid, Signal::SIGKILL);
}
