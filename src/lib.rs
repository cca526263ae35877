//! taskbox: per-slot lifecycle management for untrusted task execution
//! inside isolated virtual machines
//!
//! # Architecture
//!
//! This crate is organized around one sandbox slot and the capabilities it
//! composes:
//!
//! ## Slot Core ([`slot`])
//! - [`slot::sandbox`]: slot lifecycle (`start`/`busy`/`wait`/`kill`) and
//!   deterministic outcome classification
//! - [`slot::workdir`]: per-slot transient work area
//! - [`slot::cooldown`]: minimum idle interval between reuses of a slot
//!
//! ## VM Layer ([`vm`])
//! - [`vm::instance`]: VM process lifecycle with hard timeout and kill switch
//! - [`vm::disk`]: disk-role name grammar and lock mode derivation
//! - [`vm::locks`]: advisory shared/exclusive file locks on disk images
//! - [`vm::options`]: composed launch options
//!
//! ## Collaborators
//! - [`net::tap`]: deterministic per-slot network identity
//! - [`plugin`]: the two plugin hook contracts (extra images, before exec)
//! - [`archive`]: tolerant output archive extraction
//! - [`config`]: settings file loading
//!
//! # Design Principles
//!
//! 1. **One run at a time per slot** - `start()` is rejected while busy
//! 2. **Nothing leaks across runs** - the work area is wiped per run
//! 3. **Fail fast before spawn** - disk names validated at the composition
//!    boundary
//! 4. **Classification over guessing** - status derives from the process
//!    outcome and the extracted exit code, nothing else

pub mod archive;
pub mod config;
pub mod net;
pub mod plugin;
pub mod slot;
pub mod types;
pub mod vm;

// CLI entrypoint wiring shared by the taskbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::{NetworkSettings, Settings};
pub use slot::{RunHandle, SandboxSlot};
pub use types::{ExecutionOutcome, OutputBundle, Result, RunStatus, SandboxError};
