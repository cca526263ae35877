/// VM process layer: disk composition, advisory locks and process lifecycle
pub mod disk;
pub mod instance;
pub mod locks;
pub mod options;

pub use instance::{ProcessOutcome, VmInstance};
pub use options::VmOptions;
