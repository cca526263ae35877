/// Network provisioning: deterministic per-slot tap device identity
pub mod tap;

pub use tap::TapDevice;
