/// Per-slot virtual network identity
///
/// When networking is enabled each slot gets exactly one tap device whose
/// name and address are pure functions of the slot index and the configured
/// base range. The same slot therefore always presents the same network
/// identity across runs, and distinct slots never collide. Device creation
/// itself is an external capability; this module only derives the identity.
use crate::config::NetworkSettings;
use crate::types::{Result, SandboxError};
use std::net::Ipv4Addr;

/// Tap device identity attached to a slot's VM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapDevice {
    pub name: String,
    pub ip: Ipv4Addr,
    /// Identity the external device-creation primitive should own the
    /// device as.
    pub owner: String,
}

impl TapDevice {
    /// Derive the device identity for a slot index.
    pub fn for_slot(index: usize, settings: &NetworkSettings) -> Result<Self> {
        let octet = settings.private_ip_range_start as usize + index;
        if octet > 254 {
            return Err(SandboxError::Config(format!(
                "Slot {} exceeds the private IP range starting at {}",
                index, settings.private_ip_range_start
            )));
        }

        Ok(TapDevice {
            name: format!("tap_tb{}", index),
            ip: Ipv4Addr::new(192, 168, octet as u8, 1),
            owner: settings.owner.clone(),
        })
    }

    /// Render the VM command-line argument attaching this device as eth0.
    pub fn vm_arg(&self) -> String {
        format!("eth0=tuntap,{},,{}", self.name, self.ip)
    }
}

/// All network devices for a slot: one tap device when networking is
/// enabled, none otherwise.
pub fn devices_for_slot(index: usize, settings: &NetworkSettings) -> Result<Vec<TapDevice>> {
    if settings.enabled {
        Ok(vec![TapDevice::for_slot(index, settings)?])
    } else {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_settings() -> NetworkSettings {
        NetworkSettings {
            enabled: true,
            private_ip_range_start: 220,
            owner: "taskbox".to_string(),
        }
    }

    #[test]
    fn test_identity_is_deterministic() {
        let settings = enabled_settings();
        let a = TapDevice::for_slot(2, &settings).unwrap();
        let b = TapDevice::for_slot(2, &settings).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "tap_tb2");
        assert_eq!(a.ip, Ipv4Addr::new(192, 168, 222, 1));
    }

    #[test]
    fn test_distinct_slots_never_collide() {
        let settings = enabled_settings();
        let a = TapDevice::for_slot(0, &settings).unwrap();
        let b = TapDevice::for_slot(1, &settings).unwrap();
        assert_ne!(a.name, b.name);
        assert_ne!(a.ip, b.ip);
    }

    #[test]
    fn test_disabled_network_yields_no_devices() {
        let settings = NetworkSettings::default();
        assert!(devices_for_slot(0, &settings).unwrap().is_empty());
    }

    #[test]
    fn test_range_overflow_is_config_error() {
        let settings = enabled_settings();
        let err = TapDevice::for_slot(40, &settings).unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
    }

    #[test]
    fn test_vm_arg_format() {
        let settings = enabled_settings();
        let dev = TapDevice::for_slot(0, &settings).unwrap();
        assert_eq!(dev.vm_arg(), "eth0=tuntap,tap_tb0,,192.168.220.1");
    }
}
