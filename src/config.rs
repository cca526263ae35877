use crate::types::{Result, SandboxError};
/// Configuration loading from a JSON settings file
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_vm_command() -> PathBuf {
    PathBuf::from("linux")
}

fn default_instance_ram() -> String {
    "96M".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> u64 {
    3
}

fn default_max_output_size() -> u64 {
    10 * 1024 * 1024
}

/// Isolated-network settings for slot tap devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub enabled: bool,
    /// Third octet base of the per-slot private range: slot i gets
    /// 192.168.(start + i).1.
    pub private_ip_range_start: u8,
    /// Identity handed to the external device-creation primitive.
    #[serde(default)]
    pub owner: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            private_ip_range_start: 220,
            owner: String::new(),
        }
    }
}

/// Full settings structure consumed by sandbox slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root under which each slot keeps its numbered work area.
    pub work_dir: PathBuf,
    /// Read-only root filesystem image shared by all slots.
    pub rootfs_path: PathBuf,
    /// VM launcher binary.
    #[serde(default = "default_vm_command")]
    pub vm_command: PathBuf,
    /// Memory limit passed to the VM command line verbatim (e.g. "96M").
    #[serde(default = "default_instance_ram")]
    pub instance_ram: String,
    /// Hard wall-clock limit for one run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum idle interval between runs on the same slot.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Size the output disk is pre-sized to before each run, in bytes.
    #[serde(default = "default_max_output_size")]
    pub max_output_size: u64,
    #[serde(default)]
    pub network: NetworkSettings,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SandboxError::Config(format!(
                "Failed to read settings file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse settings JSON: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check settings for values the slot layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(SandboxError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_output_size == 0 {
            return Err(SandboxError::Config(
                "max_output_size must be greater than zero".to_string(),
            ));
        }
        if self.instance_ram.is_empty() {
            return Err(SandboxError::Config(
                "instance_ram must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_settings_parse_with_defaults() {
        let json = r#"{
            "work_dir": "/var/lib/taskbox/work",
            "rootfs_path": "/var/lib/taskbox/rootfs.img"
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.vm_command, PathBuf::from("linux"));
        assert_eq!(settings.instance_ram, "96M");
        assert_eq!(settings.timeout_secs, 60);
        assert_eq!(settings.cooldown_secs, 3);
        assert_eq!(settings.max_output_size, 10 * 1024 * 1024);
        assert!(!settings.network.enabled);
    }

    #[test]
    fn test_network_settings_parse() {
        let json = r#"{
            "work_dir": "/tmp/w",
            "rootfs_path": "/tmp/r.img",
            "network": {
                "enabled": true,
                "private_ip_range_start": 200,
                "owner": "taskbox"
            }
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(settings.network.enabled);
        assert_eq!(settings.network.private_ip_range_start, 200);
        assert_eq!(settings.network.owner, "taskbox");
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let json = r#"{
            "work_dir": "/tmp/w",
            "rootfs_path": "/tmp/r.img",
            "timeout_secs": 0
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(SandboxError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_missing_file_is_config_error() {
        let err = Settings::load_from_file("/nonexistent/taskbox-settings.json").unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
    }
}
