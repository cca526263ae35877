/// Plugin hook contracts
///
/// Plugins extend a run in exactly two ways: contributing extra disk
/// images, and performing side effects right before execution. Everything
/// else about a plugin is out of scope here. Contributed disk names are
/// validated against the disk-role grammar by the slot, not by the
/// registry.
use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-run context handed to both hooks.
pub struct HookContext<'a> {
    pub slot_index: usize,
    pub work_dir: &'a Path,
    /// Fixed task-input location the caller's archive was moved to.
    pub task_archive: &'a Path,
}

pub trait SandboxPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Extra disk images to attach, keyed by disk-role name.
    fn extra_images(&self, _ctx: &HookContext) -> HashMap<String, PathBuf> {
        HashMap::new()
    }

    /// Side effects before the VM is launched. The return value is
    /// intentionally absent; plugins cannot veto a run.
    fn before_exec(&self, _ctx: &HookContext) {}
}

/// Dispatches the two hooks over every registered plugin.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn SandboxPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn SandboxPlugin>) {
        self.plugins.push(plugin);
    }

    /// Merge every plugin's extra images in registration order. On a name
    /// collision the later registration wins; the overwrite is logged so a
    /// misconfiguration stays visible.
    pub fn extra_images(&self, ctx: &HookContext) -> HashMap<String, PathBuf> {
        let mut merged: HashMap<String, PathBuf> = HashMap::new();
        for plugin in &self.plugins {
            for (name, path) in plugin.extra_images(ctx) {
                if let Some(previous) = merged.insert(name.clone(), path) {
                    warn!(
                        "Plugin {} overrides disk image {} (was {})",
                        plugin.name(),
                        name,
                        previous.display()
                    );
                }
            }
        }
        merged
    }

    pub fn before_exec(&self, ctx: &HookContext) {
        for plugin in &self.plugins {
            plugin.before_exec(ctx);
        }
    }
}
