use crate::config::Settings;
use crate::plugin::PluginRegistry;
use crate::slot::SandboxSlot;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task archive on a slot and print the outcome as JSON
    Run {
        /// Slot index to run on
        #[arg(long, default_value_t = 0)]
        slot: usize,
        /// Task archive; consumed destructively by the slot
        task: PathBuf,
    },
    /// Validate a settings file and exit
    CheckConfig,
}

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = Settings::load_from_file(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?;

    match cli.command {
        Commands::Run { slot, task } => {
            let work_root = settings.work_dir.clone();
            let mut sandbox =
                SandboxSlot::new(slot, settings, &work_root, Arc::new(PluginRegistry::new()))?;

            let handle = sandbox.start(&task)?;
            let outcome = handle.wait();
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::CheckConfig => {
            println!(
                "Settings OK: work dir {}, rootfs {}",
                settings.work_dir.display(),
                settings.rootfs_path.display()
            );
            Ok(())
        }
    }
}
