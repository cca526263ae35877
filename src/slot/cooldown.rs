/// Cooldown bookkeeping between reuses of the same slot
///
/// Network setup occasionally fails when a slot's tap device is reused too
/// quickly after the previous run, so every run waits out a minimum idle
/// interval since the slot's last completion before the VM is launched.
/// The authoritative last-completion value lives in memory; the marker file
/// in the work area exists only so the interval survives process restarts
/// and is consulted only when no in-memory value exists yet.
use log::{debug, warn};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct CooldownTracker {
    interval: Duration,
    last_completion: Mutex<Option<SystemTime>>,
}

impl CooldownTracker {
    pub fn new(interval: Duration) -> Self {
        CooldownTracker {
            interval,
            last_completion: Mutex::new(None),
        }
    }

    /// Load the persisted completion timestamp, only when no in-memory
    /// value exists. A missing marker is normal; an unreadable one is
    /// logged and ignored.
    pub fn prime_from_marker(&self, marker: &Path) {
        let mut last = self.last_completion.lock().unwrap();
        if last.is_some() || !marker.exists() {
            return;
        }

        match fs::read_to_string(marker) {
            Ok(content) => match content.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs >= 0.0 => {
                    *last = Some(UNIX_EPOCH + Duration::from_secs_f64(secs));
                }
                _ => warn!(
                    "Ignoring unparseable cooldown marker {}",
                    marker.display()
                ),
            },
            Err(e) => warn!("Failed to read cooldown marker {}: {}", marker.display(), e),
        }
    }

    /// Record a completion now, best-effort persisting it to the marker.
    /// A write failure is logged, never fatal to the run.
    pub fn record_completion(&self, marker: &Path) {
        let now = SystemTime::now();
        *self.last_completion.lock().unwrap() = Some(now);

        let secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        if let Err(e) = fs::write(marker, format!("{}", secs)) {
            warn!("Failed to write cooldown marker {}: {}", marker.display(), e);
        }
    }

    /// Sleep out whatever remains of the cooldown interval.
    pub fn wait_remaining(&self, index: usize) {
        let last = *self.last_completion.lock().unwrap();
        let Some(last) = last else { return };

        if let Ok(remaining) = (last + self.interval).duration_since(SystemTime::now()) {
            debug!(
                "Slot {}: waiting {:.2}s for cooldown",
                index,
                remaining.as_secs_f64()
            );
            std::thread::sleep(remaining);
        }
    }
}
