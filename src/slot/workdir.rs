/// Per-slot work area
///
/// Each slot owns one numbered directory under the work root holding the
/// task input archive, the output archive, the VM log and the cooldown
/// marker. The directory is wiped and recreated at slot construction and at
/// the start of every accepted run so nothing leaks across runs; only the
/// cooldown marker is deliberately written back after each completion.
use crate::types::Result;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct WorkArea {
    index: usize,
    dir: PathBuf,
}

impl WorkArea {
    pub fn new(work_root: &Path, index: usize) -> Self {
        WorkArea {
            index,
            dir: work_root.join(index.to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fixed location the caller's archive is moved to.
    pub fn task_archive(&self) -> PathBuf {
        self.dir.join("task.tar")
    }

    /// Output archive the VM writes its results into.
    pub fn output_archive(&self) -> PathBuf {
        self.dir.join("output.tar")
    }

    pub fn vm_log(&self) -> PathBuf {
        self.dir.join("vm.log")
    }

    /// Completion timestamp surviving process restarts.
    pub fn cooldown_marker(&self) -> PathBuf {
        self.dir.join("cooldown.stamp")
    }

    /// Wipe and recreate the work area.
    pub fn reset(&self) -> Result<()> {
        debug!("Slot {}: clearing work area", self.index);
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

/// Move a file destructively, degrading to copy+remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_per_index() {
        let root = Path::new("/var/lib/taskbox/work");
        let a = WorkArea::new(root, 0);
        let b = WorkArea::new(root, 7);
        assert_eq!(a.task_archive(), root.join("0").join("task.tar"));
        assert_eq!(b.output_archive(), root.join("7").join("output.tar"));
        assert_ne!(a.dir(), b.dir());
    }

    #[test]
    fn test_reset_wipes_previous_contents() {
        let root = tempfile::tempdir().unwrap();
        let area = WorkArea::new(root.path(), 3);
        area.reset().unwrap();

        let leftover = area.dir().join("stale.txt");
        fs::write(&leftover, b"old run").unwrap();
        assert!(leftover.exists());

        area.reset().unwrap();
        assert!(area.dir().exists());
        assert!(!leftover.exists());
    }

    #[test]
    fn test_move_file_is_destructive() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("submission.tar");
        let dst = root.path().join("task.tar");
        fs::write(&src, b"archive").unwrap();

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"archive");
    }
}
