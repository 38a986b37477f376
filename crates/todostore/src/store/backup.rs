//! Rotating backups of the main data file.
//!
//! Backups live next to the data file as `<data_file>.bak.<n>`, where `.bak.1`
//! is always the most recent. Before each snapshot replaces the main file, the
//! rotator shifts existing backups up one slot, drops anything past the
//! configured count, and copies the current main file into `.bak.1`.
//!
//! Rotation is written to tolerate a crash at any point: every step is either
//! a rename (atomic) or a copy through a temp file, and the main file itself
//! is never moved.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::snapshot::write_atomic;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct BackupRotator {
    data_file: PathBuf,
    count: usize,
}

impl BackupRotator {
    pub fn new(data_file: impl Into<PathBuf>, count: usize) -> Self {
        Self {
            data_file: data_file.into(),
            count,
        }
    }

    pub fn slot_path(&self, n: usize) -> PathBuf {
        let mut name = self.data_file.as_os_str().to_os_string();
        name.push(format!(".bak.{}", n));
        PathBuf::from(name)
    }

    /// Existing backups inside the configured range, newest first.
    pub fn list(&self) -> Vec<(usize, PathBuf)> {
        (1..=self.count)
            .map(|n| (n, self.slot_path(n)))
            .filter(|(_, p)| p.is_file())
            .collect()
    }

    /// Every `.bak.<n>` file on disk, including stray slots past the
    /// configured count, sorted by slot.
    fn existing(&self) -> Result<Vec<usize>> {
        let Some(file_name) = self.data_file.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            return Ok(Vec::new());
        };
        let dir = match self.data_file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let prefix = format!("{}.bak.", file_name);

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut slots: Vec<usize> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                name.strip_prefix(&prefix)?.parse::<usize>().ok()
            })
            .filter(|&n| n >= 1)
            .collect();
        slots.sort_unstable();
        Ok(slots)
    }

    /// Shifts backups up one slot and copies the current main file into
    /// `.bak.1`. With no main file, only pruning and renumbering happen.
    pub fn rotate(&self) -> Result<()> {
        let main_exists = self.data_file.is_file();
        let offset = usize::from(main_exists);
        let keep = self.count.saturating_sub(offset);

        let existing = self.existing()?;
        for &n in existing.iter().skip(keep) {
            let path = self.slot_path(n);
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Pruned backup"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Kept backups move to dense slots starting after the new `.bak.1`.
        // Upward moves go highest first and downward moves lowest first, so a
        // rename never lands on a slot that has not been vacated yet.
        let moves: Vec<(usize, usize)> = existing
            .iter()
            .take(keep)
            .enumerate()
            .map(|(k, &from)| (from, k + 1 + offset))
            .filter(|(from, to)| from != to)
            .collect();

        for &(from, to) in moves.iter().rev().filter(|(from, to)| to > from) {
            fs::rename(self.slot_path(from), self.slot_path(to))?;
        }
        for &(from, to) in moves.iter().filter(|(from, to)| to < from) {
            fs::rename(self.slot_path(from), self.slot_path(to))?;
        }

        if main_exists && self.count > 0 {
            let bytes = fs::read(&self.data_file)?;
            write_atomic(&self.slot_path(1), &bytes)?;
        }

        debug!(
            data_file = %self.data_file.display(),
            count = self.count,
            "Rotated backups"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(count: usize) -> (TempDir, BackupRotator) {
        let dir = TempDir::new().unwrap();
        let rotator = BackupRotator::new(dir.path().join("appdata.json"), count);
        (dir, rotator)
    }

    fn write_main(rotator: &BackupRotator, content: &str) {
        fs::write(&rotator.data_file, content).unwrap();
    }

    fn slot(rotator: &BackupRotator, n: usize) -> Option<String> {
        fs::read_to_string(rotator.slot_path(n)).ok()
    }

    #[test]
    fn test_slot_path_naming() {
        let rotator = BackupRotator::new("data/appdata.json", 3);
        assert_eq!(rotator.slot_path(2), PathBuf::from("data/appdata.json.bak.2"));
    }

    #[test]
    fn test_first_rotation_copies_main() {
        let (_dir, rotator) = setup(3);
        write_main(&rotator, "v1");
        rotator.rotate().unwrap();

        assert_eq!(slot(&rotator, 1).as_deref(), Some("v1"));
        assert_eq!(fs::read_to_string(&rotator.data_file).unwrap(), "v1");
    }

    #[test]
    fn test_rotation_without_main_is_noop() {
        let (_dir, rotator) = setup(3);
        rotator.rotate().unwrap();
        assert!(rotator.list().is_empty());
    }

    #[test]
    fn test_rotation_caps_at_count_newest_first() {
        let (_dir, rotator) = setup(3);
        for v in 1..=5 {
            write_main(&rotator, &format!("v{v}"));
            rotator.rotate().unwrap();
        }

        assert_eq!(slot(&rotator, 1).as_deref(), Some("v5"));
        assert_eq!(slot(&rotator, 2).as_deref(), Some("v4"));
        assert_eq!(slot(&rotator, 3).as_deref(), Some("v3"));
        assert_eq!(slot(&rotator, 4), None);
        assert_eq!(rotator.list().len(), 3);
    }

    #[test]
    fn test_gaps_are_compacted() {
        let (_dir, rotator) = setup(4);
        fs::write(rotator.slot_path(2), "old2").unwrap();
        fs::write(rotator.slot_path(5), "old5").unwrap();
        write_main(&rotator, "current");
        rotator.rotate().unwrap();

        assert_eq!(slot(&rotator, 1).as_deref(), Some("current"));
        assert_eq!(slot(&rotator, 2).as_deref(), Some("old2"));
        assert_eq!(slot(&rotator, 3).as_deref(), Some("old5"));
        assert_eq!(slot(&rotator, 5), None);
    }

    #[test]
    fn test_shrinking_count_prunes_oldest() {
        let (_dir, rotator) = setup(5);
        for v in 1..=5 {
            write_main(&rotator, &format!("v{v}"));
            rotator.rotate().unwrap();
        }

        let smaller = BackupRotator::new(rotator.data_file.clone(), 2);
        write_main(&smaller, "v6");
        smaller.rotate().unwrap();

        assert_eq!(slot(&smaller, 1).as_deref(), Some("v6"));
        assert_eq!(slot(&smaller, 2).as_deref(), Some("v5"));
        for n in 3..=5 {
            assert_eq!(slot(&smaller, n), None);
        }
    }

    #[test]
    fn test_zero_count_keeps_nothing() {
        let (_dir, rotator) = setup(0);
        fs::write(rotator.slot_path(1), "stale").unwrap();
        write_main(&rotator, "v1");
        rotator.rotate().unwrap();

        assert_eq!(slot(&rotator, 1), None);
        assert_eq!(fs::read_to_string(&rotator.data_file).unwrap(), "v1");
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let (dir, rotator) = setup(2);
        fs::write(dir.path().join("appdata.json.bak.old"), "x").unwrap();
        fs::write(dir.path().join("other.json.bak.1"), "y").unwrap();
        write_main(&rotator, "v1");
        rotator.rotate().unwrap();

        assert!(dir.path().join("appdata.json.bak.old").exists());
        assert!(dir.path().join("other.json.bak.1").exists());
        assert_eq!(slot(&rotator, 1).as_deref(), Some("v1"));
    }
}
