//! Atomic snapshot writes.
//!
//! A snapshot is written to a uniquely named temp file in the target's
//! directory, synced, then renamed over the target. Readers therefore see
//! either the previous file or the new one, never a mix. The two halves are
//! split ([`stage_snapshot`] then [`StagedFile::commit`]) so the checkpoint
//! can rotate backups between them.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use super::state::StoreState;
use crate::error::{Result, StoreError};

/// A fully written and synced temp file waiting to be renamed into place.
///
/// Dropping it without calling [`commit`](Self::commit) removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// The temp file holding the staged bytes.
    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    /// Renames the temp file over the target.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp, &self.target)?;
        self.committed = true;
        sync_parent(&self.target);
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.tmp) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %self.tmp.display(), error = %e, "Could not remove temp file");
                }
            }
        }
    }
}

/// `.<name>.` prefix shared by every temp file staged for `target`,
/// including those of its backups.
fn tmp_prefix(target: &Path) -> String {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    format!(".{}.", name)
}

fn tmp_path_for(target: &Path) -> PathBuf {
    target.with_file_name(format!("{}{}.tmp", tmp_prefix(target), Uuid::new_v4()))
}

/// Deletes temp files left next to `target` by a process that died between
/// staging and rename. Returns how many were removed.
///
/// Only call this while no other writer can be staging for `target`.
pub fn remove_stale_temps(target: &Path) -> usize {
    let dir = match target.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir,
        None => Path::new("."),
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "Could not scan for stale temp files");
            }
            return 0;
        }
    };

    let prefix = tmp_prefix(target);
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with(&prefix) && name.ends_with(".tmp")) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                warn!(path = %entry.path().display(), "Removed stale temp file");
                removed += 1;
            }
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Could not remove stale temp file"),
        }
    }
    removed
}

/// Makes the rename durable. Directory fsync is a unix notion.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
        warn!(dir = %parent.display(), error = %e, "Could not sync directory");
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// Writes `bytes` to a synced temp file next to `target`.
pub fn stage_bytes(target: &Path, bytes: &[u8]) -> Result<StagedFile> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let staged = StagedFile {
        tmp: tmp_path_for(target),
        target: target.to_path_buf(),
        committed: false,
    };

    let mut file = File::create(&staged.tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(staged)
}

/// Serializes `state` as pretty-printed JSON into a staged temp file.
pub fn stage_snapshot(target: &Path, state: &StoreState) -> Result<StagedFile> {
    let mut bytes = serde_json::to_vec_pretty(state)?;
    bytes.push(b'\n');
    stage_bytes(target, &bytes)
}

/// Replaces `target` with `bytes` atomically.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    stage_bytes(target, bytes)?.commit()
}

/// Loads and checks a snapshot.
///
/// Returns `Ok(None)` if the file does not exist, and
/// [`StoreError::Corruption`] if it cannot be parsed or fails the structural
/// checks in [`StoreState::check`].
pub fn load_snapshot(path: &Path) -> Result<Option<StoreState>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let corrupt = |reason: String| StoreError::Corruption {
        path: path.to_path_buf(),
        reason,
    };

    let state: StoreState = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
    state.check().map_err(corrupt)?;
    Ok(Some(state))
}
