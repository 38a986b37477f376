//! Startup recovery.
//!
//! Picks the most trustworthy base state and replays the WAL on top of it:
//!
//! ```text
//! LoadMain ──ok──────────────────────────────┐
//!    │ missing / corrupt                      │
//!    ▼                                        ▼
//! TryBackups ──.bak.n valid──────────────▶ ReplayWal ──▶ Ready
//!    │ none valid                             ▲
//!    └──────────── empty state ───────────────┘
//! ```
//!
//! A corrupt main file or backup is logged and skipped. The only fatal
//! condition is a WAL that exists but cannot be read.

use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use super::backup::BackupRotator;
use super::snapshot::load_snapshot;
use super::state::StoreState;
use super::wal::WalLog;
use crate::error::Result;

/// Where the recovered state came from before WAL replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryBase {
    MainFile,
    /// Backup slot `n`, where 1 is the most recent.
    Backup(usize),
    Empty,
}

impl fmt::Display for RecoveryBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryBase::MainFile => f.write_str("main file"),
            RecoveryBase::Backup(n) => write!(f, "backup {}", n),
            RecoveryBase::Empty => f.write_str("empty state"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub base: RecoveryBase,
    /// WAL entries applied on top of the base.
    pub replayed: usize,
    /// WAL entries that were malformed, out of order, or failed to apply.
    pub skipped: usize,
    /// The WAL ended with an unterminated line.
    pub torn_tail: bool,
}

/// Output of [`recover`]: the state to serve, the WAL it was built from, and
/// the report handed back to the caller.
#[derive(Debug)]
pub struct Recovered {
    pub state: StoreState,
    pub wal: WalLog,
    pub report: RecoveryReport,
    /// The main file exists but could not be loaded.
    pub main_unusable: bool,
}

impl Recovered {
    /// The data file should be rewritten right away: it was unusable, the
    /// state came from a backup, or the WAL holds bytes that a fresh snapshot
    /// would subsume.
    pub fn needs_checkpoint(&self) -> bool {
        self.main_unusable
            || matches!(self.report.base, RecoveryBase::Backup(_))
            || !self.wal.is_empty()
    }
}

enum Step {
    LoadMain,
    TryBackups,
    ReplayWal(StoreState, RecoveryBase),
    Ready(Recovered),
}

/// Runs the recovery state machine to completion.
pub fn recover(data_file: &Path, wal_file: &Path, backups: &BackupRotator) -> Result<Recovered> {
    let mut main_unusable = false;
    let mut step = Step::LoadMain;
    loop {
        step = match step {
            Step::LoadMain => match load_snapshot(data_file) {
                Ok(Some(state)) => Step::ReplayWal(state, RecoveryBase::MainFile),
                Ok(None) => Step::TryBackups,
                Err(e) => {
                    warn!(path = %data_file.display(), error = %e, "Main data file unusable, trying backups");
                    main_unusable = true;
                    Step::TryBackups
                }
            },
            Step::TryBackups => try_backups(backups),
            Step::ReplayWal(mut state, base) => {
                let wal = WalLog::read(wal_file)?;
                let stats = wal.replay_onto(&mut state);
                let report = RecoveryReport {
                    base,
                    replayed: stats.applied,
                    skipped: stats.skipped,
                    torn_tail: wal.torn_tail,
                };
                Step::Ready(Recovered {
                    state,
                    wal,
                    report,
                    main_unusable,
                })
            }
            Step::Ready(recovered) => {
                let r = &recovered.report;
                info!(
                    base = %r.base,
                    replayed = r.replayed,
                    skipped = r.skipped,
                    torn_tail = r.torn_tail,
                    todos = recovered.state.todos.len(),
                    notes = recovered.state.notes.len(),
                    work_items = recovered.state.work_items.len(),
                    "Recovery complete"
                );
                return Ok(recovered);
            }
        };
    }
}

fn try_backups(backups: &BackupRotator) -> Step {
    for (n, path) in backups.list() {
        match load_snapshot(&path) {
            Ok(Some(state)) => {
                warn!(path = %path.display(), slot = n, "Recovering from backup");
                return Step::ReplayWal(state, RecoveryBase::Backup(n));
            }
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unusable backup"),
        }
    }
    Step::ReplayWal(StoreState::default(), RecoveryBase::Empty)
}
