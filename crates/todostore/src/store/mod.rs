//! # Store Facade
//!
//! [`Store`] owns the data file, the WAL and the backups for one process.
//! It is opened once, shared by reference (or `Arc`), and closed explicitly.
//!
//! ## Write path
//!
//! Every mutation runs under one writer lock:
//!
//! 1. Validate and normalize the input (see [`crate::validation`]).
//! 2. Assign the id and stamp the timestamps.
//! 3. Append the [`WalEntry`](wal::WalEntry) and fsync it.
//! 4. Apply the same entry to the in-memory state with [`StoreState::apply`].
//! 5. Checkpoint if the WAL has reached `snapshot_every` entries.
//!
//! A crash before step 3 completes means the mutation never happened. A crash
//! after it is repaired by replay on the next [`Store::open`].
//!
//! ## Read path
//!
//! Reads clone an `Arc<StoreState>` and never wait on the writer. Writers
//! copy-on-write the state when a reader still holds the previous version.
//!
//! ## Checkpoint
//!
//! Stage the snapshot in a temp file, rotate backups, rename the snapshot
//! over the data file, then truncate the WAL. Runs under the writer lock.

pub mod backup;
pub mod recovery;
pub mod snapshot;
pub mod state;
pub mod wal;

pub use recovery::{RecoveryBase, RecoveryReport};
pub use state::StoreState;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::model::{next_stamp, Note, Record, Tagged, Todo, WorkItem};
use crate::query::RecordQuery;
use backup::BackupRotator;
use snapshot::stage_snapshot;
use wal::{WalEntry, WalWriter};

/// Counts and paths describing an open store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub todos: usize,
    pub notes: usize,
    pub work_items: usize,
    /// WAL entries not yet folded into a snapshot.
    pub wal_entries: u64,
    pub backups: usize,
    pub data_file: PathBuf,
    pub wal_file: PathBuf,
}

pub struct Store {
    config: StoreConfig,
    backups: BackupRotator,
    writer: Mutex<WalWriter>,
    state: RwLock<Arc<StoreState>>,
}

impl Store {
    /// Recovers the persisted state and opens the WAL for appending.
    ///
    /// If the state came from a backup, or the WAL was not empty, a checkpoint
    /// runs before returning so the data file is current and the WAL clean.
    /// An unreadable data file is first renamed to `<data_file>.corrupt`.
    /// Temp files abandoned by an interrupted checkpoint are deleted.
    pub fn open(config: StoreConfig) -> Result<(Self, RecoveryReport)> {
        snapshot::remove_stale_temps(&config.data_file);
        snapshot::remove_stale_temps(&config.wal_file);
        let backups = BackupRotator::new(config.data_file.clone(), config.backup_count);
        let recovered = recovery::recover(&config.data_file, &config.wal_file, &backups)?;
        let needs_checkpoint = recovered.needs_checkpoint();
        if recovered.main_unusable {
            quarantine(&config.data_file);
        }

        let writer = WalWriter::resume(&config.wal_file, &recovered.wal)?;
        let store = Store {
            config,
            backups,
            writer: Mutex::new(writer),
            state: RwLock::new(Arc::new(recovered.state)),
        };

        if needs_checkpoint {
            store.checkpoint()?;
        }
        Ok((store, recovered.report))
    }

    /// Folds any outstanding WAL entries into the data file and releases the
    /// store.
    pub fn close(self) -> Result<()> {
        let mut writer = self.lock_writer();
        if writer.pending() > 0 {
            self.checkpoint_locked(&mut writer)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn todos(&self) -> Records<'_, Todo> {
        Records::new(self)
    }

    pub fn notes(&self) -> Records<'_, Note> {
        Records::new(self)
    }

    pub fn work_items(&self) -> Records<'_, WorkItem> {
        Records::new(self)
    }

    /// An immutable view of the current state.
    pub fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Writes a snapshot, rotates backups and truncates the WAL.
    pub fn checkpoint(&self) -> Result<()> {
        let mut writer = self.lock_writer();
        self.checkpoint_locked(&mut writer)
    }

    /// Existing backup files, newest first.
    pub fn backups(&self) -> Vec<PathBuf> {
        self.backups.list().into_iter().map(|(_, p)| p).collect()
    }

    /// Sorted, de-duplicated categories across todos and notes.
    pub fn categories(&self) -> Vec<String> {
        let state = self.snapshot();
        let todos = state.todos.iter().filter_map(Tagged::category);
        let notes = state.notes.iter().filter_map(Tagged::category);
        todos
            .chain(notes)
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Checks that the in-memory state still serializes and passes the same
    /// structural checks applied when loading from disk.
    pub fn health(&self) -> Result<()> {
        let state = self.snapshot();
        serde_json::to_vec(&*state)?;
        state.check().map_err(|reason| StoreError::Corruption {
            path: self.config.data_file.clone(),
            reason,
        })
    }

    pub fn status(&self) -> StoreStatus {
        let wal_entries = self.lock_writer().pending();
        let state = self.snapshot();
        StoreStatus {
            todos: state.todos.len(),
            notes: state.notes.len(),
            work_items: state.work_items.len(),
            wal_entries,
            backups: self.backups.list().len(),
            data_file: self.config.data_file.clone(),
            wal_file: self.config.wal_file.clone(),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, WalWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkpoint_locked(&self, writer: &mut WalWriter) -> Result<()> {
        let state = self.snapshot();
        let staged = stage_snapshot(&self.config.data_file, &state)?;
        self.backups.rotate()?;
        staged.commit()?;

        let folded = writer.pending();
        writer.truncate()?;
        info!(
            data_file = %self.config.data_file.display(),
            folded,
            todos = state.todos.len(),
            notes = state.notes.len(),
            work_items = state.work_items.len(),
            "Checkpoint written"
        );
        Ok(())
    }

    /// Logs `entry`, then applies it. Caller holds the writer lock.
    fn commit(&self, writer: &mut WalWriter, mut entry: WalEntry) -> Result<()> {
        writer.append(&mut entry)?;
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            Arc::make_mut(&mut *state).apply(&entry)?;
        }

        let every = self.config.snapshot_every;
        if every > 0 && writer.pending() >= every {
            // The mutation is already durable in the WAL.
            if let Err(e) = self.checkpoint_locked(writer) {
                warn!(error = %e, "Automatic checkpoint failed");
            }
        }
        Ok(())
    }

    fn find<R: Record>(&self, id: Uuid) -> Result<R> {
        self.snapshot()
            .find::<R>(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                collection: R::COLLECTION,
                id,
            })
    }

    fn create<R: Record>(&self, draft: R::Draft) -> Result<R> {
        let mut writer = self.lock_writer();
        let record = R::from_draft(draft, Uuid::new_v4(), next_stamp(None))?;
        self.commit(&mut writer, WalEntry::create(&record)?)?;
        Ok(record)
    }

    fn list<R: Record>(&self, query: &R::Query) -> Vec<R> {
        let state = self.snapshot();
        query.apply(R::items(&state).iter().cloned())
    }

    fn update<R: Record>(&self, id: Uuid, patch: R::Patch) -> Result<R> {
        let mut writer = self.lock_writer();
        let current = self.find::<R>(id)?;
        let next = current.patched(patch, next_stamp(Some(current.updated_at())))?;
        self.commit(&mut writer, WalEntry::update(&next)?)?;
        Ok(next)
    }

    fn delete<R: Record>(&self, id: Uuid) -> Result<()> {
        let mut writer = self.lock_writer();
        self.find::<R>(id)?;
        self.commit(&mut writer, WalEntry::delete::<R>(id))
    }

    fn mark_done(&self, id: Uuid) -> Result<Todo> {
        let mut writer = self.lock_writer();
        let current = self.find::<Todo>(id)?;
        let stamp = next_stamp(Some(current.updated_at));
        self.commit(&mut writer, WalEntry::mark_done(id, stamp))?;
        self.find::<Todo>(id)
    }
}

/// Moves an unreadable data file to `<data_file>.corrupt` so the next
/// checkpoint does not rotate it into the backups.
fn quarantine(data_file: &Path) {
    let mut name = data_file.as_os_str().to_os_string();
    name.push(".corrupt");
    let target = PathBuf::from(name);
    match fs::rename(data_file, &target) {
        Ok(()) => warn!(to = %target.display(), "Set aside unreadable data file"),
        Err(e) => warn!(path = %data_file.display(), error = %e, "Could not set aside unreadable data file"),
    }
}

/// CRUD over one collection of a [`Store`].
pub struct Records<'a, R: Record> {
    store: &'a Store,
    _kind: PhantomData<R>,
}

impl<'a, R: Record> Records<'a, R> {
    fn new(store: &'a Store) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    /// Validates the draft, assigns an id and timestamps, and persists it.
    pub fn create(&self, draft: R::Draft) -> Result<R> {
        self.store.create::<R>(draft)
    }

    pub fn get(&self, id: Uuid) -> Result<R> {
        self.store.find::<R>(id)
    }

    pub fn list(&self, query: &R::Query) -> Vec<R> {
        self.store.list::<R>(query)
    }

    /// Every record in insertion order.
    pub fn all(&self) -> Vec<R> {
        R::items(&self.store.snapshot()).to_vec()
    }

    /// Applies a patch. Unset patch fields keep their current values.
    pub fn update(&self, id: Uuid, patch: R::Patch) -> Result<R> {
        self.store.update::<R>(id, patch)
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.store.delete::<R>(id)
    }

    /// Resolves a full id or a unique prefix of one.
    pub fn resolve(&self, needle: &str) -> Result<Uuid> {
        if let Ok(id) = Uuid::parse_str(needle) {
            return Ok(id);
        }
        let needle = needle.trim().to_ascii_lowercase();
        let state = self.store.snapshot();
        let mut matches = R::items(&state)
            .iter()
            .map(Record::id)
            .filter(|id| !needle.is_empty() && id.to_string().starts_with(&needle));

        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id),
            (None, _) => Err(StoreError::InvalidOperation(format!(
                "no {} id matches '{}'",
                R::COLLECTION,
                needle
            ))),
            (Some(_), Some(_)) => Err(StoreError::InvalidOperation(format!(
                "'{}' matches more than one {} id",
                needle,
                R::COLLECTION
            ))),
        }
    }
}

impl Records<'_, Todo> {
    /// Sets `done` and refreshes `updated_at`. Always logs a `mark_done`
    /// entry, even for a todo that is already done.
    pub fn mark_done(&self, id: Uuid) -> Result<Todo> {
        self.store.mark_done(id)
    }
}
