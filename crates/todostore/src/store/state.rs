use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::wal::{MarkDonePayload, Operation, WalEntry};
use crate::error::{Result, StoreError};
use crate::model::{Collection, Note, Record, Todo, WorkItem};

/// The complete contents of the data file.
///
/// `work_items` was added to the format after `todos` and `notes`, so a
/// document without it still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    pub todos: Vec<Todo>,
    pub notes: Vec<Note>,
    #[serde(default)]
    pub work_items: Vec<WorkItem>,
}

impl StoreState {
    pub fn find<R: Record>(&self, id: &Uuid) -> Option<&R> {
        R::items(self).iter().find(|r| r.id() == *id)
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty() && self.notes.is_empty() && self.work_items.is_empty()
    }

    /// Structural checks run on every state read from disk: each record passes
    /// its validator, ids are unique per collection, and no record was updated
    /// before it was created.
    pub fn check(&self) -> std::result::Result<(), String> {
        check_collection::<Todo>(self)?;
        check_collection::<Note>(self)?;
        check_collection::<WorkItem>(self)?;
        Ok(())
    }

    /// Applies one WAL entry. The live write path and WAL replay both go
    /// through here.
    ///
    /// Applying is idempotent: `create` and `update` write the post-image by
    /// id, `delete` of an absent id does nothing, `mark_done` sets fixed
    /// values. Replaying entries already reflected in the base state is
    /// therefore harmless.
    pub fn apply(&mut self, entry: &WalEntry) -> Result<()> {
        match (entry.collection, entry.operation) {
            (Collection::Todos, Operation::MarkDone) => self.mark_done(entry),
            (Collection::Todos, _) => self.apply_to::<Todo>(entry),
            (Collection::Notes, _) => self.apply_to::<Note>(entry),
            (Collection::WorkItems, _) => self.apply_to::<WorkItem>(entry),
        }
    }

    fn apply_to<R: Record>(&mut self, entry: &WalEntry) -> Result<()> {
        match entry.operation {
            Operation::Create | Operation::Update => {
                let record: R = serde_json::from_value(entry.payload.clone())?;
                if record.id() != entry.id {
                    return Err(StoreError::InvalidOperation(format!(
                        "payload id {} does not match entry id {}",
                        record.id(),
                        entry.id
                    )));
                }
                record.validate()?;

                let items = R::items_mut(self);
                match items.iter_mut().find(|r| r.id() == entry.id) {
                    Some(slot) => *slot = record,
                    None => items.push(record),
                }
            }
            Operation::Delete => {
                R::items_mut(self).retain(|r| r.id() != entry.id);
            }
            Operation::MarkDone => {
                return Err(StoreError::InvalidOperation(format!(
                    "mark_done is not supported for {}",
                    R::COLLECTION
                )));
            }
        }
        Ok(())
    }

    fn mark_done(&mut self, entry: &WalEntry) -> Result<()> {
        let payload: MarkDonePayload = serde_json::from_value(entry.payload.clone())?;
        let todo = self
            .todos
            .iter_mut()
            .find(|t| t.id == entry.id)
            .ok_or(StoreError::NotFound {
                collection: Collection::Todos,
                id: entry.id,
            })?;
        todo.done = true;
        todo.updated_at = payload.updated_at;
        Ok(())
    }
}

fn check_collection<R: Record>(state: &StoreState) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for record in R::items(state) {
        if !seen.insert(record.id()) {
            return Err(format!("duplicate id {} in {}", record.id(), R::COLLECTION));
        }
        record
            .validate()
            .map_err(|e| format!("{} {}: {}", R::COLLECTION, record.id(), e))?;
        if record.updated_at() < record.created_at() {
            return Err(format!(
                "{} {}: updated_at precedes created_at",
                R::COLLECTION,
                record.id()
            ));
        }
    }
    Ok(())
}
