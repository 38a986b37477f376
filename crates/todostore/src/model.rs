//! # Domain Model
//!
//! The store keeps three record kinds, each in its own collection:
//!
//! - [`Todo`]: a task with tags, a done flag, and an optional due date.
//! - [`Note`]: free-form text with tags.
//! - [`WorkItem`]: a dated piece of work (name, start/end dates, what and why).
//!
//! All three share an id and a pair of timestamps, exposed through the
//! [`Record`] trait so the WAL, snapshot and facade code can stay generic.
//! Todos and notes additionally carry [`Tags`] and implement [`Tagged`].
//!
//! ## Inputs
//!
//! Callers never construct records directly. They hand the store a *draft*
//! (`NewTodo`, `NewNote`, `NewWorkItem`) or a *patch* (`TodoPatch`, ...). The
//! store assigns the id and timestamps, normalizes text fields, and runs the
//! validators in [`crate::validation`] before anything is logged.
//!
//! ## Normalization
//!
//! - Titles and names are trimmed.
//! - Optional text that is blank after trimming becomes `None`.
//! - Tag keys and values are trimmed.
//!
//! ## Timestamps
//!
//! Stamps are UTC with second precision and serialize as `YYYY-MM-DDTHH:MM:SSZ`.
//! [`next_stamp`] never returns a value at or before the previous stamp of the
//! same record, so `updated_at` strictly increases even for edits that land in
//! the same second.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::query::{NoteQuery, RecordQuery, TodoQuery, WorkQuery};
use crate::store::StoreState;
use crate::validation::{
    validate_due_date, validate_required, validate_tags, validate_work_dates, ValidationError,
};

/// Free-form `key -> value` labels. `category` and `priority` are mandatory.
pub type Tags = BTreeMap<String, String>;

/// Priority levels accepted in the `priority` tag.
///
/// Variants are declared most pressing first, so the derived ordering is the
/// rank used when sorting by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ValidationError::InvalidPriority(other.to_string())),
        }
    }
}

/// The three collections of the data file, named as they appear on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Todos,
    Notes,
    WorkItems,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Todos => "todos",
            Collection::Notes => "notes",
            Collection::WorkItems => "work_items",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serde adapter for the `YYYY-MM-DDTHH:MM:SSZ` timestamp format.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Parses the canonical format, falling back to any RFC 3339 timestamp.
    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, FORMAT) {
            return Ok(naive.and_utc());
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
    }
}

/// Returns the stamp for a mutation: now (truncated to seconds), or one second
/// past `previous` if the clock has not moved beyond it.
pub fn next_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(0);
    match previous {
        Some(prev) if prev >= now => prev + Duration::seconds(1),
        _ => now,
    }
}

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn clean_tags(tags: Tags) -> Tags {
    tags.into_iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Capabilities shared by every record kind.
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const COLLECTION: Collection;

    /// Caller input for `create`.
    type Draft;
    /// Caller input for `update`.
    type Patch;
    /// Filter and sort options for `list`.
    type Query: RecordQuery<Self> + Default;

    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    /// Builds a normalized, validated record from a draft.
    fn from_draft(draft: Self::Draft, id: Uuid, now: DateTime<Utc>)
        -> Result<Self, ValidationError>;

    /// Returns a copy with the patch applied, normalized, validated and stamped.
    fn patched(&self, patch: Self::Patch, now: DateTime<Utc>) -> Result<Self, ValidationError>;

    fn validate(&self) -> Result<(), ValidationError>;

    fn items(state: &StoreState) -> &[Self];
    fn items_mut(state: &mut StoreState) -> &mut Vec<Self>;
}

/// Records that carry [`Tags`].
pub trait Tagged {
    fn tags(&self) -> &Tags;

    fn category(&self) -> Option<&str> {
        self.tags().get("category").map(String::as_str)
    }

    fn priority(&self) -> Option<Priority> {
        self.tags().get("priority").and_then(|p| p.parse().ok())
    }
}

// --- Todo ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl NewTodo {
    pub fn new(title: impl Into<String>, category: &str, priority: Priority) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
        .with_tag("category", category)
        .with_tag("priority", priority.as_str())
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<String>>,
}

impl Todo {
    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.description = clean_optional(self.description.take());
        self.due_date = clean_optional(self.due_date.take()).map(|d| d.trim().to_string());
        self.tags = clean_tags(std::mem::take(&mut self.tags));
    }
}

impl Record for Todo {
    const COLLECTION: Collection = Collection::Todos;
    type Draft = NewTodo;
    type Patch = TodoPatch;
    type Query = TodoQuery;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn from_draft(draft: NewTodo, id: Uuid, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let mut todo = Todo {
            id,
            title: draft.title,
            description: draft.description,
            tags: draft.tags,
            done: draft.done,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
        };
        todo.normalize();
        todo.validate()?;
        Ok(todo)
    }

    fn patched(&self, patch: TodoPatch, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        if let Some(title) = patch.title {
            next.title = title;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(tags) = patch.tags {
            next.tags = tags;
        }
        if let Some(done) = patch.done {
            next.done = done;
        }
        if let Some(due_date) = patch.due_date {
            next.due_date = due_date;
        }
        next.updated_at = now;
        next.normalize();
        next.validate()?;
        Ok(next)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("title", &self.title)?;
        validate_tags(&self.tags)?;
        if let Some(due) = &self.due_date {
            validate_due_date(due)?;
        }
        Ok(())
    }

    fn items(state: &StoreState) -> &[Self] {
        &state.todos
    }

    fn items_mut(state: &mut StoreState) -> &mut Vec<Self> {
        &mut state.todos
    }
}

impl Tagged for Todo {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

// --- Note ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

impl NewNote {
    pub fn new(title: impl Into<String>, category: &str, priority: Priority) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
        .with_tag("category", category)
        .with_tag("priority", priority.as_str())
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub note: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<Tags>,
}

impl Note {
    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.note = clean_optional(self.note.take());
        self.tags = clean_tags(std::mem::take(&mut self.tags));
    }
}

impl Record for Note {
    const COLLECTION: Collection = Collection::Notes;
    type Draft = NewNote;
    type Patch = NotePatch;
    type Query = NoteQuery;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn from_draft(draft: NewNote, id: Uuid, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let mut note = Note {
            id,
            title: draft.title,
            note: draft.note,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
        };
        note.normalize();
        note.validate()?;
        Ok(note)
    }

    fn patched(&self, patch: NotePatch, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        if let Some(title) = patch.title {
            next.title = title;
        }
        if let Some(note) = patch.note {
            next.note = note;
        }
        if let Some(tags) = patch.tags {
            next.tags = tags;
        }
        next.updated_at = now;
        next.normalize();
        next.validate()?;
        Ok(next)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("title", &self.title)?;
        validate_tags(&self.tags)?;
        Ok(())
    }

    fn items(state: &StoreState) -> &[Self] {
        &state.notes
    }

    fn items_mut(state: &mut StoreState) -> &mut Vec<Self> {
        &mut state.notes
    }
}

impl Tagged for Note {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

// --- WorkItem ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub name: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub why: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub name: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub why: Option<String>,
}

impl NewWorkItem {
    pub fn new(name: impl Into<String>, start_date: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_date: start_date.into(),
            ..Default::default()
        }
    }

    pub fn ending(mut self, end_date: impl Into<String>) -> Self {
        self.end_date = Some(end_date.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_why(mut self, why: impl Into<String>) -> Self {
        self.why = Some(why.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub why: Option<Option<String>>,
}

impl WorkItem {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.start_date = self.start_date.trim().to_string();
        self.end_date = clean_optional(self.end_date.take()).map(|d| d.trim().to_string());
        self.description = clean_optional(self.description.take());
        self.why = clean_optional(self.why.take());
    }
}

impl Record for WorkItem {
    const COLLECTION: Collection = Collection::WorkItems;
    type Draft = NewWorkItem;
    type Patch = WorkItemPatch;
    type Query = WorkQuery;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn from_draft(
        draft: NewWorkItem,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let mut item = WorkItem {
            id,
            name: draft.name,
            start_date: draft.start_date,
            end_date: draft.end_date,
            description: draft.description,
            why: draft.why,
            created_at: now,
            updated_at: now,
        };
        item.normalize();
        item.validate()?;
        Ok(item)
    }

    fn patched(&self, patch: WorkItemPatch, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(start_date) = patch.start_date {
            next.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            next.end_date = end_date;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(why) = patch.why {
            next.why = why;
        }
        next.updated_at = now;
        next.normalize();
        next.validate()?;
        Ok(next)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("name", &self.name)?;
        validate_work_dates(&self.start_date, self.end_date.as_deref())
    }

    fn items(state: &StoreState) -> &[Self] {
        &state.work_items
    }

    fn items_mut(state: &mut StoreState) -> &mut Vec<Self> {
        &mut state.work_items
    }
}
