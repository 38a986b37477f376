//! # Listing: Filters and Sorting
//!
//! Each record kind has a query type that filters and optionally sorts a
//! `list` result. A default query matches everything and keeps insertion
//! order.
//!
//! | Query | Filters | Sorts |
//! |-------|---------|-------|
//! | [`TodoQuery`] | search, category, priority, status | default, due date, priority, status, updated, created, title |
//! | [`NoteQuery`] | search, category, priority | default (updated), priority, updated, created, title |
//! | [`WorkQuery`] | search, from/to window | start (default), end, updated, name |
//!
//! Search is a case-insensitive substring match over the record's text
//! fields. Due dates that are missing or unparsable sort after every real
//! date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::model::{Note, Priority, Tagged, Todo, WorkItem};
use crate::validation::parse_day;

/// Filtering and ordering over one record kind.
pub trait RecordQuery<R> {
    fn matches(&self, record: &R) -> bool;

    /// Reorders `records` in place. A no-op leaves insertion order.
    fn sort(&self, records: &mut [R]);

    fn apply(&self, records: impl IntoIterator<Item = R>) -> Vec<R> {
        let mut out: Vec<R> = records.into_iter().filter(|r| self.matches(r)).collect();
        self.sort(&mut out);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Done,
    #[default]
    All,
}

/// Case-insensitive substring match over the fields joined by single spaces.
/// Missing fields join as empty strings.
fn contains_ci(fields: &[Option<&str>], needle: &str) -> bool {
    let haystack = fields
        .iter()
        .map(|field| field.unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ");
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn tag_filters_match<R: Tagged>(
    record: &R,
    category: Option<&str>,
    priority: Option<Priority>,
) -> bool {
    if let Some(category) = category {
        if record.category() != Some(category) {
            return false;
        }
    }
    if let Some(priority) = priority {
        if record.priority() != Some(priority) {
            return false;
        }
    }
    true
}

fn due_key(todo: &Todo) -> Option<NaiveDate> {
    todo.due_date
        .as_deref()
        .and_then(|d| parse_day("due_date", d).ok())
}

/// Missing due dates sort last in ascending order.
fn cmp_due(a: &Todo, b: &Todo) -> Ordering {
    match (due_key(a), due_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Unknown priorities rank after `low`.
fn cmp_priority<R: Tagged>(a: &R, b: &R) -> Ordering {
    let rank = |r: &R| r.priority().map(|p| p as u8).unwrap_or(u8::MAX);
    rank(a).cmp(&rank(b))
}

fn cmp_title(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

// --- Todos ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoSort {
    /// Open first, then due date, priority, title.
    Default,
    DueDate,
    Priority,
    Status,
    UpdatedAt,
    CreatedAt,
    Title,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub sort: Option<TodoSort>,
    #[serde(default)]
    pub order: SortOrder,
}

impl TodoQuery {
    pub fn open() -> Self {
        Self {
            status: Status::Open,
            ..Default::default()
        }
    }

    pub fn sorted(mut self, sort: TodoSort, order: SortOrder) -> Self {
        self.sort = Some(sort);
        self.order = order;
        self
    }
}

impl RecordQuery<Todo> for TodoQuery {
    fn matches(&self, todo: &Todo) -> bool {
        if let Some(q) = self.search.as_deref().filter(|q| !q.is_empty()) {
            if !contains_ci(&[Some(todo.title.as_str()), todo.description.as_deref()], q) {
                return false;
            }
        }
        match self.status {
            Status::Open if todo.done => return false,
            Status::Done if !todo.done => return false,
            _ => {}
        }
        tag_filters_match(todo, self.category.as_deref(), self.priority)
    }

    fn sort(&self, todos: &mut [Todo]) {
        let Some(sort) = self.sort else {
            return;
        };
        let order = self.order;
        todos.sort_by(|a, b| {
            let status = || a.done.cmp(&b.done);
            let due = || cmp_due(a, b);
            let prio = || cmp_priority(a, b);
            let title = || cmp_title(&a.title, &b.title);
            let ord = match sort {
                TodoSort::Default => status().then_with(due).then_with(prio).then_with(title),
                TodoSort::DueDate => due().then_with(prio).then_with(status).then_with(title),
                TodoSort::Priority => prio().then_with(due).then_with(status).then_with(title),
                TodoSort::Status => status().then_with(due).then_with(prio).then_with(title),
                TodoSort::UpdatedAt => a.updated_at.cmp(&b.updated_at).then_with(due).then_with(title),
                TodoSort::CreatedAt => a.created_at.cmp(&b.created_at).then_with(due).then_with(title),
                TodoSort::Title => title().then_with(due).then_with(prio),
            };
            order.apply(ord)
        });
    }
}

// --- Notes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteSort {
    /// Same as `UpdatedAt`.
    Default,
    Priority,
    UpdatedAt,
    CreatedAt,
    Title,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub sort: Option<NoteSort>,
    #[serde(default)]
    pub order: SortOrder,
}

impl RecordQuery<Note> for NoteQuery {
    fn matches(&self, note: &Note) -> bool {
        if let Some(q) = self.search.as_deref().filter(|q| !q.is_empty()) {
            if !contains_ci(&[Some(note.title.as_str()), note.note.as_deref()], q) {
                return false;
            }
        }
        tag_filters_match(note, self.category.as_deref(), self.priority)
    }

    fn sort(&self, notes: &mut [Note]) {
        let Some(sort) = self.sort else {
            return;
        };
        let order = self.order;
        notes.sort_by(|a, b| {
            let prio = || cmp_priority(a, b);
            let title = || cmp_title(&a.title, &b.title);
            let ord = match sort {
                NoteSort::Default | NoteSort::UpdatedAt => a
                    .updated_at
                    .cmp(&b.updated_at)
                    .then_with(prio)
                    .then_with(title),
                NoteSort::CreatedAt => a
                    .created_at
                    .cmp(&b.created_at)
                    .then_with(prio)
                    .then_with(title),
                NoteSort::Priority => prio().then_with(title),
                NoteSort::Title => title().then_with(prio),
            };
            order.apply(ord)
        });
    }
}

// --- Work items ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkSort {
    Start,
    End,
    Updated,
    Name,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkQuery {
    #[serde(default)]
    pub search: Option<String>,
    /// Drop items that start before this day.
    #[serde(default)]
    pub from: Option<NaiveDate>,
    /// Drop items that end after this day, and open-ended items starting after it.
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub sort: Option<WorkSort>,
    #[serde(default)]
    pub order: SortOrder,
}

impl RecordQuery<WorkItem> for WorkQuery {
    fn matches(&self, item: &WorkItem) -> bool {
        if let Some(q) = self.search.as_deref().filter(|q| !q.is_empty()) {
            let fields = [
                Some(item.name.as_str()),
                item.description.as_deref(),
                item.why.as_deref(),
            ];
            if !contains_ci(&fields, q) {
                return false;
            }
        }

        let start = parse_day("start_date", &item.start_date).ok();
        let end = item
            .end_date
            .as_deref()
            .and_then(|e| parse_day("end_date", e).ok());

        if let (Some(from), Some(start)) = (self.from, start) {
            if start < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            match (end, start) {
                (Some(end), _) if end > to => return false,
                (None, Some(start)) if start > to => return false,
                _ => {}
            }
        }
        true
    }

    fn sort(&self, items: &mut [WorkItem]) {
        let Some(sort) = self.sort else {
            return;
        };
        let order = self.order;
        items.sort_by(|a, b| {
            let name = || cmp_title(&a.name, &b.name);
            let start = || a.start_date.cmp(&b.start_date);
            let end = || {
                a.end_date
                    .as_deref()
                    .unwrap_or("")
                    .cmp(b.end_date.as_deref().unwrap_or(""))
            };
            let ord = match sort {
                WorkSort::Start => start().then_with(end).then_with(name),
                WorkSort::End => end().then_with(start).then_with(name),
                WorkSort::Updated => a.updated_at.cmp(&b.updated_at).then_with(start).then_with(name),
                WorkSort::Name => name().then_with(start),
            };
            order.apply(ord)
        });
    }
}
