use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use timeago::Formatter;
use todostore::model::{Note, Priority, Tagged, Tags, Todo, WorkItem};
use todostore::{RecoveryBase, RecoveryReport, StoreStatus};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const LINE_WIDTH: usize = 100;
const ID_WIDTH: usize = 8;
const TIME_WIDTH: usize = 14;
const DONE_MARKER: &str = "✓";

pub(super) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(super) fn print_success(message: &str) {
    println!("{}", message.green());
}

/// Whether a recovery is routine: a clean start from the data file, or a
/// first run with nothing on disk yet.
fn is_quiet(report: &RecoveryReport) -> bool {
    let clean = report.skipped == 0 && !report.torn_tail;
    match report.base {
        RecoveryBase::MainFile => clean,
        RecoveryBase::Empty => clean && report.replayed == 0,
        RecoveryBase::Backup(_) => false,
    }
}

pub(super) fn print_recovery(report: &RecoveryReport) {
    if is_quiet(report) {
        return;
    }
    let mut line = format!("Recovered from {}", report.base);
    if report.replayed > 0 {
        line.push_str(&format!(", replayed {} WAL entries", report.replayed));
    }
    if report.skipped > 0 {
        line.push_str(&format!(", skipped {}", report.skipped));
    }
    if report.torn_tail {
        line.push_str(", dropped a torn WAL tail");
    }
    eprintln!("{}", line.yellow());
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..ID_WIDTH].to_string()
}

fn priority_label(priority: Option<Priority>) -> String {
    let label = priority.map(|p| p.as_str()).unwrap_or("?");
    let padded = format!("{:<6}", label);
    match priority {
        Some(Priority::Urgent) => padded.red().bold().to_string(),
        Some(Priority::High) => padded.red().to_string(),
        Some(Priority::Medium) => padded.yellow().to_string(),
        Some(Priority::Low) | None => padded.dimmed().to_string(),
    }
}

fn extra_tags(tags: &Tags) -> String {
    tags.iter()
        .filter(|(k, _)| k.as_str() != "category" && k.as_str() != "priority")
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_row(left: &str, body: &str, right: &str) {
    let available = LINE_WIDTH.saturating_sub(left.width() + TIME_WIDTH + 1);
    let body = truncate_to_width(body, available);
    let padding = available.saturating_sub(body.width());
    println!("{} {}{}{}", left, body, " ".repeat(padding), right.dimmed());
}

pub(super) fn print_todos(todos: &[Todo]) {
    if todos.is_empty() {
        println!("No todos found.");
        return;
    }
    for todo in todos {
        let marker = if todo.done { DONE_MARKER.green() } else { " ".normal() };
        let left = format!(
            "{} {} {}",
            marker,
            short_id(&todo.id).yellow(),
            priority_label(todo.priority())
        );
        let mut body = todo.title.clone();
        if let Some(category) = todo.category() {
            body.push_str(&format!(" [{}]", category));
        }
        if let Some(due) = &todo.due_date {
            body.push_str(&format!(" due {}", due));
        }
        print_row(&left, &body, &format_time_ago(todo.updated_at));
    }
}

pub(super) fn print_notes(notes: &[Note]) {
    if notes.is_empty() {
        println!("No notes found.");
        return;
    }
    for note in notes {
        let left = format!(
            "  {} {}",
            short_id(&note.id).yellow(),
            priority_label(note.priority())
        );
        let preview: String = note
            .note
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(50)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        let mut body = note.title.clone();
        if let Some(category) = note.category() {
            body.push_str(&format!(" [{}]", category));
        }
        if !preview.is_empty() {
            body.push(' ');
            body.push_str(&preview);
        }
        print_row(&left, &body, &format_time_ago(note.updated_at));
    }
}

pub(super) fn print_work_items(items: &[WorkItem]) {
    if items.is_empty() {
        println!("No work items found.");
        return;
    }
    for item in items {
        let span = match &item.end_date {
            Some(end) => format!("{} → {}", item.start_date, end),
            None => format!("{} → …", item.start_date),
        };
        let left = format!("  {} {}", short_id(&item.id).yellow(), span.cyan());
        print_row(&left, &item.name, &format_time_ago(item.updated_at));
    }
}

fn print_field(label: &str, value: &str) {
    println!("{:>12}  {}", label.dimmed(), value);
}

fn print_stamps(created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
    print_field("created", &created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    print_field(
        "updated",
        &format!(
            "{} ({})",
            updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            format_time_ago(updated_at).trim()
        ),
    );
}

pub(super) fn print_todo(todo: &Todo) {
    println!("{}", todo.title.bold());
    println!("--------------------------------");
    print_field("id", &todo.id.to_string());
    print_field("status", if todo.done { "done" } else { "open" });
    print_field("category", todo.category().unwrap_or("-"));
    print_field("priority", &priority_label(todo.priority()));
    let extra = extra_tags(&todo.tags);
    if !extra.is_empty() {
        print_field("tags", &extra);
    }
    if let Some(due) = &todo.due_date {
        print_field("due", due);
    }
    print_stamps(todo.created_at, todo.updated_at);
    if let Some(description) = &todo.description {
        println!();
        println!("{}", description);
    }
}

pub(super) fn print_note(note: &Note) {
    println!("{}", note.title.bold());
    println!("--------------------------------");
    print_field("id", &note.id.to_string());
    print_field("category", note.category().unwrap_or("-"));
    print_field("priority", &priority_label(note.priority()));
    let extra = extra_tags(&note.tags);
    if !extra.is_empty() {
        print_field("tags", &extra);
    }
    print_stamps(note.created_at, note.updated_at);
    if let Some(body) = &note.note {
        println!();
        println!("{}", body);
    }
}

pub(super) fn print_work_item(item: &WorkItem) {
    println!("{}", item.name.bold());
    println!("--------------------------------");
    print_field("id", &item.id.to_string());
    print_field("start", &item.start_date);
    print_field("end", item.end_date.as_deref().unwrap_or("-"));
    print_stamps(item.created_at, item.updated_at);
    if let Some(description) = &item.description {
        println!();
        println!("{}", description);
    }
    if let Some(why) = &item.why {
        println!();
        println!("{} {}", "Why:".dimmed(), why);
    }
}

pub(super) fn print_status(status: &StoreStatus) {
    print_field("data file", &status.data_file.display().to_string());
    print_field("wal file", &status.wal_file.display().to_string());
    print_field("todos", &status.todos.to_string());
    print_field("notes", &status.notes.to_string());
    print_field("work items", &status.work_items.to_string());
    print_field("wal entries", &status.wal_entries.to_string());
    print_field("backups", &status.backups.to_string());
}

fn truncate_to_width(s: &str, max_width: usize) -> String {
    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > max_width.saturating_sub(1) {
            result.push('…');
            return result;
        }
        result.push(c);
        current_width += char_width;
    }

    result
}

fn format_time_ago(timestamp: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);
    let time_str = Formatter::new().convert(duration.to_std().unwrap_or_default());
    format!("{:>width$}", time_str, width = TIME_WIDTH)
}
