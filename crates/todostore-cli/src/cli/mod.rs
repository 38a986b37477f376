mod print;
mod setup;

use clap::Parser;
use std::io::IsTerminal;
use todostore::model::{
    NewNote, NewTodo, NewWorkItem, Note, NotePatch, Priority, Tags, Todo, TodoPatch, WorkItem,
    WorkItemPatch,
};
use todostore::query::{NoteQuery, SortOrder, TodoQuery, WorkQuery};
use todostore::{Result, Store, StoreConfig, StoreError};
use tracing_subscriber::EnvFilter;

use print::*;
use setup::{Cli, Commands, NoteCommands, TagArgs, TodoCommands, WorkCommands};

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = StoreConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.data_file.clone() {
        config.data_file = path;
    }
    if let Some(path) = cli.wal_file.clone() {
        config.wal_file = path;
    }
    if let Some(count) = cli.backups {
        config.backup_count = count;
    }
    init_logging(&config.log_level);

    let (store, report) = Store::open(config)?;
    if !cli.json {
        print_recovery(&report);
    }

    let ctx = Context {
        store: &store,
        json: cli.json,
    };
    match cli.command {
        Commands::Todo(cmd) => ctx.todo(cmd)?,
        Commands::Note(cmd) => ctx.note(cmd)?,
        Commands::Work(cmd) => ctx.work(cmd)?,
        Commands::Checkpoint => {
            store.checkpoint()?;
            ctx.done("Checkpoint written.")?;
        }
        Commands::Status => {
            let status = store.status();
            if cli.json {
                print_json(&status)?;
            } else {
                print_status(&status);
            }
        }
        Commands::Health => {
            store.health()?;
            ctx.done("ok")?;
        }
    }

    store.close()
}

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` wins over the
/// configured level.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn parse_priority(raw: Option<String>) -> Result<Option<Priority>> {
    raw.map(|p| p.parse::<Priority>().map_err(StoreError::from))
        .transpose()
}

fn order(desc: bool) -> SortOrder {
    if desc {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    }
}

/// Merges tag flags over `base`.
fn merge_tags(mut base: Tags, args: TagArgs) -> Tags {
    if let Some(category) = args.category {
        base.insert("category".to_string(), category);
    }
    if let Some(priority) = args.priority {
        base.insert("priority".to_string(), priority);
    }
    base.extend(args.tags);
    base
}

fn has_tag_changes(args: &TagArgs) -> bool {
    args.category.is_some() || args.priority.is_some() || !args.tags.is_empty()
}

struct Context<'a> {
    store: &'a Store,
    json: bool,
}

impl Context<'_> {
    fn done(&self, message: &str) -> Result<()> {
        if self.json {
            print_json(&serde_json::json!({ "status": message }))?;
        } else {
            print_success(message);
        }
        Ok(())
    }

    fn show<T: serde::Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            print_json(value)?;
        } else {
            human(value);
        }
        Ok(())
    }

    fn todo(&self, cmd: TodoCommands) -> Result<()> {
        let todos = self.store.todos();
        match cmd {
            TodoCommands::Add {
                title,
                tags,
                description,
                due,
            } => {
                let draft = NewTodo {
                    title,
                    description,
                    tags: merge_tags(Tags::new(), tags),
                    done: false,
                    due_date: due,
                };
                let todo = todos.create(draft)?;
                self.show(&todo, print_todo)
            }
            TodoCommands::List {
                search,
                category,
                priority,
                status,
                sort,
                desc,
            } => {
                let query = TodoQuery {
                    search,
                    category,
                    priority: parse_priority(priority)?,
                    status: status.into(),
                    sort: sort.map(Into::into),
                    order: order(desc),
                };
                let found: Vec<Todo> = todos.list(&query);
                self.show(&found, |t| print_todos(t))
            }
            TodoCommands::Show { id } => {
                let todo = todos.get(todos.resolve(&id)?)?;
                self.show(&todo, print_todo)
            }
            TodoCommands::Edit {
                id,
                title,
                tags,
                description,
                due,
                undone,
            } => {
                let id = todos.resolve(&id)?;
                let current = todos.get(id)?;
                let patch = TodoPatch {
                    title,
                    description: description.map(Some),
                    tags: has_tag_changes(&tags).then(|| merge_tags(current.tags.clone(), tags)),
                    done: undone.then_some(false),
                    due_date: due.map(Some),
                };
                let todo = todos.update(id, patch)?;
                self.show(&todo, print_todo)
            }
            TodoCommands::Done { id } => {
                let todo = todos.mark_done(todos.resolve(&id)?)?;
                self.show(&todo, print_todo)
            }
            TodoCommands::Rm { id } => {
                todos.delete(todos.resolve(&id)?)?;
                self.done("Todo deleted.")
            }
        }
    }

    fn note(&self, cmd: NoteCommands) -> Result<()> {
        let notes = self.store.notes();
        match cmd {
            NoteCommands::Add { title, tags, body } => {
                let draft = NewNote {
                    title,
                    note: body,
                    tags: merge_tags(Tags::new(), tags),
                };
                let note = notes.create(draft)?;
                self.show(&note, print_note)
            }
            NoteCommands::List {
                search,
                category,
                priority,
                sort,
                desc,
            } => {
                let query = NoteQuery {
                    search,
                    category,
                    priority: parse_priority(priority)?,
                    sort: sort.map(Into::into),
                    order: order(desc),
                };
                let found: Vec<Note> = notes.list(&query);
                self.show(&found, |n| print_notes(n))
            }
            NoteCommands::Show { id } => {
                let note = notes.get(notes.resolve(&id)?)?;
                self.show(&note, print_note)
            }
            NoteCommands::Edit {
                id,
                title,
                tags,
                body,
            } => {
                let id = notes.resolve(&id)?;
                let current = notes.get(id)?;
                let patch = NotePatch {
                    title,
                    note: body.map(Some),
                    tags: has_tag_changes(&tags).then(|| merge_tags(current.tags.clone(), tags)),
                };
                let note = notes.update(id, patch)?;
                self.show(&note, print_note)
            }
            NoteCommands::Rm { id } => {
                notes.delete(notes.resolve(&id)?)?;
                self.done("Note deleted.")
            }
        }
    }

    fn work(&self, cmd: WorkCommands) -> Result<()> {
        let items = self.store.work_items();
        match cmd {
            WorkCommands::Add {
                name,
                start,
                end,
                description,
                why,
            } => {
                let draft = NewWorkItem {
                    name,
                    start_date: start,
                    end_date: end,
                    description,
                    why,
                };
                let item = items.create(draft)?;
                self.show(&item, print_work_item)
            }
            WorkCommands::List {
                search,
                from,
                to,
                sort,
                desc,
            } => {
                let query = WorkQuery {
                    search,
                    from,
                    to,
                    sort: sort.map(Into::into),
                    order: order(desc),
                };
                let found: Vec<WorkItem> = items.list(&query);
                self.show(&found, |w| print_work_items(w))
            }
            WorkCommands::Show { id } => {
                let item = items.get(items.resolve(&id)?)?;
                self.show(&item, print_work_item)
            }
            WorkCommands::Edit {
                id,
                name,
                start,
                end,
                description,
                why,
            } => {
                let id = items.resolve(&id)?;
                let patch = WorkItemPatch {
                    name,
                    start_date: start,
                    end_date: end.map(Some),
                    description: description.map(Some),
                    why: why.map(Some),
                };
                let item = items.update(id, patch)?;
                self.show(&item, print_work_item)
            }
            WorkCommands::Rm { id } => {
                items.delete(items.resolve(&id)?)?;
                self.done("Work item deleted.")
            }
        }
    }
}
