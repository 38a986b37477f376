use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use todostore::query::{NoteSort, Status, TodoSort, WorkSort};

#[derive(Parser, Debug)]
#[command(
    name = "todostore",
    bin_name = "todostore",
    version,
    disable_help_subcommand = true
)]
#[command(about = "Crash-safe todo, note and work item store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML config file (defaults to ./todostore.toml when present)
    #[arg(long, global = true, value_name = "PATH", help_heading = "Options")]
    pub config: Option<PathBuf>,

    /// Main data file (overrides DATA_FILE)
    #[arg(long, global = true, value_name = "PATH", help_heading = "Options")]
    pub data_file: Option<PathBuf>,

    /// Write-ahead log (overrides WAL_FILE)
    #[arg(long, global = true, value_name = "PATH", help_heading = "Options")]
    pub wal_file: Option<PathBuf>,

    /// Number of rotating backups (overrides BACKUP_COUNT)
    #[arg(long, global = true, value_name = "N", help_heading = "Options")]
    pub backups: Option<usize>,

    /// Print records as JSON
    #[arg(long, global = true, help_heading = "Options")]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage todos
    #[command(subcommand)]
    Todo(TodoCommands),

    /// Manage notes
    #[command(subcommand)]
    Note(NoteCommands),

    /// Manage work items
    #[command(subcommand)]
    Work(WorkCommands),

    /// Write a snapshot, rotate backups and clear the WAL
    Checkpoint,

    /// Show record counts, pending WAL entries and backups
    Status,

    /// Verify the loaded data is consistent
    Health,
}

/// Tag arguments shared by todos and notes.
#[derive(Args, Debug, Default)]
pub struct TagArgs {
    /// Category tag
    #[arg(short, long)]
    pub category: Option<String>,

    /// Priority tag: low, medium, high or urgent
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Extra tag as key=value (repeatable)
    #[arg(short = 't', long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Open,
    Done,
    All,
}

impl From<StatusArg> for Status {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Open => Status::Open,
            StatusArg::Done => Status::Done,
            StatusArg::All => Status::All,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TodoSortArg {
    Default,
    Due,
    Priority,
    Status,
    Updated,
    Created,
    Title,
}

impl From<TodoSortArg> for TodoSort {
    fn from(arg: TodoSortArg) -> Self {
        match arg {
            TodoSortArg::Default => TodoSort::Default,
            TodoSortArg::Due => TodoSort::DueDate,
            TodoSortArg::Priority => TodoSort::Priority,
            TodoSortArg::Status => TodoSort::Status,
            TodoSortArg::Updated => TodoSort::UpdatedAt,
            TodoSortArg::Created => TodoSort::CreatedAt,
            TodoSortArg::Title => TodoSort::Title,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum NoteSortArg {
    Default,
    Priority,
    Updated,
    Created,
    Title,
}

impl From<NoteSortArg> for NoteSort {
    fn from(arg: NoteSortArg) -> Self {
        match arg {
            NoteSortArg::Default => NoteSort::Default,
            NoteSortArg::Priority => NoteSort::Priority,
            NoteSortArg::Updated => NoteSort::UpdatedAt,
            NoteSortArg::Created => NoteSort::CreatedAt,
            NoteSortArg::Title => NoteSort::Title,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WorkSortArg {
    Start,
    End,
    Updated,
    Name,
}

impl From<WorkSortArg> for WorkSort {
    fn from(arg: WorkSortArg) -> Self {
        match arg {
            WorkSortArg::Start => WorkSort::Start,
            WorkSortArg::End => WorkSort::End,
            WorkSortArg::Updated => WorkSort::Updated,
            WorkSortArg::Name => WorkSort::Name,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum TodoCommands {
    /// Create a todo
    #[command(alias = "new")]
    Add {
        title: String,

        #[command(flatten)]
        tags: TagArgs,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Due date (YYYY-MM-DD or ISO-8601 datetime)
        #[arg(long)]
        due: Option<String>,
    },

    /// List todos
    #[command(alias = "ls")]
    List {
        /// Case-insensitive text search
        #[arg(short, long)]
        search: Option<String>,

        /// Only this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only this priority
        #[arg(short, long)]
        priority: Option<String>,

        #[arg(long, value_enum, default_value = "all")]
        status: StatusArg,

        #[arg(long, value_enum)]
        sort: Option<TodoSortArg>,

        /// Reverse the sort order
        #[arg(long)]
        desc: bool,
    },

    /// Show one todo
    #[command(alias = "view")]
    Show { id: String },

    /// Change fields of a todo (an empty string clears optional fields)
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        tags: TagArgs,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        due: Option<String>,

        /// Mark the todo as not done
        #[arg(long)]
        undone: bool,
    },

    /// Mark a todo as done
    Done { id: String },

    /// Delete a todo
    #[command(alias = "delete")]
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// Create a note
    #[command(alias = "new")]
    Add {
        title: String,

        #[command(flatten)]
        tags: TagArgs,

        /// Note body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// List notes
    #[command(alias = "ls")]
    List {
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        priority: Option<String>,

        #[arg(long, value_enum)]
        sort: Option<NoteSortArg>,

        #[arg(long)]
        desc: bool,
    },

    /// Show one note
    #[command(alias = "view")]
    Show { id: String },

    /// Change fields of a note (an empty string clears the body)
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        tags: TagArgs,

        #[arg(short, long)]
        body: Option<String>,
    },

    /// Delete a note
    #[command(alias = "delete")]
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
pub enum WorkCommands {
    /// Record a work item
    #[command(alias = "new")]
    Add {
        name: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Why the work mattered
        #[arg(short, long)]
        why: Option<String>,
    },

    /// List work items
    #[command(alias = "ls")]
    List {
        #[arg(short, long)]
        search: Option<String>,

        /// Hide items starting before this day
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,

        /// Hide items ending after this day
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,

        #[arg(long, value_enum)]
        sort: Option<WorkSortArg>,

        #[arg(long)]
        desc: bool,
    },

    /// Show one work item
    #[command(alias = "view")]
    Show { id: String },

    /// Change fields of a work item (an empty string clears optional fields)
    Edit {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        why: Option<String>,
    },

    /// Delete a work item
    #[command(alias = "delete")]
    Rm { id: String },
}
