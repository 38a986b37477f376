//! # Todostore CLI
//!
//! A thin command-line client over the `todostore` library. Everything here
//! is terminal concerns: argument parsing (`cli/setup.rs`), dispatch
//! (`cli/mod.rs`) and rendering (`cli/print.rs`). Persistence, validation
//! and recovery live in the library and are reached only through
//! [`todostore::Store`].
//!
//! ```text
//! todostore todo add "Buy milk" -c errand -p low
//! todostore todo done 3f2a
//! todostore note ls --sort priority
//! todostore work add "Quarterly review" --start 2030-01-01 --end 2030-01-31
//! todostore checkpoint
//! ```
//!
//! Configuration comes from `--config`/`todostore.toml`, then `DATA_FILE`,
//! `WAL_FILE`, `BACKUP_COUNT`, `SNAPSHOT_EVERY` and `LOG_LEVEL`, then the
//! `--data-file`, `--wal-file` and `--backups` flags. Logs go to stderr;
//! set `RUST_LOG=debug` to see every WAL append.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
