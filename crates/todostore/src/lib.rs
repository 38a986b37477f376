//! # Todostore Architecture
//!
//! Todostore is the persistence core of a single-user todo and notes app: a
//! JSON data file, a write-ahead log in front of it, and a ring of backups
//! behind it. It is a library with no opinion about its caller; the bundled
//! `todostore` binary is one client, an HTTP layer would be another.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Store Facade (store/mod.rs)                                │
//! │  - open / close / checkpoint                                │
//! │  - per-collection CRUD handles, mark_done for todos         │
//! │  - one writer lock, lock-free reads of an Arc'd state       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Records (model.rs, validation.rs, query.rs)                │
//! │  - Todo / Note / WorkItem behind the Record trait           │
//! │  - pure validation and normalization                        │
//! │  - filters and sorts for listing                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Persistence (store/wal.rs, snapshot.rs, backup.rs,         │
//! │               recovery.rs, state.rs)                        │
//! │  - line-delimited JSON WAL, fsynced per append              │
//! │  - temp-file-and-rename snapshots                           │
//! │  - `.bak.<n>` rotation, newest in slot 1                    │
//! │  - recovery: main → backups → empty, then WAL replay        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## No I/O Assumptions Beyond the Files
//!
//! The library never writes to stdout or stderr and never installs a log
//! subscriber. It reports through `Result<T, StoreError>` and `tracing`
//! events; the caller decides what to show.
//!
//! ## Example
//!
//! ```no_run
//! use todostore::config::StoreConfig;
//! use todostore::model::{NewTodo, Priority};
//! use todostore::store::Store;
//!
//! # fn main() -> todostore::error::Result<()> {
//! let (store, report) = Store::open(StoreConfig::load(None)?)?;
//! println!("recovered from {}", report.base);
//!
//! let todo = store.todos().create(NewTodo::new("Buy milk", "errand", Priority::Low))?;
//! store.todos().mark_done(todo.id)?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: layered configuration (defaults, TOML, environment)
//! - [`error`]: `StoreError` and the crate `Result`
//! - [`model`]: record types, drafts, patches, timestamps
//! - [`validation`]: the record validator
//! - [`query`]: list filters and sort orders
//! - [`store`]: the facade and the persistence machinery under it

pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod store;
pub mod validation;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::{RecoveryBase, RecoveryReport, Store, StoreStatus};
