use std::fs;
use std::path::Path;
use tempfile::TempDir;
use todostore::model::{NewNote, NewTodo, NewWorkItem, Priority, TodoPatch};
use todostore::store::backup::BackupRotator;
use todostore::store::snapshot::{load_snapshot, stage_snapshot};
use todostore::store::wal::{Operation, WalLog};
use todostore::{RecoveryBase, Store, StoreConfig};

fn setup() -> (TempDir, StoreConfig) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        backup_count: 3,
        snapshot_every: 0,
        ..StoreConfig::in_dir(dir.path().join("data"))
    };
    (dir, config)
}

/// Cuts the last WAL line in half, as if the process died mid-append.
fn tear_last_line(wal: &Path) {
    let bytes = fs::read(wal).unwrap();
    assert_eq!(bytes.last(), Some(&b'\n'));
    let body = &bytes[..bytes.len() - 1];
    let start = body.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let cut = start + (body.len() - start) / 2;
    fs::write(wal, &bytes[..cut]).unwrap();
}

#[test]
fn test_torn_final_entry_is_dropped() {
    let (_dir, config) = setup();
    let (store, _) = Store::open(config.clone()).unwrap();
    let created: Vec<_> = (0..5)
        .map(|i| {
            store
                .todos()
                .create(NewTodo::new(format!("todo {i}"), "errand", Priority::Low))
                .unwrap()
        })
        .collect();
    drop(store);

    tear_last_line(&config.wal_file);

    let (store, report) = Store::open(config.clone()).unwrap();
    assert_eq!(report.base, RecoveryBase::Empty);
    assert!(report.torn_tail);
    assert_eq!(report.replayed, 4);
    assert_eq!(store.todos().all(), created[..4].to_vec());

    // The recovery checkpoint leaves a clean WAL behind.
    assert_eq!(fs::metadata(&config.wal_file).unwrap().len(), 0);
    let again = store
        .todos()
        .create(NewTodo::new("after crash", "errand", Priority::Low))
        .unwrap();
    drop(store);

    let (store, report) = Store::open(config).unwrap();
    assert_eq!(report.base, RecoveryBase::MainFile);
    assert!(!report.torn_tail);
    assert_eq!(store.todos().all().last(), Some(&again));
}

#[test]
fn test_wal_alone_rebuilds_state() {
    let (_dir, config) = setup();
    let (store, _) = Store::open(config.clone()).unwrap();
    let a = store
        .todos()
        .create(NewTodo::new("A", "errand", Priority::Low))
        .unwrap();
    store
        .todos()
        .update(
            a.id,
            TodoPatch {
                title: Some("A2".into()),
                ..Default::default()
            },
        )
        .unwrap();
    store.todos().delete(a.id).unwrap();
    let b = store
        .todos()
        .create(NewTodo::new("B", "errand", Priority::High))
        .unwrap();
    drop(store);

    let ops: Vec<Operation> = WalLog::read(&config.wal_file)
        .unwrap()
        .entries
        .into_iter()
        .map(|(_, e)| e.operation)
        .collect();
    assert_eq!(
        ops,
        vec![
            Operation::Create,
            Operation::Update,
            Operation::Delete,
            Operation::Create
        ]
    );
    assert!(!config.data_file.exists());

    let (store, report) = Store::open(config).unwrap();
    assert_eq!(report.base, RecoveryBase::Empty);
    assert_eq!(report.replayed, 4);
    assert_eq!(store.todos().all(), vec![b]);
}

#[test]
fn test_snapshot_round_trip() {
    let (_dir, config) = setup();
    let (store, _) = Store::open(config.clone()).unwrap();
    store
        .todos()
        .create(
            NewTodo::new("Pay rent", "home", Priority::Urgent)
                .with_due_date("2030-02-01")
                .with_description("before the 1st"),
        )
        .unwrap();
    store
        .notes()
        .create(NewNote::new("Gift ideas", "personal", Priority::Medium).with_body("books"))
        .unwrap();
    store
        .work_items()
        .create(
            NewWorkItem::new("Migration", "2030-01-01")
                .ending("2030-03-31")
                .with_why("old cluster is EOL"),
        )
        .unwrap();
    let before = store.snapshot();
    store.close().unwrap();

    let (store, report) = Store::open(config).unwrap();
    assert_eq!(report.base, RecoveryBase::MainFile);
    assert_eq!(report.replayed, 0);
    assert_eq!(*store.snapshot(), *before);
}

#[test]
fn test_replay_after_checkpoint_does_not_double_apply() {
    let (_dir, config) = setup();
    let (store, _) = Store::open(config.clone()).unwrap();
    let todo = store
        .todos()
        .create(NewTodo::new("Once", "errand", Priority::Low))
        .unwrap();
    store.todos().mark_done(todo.id).unwrap();
    store
        .notes()
        .create(NewNote::new("Only one", "c", Priority::Low))
        .unwrap();
    let expected = store.snapshot();

    // Crash between the snapshot rename and the WAL truncation.
    let wal_bytes = fs::read(&config.wal_file).unwrap();
    store.checkpoint().unwrap();
    drop(store);
    fs::write(&config.wal_file, wal_bytes).unwrap();

    let (store, report) = Store::open(config).unwrap();
    assert_eq!(report.base, RecoveryBase::MainFile);
    assert_eq!(report.replayed, 3);
    assert_eq!(*store.snapshot(), *expected);
}

#[test]
fn test_corrupt_main_recovers_from_backup_and_wal() {
    let (_dir, config) = setup();
    let (store, _) = Store::open(config.clone()).unwrap();
    let first = store
        .notes()
        .create(NewNote::new("first", "c", Priority::Low))
        .unwrap();
    store.checkpoint().unwrap();
    let second = store
        .notes()
        .create(NewNote::new("second", "c", Priority::Low))
        .unwrap();
    store.checkpoint().unwrap();
    let third = store
        .notes()
        .create(NewNote::new("third", "c", Priority::Low))
        .unwrap();
    drop(store);

    // .bak.1 holds the state after the first checkpoint; the WAL holds "third".
    fs::write(&config.data_file, "{\"todos\": [{\"broken\"").unwrap();

    let (store, report) = Store::open(config.clone()).unwrap();
    assert_eq!(report.base, RecoveryBase::Backup(1));
    let titles: Vec<String> = store.notes().all().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec![first.title, third.title]);
    assert!(store.notes().get(second.id).unwrap_err().is_not_found());

    // The bad file is set aside and the good backup stays in slot 1.
    let mut corrupt = config.data_file.clone().into_os_string();
    corrupt.push(".corrupt");
    assert!(Path::new(&corrupt).is_file());
    let bak1 = fs::read_to_string(config.backup_path(1)).unwrap();
    assert!(bak1.contains("first") && !bak1.contains("second"));

    // The recovered state was written back as the main file.
    drop(store);
    let (_, report) = Store::open(config).unwrap();
    assert_eq!(report.base, RecoveryBase::MainFile);
}

#[test]
fn test_malformed_middle_entry_is_skipped() {
    let (_dir, config) = setup();
    let (store, _) = Store::open(config.clone()).unwrap();
    for title in ["one", "two", "three"] {
        store
            .notes()
            .create(NewNote::new(title, "c", Priority::Low))
            .unwrap();
    }
    drop(store);

    let raw = fs::read_to_string(&config.wal_file).unwrap();
    let mut lines: Vec<&str> = raw.lines().collect();
    lines[1] = "{\"seq\": 2, \"operation\": ";
    fs::write(&config.wal_file, lines.join("\n") + "\n").unwrap();

    let (store, report) = Store::open(config).unwrap();
    assert_eq!(report.replayed, 2);
    assert_eq!(report.skipped, 1);
    let titles: Vec<String> = store.notes().all().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["one", "three"]);
}

#[test]
fn test_crash_between_rotation_and_rename_keeps_main_and_backup() {
    let (dir, config) = setup();
    let (store, _) = Store::open(config.clone()).unwrap();
    store
        .notes()
        .create(NewNote::new("first", "personal", Priority::Low))
        .unwrap();
    store.checkpoint().unwrap();
    store
        .notes()
        .create(NewNote::new("second", "personal", Priority::Low))
        .unwrap();
    let state = store.snapshot();
    drop(store);

    // Checkpoint interrupted after rotating: the staged snapshot is never
    // renamed and its temp file is left behind.
    let staged = stage_snapshot(&config.data_file, &state).unwrap();
    BackupRotator::new(config.data_file.clone(), config.backup_count)
        .rotate()
        .unwrap();
    std::mem::forget(staged);

    let main = load_snapshot(&config.data_file).unwrap().unwrap();
    assert_eq!(main.notes.len(), 1);
    let bak1 = load_snapshot(&config.backup_path(1)).unwrap().unwrap();
    assert_eq!(bak1, main);

    let (store, report) = Store::open(config.clone()).unwrap();
    assert_eq!(report.base, RecoveryBase::MainFile);
    assert_eq!(report.replayed, 1);
    let titles: Vec<_> = store.notes().all().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["first", "second"]);

    let leftovers: Vec<_> = fs::read_dir(dir.path().join("data"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp files: {:?}", leftovers);
}
