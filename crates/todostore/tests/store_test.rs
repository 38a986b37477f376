use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use todostore::model::{NewNote, NewTodo, NotePatch, Priority, Tags, TodoPatch};
use todostore::store::wal::{Operation, WalLog};
use todostore::{Store, StoreConfig};

fn setup(backup_count: usize) -> (TempDir, StoreConfig) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        backup_count,
        snapshot_every: 0,
        ..StoreConfig::in_dir(dir.path())
    };
    (dir, config)
}

#[test]
fn test_buy_milk() {
    let (_dir, config) = setup(3);
    let (store, _) = Store::open(config.clone()).unwrap();

    let todo = store
        .todos()
        .create(NewTodo::new("Buy milk", "errand", Priority::Low))
        .unwrap();
    assert_eq!(todo.id.get_version_num(), 4);
    assert!(!todo.done);
    assert_eq!(todo.created_at, todo.updated_at);

    let before = WalLog::read(&config.wal_file).unwrap().entries.len();
    let done = store.todos().mark_done(todo.id).unwrap();
    assert!(done.done);
    assert!(done.updated_at > todo.updated_at);
    assert_eq!(done.created_at, todo.created_at);
    assert_eq!(store.todos().all().len(), 1);

    let log = WalLog::read(&config.wal_file).unwrap();
    assert_eq!(log.entries.len(), before + 1);
    let (_, last) = log.entries.last().unwrap();
    assert_eq!(last.operation, Operation::MarkDone);
    assert_eq!(last.id, todo.id);
}

#[test]
fn test_repeated_updates_strictly_advance() {
    let (_dir, config) = setup(3);
    let (store, _) = Store::open(config).unwrap();
    let note = store
        .notes()
        .create(NewNote::new("Draft", "writing", Priority::Medium))
        .unwrap();

    let mut previous = note.clone();
    for i in 0..5 {
        let next = store
            .notes()
            .update(
                note.id,
                NotePatch {
                    note: Some(Some(format!("rev {i}"))),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(next.updated_at > previous.updated_at);
        assert_eq!(next.created_at, note.created_at);
        previous = next;
    }
    assert_eq!(store.notes().get(note.id).unwrap(), previous);
}

#[test]
fn test_rejected_records_never_persist() {
    let (_dir, config) = setup(3);
    let (store, _) = Store::open(config.clone()).unwrap();

    let mut tags = Tags::new();
    tags.insert("category".into(), "errand".into());
    let missing_priority = NewTodo {
        title: "no priority".into(),
        tags,
        ..Default::default()
    };
    assert!(store.todos().create(missing_priority).unwrap_err().is_validation());

    let critical = NewTodo::new("critical one", "errand", Priority::Low).with_tag("priority", "critical");
    assert!(store.todos().create(critical).unwrap_err().is_validation());

    let ok = store
        .todos()
        .create(NewTodo::new("fine", "errand", Priority::Low))
        .unwrap();
    let mut bad_tags = ok.tags.clone();
    bad_tags.insert("priority".into(), "critical".into());
    let err = store
        .todos()
        .update(
            ok.id,
            TodoPatch {
                tags: Some(bad_tags),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(store.todos().get(ok.id).unwrap(), ok);

    let wal = fs::read_to_string(&config.wal_file).unwrap();
    store.checkpoint().unwrap();
    let data = fs::read_to_string(&config.data_file).unwrap();
    for text in [&wal, &data] {
        assert!(!text.contains("no priority"));
        assert!(!text.contains("critical"));
    }
    assert_eq!(wal.lines().count(), 1);
}

#[test]
fn test_backup_rotation_keeps_count() {
    let (_dir, config) = setup(3);
    let (store, _) = Store::open(config.clone()).unwrap();

    let mut mains = Vec::new();
    for i in 0..=config.backup_count {
        store
            .notes()
            .create(NewNote::new(format!("note {i}"), "c", Priority::Low))
            .unwrap();
        store.checkpoint().unwrap();
        mains.push(fs::read(&config.data_file).unwrap());
    }

    let backups = store.backups();
    assert_eq!(backups.len(), config.backup_count);
    assert_eq!(backups[0], config.backup_path(1));
    assert!(!config.backup_path(config.backup_count + 1).exists());
    assert_eq!(
        fs::read(config.backup_path(1)).unwrap(),
        mains[mains.len() - 2]
    );
    assert_eq!(
        fs::read(config.backup_path(3)).unwrap(),
        mains[mains.len() - 4]
    );
}

#[test]
fn test_no_temp_files_left_behind() {
    let (dir, config) = setup(2);
    let (store, _) = Store::open(config).unwrap();
    for i in 0..3 {
        store
            .notes()
            .create(NewNote::new(format!("n{i}"), "c", Priority::Low))
            .unwrap();
        store.checkpoint().unwrap();
    }

    for entry in fs::read_dir(dir.path()).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        assert!(!name.ends_with(".tmp"), "Found leftover tmp file: {}", name);
    }
}

#[test]
fn test_concurrent_writers_are_serialized() {
    let (_dir, config) = setup(3);
    let (store, _) = Store::open(config.clone()).unwrap();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    store
                        .todos()
                        .create(NewTodo::new(format!("t{t}-{i}"), "load", Priority::Low))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.todos().all().len(), 40);
    let seqs: Vec<u64> = WalLog::read(&config.wal_file)
        .unwrap()
        .entries
        .iter()
        .map(|(_, e)| e.seq)
        .collect();
    assert_eq!(seqs, (1..=40).collect::<Vec<u64>>());

    // In-memory order matches WAL order.
    let wal_ids: Vec<_> = WalLog::read(&config.wal_file)
        .unwrap()
        .entries
        .into_iter()
        .map(|(_, e)| e.id)
        .collect();
    let state_ids: Vec<_> = store.todos().all().into_iter().map(|t| t.id).collect();
    assert_eq!(wal_ids, state_ids);
}
