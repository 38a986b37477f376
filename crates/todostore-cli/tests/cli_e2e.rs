use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn todostore(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("todostore").unwrap();
    cmd.current_dir(dir)
        .env_remove("DATA_FILE")
        .env_remove("WAL_FILE")
        .env_remove("BACKUP_COUNT")
        .env_remove("SNAPSHOT_EVERY")
        .env_remove("LOG_LEVEL")
        .env_remove("RUST_LOG");
    cmd
}

fn json(dir: &Path, args: &[&str]) -> serde_json::Value {
    let out = todostore(dir)
        .args(args)
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&out).unwrap()
}

#[test]
fn test_todo_lifecycle() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let created = json(root, &["todo", "add", "Buy milk", "-c", "errand", "-p", "low"]);
    assert_eq!(created["title"], "Buy milk");
    assert_eq!(created["done"], false);
    assert_eq!(created["created_at"], created["updated_at"]);
    let id = created["id"].as_str().unwrap().to_string();

    let done = json(root, &["todo", "done", &id[..8]]);
    assert_eq!(done["done"], true);
    assert_eq!(done["id"], id.as_str());

    let listed = json(root, &["todo", "ls", "--status", "done"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    todostore(root)
        .args(["todo", "rm", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Todo deleted."));

    let listed = json(root, &["todo", "ls"]);
    assert!(listed.as_array().unwrap().is_empty());
}

#[test]
fn test_default_paths_are_under_data_dir() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .args(["note", "add", "Idea", "-c", "personal", "-p", "high"])
        .assert()
        .success();

    // Each run closes the store, which checkpoints.
    assert!(dir.path().join("data/appdata.json").is_file());
    assert_eq!(
        fs::metadata(dir.path().join("data/appdata.wal")).unwrap().len(),
        0
    );
}

#[test]
fn test_first_run_prints_no_recovery_notice() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .args(["todo", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No todos found."))
        .stderr(predicate::str::contains("Recovered").not());
}

#[test]
fn test_invalid_priority_is_reported() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .args(["todo", "add", "Oops", "-c", "errand", "-p", "critical"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("priority must be one of"));

    let listed = json(dir.path(), &["todo", "ls"]);
    assert!(listed.as_array().unwrap().is_empty());
}

#[test]
fn test_missing_tags_are_reported() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .args(["note", "add", "No tags"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required tag"));
}

#[test]
fn test_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .args(["note", "show", "00000000-0000-4000-8000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_explicit_paths_and_status() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("custom.json");
    let wal = dir.path().join("custom.wal");
    let data_arg = data.to_str().unwrap();
    let wal_arg = wal.to_str().unwrap();

    for name in ["one", "two"] {
        todostore(dir.path())
            .args(["work", "add", name, "--start", "2030-01-01"])
            .args(["--data-file", data_arg, "--wal-file", wal_arg, "--backups", "1"])
            .assert()
            .success();
    }

    let status = json(
        dir.path(),
        &["status", "--data-file", data_arg, "--wal-file", wal_arg, "--backups", "1"],
    );
    assert_eq!(status["work_items"], 2);
    assert_eq!(status["wal_entries"], 0);
    assert_eq!(status["backups"], 1);
    assert!(dir.path().join("custom.json.bak.1").is_file());
}

#[test]
fn test_env_config() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .env("DATA_FILE", "store/main.json")
        .env("WAL_FILE", "store/main.wal")
        .args(["note", "add", "From env", "-c", "c", "-p", "low"])
        .assert()
        .success();
    assert!(dir.path().join("store/main.json").is_file());
}

#[test]
fn test_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("todostore.toml"),
        "data_file = \"cfg/app.json\"\nwal_file = \"cfg/app.wal\"\nbackup_count = 2\n",
    )
    .unwrap();
    todostore(dir.path())
        .args(["todo", "add", "Configured", "-c", "c", "-p", "medium"])
        .assert()
        .success();
    assert!(dir.path().join("cfg/app.json").is_file());
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .args(["status", "--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_recovery_from_wal_after_crash() {
    let dir = TempDir::new().unwrap();
    let wal_dir = dir.path().join("data");
    fs::create_dir_all(&wal_dir).unwrap();

    // A WAL left behind by a process that never checkpointed, with a torn tail.
    let id = "6f1c1c1e-8a51-4f8e-9d38-2b1c54a0e001";
    let entry = format!(
        concat!(
            r#"{{"seq":1,"operation":"create","collection":"todos","id":"{id}","#,
            r#""payload":{{"id":"{id}","title":"Survivor","description":null,"#,
            r#""tags":{{"category":"c","priority":"low"}},"done":false,"due_date":null,"#,
            r#""created_at":"2030-01-01T00:00:00Z","updated_at":"2030-01-01T00:00:00Z"}}}}"#,
            "\n",
            r#"{{"seq":2,"operation":"del"#
        ),
        id = id
    );
    fs::write(wal_dir.join("appdata.wal"), entry).unwrap();

    todostore(dir.path())
        .args(["todo", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Survivor"))
        .stderr(predicate::str::contains("torn WAL tail"));

    let shown = json(dir.path(), &["todo", "show", id]);
    assert_eq!(shown["title"], "Survivor");
}

#[test]
fn test_health_and_checkpoint() {
    let dir = TempDir::new().unwrap();
    todostore(dir.path())
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
    todostore(dir.path())
        .arg("checkpoint")
        .assert()
        .success()
        .stdout(predicate::str::contains("Checkpoint written."));
}
