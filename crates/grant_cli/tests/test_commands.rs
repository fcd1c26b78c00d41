//! CLI integration tests

use grant_test_helpers::prelude::*;
use predicates::prelude::*;

#[test]
fn test_grant_help() {
    grant_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("GrantSync"));
}

#[test]
fn test_grant_version() {
    grant_command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_grant_init() {
    let temp = temp_dir();

    grant_command()
        .current_dir(temp.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("Workspace initialized"));

    assert!(temp.path().join(".grantsync/config.toml").exists());
    assert!(temp.path().join(".grantsync/offline").is_dir());
    let gitignore = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".grantsync/offline/"));
}

#[test]
fn test_grant_init_already_initialized() {
    let temp = temp_dir();

    grant_command().current_dir(temp.path()).arg("init").assert().success();

    grant_command()
        .current_dir(temp.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    let gitignore = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches(".grantsync/offline/").count(), 1);
}

#[test]
fn test_queue_add_then_status() {
    let workspace = init_workspace();

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "add", "update", "profile", r#"{"name":"Food Bank"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued").and(contains_item_id()));

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "status"])
        .assert()
        .success()
        .stdout(queue_status_is(1, 0, 0, 1));

    grant_command()
        .current_dir(workspace.path())
        .args(["cache", "get", "profile", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Food Bank"));
}

#[test]
fn test_queue_list_preserves_order() {
    let workspace = init_workspace();

    for resource in ["first", "second"] {
        grant_command()
            .current_dir(workspace.path())
            .args(["queue", "add", "create", resource])
            .assert()
            .success();
    }

    let output = grant_command()
        .current_dir(workspace.path())
        .args(["queue", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let first = stdout.find("first").unwrap();
    let second = stdout.find("second").unwrap();
    assert!(first < second);
}

#[test]
fn test_queue_add_rejects_unknown_operation() {
    let workspace = init_workspace();

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "add", "upsert", "profile"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid operation"));
}

#[test]
fn test_queue_add_rejects_invalid_json() {
    let workspace = init_workspace();

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "add", "create", "profile", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid JSON"));
}

#[test]
fn test_sync_unreachable_keeps_queue() {
    let workspace = init_workspace();

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "add", "delete", "draft"])
        .assert()
        .success();

    grant_command()
        .current_dir(workspace.path())
        .arg("sync")
        .assert()
        .success()
        .stderr(predicate::str::contains("unreachable"))
        .stdout(queue_status_is(1, 0, 0, 1));
}

#[test]
fn test_queue_clear() {
    let workspace = init_workspace();

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "add", "create", "profile"])
        .assert()
        .success();

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 queued operations"));

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn test_invalid_config_exit_code() {
    let workspace = workspace_with_config("[sync]\nconflict_strategy = \"crdt\"\n");

    grant_command()
        .current_dir(workspace.path())
        .args(["queue", "status"])
        .assert()
        .code(101)
        .stderr(predicate::str::contains("conflict_strategy"));
}

#[test]
fn test_workspace_from_env() {
    let workspace = init_workspace();
    let elsewhere = temp_dir();

    grant_command()
        .current_dir(elsewhere.path())
        .env("GRANT_WORKSPACE", workspace.path())
        .args(["queue", "add", "create", "profile"])
        .assert()
        .success();

    assert!(workspace.path().join(".grantsync/offline/offline_sync_queue.json").exists());
}
