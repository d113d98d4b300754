//! End-to-end CLI tests for the manga-sync binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

mod support;

use std::path::Path;

use assert_cmd::Command;
use manga_sync_core::{CatalogStore, Database, SqliteCatalogStore};
use predicates::prelude::*;
use tempfile::TempDir;

use support::mangadex_mock::{mount_catalog, mount_feed, mount_pages, mount_title, mount_updated};
use support::socket_guard::start_mock_server_or_skip;

fn write_config(config_home: &Path, contents: &str) {
    let config_dir = config_home.join("manga-sync");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), contents).unwrap();
}

async fn stored_items(db_path: &Path) -> u64 {
    let db = Database::connect(db_path).await.unwrap();
    let store = SqliteCatalogStore::new(std::sync::Arc::new(db));
    store.count_items().await.unwrap()
}

fn manga_sync(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("manga-sync").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home).env("RUST_LOG", "info");
    cmd
}

#[test]
fn test_binary_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("manga-sync").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("retry"));
}

#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("manga-sync").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let mut cmd = Command::cargo_bin("manga-sync").unwrap();
    cmd.assert().failure();
}

#[test]
fn test_binary_rejects_invalid_config_file() {
    let config_home = TempDir::new().unwrap();
    write_config(config_home.path(), "batch_sise = 3\n");

    manga_sync(config_home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_sync_populates_database() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_catalog(&server, &[("m1", "Berserk"), ("m2", "Vagabond")]).await;
    mount_feed(&server, "m1", &["c1"]).await;
    mount_feed(&server, "m2", &["c2"]).await;
    mount_pages(&server, "c1", &["1.jpg"]).await;
    mount_pages(&server, "c2", &["1.jpg"]).await;

    let config_home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db_path = data.path().join("catalog.db");
    let uri = server.uri();
    let home = config_home.path().to_path_buf();
    let db = db_path.clone();

    tokio::task::spawn_blocking(move || {
        manga_sync(&home)
            .args(["sync", "--no-progress", "--batch-size", "1", "--batch-delay-ms", "0"])
            .arg("--base-url")
            .arg(&uri)
            .arg("--db")
            .arg(&db)
            .assert()
            .success()
            .stdout(predicate::str::contains("Sync finished"));
    })
    .await
    .unwrap();

    assert_eq!(stored_items(&db_path).await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_sync_updated_respects_limit() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_updated(&server, 0, &[("u1", "Kaiju No. 8"), ("u2", "Sakamoto Days")], 0).await;
    mount_feed(&server, "u1", &["cu1"]).await;
    mount_pages(&server, "cu1", &["1.jpg"]).await;

    let config_home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db_path = data.path().join("updated.db");
    let uri = server.uri();
    let home = config_home.path().to_path_buf();
    let db = db_path.clone();

    tokio::task::spawn_blocking(move || {
        manga_sync(&home)
            .args(["sync", "--updated", "--limit", "1", "--no-progress"])
            .args(["--batch-delay-ms", "0", "--base-url"])
            .arg(&uri)
            .arg("--db")
            .arg(&db)
            .assert()
            .success()
            .stdout(predicate::str::contains("Sync finished"));
    })
    .await
    .unwrap();

    assert_eq!(stored_items(&db_path).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_retry_reads_settings_from_config_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_title(&server, "m7", "Akira").await;
    mount_feed(&server, "m7", &["c7"]).await;
    mount_pages(&server, "c7", &["1.jpg", "2.jpg"]).await;

    let config_home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db_path = data.path().join("retry.db");
    write_config(
        config_home.path(),
        &format!(
            "base_url = \"{}\"\ndb_path = \"{}\"\n",
            server.uri(),
            db_path.to_string_lossy().replace('\\', "\\\\")
        ),
    );
    let home = config_home.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        manga_sync(&home)
            .args(["retry", "m7", "--no-progress"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Title synced"));
    })
    .await
    .unwrap();

    assert_eq!(stored_items(&db_path).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_retry_unknown_title_fails() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let config_home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db = data.path().join("missing.db");
    let uri = server.uri();
    let home = config_home.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        manga_sync(&home)
            .args(["retry", "nope", "--no-progress", "--base-url"])
            .arg(&uri)
            .arg("--db")
            .arg(&db)
            .assert()
            .failure()
            .stderr(predicate::str::contains("404"));
    })
    .await
    .unwrap();
}
