use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use lode_core::config::{CacheConfig, GlobalConfig, NetworkConfig};
use lode_core::lockfile::LockFile;
use lode_core::package::{ContentHash, PackageName};
use lode_ops::ops_add::{self, AddOptions};
use lode_ops::ops_install::{self, InstallOptions};
use lode_ops::ops_lock::{self, LockOptions};
use lode_ops::ops_remove;
use lode_ops::ops_tree::{self, TreeOptions};
use lode_ops::ops_update::{self, UpdateOptions};
use lode_ops::project::Project;
use lode_util::errors::LodeError;

fn name(s: &str) -> PackageName {
    PackageName::new(s).unwrap()
}

fn config(tmp: &Path) -> GlobalConfig {
    GlobalConfig {
        network: NetworkConfig {
            retries: 1,
            timeout_secs: 5,
            backoff_ms: 1,
            max_backoff_ms: 2,
        },
        cache: CacheConfig {
            dir: Some(tmp.join("cache")),
        },
        ..Default::default()
    }
}

fn write(dir: &Path, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("Lode.toml"), body).unwrap();
}

/// `app` -> `lib-a` -> `lib-b`, all local path packages.
fn workspace(tmp: &Path) -> PathBuf {
    let app = tmp.join("app");
    write(
        &app,
        "[package]\nname = \"app\"\nversion = \"0.1.0\"\n\n[dependencies]\nlib-a = { path = \"../lib-a\" }\n",
    );
    write(
        &tmp.join("lib-a"),
        "[package]\nname = \"lib-a\"\nversion = \"0.2.0\"\n\n[dependencies]\nlib-b = { path = \"../lib-b\" }\n",
    );
    write(&tmp.join("lib-b"), "[package]\nname = \"lib-b\"\nversion = \"1.0.0\"\n");
    std::fs::write(tmp.join("lib-b").join("data.txt"), "payload").unwrap();
    app
}

fn read_lock(app: &Path) -> LockFile {
    LockFile::from_path(&app.join("Lode.lock")).unwrap()
}

fn install_opts(app: &Path) -> InstallOptions {
    InstallOptions {
        target: Some(app.join("env")),
        jobs: Some(2),
        no_remove: false,
    }
}

#[tokio::test]
async fn test_lock_records_transitive_path_packages() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());

    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();

    let lock = read_lock(&app);
    assert_eq!(lock.packages.len(), 2);
    assert_eq!(lock.get(&name("lib-a")).unwrap().dependencies, vec![name("lib-b")]);
    let project = Project::load(&app, &cfg).unwrap();
    assert!(lock.is_fresh(&project.manifest.fingerprint()));
}

#[tokio::test]
async fn test_relock_is_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());

    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();
    let first = std::fs::read_to_string(app.join("Lode.lock")).unwrap();
    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();
    let second = std::fs::read_to_string(app.join("Lode.lock")).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_lock_check_detects_stale_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    let check = LockOptions { check: true };

    assert!(ops_lock::lock(&app, &cfg, &check).await.is_err());
    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();
    ops_lock::lock(&app, &cfg, &check).await.unwrap();

    let manifest = std::fs::read_to_string(app.join("Lode.toml")).unwrap();
    std::fs::write(
        app.join("Lode.toml"),
        format!("{manifest}\n[environment]\nos = \"plan9\"\n"),
    )
    .unwrap();
    assert!(ops_lock::lock(&app, &cfg, &check).await.is_err());
}

#[tokio::test]
async fn test_install_then_reinstall_is_a_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();

    let report = ops_install::run_install(&app, &cfg, &install_opts(&app), CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.installed.len(), 2);
    let data = std::fs::read_to_string(app.join("env/lib-b/data.txt")).unwrap();
    assert_eq!(data, "payload");

    let again = ops_install::run_install(&app, &cfg, &install_opts(&app), CancellationToken::new())
        .await
        .unwrap();
    assert!(again.installed.is_empty());
    assert_eq!(again.unchanged, vec![name("lib-a"), name("lib-b")]);
}

#[tokio::test]
async fn test_changed_package_fails_verification_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();
    std::fs::write(tmp.path().join("lib-b").join("data.txt"), "changed").unwrap();

    let report = ops_install::run_install(&app, &cfg, &install_opts(&app), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failed_names(), vec!["lib-b"]);
    assert!(!app.join("env/lib-b").exists());
    assert!(app.join("env/lib-a").is_dir());
    assert_eq!(report.outcome().unwrap_err().exit_code(), 4);
}

#[tokio::test]
async fn test_corrupt_lock_fails_before_touching_environment() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    std::fs::write(app.join("Lode.lock"), "format-version = \"9.0\"\nfingerprint = \"x\"\n").unwrap();

    let err = ops_install::run_install(&app, &cfg, &install_opts(&app), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LodeError::Format { .. }));
    assert_eq!(err.exit_code(), 5);
    assert!(!app.join("env").exists());
}

#[tokio::test]
async fn test_remove_relocks_and_uninstalls() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();
    ops_install::install(&app, &cfg, &install_opts(&app), CancellationToken::new())
        .await
        .unwrap();

    ops_remove::remove(&app, &cfg, "lib-a").await.unwrap();
    assert!(read_lock(&app).packages.is_empty());

    let report = ops_install::run_install(&app, &cfg, &install_opts(&app), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.removed.len(), 2);
    assert!(!app.join("env/lib-a").exists());
}

#[tokio::test]
async fn test_failed_add_restores_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    let before = std::fs::read(app.join("Lode.toml")).unwrap();

    let opts = AddOptions {
        spec: "ghost".into(),
        path: Some("../ghost".into()),
        ..Default::default()
    };
    assert!(ops_add::add(&app, &cfg, &opts).await.is_err());
    assert_eq!(std::fs::read(app.join("Lode.toml")).unwrap(), before);
}

#[tokio::test]
async fn test_add_path_dependency_relocks() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    write(&tmp.path().join("extra"), "[package]\nname = \"extra\"\nversion = \"0.0.1\"\n");

    let opts = AddOptions {
        spec: "extra".into(),
        path: Some("../extra".into()),
        ..Default::default()
    };
    ops_add::add(&app, &cfg, &opts).await.unwrap();

    let manifest = std::fs::read_to_string(app.join("Lode.toml")).unwrap();
    assert!(manifest.contains("extra = { path = \"../extra\" }"));
    assert!(read_lock(&app).get(&name("extra")).is_some());
}

#[tokio::test]
async fn test_add_registry_dependency_pins_caret() {
    let tmp = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let artifact_hash = ContentHash::sha256(b"six");
    let versions = server
        .mock("GET", "/six/versions.json")
        .with_status(200)
        .with_body(r#"{"versions": [{"version": "1.15.0"}, {"version": "1.16.0"}], "next": null}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/six/1.16.0/metadata.json")
        .with_status(200)
        .with_body(format!(r#"{{"hash": "{artifact_hash}"}}"#))
        .create_async()
        .await;

    let app = tmp.path().join("app");
    write(
        &app,
        &format!(
            "[package]\nname = \"app\"\nversion = \"0.1.0\"\n\n[registry]\nurl = \"{}\"\n\n[dependencies]\n",
            server.url()
        ),
    );
    let cfg = config(tmp.path());

    let opts = AddOptions {
        spec: "six".into(),
        ..Default::default()
    };
    ops_add::add(&app, &cfg, &opts).await.unwrap();

    versions.assert_async().await;
    let manifest = std::fs::read_to_string(app.join("Lode.toml")).unwrap();
    assert!(manifest.contains("six = \"^1.16.0\""));
    let lock = read_lock(&app);
    assert_eq!(lock.get(&name("six")).unwrap().version.to_string(), "1.16.0");
    let project = Project::load(&app, &cfg).unwrap();
    assert!(lock.is_fresh(&project.manifest.fingerprint()));
}

#[tokio::test]
async fn test_update_named_package_keeps_others_locked() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();
    let before = read_lock(&app);

    let opts = UpdateOptions {
        packages: vec!["lib-b".into()],
    };
    ops_update::update(&app, &cfg, &opts).await.unwrap();
    assert_eq!(read_lock(&app), before);
}

#[tokio::test]
async fn test_tree_views() {
    let tmp = tempfile::tempdir().unwrap();
    let app = workspace(tmp.path());
    let cfg = config(tmp.path());
    ops_lock::lock(&app, &cfg, &LockOptions::default()).await.unwrap();

    let full = ops_tree::render_tree(&app, &cfg, &TreeOptions::default()).unwrap();
    assert_eq!(full, "app v0.1.0\n└── lib-a v0.2.0\n    └── lib-b v1.0.0\n");

    let shallow = TreeOptions {
        depth: Some(1),
        ..Default::default()
    };
    let shallow = ops_tree::render_tree(&app, &cfg, &shallow).unwrap();
    assert!(!shallow.contains("lib-b"));

    let why = TreeOptions {
        why: Some("lib-b".into()),
        ..Default::default()
    };
    let why = ops_tree::render_tree(&app, &cfg, &why).unwrap();
    assert_eq!(why, "app v0.1.0\n  lib-a v0.2.0\n    lib-b v1.0.0\n");

    let invert = TreeOptions {
        invert: Some("lib-b".into()),
        ..Default::default()
    };
    let inverted = ops_tree::render_tree(&app, &cfg, &invert).unwrap();
    assert!(inverted.starts_with("lib-b v1.0.0\n"));
    assert!(inverted.contains("lib-a v0.2.0"));

    let missing = TreeOptions {
        why: Some("nope".into()),
        ..Default::default()
    };
    assert!(ops_tree::render_tree(&app, &cfg, &missing).is_err());
}
