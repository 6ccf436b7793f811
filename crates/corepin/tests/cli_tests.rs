//! End-to-end tests wiring the real collaborators together.
//!
//! Releases are served from `file://` URLs so the registry client, the
//! tarball installer, the Last-Known-Good file and `package.json` handling all
//! run without network access.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use corepin::cli::{EXIT_OK, Invocation};
use corepin::commands::{build_engine, execute};
use corepin_core::{Config, Definitions, Engine};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

struct Sandbox {
    _root: TempDir,
    home: PathBuf,
    project: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let releases = root.path().join("releases");
        let home = root.path().join("home");
        let project = root.path().join("project");
        std::fs::create_dir_all(&releases).unwrap();
        std::fs::create_dir_all(&project).unwrap();

        for (version, exit_code) in [("1.0.0", 10), ("1.1.0", 11)] {
            std::fs::write(
                releases.join(format!("pm-{version}.tgz")),
                release(version, exit_code),
            )
            .unwrap();
        }
        std::fs::write(
            releases.join("index.json"),
            r#"{"latest":{"stable":"1.1.0"},"versions":["1.0.0","1.1.0"]}"#,
        )
        .unwrap();

        Self {
            home,
            project,
            _root: root,
        }
        .with_definitions(&releases)
    }

    fn with_definitions(self, releases: &Path) -> Self {
        let registry = serde_json::json!({
            "type": "url",
            "url": format!("file://{}/index.json", releases.display()),
            "fields": { "tags": "latest", "versions": "versions" }
        });
        let table = serde_json::json!({
            "definitions": {
                "pm": {
                    "default": "1.0.0",
                    "fetchLatestFrom": registry,
                    "ranges": {
                        "*": {
                            "url": format!("file://{}/pm-{{}}.tgz", releases.display()),
                            "bin": { "pm": "./bin/pm" },
                            "registry": registry
                        }
                    }
                }
            }
        });
        std::fs::write(self.home_file("definitions.json"), table.to_string()).unwrap();
        self
    }

    fn home_file(&self, name: &str) -> PathBuf {
        std::fs::create_dir_all(&self.home).unwrap();
        self.home.join(name)
    }

    fn engine(&self) -> Engine {
        let definitions = Definitions::from_path(&self.home_file("definitions.json")).unwrap();
        build_engine(Arc::new(definitions), Config::default().with_home(&self.home)).unwrap()
    }

    fn manifest(&self) -> serde_json::Value {
        let content = std::fs::read_to_string(self.project.join("package.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}

/// A release whose `pm` binary exits with `exit_code`.
fn release(version: &str, exit_code: i32) -> Vec<u8> {
    let files = [
        (
            "package/package.json",
            format!(r#"{{"name":"pm","version":"{version}"}}"#),
            0o644,
        ),
        (
            "package/bin/pm",
            format!("#!/bin/sh\nexit {exit_code}\n"),
            0o755,
        ),
    ];

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn run(binary: &str) -> Invocation {
    Invocation::Run {
        binary: binary.to_string(),
        args: Vec::new(),
    }
}

#[tokio::test]
async fn use_writes_pin_with_verified_hash() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.project.join("package.json"), "{\n  \"name\": \"app\"\n}\n").unwrap();

    let code = execute(
        &sandbox.engine(),
        Invocation::Use {
            spec: "pm@^1.0.0".into(),
        },
        &sandbox.project,
    )
    .await
    .unwrap();

    assert_eq!(code, EXIT_OK);
    let manifest = sandbox.manifest();
    assert_eq!(manifest["name"], "app");
    let pin = manifest["packageManager"].as_str().unwrap();
    assert!(pin.starts_with("pm@1.1.0+sha512."), "unexpected pin {pin}");
}

#[tokio::test]
async fn pinned_project_runs_pinned_release() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.project.join("package.json"),
        r#"{"name":"app","packageManager":"pm@1.0.0"}"#,
    )
    .unwrap();

    let code = execute(&sandbox.engine(), run("pm"), &sandbox.project)
        .await
        .unwrap();

    assert_eq!(code, 10);
    assert!(sandbox.home.join("v1/pm/1.0.0/.corepin.json").is_file());
}

#[tokio::test]
async fn explicit_version_overrides_pin() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.project.join("package.json"),
        r#"{"name":"app","packageManager":"pm@1.0.0"}"#,
    )
    .unwrap();

    let code = execute(&sandbox.engine(), run("pm@1.1.0"), &sandbox.project)
        .await
        .unwrap();

    assert_eq!(code, 11);
}

#[tokio::test]
async fn install_global_records_last_known_good() {
    let sandbox = Sandbox::new();

    execute(
        &sandbox.engine(),
        Invocation::InstallGlobal {
            spec: "pm@1.0.0".into(),
        },
        &sandbox.project,
    )
    .await
    .unwrap();

    let content = std::fs::read_to_string(sandbox.home.join("lastKnownGood.json")).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(
        snapshot["pm"]
            .as_str()
            .unwrap()
            .starts_with("1.0.0+sha512.")
    );
}

#[tokio::test]
async fn unpinned_project_gets_auto_pinned() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.project.join("package.json"), r#"{"name":"app"}"#).unwrap();

    let code = execute(&sandbox.engine(), run("pm"), &sandbox.project)
        .await
        .unwrap();

    // The latest stable release is the default and gets pinned.
    assert_eq!(code, 11);
    let pin = sandbox.manifest()["packageManager"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(pin.starts_with("pm@1.1.0+sha512."), "unexpected pin {pin}");
}
