//! End-to-end pipeline runs against a local fleet mirror and a mock
//! decompiler.

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn jarscope_cmd(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jarscope").unwrap();
    cmd.env("JARSCOPE_DB", db);
    cmd
}

fn write_executable(path: &Path, content: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, content).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

/// A decompiler whose output depends on the binary it is given, so distinct
/// JAR versions decompile to distinct sources.
fn mock_decompiler(dir: &Path) -> String {
    let script = dir.join("mock-decompiler.sh");
    write_executable(
        &script,
        r#"#!/bin/sh
in="$1"; out="$2"
mkdir -p "$out/com/x"
if grep -q v2 "$in"; then
  printf 'package com.x; class Y { int n; }\n' > "$out/com/x/Y.java"
else
  printf 'package com.x; class Y {}\n' > "$out/com/x/Y.java"
fi
printf 'class Common {}\n' > "$out/com/x/Common.java"
"#,
    );
    format!("{} {{input}} {{output}}", script.display())
}

fn write_jar(path: &Path, marker: &str, size: usize, mtime_offset_days: u64) {
    let mut payload = marker.as_bytes().to_vec();
    payload.resize(size, b'.');
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, payload).unwrap();

    // Pin mtimes so first-seen ordering is deterministic.
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + mtime_offset_days * 86_400);
    let file = fs::File::options().append(true).open(path).unwrap();
    file.set_times(fs::FileTimes::new().set_modified(mtime)).unwrap();
}

/// Three services: svc-a and svc-b ship byte-identical foo.jar (v1), svc-c
/// ships a larger, later foo.jar (v2).
fn setup_fleet(tmp: &Path) -> (PathBuf, String) {
    for (service, marker, size, day) in [
        ("svc-a", "v1", 1024, 0),
        ("svc-b", "v1", 1024, 0),
        ("svc-c", "v2", 2048, 30),
    ] {
        write_jar(&tmp.join(service).join("lib/foo.jar"), marker, size, day);
        fs::create_dir_all(tmp.join(service).join("classes")).unwrap();
    }

    let entries: Vec<String> = ["svc-a", "svc-b", "svc-c"]
        .iter()
        .map(|name| {
            format!(
                r#"{{"service_name": "{name}", "environment": "prod", "host": "localhost",
                    "jar_path": "{root}/{name}/lib", "classes_path": "{root}/{name}/classes",
                    "jar_decompile_output_dir": "{root}/out/jars",
                    "class_decompile_output_dir": "{root}/out/classes"}}"#,
                root = tmp.display(),
            )
        })
        .collect();
    let config = tmp.join("services.json");
    fs::write(
        &config,
        format!(
            r#"{{"services": [{}], "internal_prefixes": ["foo", "bar"]}}"#,
            entries.join(",")
        ),
    )
    .unwrap();

    let db = tmp.join("jarscope.db");
    (db, mock_decompiler(tmp))
}

fn run_pipeline(db: &Path, config: &Path, decompiler: &str) {
    jarscope_cmd(db)
        .args(["register-services", "--config"])
        .arg(config)
        .assert()
        .success();
    jarscope_cmd(db)
        .args(["collect-jars", "--all-services"])
        .assert()
        .success();
    jarscope_cmd(db)
        .args(["decompile-jars", "--all-services", "--decompiler", decompiler])
        .assert()
        .success();
    jarscope_cmd(db)
        .args(["ingest-sources", "--all-services"])
        .assert()
        .success();
    jarscope_cmd(db)
        .args(["assign-versions"])
        .assert()
        .success();
}

#[test]
fn test_full_pipeline_versions_and_diff() {
    let tmp = TempDir::new().unwrap();
    let (db, decompiler) = setup_fleet(tmp.path());
    run_pipeline(&db, &tmp.path().join("services.json"), &decompiler);

    // Identical JARs share version 1; the larger later one is version 2.
    jarscope_cmd(&db)
        .args(["versions", "jar", "foo.jar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1  size 1024"))
        .stdout(predicate::str::contains("svc-a,svc-b"))
        .stdout(predicate::str::contains("v2  size 2048"))
        .stdout(predicate::str::contains("svc-c"));

    // One changed file between the versions, one insertion, one deletion.
    jarscope_cmd(&db)
        .args(["diff", "jar", "foo.jar", "1", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("modified com.x.Y"))
        .stdout(predicate::str::contains("-package com.x; class Y {}"))
        .stdout(predicate::str::contains("+package com.x; class Y { int n; }"))
        .stdout(predicate::str::contains(
            "1 file(s) changed, 1 insertion(s), 1 deletion(s)",
        ));

    // The unchanged file is shared, not re-diffed.
    jarscope_cmd(&db)
        .args(["diff", "jar", "foo.jar", "1", "2", "--include-unchanged"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unchanged com.x.Common"));

    // Same version on both sides: empty summary.
    jarscope_cmd(&db)
        .args(["diff", "jar", "foo.jar", "1", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "0 file(s) changed, 0 insertion(s), 0 deletion(s)",
        ));
}

#[test]
fn test_search_and_sweep_after_pipeline() {
    let tmp = TempDir::new().unwrap();
    let (db, decompiler) = setup_fleet(tmp.path());
    run_pipeline(&db, &tmp.path().join("services.json"), &decompiler);

    jarscope_cmd(&db)
        .args(["search", "foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("jar foo.jar"));
    jarscope_cmd(&db)
        .args(["search", "com.x", "--kind", "class"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    // Everything ingested is referenced; the sweep finds nothing.
    jarscope_cmd(&db)
        .args(["sweep-orphans", "--execute"])
        .assert()
        .success()
        .stderr(predicate::str::contains("removed 0 version(s)"));
}

#[test]
fn test_dry_run_ingest_is_scoped_and_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let (db, decompiler) = setup_fleet(tmp.path());

    jarscope_cmd(&db)
        .args(["register-services", "--config"])
        .arg(tmp.path().join("services.json"))
        .assert()
        .success();
    jarscope_cmd(&db)
        .args(["collect-jars", "--all-services"])
        .assert()
        .success();
    jarscope_cmd(&db)
        .args(["decompile-jars", "--all-services", "--decompiler", &decompiler])
        .assert()
        .success();

    jarscope_cmd(&db)
        .args([
            "ingest-sources",
            "--service",
            "svc-a",
            "--jar-name",
            "foo.jar",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("com.x.Y"))
        .stdout(predicate::str::contains("com.x.Common"))
        .stdout(predicate::str::contains("svc-a@localhost"))
        .stdout(predicate::str::contains("svc-b@localhost").not());

    // Dry run wrote nothing: a later real search for sources finds none.
    jarscope_cmd(&db)
        .args(["sweep-orphans"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0 orphaned version(s)"));
}

#[test]
fn test_decompile_failure_exits_four_and_pipeline_continues() {
    let tmp = TempDir::new().unwrap();
    let (db, _) = setup_fleet(tmp.path());
    let broken = tmp.path().join("broken.sh");
    write_executable(&broken, "#!/bin/sh\nexit 3\n");

    jarscope_cmd(&db)
        .args(["register-services", "--config"])
        .arg(tmp.path().join("services.json"))
        .assert()
        .success();
    jarscope_cmd(&db)
        .args(["collect-jars", "--all-services"])
        .assert()
        .success();
    jarscope_cmd(&db)
        .args([
            "decompile-jars",
            "--all-services",
            "--decompiler",
            &format!("{} {{input}} {{output}}", broken.display()),
        ])
        .assert()
        .failure()
        .code(4);

    // Listing data is intact; versions can still be assigned from metadata.
    jarscope_cmd(&db)
        .args(["assign-versions", "--jars"])
        .assert()
        .success();
    jarscope_cmd(&db)
        .args(["versions", "jar", "foo.jar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1"))
        .stdout(predicate::str::contains("v2"));
}
