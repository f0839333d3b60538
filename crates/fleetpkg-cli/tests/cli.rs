//! Exit codes and output of the `fleetpkg` binary, driven with fake tools.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const FAKE_TOOLS: &str = r#"
[tools]
rdepends = ["sh", "-c", 'case "$0" in htop) printf "htop\nlibc6\n" ;; *) echo "E: Unable to locate package $0" >&2; exit 1 ;; esac']
download = ["sh", "-c", 'for p in "$@"; do : > "${p}_1.0_amd64.deb"; done']
pdsh = ["sh", "-c", 'for n in node1 node2; do echo "$n: __FLEETPKG_STATUS=0"; done']
pdcp = "true"
rcmd = ""

[retry]
attempts = 1
"#;

fn fleetpkg(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fleetpkg"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run fleetpkg")
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("fleetpkg.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn install(temp: &TempDir, config: &Path, extra: &[&str]) -> Output {
    let staging = temp.path().join("staging");
    let mut args = vec![
        "--config",
        config.to_str().unwrap(),
        "install",
        "--staging-root",
        staging.to_str().unwrap(),
    ];
    args.extend_from_slice(extra);
    fleetpkg(&args)
}

#[test]
fn help_exits_zero() {
    let out = fleetpkg(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("install"));
}

#[test]
fn missing_arguments_exit_one() {
    assert_eq!(fleetpkg(&[]).status.code(), Some(1));
    assert_eq!(fleetpkg(&["install", "node[1-3]", "pw"]).status.code(), Some(1));
}

#[test]
fn unreadable_config_exits_one() {
    let out = fleetpkg(&["--config", "/nonexistent/fleetpkg.toml", "install", "n1", "pw", "htop"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("/nonexistent/fleetpkg.toml"));
}

#[test]
fn missing_tool_exits_three() {
    let temp = TempDir::new().unwrap();
    let config = write_config(
        temp.path(),
        "[tools]\nrdepends = \"sh\"\ndownload = \"sh\"\npdcp = \"sh\"\npdsh = \"fleetpkg-no-such-pdsh\"\n",
    );
    let out = install(&temp, &config, &["node[1-3]", "pw", "htop"]);
    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stderr).contains("fleetpkg-no-such-pdsh"));
}

#[test]
fn successful_install_prints_progress_and_exits_zero() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), FAKE_TOOLS);
    let out = install(&temp, &config, &["node[1-2]", "hunter2", "htop"]);

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(out.status.code(), Some(0), "{stdout}");
    assert!(stdout.contains("Installing package 0 ("), "{stdout}");
    assert!(stdout.contains("Done!"), "{stdout}");
    assert!(!stdout.contains("hunter2"));
    assert!(!String::from_utf8_lossy(&out.stderr).contains("hunter2"));
    assert!(!temp.path().join("staging/htop_STAGE").exists());
}

#[test]
fn failed_package_exits_four_with_json_report() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), FAKE_TOOLS);
    let out = install(
        &temp,
        &config,
        &["--format", "json", "node[1-2]", "pw", "htop", "doesnotexist", "htop"],
    );
    assert_eq!(out.status.code(), Some(4));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let packages = report["packages"].as_array().unwrap();
    assert_eq!(packages[0]["outcome"], "installed");
    assert_eq!(packages[0]["resolved"], serde_json::json!(["htop", "libc6"]));
    assert_eq!(packages[1]["outcome"], "failed");
    assert_eq!(packages[2]["outcome"], "skipped");
}
