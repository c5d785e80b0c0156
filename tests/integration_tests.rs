//! Integration tests for nftdelta
//!
//! These run the built binary end to end: argument handling, exit codes,
//! output formats, atomic output files and live captures.
//!
//! # Running with Mock
//!
//! Live captures use the mock nft script, which needs no privileges:
//! ```bash
//! cargo test --test integration_tests
//! ```
//!
//! # Running with Real nftables
//!
//! ```bash
//! sudo -E NFTDELTA_USE_REAL_NFT=1 cargo test --test integration_tests
//! ```

#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const BASELINE: &str = r#"table inet filter { # handle 1
	chain input { # handle 1
		type filter hook input priority filter; policy drop;
		ct state established,related counter packets 77 bytes 5120 accept # handle 4
		iifname "lo" accept # handle 5
		tcp dport 22 counter packets 3 bytes 180 accept # handle 6
	}
}
"#;

const COMPLETE: &str = r#"table inet filter { # handle 1
	chain input { # handle 1
		type filter hook input priority filter; policy drop;
		ct state established,related counter packets 912 bytes 64100 accept # handle 4
		iifname "lo" accept # handle 5
		tcp dport 22 counter packets 41 bytes 2460 accept # handle 6
		tcp dport 5665 counter packets 0 bytes 0 accept # handle 9
	}
}
table ip nat { # handle 5
	chain POSTROUTING { # handle 1
		type nat hook postrouting priority srcnat; policy accept;
		ip saddr 172.20.0.0/16 oifname != "br-icinga" counter packets 4 bytes 240 xt target "MASQUERADE" # handle 3
	}
}
"#;

const EXPECTED_DIFF: &str = "table inet filter {
\tchain input {
\t\ttcp dport 5665 counter accept
\t}
}

table ip nat {
\tchain POSTROUTING {
\t\ttype nat hook postrouting priority srcnat; policy accept;
\t\tip saddr 172.20.0.0/16 oifname != \"br-icinga\" counter masquerade
\t}
}
";

/// Get the path to the mock nft script
fn get_mock_nft_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("mock_nft.sh");
    path
}

/// Command for the built binary with a clean, isolated environment
fn nftdelta(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_nftdelta"));
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("NFTDELTA_LOG")
        .env_remove("NFTDELTA_ELEVATION_METHOD");

    if std::env::var("NFTDELTA_USE_REAL_NFT").is_err() {
        cmd.env("NFTDELTA_NFT_COMMAND", get_mock_nft_path())
            .env("NFTDELTA_NO_ELEVATION", "1");
    }
    cmd
}

fn write_capture(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_diff_two_files() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);
    let complete = write_capture(dir.path(), "complete.nft", COMPLETE);

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg(&complete)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), EXPECTED_DIFF);
}

#[test]
fn test_identical_captures_print_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg(&baseline)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_of(&output), "");
}

#[test]
fn test_wrong_argument_count_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);

    let none = nftdelta(dir.path()).output().unwrap();
    assert_eq!(none.status.code(), Some(2));

    let one = nftdelta(dir.path()).arg(&baseline).output().unwrap();
    assert_eq!(one.status.code(), Some(2));
    assert!(stderr_of(&one).contains("Usage error"));
    assert_eq!(stdout_of(&one), "");

    let three = nftdelta(dir.path())
        .args([&baseline, &baseline, &baseline])
        .output()
        .unwrap();
    assert_eq!(three.status.code(), Some(2));
}

#[test]
fn test_missing_input_file_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg(dir.path().join("missing.nft"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_of(&output).contains("missing.nft"));
}

#[test]
fn test_malformed_capture_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);
    let broken = write_capture(dir.path(), "complete.nft", "table ip t {\n\tchain c {\n");

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg(&broken)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_of(&output), "");
    let stderr = stderr_of(&output);
    assert!(stderr.contains("complete.nft"), "stderr: {stderr}");
    assert!(stderr.contains("never closed"), "stderr: {stderr}");
}

#[test]
fn test_complete_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);

    let mut child = nftdelta(dir.path())
        .arg(&baseline)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(COMPLETE.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), EXPECTED_DIFF);
}

#[test]
fn test_stdin_twice_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = nftdelta(dir.path())
        .args(["-", "-"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_output_file_written_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);
    let complete = write_capture(dir.path(), "complete.nft", COMPLETE);
    let target = dir.path().join("app.nft");
    std::fs::write(&target, "stale\n").unwrap();

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg(&complete)
        .arg("--output")
        .arg(&target)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), EXPECTED_DIFF);
}

#[test]
fn test_json_format() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);
    let complete = write_capture(dir.path(), "complete.nft", COMPLETE);

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg(&complete)
        .args(["--format", "json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["new_rules"], 3);
    assert_eq!(report["summary"]["new_blocks"], 2);
    assert_eq!(report["rules"][0]["rule"], "tcp dport 5665 counter accept");
    assert_eq!(report["rules"][0]["path"][1], "chain input");
}

#[test]
fn test_unified_format_shows_changes() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);
    let complete = write_capture(dir.path(), "complete.nft", COMPLETE);

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg(&complete)
        .args(["-f", "unified"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("global.nft"));
    assert!(stdout.contains("+\t\ttcp dport 5665 counter accept\n"));
    assert!(!stdout.contains("packets"));
}

#[test]
fn test_normalize_mode() {
    let dir = tempfile::tempdir().unwrap();
    let complete = write_capture(dir.path(), "complete.nft", COMPLETE);

    let output = nftdelta(dir.path())
        .arg("--normalize")
        .arg(&complete)
        .args(["--indent", "4"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = stdout_of(&output);
    assert!(stdout.starts_with("table inet filter {\n    chain input {\n        type filter"));
    assert!(!stdout.contains("handle"));
    assert!(stdout.contains("counter masquerade\n"));
}

#[test]
fn test_capture_live_ruleset_with_mock() {
    if std::env::var("NFTDELTA_USE_REAL_NFT").is_ok() {
        eprintln!("Skipping mock test: NFTDELTA_USE_REAL_NFT is set");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg("--capture")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(
        stdout_of(&output),
        "table inet filter {\n\tchain input {\n\t\ttcp dport 5665 counter accept\n\t}\n}\n"
    );
}

#[test]
fn test_capture_failure_is_explained() {
    if std::env::var("NFTDELTA_USE_REAL_NFT").is_ok() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);

    let output = nftdelta(dir.path())
        .arg(&baseline)
        .arg("--capture")
        .env("MOCK_NFT_FAIL", "1")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Insufficient permissions"), "stderr: {stderr}");
    assert!(stderr.contains("NFTDELTA_ELEVATION_METHOD"), "stderr: {stderr}");
}

#[test]
fn test_config_file_settings_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", "");
    let complete = write_capture(
        dir.path(),
        "complete.nft",
        "table ip a {\n chain x {\n  accept\n }\n chain y {\n  drop\n }\n}\n",
    );
    let config = write_capture(
        dir.path(),
        "config.json",
        r#"{"indent_width": 2, "blank_line_between_blocks": false}"#,
    );

    let output = nftdelta(dir.path())
        .arg("--config")
        .arg(&config)
        .arg(&baseline)
        .arg(&complete)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(
        stdout_of(&output),
        "table ip a {\n  chain x {\n    accept\n  }\n  chain y {\n    drop\n  }\n}\n"
    );

    let output = nftdelta(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--indent", "1"])
        .arg(&baseline)
        .arg(&complete)
        .output()
        .unwrap();
    assert!(stdout_of(&output).starts_with("table ip a {\n chain x {\n  accept\n"));
}

#[test]
fn test_invalid_explicit_config_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);
    let config = write_capture(dir.path(), "config.json", "{ not json");

    let output = nftdelta(dir.path())
        .arg("--config")
        .arg(&config)
        .arg(&baseline)
        .arg(&baseline)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_of(&output).contains("Config error"));
}

#[test]
fn test_verbose_logs_go_to_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_capture(dir.path(), "global.nft", BASELINE);
    let complete = write_capture(dir.path(), "complete.nft", COMPLETE);

    let output = nftdelta(dir.path())
        .arg("-v")
        .arg(&baseline)
        .arg(&complete)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_of(&output), EXPECTED_DIFF);
    assert!(stderr_of(&output).contains("new rule(s)"));
}
