use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn vidascii() -> Command {
    let mut cmd = Command::cargo_bin("vidascii").unwrap();
    // Keep user config files out of the way
    cmd.env("HOME", "/nonexistent-home").env("XDG_CONFIG_HOME", "/nonexistent-config");
    cmd
}

#[test]
fn test_cli_help() {
    vidascii()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ASCII-art video"))
        .stdout(predicate::str::contains("--frame-rate"));
}

#[test]
fn test_cli_version() {
    vidascii()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_missing_file() {
    let dir = tempdir().unwrap();
    vidascii()
        .current_dir(dir.path())
        .arg("nonexistent.mp4")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_rejects_extension() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("clip.mkv");
    fs::write(&input, b"not checked").unwrap();

    vidascii()
        .current_dir(dir.path())
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("mp4, mov, avi"));
}

#[test]
fn test_cli_rejects_zero_columns() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("clip.mp4");
    fs::write(&input, b"not decoded").unwrap();

    vidascii()
        .current_dir(dir.path())
        .arg(&input)
        .args(["--columns", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("columns must be at least 1"));
}

#[test]
fn test_cli_rejects_zero_frame_rate() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("clip.mov");
    fs::write(&input, b"not decoded").unwrap();

    vidascii()
        .current_dir(dir.path())
        .arg(&input)
        .args(["--frame-rate", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("frame rate must be at least 1"));
}

#[test]
fn test_cli_conflicting_presets() {
    vidascii()
        .args(["clip.mp4", "--small", "--large"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_cli_bad_config_file() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("vidascii.toml");
    fs::write(&config, "presets = 3").unwrap();

    vidascii()
        .current_dir(dir.path())
        .args(["clip.mp4", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading config"));
}

#[test]
fn test_cli_verbose_enables_debug_logging() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("clip.mp4");
    fs::write(&input, b"not decoded").unwrap();

    vidascii()
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .arg(&input)
        .arg("--verbose")
        .assert()
        .stderr(predicate::str::contains("Options:"));

    vidascii()
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .arg(&input)
        .assert()
        .stderr(predicate::str::contains("Options:").not());
}
