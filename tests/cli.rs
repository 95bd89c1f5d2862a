use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn homerow_cmd() -> Command {
    Command::cargo_bin("homerow-mouse").expect("binary exists")
}

#[test]
fn help_prints_usage() {
    homerow_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Keyboard-driven pointer control for X11 desktops",
        ))
        .stdout(predicate::str::contains("--backend"));
}

#[test]
fn unknown_backend_is_rejected() {
    homerow_cmd()
        .args(["--backend", "wayland", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'wayland'"));
}

#[test]
fn check_accepts_defaults_from_empty_config_home() {
    let temp = TempDir::new().unwrap();
    homerow_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK (backend: direct, mode: Hold)"));
}

#[test]
fn check_applies_command_line_overrides() {
    let temp = TempDir::new().unwrap();
    homerow_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .args(["--backend", "xdotool", "--toggle", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend: command, mode: Toggle"));
}

#[test]
fn out_of_range_value_fails_validation() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    std::fs::write(&config, "[motion]\ntick_interval_ms = 0\n").unwrap();

    homerow_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("motion.tick_interval_ms"));
}

#[test]
fn duplicate_key_binding_fails_validation() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    std::fs::write(&config, "[keys]\nclick = [\"KEY_J\"]\n").unwrap();

    homerow_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate key binding"));
}

#[test]
fn unparseable_config_reports_path() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    std::fs::write(&config, "[motion\nmove_speed = ").unwrap();

    homerow_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config from"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = TempDir::new().unwrap();
    homerow_cmd()
        .arg("--config")
        .arg(temp.path().join("absent.toml"))
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn status_without_daemon_reports_not_running() {
    let temp = TempDir::new().unwrap();
    homerow_cmd()
        .arg("--pid-file")
        .arg(temp.path().join("homerow-mouse.pid"))
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn stop_removes_stale_pid_file() {
    let temp = TempDir::new().unwrap();
    let pid_file = temp.path().join("homerow-mouse.pid");
    std::fs::write(&pid_file, "4242\n").unwrap();

    homerow_cmd()
        .arg("--pid-file")
        .arg(&pid_file)
        .arg("stop")
        .assert()
        .success()
        .stdout(predicate::str::contains("removed stale PID file"));
    assert!(!pid_file.exists());
}

#[test]
fn init_config_writes_example_and_refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    let expected = temp.path().join("homerow-mouse").join("config.toml");

    homerow_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .arg("--init-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default config"));

    let written = std::fs::read_to_string(&expected).unwrap();
    assert!(written.contains("[motion]"));
    assert!(written.contains("[keys]"));

    homerow_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .arg("--init-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    homerow_cmd()
        .arg("--config")
        .arg(&expected)
        .arg("check")
        .assert()
        .success();
}
