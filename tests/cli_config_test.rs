use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_hotreload"))
        .arg("init")
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run init command");
    assert!(output.status.success());

    let config_path = temp_dir.path().join(".hotreload/settings.toml");
    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[watch]"));
    assert!(content.contains("debounce_ms = 200"));

    // A second init without --force refuses to overwrite
    let output = Command::new(env!("CARGO_BIN_EXE_hotreload"))
        .arg("init")
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run init command");
    assert!(!output.status.success());
}

#[test]
fn test_config_command_with_custom_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("custom.toml");
    std::fs::write(&config_path, "[watch]\ndebounce_ms = 75\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_hotreload"))
        .args(["config", "--config"])
        .arg(&config_path)
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run config command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("debounce_ms = 75"), "{stdout}");
    assert!(stdout.contains("trim_traceback = true"), "{stdout}");
}

#[test]
fn test_run_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_hotreload"))
        .args(["run", "missing.hr"])
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run run command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load missing.hr"), "{stderr}");
}
