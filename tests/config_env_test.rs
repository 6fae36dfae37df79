use hotreload::Settings;
use hotreload::config::WatchBackend;
use std::env;
use tempfile::TempDir;

#[test]
fn test_env_overrides_file_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &config_path,
        "[watch]\ndebounce_ms = 50\nbackend = \"native\"\n\n[reload]\nentry = \"start\"\n",
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("HOTRELOAD_WATCH__DEBOUNCE_MS", "300");
        env::set_var("HOTRELOAD_RELOAD__TRIM_TRACEBACK", "false");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("HOTRELOAD_WATCH__DEBOUNCE_MS");
        env::remove_var("HOTRELOAD_RELOAD__TRIM_TRACEBACK");
    }

    assert_eq!(settings.watch.debounce_ms, 300, "env wins over the file");
    assert!(!settings.reload.trim_traceback);
    assert_eq!(settings.watch.backend, WatchBackend::Native);
    assert_eq!(settings.reload.entry, "start");
}
