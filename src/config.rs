//! Configuration for the hot reload system.
//!
//! Layered configuration:
//! - Default values
//! - TOML configuration file (`.hotreload/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `HOTRELOAD_` and use double
//! underscores to separate nested levels:
//! - `HOTRELOAD_WATCH__DEBOUNCE_MS=300` sets `watch.debounce_ms`
//! - `HOTRELOAD_WATCH__BACKEND=poll` sets `watch.backend`
//! - `HOTRELOAD_RELOAD__TRIM_TRACEBACK=false` sets `reload.trim_traceback`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory searched for in the current directory and its ancestors.
pub const CONFIG_DIR: &str = ".hotreload";

/// Settings file inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

const ENV_PREFIX: &str = "HOTRELOAD_";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Watch sessions and debouncing
    #[serde(default)]
    pub watch: WatchConfig,

    /// Reload orchestration
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Filesystem event backend.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Native notifications, falling back to polling if they are unavailable
    #[default]
    Auto,
    /// Native notifications only
    Native,
    /// Always poll modification times
    Poll,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// How long a path must stay quiet before its event settles
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval of the polling backend
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Worker wake-up interval when nothing is buffered
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,

    #[serde(default)]
    pub backend: WatchBackend,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReloadConfig {
    /// Drop stack frames outside the reloaded unit from failure reports
    #[serde(default = "default_true")]
    pub trim_traceback: bool,

    /// Function the CLI calls after every successful (re)load
    #[serde(default = "default_entry")]
    pub entry: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every module
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `hotreload::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_debounce_ms() -> u64 {
    200
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_idle_tick_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_entry() -> String {
    "main".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_tick_ms: default_idle_tick_ms(),
            backend: WatchBackend::default(),
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            trim_traceback: true,
            entry: default_entry(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.hotreload/settings.toml` from the current directory upwards.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
