use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory the `directory` storage backend writes cards and assets to
    pub storage_dir: Option<PathBuf>,
    /// Keep the raw package as a `package-original` asset on collection cards
    pub keep_original_package: Option<bool>,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
}

impl Config {
    pub fn keep_original_package(&self) -> bool {
        self.keep_original_package.unwrap_or(true)
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// The configured storage directory, falling back to `default_dir`.
    pub fn storage_dir_or(&self, default_dir: &Path) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| default_dir.to_path_buf())
    }

    /// Applies a `config set` value.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), String> {
        match key {
            ConfigKey::StorageDir => {
                if value.trim().is_empty() {
                    return Err("storage-dir cannot be empty".to_string());
                }
                self.storage_dir = Some(PathBuf::from(value));
            }
            ConfigKey::KeepOriginalPackage => {
                self.keep_original_package = Some(parse_bool(value)?);
            }
            ConfigKey::LogFilter => {
                if value.trim().is_empty() {
                    return Err("log-filter cannot be empty".to_string());
                }
                self.log_filter = Some(value.trim().to_string());
            }
        }
        Ok(())
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::StorageDir => self.storage_dir = None,
            ConfigKey::KeepOriginalPackage => self.keep_original_package = None,
            ConfigKey::LogFilter => self.log_filter = None,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(format!("expected on/off, got '{other}'")),
    }
}

/// Settable configuration keys, spelled the way the CLI accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    StorageDir,
    KeepOriginalPackage,
    LogFilter,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [
        ConfigKey::StorageDir,
        ConfigKey::KeepOriginalPackage,
        ConfigKey::LogFilter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::StorageDir => "storage-dir",
            ConfigKey::KeepOriginalPackage => "keep-original-package",
            ConfigKey::LogFilter => "log-filter",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = ConfigKey::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown config key '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.local/share/cardvault/library` → `~/.local/share/cardvault/library`
/// - Windows: paths are shown unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
