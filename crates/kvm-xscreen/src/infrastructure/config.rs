//! TOML configuration for the `kvm-xscreen` binary.
//!
//! Read from `$XDG_CONFIG_HOME/kvm-xscreen/config.toml`, falling back to
//! `~/.config/kvm-xscreen/config.toml`.  A missing file means defaults:
//!
//! ```toml
//! [screen]
//! display = ":0.0"
//! role = "primary"
//! xtest_xinerama_unaware = true
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = ...)]`, so a file that names only
//! the settings it changes is valid, and so is a file written by an older
//! version.

use std::path::{Path, PathBuf};

use kvm_core::{OptionsList, OPTION_XTEST_XINERAMA_UNAWARE};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::ScreenRole;

/// Display used when neither the config nor `$DISPLAY` names one.
pub const DEFAULT_DISPLAY: &str = ":0.0";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct ScreenConfig {
    #[serde(default)]
    pub screen: ScreenSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Which display to open and in which role.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScreenSection {
    /// X display name; `None` uses `$DISPLAY`.
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub role: ScreenRole,
    /// Whether XTest motion ignores the Xinerama layout, forcing direct
    /// warps on multi-monitor servers.
    #[serde(default = "default_true")]
    pub xtest_xinerama_unaware: bool,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScreenSection {
    fn default() -> Self {
        Self {
            display: None,
            role: ScreenRole::default(),
            xtest_xinerama_unaware: default_true(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ScreenConfig {
    /// The display to open: the configured name, else `$DISPLAY`, else
    /// [`DEFAULT_DISPLAY`].
    pub fn display_name(&self) -> String {
        resolve_display(
            self.screen.display.as_deref(),
            std::env::var("DISPLAY").ok().as_deref(),
        )
    }

    /// The screen options this config sets.
    pub fn options(&self) -> OptionsList {
        vec![(
            OPTION_XTEST_XINERAMA_UNAWARE,
            i32::from(self.screen.xtest_xinerama_unaware),
        )]
    }
}

fn resolve_display(configured: Option<&str>, environment: Option<&str>) -> String {
    configured
        .or(environment)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DISPLAY)
        .to_string()
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the directory holding the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("kvm-xscreen"))
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from its default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ScreenConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `ScreenConfig` from `path`, returning the defaults if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ScreenConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ScreenConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_primary_and_xinerama_unaware() {
        // Arrange / Act
        let cfg = ScreenConfig::default();

        // Assert
        assert_eq!(cfg.screen.role, ScreenRole::Primary);
        assert!(cfg.screen.xtest_xinerama_unaware);
        assert_eq!(cfg.logging.log_level, "info");
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let cfg: ScreenConfig = toml::from_str("[screen]\nrole = \"secondary\"\n").expect("parse");

        assert_eq!(cfg.screen.role, ScreenRole::Secondary);
        assert!(cfg.screen.xtest_xinerama_unaware);
        assert_eq!(cfg.screen.display, None);
        assert_eq!(cfg.logging, LoggingSection::default());
    }

    #[test]
    fn test_unknown_role_is_a_parse_error() {
        let result: Result<ScreenConfig, _> = toml::from_str("[screen]\nrole = \"tertiary\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_options_carry_xinerama_flag() {
        let mut cfg = ScreenConfig::default();
        cfg.screen.xtest_xinerama_unaware = false;

        assert_eq!(cfg.options(), vec![(OPTION_XTEST_XINERAMA_UNAWARE, 0)]);
    }

    #[test]
    fn test_display_resolution_order() {
        assert_eq!(resolve_display(Some(":1"), Some(":2")), ":1");
        assert_eq!(resolve_display(None, Some(":2")), ":2");
        assert_eq!(resolve_display(None, None), DEFAULT_DISPLAY);
        assert_eq!(resolve_display(None, Some("")), DEFAULT_DISPLAY);
    }

    #[test]
    fn test_load_from_path_reads_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("kvm-xscreen-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(&path, "[screen]\ndisplay = \":3\"\n\n[logging]\nlog_level = \"debug\"\n")
            .expect("write");

        // Act
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded.screen.display.as_deref(), Some(":3"));
        assert_eq!(loaded.logging.log_level, "debug");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unreadable_path_is_an_io_error() {
        // A directory where the file should be cannot be read as text.
        let dir = std::env::temp_dir().join(format!("kvm-xscreen-config-dir-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");

        let result = load_config_from(&dir);

        assert!(matches!(result, Err(ConfigError::Io { .. })));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let path = std::env::temp_dir().join("kvm-xscreen-does-not-exist/config.toml");
        assert_eq!(load_config_from(&path).expect("load"), ScreenConfig::default());
    }
}
