//! Runtime configuration for the interception policy and the per-directory
//! database filename. Everything here has a literal default that matches
//! the hardcoded behavior this crate was distilled from; environment
//! overrides are opt-in and only consulted by [`Config::from_env`].

use crate::error::{self, Result};

const DEFAULT_SAVE_DB_FILENAME: &str = "ZomboidSQLite.db";
const DEFAULT_SAVES_MARKER: &str = "Saves";
const DEFAULT_INTERCEPTED_EXTENSION: &str = "bin";

/// Knobs for [`crate::handler::CallHandler`]'s interception policy and
/// per-directory database naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Filename of the per-directory database, e.g. `ZomboidSQLite.db`.
    pub save_db_filename: String,
    /// Literal directory name that marks a path as being under a "Saves" root.
    pub saves_marker: String,
    /// File extension (without the leading dot) that must match for a path
    /// to be a candidate for interception.
    pub intercepted_extension: String,
    /// Master switch. When `false`, every interception check returns `false`
    /// regardless of path shape, so every call passes through.
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_db_filename: DEFAULT_SAVE_DB_FILENAME.to_string(),
            saves_marker: DEFAULT_SAVES_MARKER.to_string(),
            intercepted_extension: DEFAULT_INTERCEPTED_EXTENSION.to_string(),
            enabled: true,
        }
    }
}

impl Config {
    /// Build a [`Config`], overriding individual defaults from environment
    /// variables when present:
    ///
    /// - `VFSDB_SAVE_DB_FILENAME`
    /// - `VFSDB_SAVES_MARKER`
    /// - `VFSDB_INTERCEPTED_EXTENSION`
    /// - `VFSDB_DISABLED` (any non-empty value disables interception)
    ///
    /// Absence of a variable falls back to the literal default, not an error.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(name) = std::env::var("VFSDB_SAVE_DB_FILENAME") {
            if name.is_empty() {
                return error::ConfigSnafu {
                    message: "VFSDB_SAVE_DB_FILENAME must not be empty".to_string(),
                }
                .fail();
            }
            cfg.save_db_filename = name;
        }

        if let Ok(marker) = std::env::var("VFSDB_SAVES_MARKER") {
            if marker.is_empty() {
                return error::ConfigSnafu {
                    message: "VFSDB_SAVES_MARKER must not be empty".to_string(),
                }
                .fail();
            }
            cfg.saves_marker = marker;
        }

        if let Ok(ext) = std::env::var("VFSDB_INTERCEPTED_EXTENSION") {
            if ext.is_empty() {
                return error::ConfigSnafu {
                    message: "VFSDB_INTERCEPTED_EXTENSION must not be empty".to_string(),
                }
                .fail();
            }
            cfg.intercepted_extension = ext;
        }

        if std::env::var("VFSDB_DISABLED").is_ok_and(|v| !v.is_empty()) {
            cfg.enabled = false;
        }

        Ok(cfg)
    }
}
