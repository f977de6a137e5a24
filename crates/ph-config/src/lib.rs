// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for panelhost.
//!
//! This crate provides [`PanelHostConfig`] — the top-level runtime settings
//! — together with helpers for loading from TOML files, merging overlays,
//! and producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `dev_cache_bypass` is enabled; the Artifact Cache will always miss.
    DevCacheBypassEnabled,
    /// A size cap is unusually small and will reject ordinary builds.
    SuspiciouslySmallSizeCap {
        /// Which field.
        field: String,
        /// The configured value, in bytes.
        bytes: usize,
    },
    /// The type-definition debounce window is zero, defeating batching.
    ZeroDebounceWindow,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::DevCacheBypassEnabled => {
                write!(f, "dev_cache_bypass is enabled; builds will never hit the artifact cache")
            }
            ConfigWarning::SuspiciouslySmallSizeCap { field, bytes } => {
                write!(f, "{field} is set to {bytes} bytes, which is unusually small")
            }
            ConfigWarning::ZeroDebounceWindow => {
                write!(f, "typedef_debounce_ms is 0; package installs will not be batched")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Top-level panelhost runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PanelHostConfig {
    /// Root directory for per-workspace SQLite databases.
    pub workspace_db_root: PathBuf,
    /// Root directory for the content-addressed artifact cache.
    pub artifact_cache_root: PathBuf,
    /// Root directory for per-consumer type-definition dependency roots.
    pub typedef_root: PathBuf,
    /// Maximum bundle (JS) size, in bytes.
    pub bundle_max_bytes: usize,
    /// Maximum HTML document size, in bytes.
    pub html_max_bytes: usize,
    /// Maximum CSS bundle size, in bytes.
    pub css_max_bytes: usize,
    /// LRU capacity for the type-definition cache.
    pub typedef_cache_capacity: usize,
    /// Debounce window for batching type-definition installs, in milliseconds.
    pub typedef_debounce_ms: u64,
    /// Maximum retry iterations for the type-definition install fixpoint.
    pub typedef_max_retries: u32,
    /// When `true`, the Artifact Cache always misses (development mode).
    pub dev_cache_bypass: bool,
    /// Package manager executable used by the Dependency Installer.
    pub package_manager_bin: String,
    /// Bundler executable used by the Build Pipeline.
    pub bundler_bin: String,
    /// Git executable used by the Git Provisioner.
    pub git_bin: String,
}

impl Default for PanelHostConfig {
    fn default() -> Self {
        Self {
            workspace_db_root: PathBuf::from("./data/workspaces"),
            artifact_cache_root: PathBuf::from("./data/artifacts"),
            typedef_root: PathBuf::from("./data/typedefs"),
            bundle_max_bytes: ph_core::size_caps::BUNDLE_MAX_BYTES,
            html_max_bytes: ph_core::size_caps::HTML_MAX_BYTES,
            css_max_bytes: ph_core::size_caps::CSS_MAX_BYTES,
            typedef_cache_capacity: ph_core::DEFAULT_TYPEDEF_CACHE_CAPACITY,
            typedef_debounce_ms: 20,
            typedef_max_retries: 5,
            dev_cache_bypass: false,
            package_manager_bin: "npm".to_string(),
            bundler_bin: "esbuild".to_string(),
            git_bin: "git".to_string(),
        }
    }
}

impl PanelHostConfig {
    /// Load configuration from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if `path` does not exist, or
    /// [`ConfigError::ParseError`] if the contents are not valid TOML for
    /// this shape.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })
    }

    /// Merge `overlay` onto `self`: every non-default field in `overlay`
    /// replaces the corresponding field in `self`. Used to apply a
    /// workspace-local override file on top of a global config.
    #[must_use]
    pub fn merge(mut self, overlay: PanelHostConfigOverlay) -> Self {
        if let Some(v) = overlay.workspace_db_root {
            self.workspace_db_root = v;
        }
        if let Some(v) = overlay.artifact_cache_root {
            self.artifact_cache_root = v;
        }
        if let Some(v) = overlay.typedef_root {
            self.typedef_root = v;
        }
        if let Some(v) = overlay.bundle_max_bytes {
            self.bundle_max_bytes = v;
        }
        if let Some(v) = overlay.html_max_bytes {
            self.html_max_bytes = v;
        }
        if let Some(v) = overlay.css_max_bytes {
            self.css_max_bytes = v;
        }
        if let Some(v) = overlay.typedef_cache_capacity {
            self.typedef_cache_capacity = v;
        }
        if let Some(v) = overlay.typedef_debounce_ms {
            self.typedef_debounce_ms = v;
        }
        if let Some(v) = overlay.dev_cache_bypass {
            self.dev_cache_bypass = v;
        }
        self
    }

    /// Validate semantic constraints, returning hard errors and advisory
    /// warnings separately.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any size cap is zero or
    /// the typedef cache capacity is zero.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut reasons = Vec::new();
        if self.bundle_max_bytes == 0 {
            reasons.push("bundle_max_bytes must be non-zero".to_string());
        }
        if self.html_max_bytes == 0 {
            reasons.push("html_max_bytes must be non-zero".to_string());
        }
        if self.css_max_bytes == 0 {
            reasons.push("css_max_bytes must be non-zero".to_string());
        }
        if self.typedef_cache_capacity == 0 {
            reasons.push("typedef_cache_capacity must be non-zero".to_string());
        }
        if self.package_manager_bin.trim().is_empty() {
            reasons.push("package_manager_bin must not be empty".to_string());
        }
        if !reasons.is_empty() {
            return Err(ConfigError::ValidationError { reasons });
        }

        let mut warnings = Vec::new();
        if self.dev_cache_bypass {
            warnings.push(ConfigWarning::DevCacheBypassEnabled);
        }
        if self.bundle_max_bytes < 1024 {
            warnings.push(ConfigWarning::SuspiciouslySmallSizeCap {
                field: "bundle_max_bytes".to_string(),
                bytes: self.bundle_max_bytes,
            });
        }
        if self.typedef_debounce_ms == 0 {
            warnings.push(ConfigWarning::ZeroDebounceWindow);
        }
        Ok(warnings)
    }
}

/// A partial config used as a merge overlay (e.g. from CLI flags or a
/// workspace-local `.panelhost.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PanelHostConfigOverlay {
    /// See [`PanelHostConfig::workspace_db_root`].
    pub workspace_db_root: Option<PathBuf>,
    /// See [`PanelHostConfig::artifact_cache_root`].
    pub artifact_cache_root: Option<PathBuf>,
    /// See [`PanelHostConfig::typedef_root`].
    pub typedef_root: Option<PathBuf>,
    /// See [`PanelHostConfig::bundle_max_bytes`].
    pub bundle_max_bytes: Option<usize>,
    /// See [`PanelHostConfig::html_max_bytes`].
    pub html_max_bytes: Option<usize>,
    /// See [`PanelHostConfig::css_max_bytes`].
    pub css_max_bytes: Option<usize>,
    /// See [`PanelHostConfig::typedef_cache_capacity`].
    pub typedef_cache_capacity: Option<usize>,
    /// See [`PanelHostConfig::typedef_debounce_ms`].
    pub typedef_debounce_ms: Option<u64>,
    /// See [`PanelHostConfig::dev_cache_bypass`].
    pub dev_cache_bypass: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_with_no_warnings() {
        let warnings = PanelHostConfig::default().validate().unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn zero_size_cap_is_a_hard_error() {
        let mut cfg = PanelHostConfig::default();
        cfg.bundle_max_bytes = 0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn dev_cache_bypass_warns() {
        let mut cfg = PanelHostConfig::default();
        cfg.dev_cache_bypass = true;
        let warnings = cfg.validate().unwrap();
        assert!(warnings.contains(&ConfigWarning::DevCacheBypassEnabled));
    }

    #[test]
    fn merge_overlay_replaces_only_set_fields() {
        let base = PanelHostConfig::default();
        let overlay = PanelHostConfigOverlay {
            dev_cache_bypass: Some(true),
            ..Default::default()
        };
        let merged = base.clone().merge(overlay);
        assert!(merged.dev_cache_bypass);
        assert_eq!(merged.bundle_max_bytes, base.bundle_max_bytes);
    }

    #[test]
    fn load_missing_file_is_file_not_found() {
        let err = PanelHostConfig::load(Path::new("/nonexistent/panelhost.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_parses_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panelhost.toml");
        std::fs::write(&path, "dev_cache_bypass = true\n").unwrap();
        let cfg = PanelHostConfig::load(&path).unwrap();
        assert!(cfg.dev_cache_bypass);
    }
}
