//! Server settings.
//!
//! Read from `initializationOptions` at startup and replaced on
//! `workspace/didChangeConfiguration`. Settings may be sent bare or nested
//! under a `joule` key.

use joule_analysis::DiagnosticOptions;
use joule_loader::SearchPaths;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable with extra library roots.
pub const JSONNET_PATH: &str = "JSONNET_PATH";

/// Diagnostic settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsConfig {
    /// Publish diagnostics at all.
    pub enable: bool,
    /// Warn when a local hides an earlier one of its chain.
    pub shadowing: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            shadowing: true,
        }
    }
}

/// Inlay hint settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlayHintsConfig {
    /// Answer inlay hint requests.
    pub enable: bool,
}

impl Default for InlayHintsConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

/// All settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Library roots searched after the importer's directory.
    pub jpath: Vec<PathBuf>,
    /// Diagnostics.
    pub diagnostics: DiagnosticsConfig,
    /// Inlay hints.
    pub inlay_hints: InlayHintsConfig,
    /// Delay before background diagnostics start, in milliseconds.
    pub debounce_ms: u64,
    /// Analysis threads; 0 picks one per core.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jpath: Vec::new(),
            diagnostics: DiagnosticsConfig::default(),
            inlay_hints: InlayHintsConfig::default(),
            debounce_ms: 150,
            workers: 0,
        }
    }
}

impl Config {
    /// Settings from a client payload. Missing keys take their defaults; an
    /// unreadable payload is logged and ignored.
    #[must_use]
    pub fn from_json(value: Option<serde_json::Value>) -> Self {
        let Some(mut value) = value else {
            return Self::default();
        };
        if let Some(nested) = value.get_mut("joule").map(serde_json::Value::take) {
            value = nested;
        }
        if value.is_null() {
            return Self::default();
        }
        match serde_json::from_value(value) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Invalid settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Import search paths: `jpath`, then the roots listed in `env_path`
    /// (the value of `JSONNET_PATH`).
    #[must_use]
    pub fn search_paths(
        &self,
        workspace_root: Option<&Path>,
        env_path: Option<&str>,
    ) -> SearchPaths {
        let mut jpath = self.jpath.clone();
        if let Some(env_path) = env_path {
            jpath.extend(
                env_path
                    .split(':')
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
            );
        }
        SearchPaths::new(jpath, workspace_root.map(Path::to_path_buf))
    }

    /// Which optional checks the diagnostic pipeline runs.
    #[must_use]
    pub const fn diagnostic_options(&self) -> DiagnosticOptions {
        DiagnosticOptions {
            shadowing: self.diagnostics.shadowing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = Config::from_json(None);
        assert!(config.diagnostics.enable);
        assert!(config.diagnostics.shadowing);
        assert!(config.inlay_hints.enable);
        assert_eq!(config.debounce_ms, 150);
    }

    #[test]
    fn test_camel_case_keys() {
        let config = Config::from_json(Some(json!({
            "jpath": ["/lib"],
            "diagnostics": { "shadowing": false },
            "inlayHints": { "enable": false },
            "debounceMs": 0,
            "workers": 2
        })));
        assert_eq!(config.jpath, vec![PathBuf::from("/lib")]);
        assert!(config.diagnostics.enable);
        assert!(!config.diagnostics.shadowing);
        assert!(!config.inlay_hints.enable);
        assert_eq!(config.debounce_ms, 0);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_nested_under_joule() {
        let config = Config::from_json(Some(json!({ "joule": { "debounceMs": 5 } })));
        assert_eq!(config.debounce_ms, 5);
    }

    #[test]
    fn test_invalid_payload_falls_back() {
        let config = Config::from_json(Some(json!({ "jpath": 3 })));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_path_is_appended() {
        let config = Config {
            jpath: vec![PathBuf::from("/a")],
            ..Config::default()
        };
        let search = config.search_paths(Some(Path::new("/w")), Some("/b::/c"));
        assert_eq!(
            search.jpath,
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
        assert_eq!(search.workspace_root, Some(PathBuf::from("/w")));
    }
}
