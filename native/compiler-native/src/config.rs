//! Compiler configuration.
//!
//! Options are plain serde data so the same struct can be read from a JSON
//! file on disk or passed across the Node boundary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::validate::{CompileResult, CompilerError, ErrorKind};

pub const DEFAULT_MAX_RESOLUTION_ITERATIONS: usize = 1024;
pub const DEFAULT_RUNTIME_DATA: &str = "__ZENITH_PAGE__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CompileOptions {
    /// Directory scanned for components. `None` disables component discovery.
    pub components_dir: Option<String>,
    pub layouts_dir: Option<String>,
    pub pages_dir: Option<String>,
    /// Ceiling on inlining iterations for one file.
    pub max_resolution_iterations: usize,
    pub scope_styles: bool,
    /// Reject template references that resolve to nothing.
    pub strict_references: bool,
    /// Declared store names. Empty accepts any `stores.<name>`.
    pub stores: Vec<String>,
    /// Global the hydration layer reads page data from.
    pub runtime_data: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            components_dir: None,
            layouts_dir: None,
            pages_dir: None,
            max_resolution_iterations: DEFAULT_MAX_RESOLUTION_ITERATIONS,
            scope_styles: true,
            strict_references: true,
            stores: Vec::new(),
            runtime_data: DEFAULT_RUNTIME_DATA.to_string(),
        }
    }
}

impl CompileOptions {
    pub fn from_json_str(json: &str) -> CompileResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            CompilerError::new(
                ErrorKind::Io,
                &format!("Invalid compiler options: {}", e),
                "<options>",
                e.line() as u32,
                e.column() as u32,
            )
        })
    }

    pub fn from_json_file(path: &Path) -> CompileResult<Self> {
        let file = path.to_string_lossy();
        let json = fs::read_to_string(path).map_err(|e| {
            CompilerError::new(
                ErrorKind::Io,
                &format!("Failed to read options: {}", e),
                &file,
                1,
                1,
            )
        })?;
        Self::from_json_str(&json).map(|options| {
            tracing::debug!(file = %file, "loaded compiler options");
            options
        })
    }

    pub fn with_components_dir(mut self, dir: impl Into<String>) -> Self {
        self.components_dir = Some(dir.into());
        self
    }

    pub fn with_layouts_dir(mut self, dir: impl Into<String>) -> Self {
        self.layouts_dir = Some(dir.into());
        self
    }

    /// Stable string covering every option that changes generated output.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let options = CompileOptions::from_json_str(r#"{ "componentsDir": "src/components" }"#)
            .unwrap();
        assert_eq!(options.components_dir.as_deref(), Some("src/components"));
        assert_eq!(
            options.max_resolution_iterations,
            DEFAULT_MAX_RESOLUTION_ITERATIONS
        );
        assert!(options.scope_styles);
        assert_eq!(options.runtime_data, "__ZENITH_PAGE__");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = CompileOptions::from_json_str(r#"{ "componentDir": "x" }"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(err.message.contains("componentDir"));
    }

    #[test]
    fn test_fingerprint_tracks_options() {
        let a = CompileOptions::default();
        let b = CompileOptions {
            stores: vec!["cart".into()],
            ..CompileOptions::default()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), CompileOptions::default().fingerprint());
    }
}
