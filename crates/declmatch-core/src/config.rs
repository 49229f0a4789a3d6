//! Configuration for a matching pass.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Match configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Namespace wrapping the synthetic probe source
    #[serde(default = "default_probe_namespace")]
    pub probe_namespace: String,

    /// Stem suffix marking auxiliary headers (`foo_aux.h` stands in for `foo.h`)
    #[serde(default = "default_aux_suffix")]
    pub aux_suffix: String,

    /// Unique-ownership wrapper template
    #[serde(default = "default_unique_ptr")]
    pub unique_ptr_template: String,

    /// Shared-ownership wrapper template
    #[serde(default = "default_shared_ptr")]
    pub shared_ptr_template: String,

    /// Function wrapper used to spell matched callables
    #[serde(default = "default_function_wrapper")]
    pub function_wrapper: String,

    /// Require top-level decls without their own constraint to live in the root file
    #[serde(default)]
    pub enforce_root_file: bool,

    /// Break overload ties in favour of non-deprecated declarations
    #[serde(default = "default_prefer_non_deprecated")]
    pub prefer_non_deprecated: bool,
}

fn default_probe_namespace() -> String {
    "declmatch_probe".to_string()
}

fn default_aux_suffix() -> String {
    "_aux".to_string()
}

fn default_unique_ptr() -> String {
    "::std::unique_ptr".to_string()
}

fn default_shared_ptr() -> String {
    "::std::shared_ptr".to_string()
}

fn default_function_wrapper() -> String {
    "::std::function".to_string()
}

fn default_prefer_non_deprecated() -> bool {
    true
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            probe_namespace: default_probe_namespace(),
            aux_suffix: default_aux_suffix(),
            unique_ptr_template: default_unique_ptr(),
            shared_ptr_template: default_shared_ptr(),
            function_wrapper: default_function_wrapper(),
            enforce_root_file: false,
            prefer_non_deprecated: default_prefer_non_deprecated(),
        }
    }
}

impl MatchConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, MatchError> {
        toml::from_str(content).map_err(|e| MatchError::Config {
            message: format!("failed to parse config: {}", e),
        })
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, MatchError> {
        let content = fs::read_to_string(path).map_err(|e| MatchError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        tracing::debug!("loading match config from {}", path.display());
        Self::from_toml_str(&content)
    }
}
