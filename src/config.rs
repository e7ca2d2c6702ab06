//! Pipeline Configuration
//!
//! Every field has a default, so an empty file (or no file) is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::registry::SchemaSource;
use crate::transform::{FenceOptions, RenderMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PipelineConfig {
    pub mode: RenderMode,
    pub diagram_language: String,
    pub default_language: String,
    pub highlight_theme: String,
    /// Load schemas from this directory instead of the embedded copies.
    pub schema_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let fences = FenceOptions::default();
        Self {
            mode: RenderMode::Trusted,
            diagram_language: fences.diagram_language,
            default_language: fences.default_language,
            highlight_theme: "github-dark".to_string(),
            schema_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn fence_options(&self) -> FenceOptions {
        FenceOptions {
            diagram_language: self.diagram_language.trim().to_lowercase(),
            default_language: self.default_language.trim().to_lowercase(),
        }
    }

    pub fn schema_source(&self) -> SchemaSource {
        match &self.schema_dir {
            Some(dir) => SchemaSource::Directory(dir.clone()),
            None => SchemaSource::Embedded,
        }
    }
}
