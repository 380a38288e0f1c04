//! Tunables for the diagram core, read from a JSON file. Every section and
//! every field is optional; missing values keep their defaults.
//!
//! ```json
//! {
//!   "diagramType": "simple",
//!   "algorithm": "hierarchical",
//!   "grid": { "padding": 60 },
//!   "router": { "debounceMs": 50 }
//! }
//! ```

use crate::layout::{LayoutAlgorithm, LayoutOptions};
use crate::measure::TextMetrics;
use crate::model::DiagramKind;
use crate::routing::RouterOptions;
use crate::viewport::ViewportOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub diagram_type: DiagramKind,
    /// Algorithm used when a whole diagram is rearranged.
    pub algorithm: LayoutAlgorithm,
    #[serde(flatten)]
    pub layout: LayoutOptions,
    pub router: RouterOptions,
    pub viewport: ViewportOptions,
    pub metrics: TextMetrics,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = Config::from_json(&json)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}
