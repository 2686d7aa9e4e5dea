use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::order::LoadingOrder;

/// Extension declarations read from `loadorder.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct LoadorderConfig {
    #[serde(default)]
    pub extensions: Vec<ExtensionConfig>,
}

impl LoadorderConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("failed to parse TOML config: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str::<Self>(text)?)
    }
}

/// A single `[[extensions]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionConfig {
    /// Extension point the entry contributes to.
    pub point: String,
    /// Plugin that declares the entry.
    pub plugin: String,
    pub id: Option<String>,
    #[serde(default)]
    pub order: LoadingOrder,
    pub implementation: Option<String>,
}
