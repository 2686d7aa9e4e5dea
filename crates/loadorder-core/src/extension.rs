use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::{ExtensionConfig, LoadorderConfig};
use crate::order::LoadingOrder;
use crate::sort::{self, ConflictError, Orderable};

/// Identifies the declaration of an extension in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionDescriptor {
    pub plugin: String,
    pub point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub order: String,
}

impl Display for ExtensionDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.plugin)?;
        if let Some(id) = &self.id {
            write!(f, "/{id}")?;
        }
        write!(f, " on {} (order=\"{}\")", self.point, self.order)
    }
}

/// An extension contributed by a plugin to an extension point.
#[derive(Debug, Clone)]
pub struct Extension {
    plugin: String,
    point: String,
    id: Option<String>,
    order: LoadingOrder,
    implementation: Option<String>,
}

impl Extension {
    pub fn new(plugin: impl Into<String>, point: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            point: point.into(),
            id: None,
            order: LoadingOrder::ANY,
            implementation: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_order(mut self, order: LoadingOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn point(&self) -> &str {
        &self.point
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn implementation(&self) -> Option<&str> {
        self.implementation.as_deref()
    }

    pub fn descriptor(&self) -> ExtensionDescriptor {
        ExtensionDescriptor {
            plugin: self.plugin.clone(),
            point: self.point.clone(),
            id: self.id.clone(),
            order: self.order.to_string(),
        }
    }
}

impl From<ExtensionConfig> for Extension {
    fn from(cfg: ExtensionConfig) -> Self {
        Self {
            plugin: cfg.plugin,
            point: cfg.point,
            id: cfg.id,
            order: cfg.order,
            implementation: cfg.implementation,
        }
    }
}

impl Orderable for Extension {
    type Payload = ExtensionDescriptor;

    fn order_id(&self) -> Option<&str> {
        self.id()
    }

    fn order(&self) -> &LoadingOrder {
        &self.order
    }

    fn conflict_payload(&self) -> Self::Payload {
        self.descriptor()
    }
}

/// All declared extensions, grouped by extension point.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    /// Extension point names in first-declaration order.
    points: Vec<String>,
    extensions: HashMap<String, Vec<Extension>>,
}

impl ExtensionRegistry {
    /// Builds a registry from every `[[extensions]]` entry, keeping declaration order.
    pub fn from_config(config: &LoadorderConfig) -> Self {
        let mut registry = Self::default();
        for entry in &config.extensions {
            registry.register(Extension::from(entry.clone()));
        }
        debug!(
            "registered {} extensions on {} points",
            config.extensions.len(),
            registry.points.len()
        );
        registry
    }

    /// Registers a new extension after those already declared for its point.
    pub fn register(&mut self, extension: Extension) {
        debug!(
            "registering extension from '{}' on '{}' (order={})",
            extension.plugin, extension.point, extension.order
        );
        if !self.extensions.contains_key(&extension.point) {
            self.points.push(extension.point.clone());
        }
        self.extensions
            .entry(extension.point.clone())
            .or_default()
            .push(extension);
    }

    /// Extension point names in first-declaration order.
    pub fn points(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(String::as_str)
    }

    /// Extensions of `point` in declaration order.
    pub fn extensions(&self, point: &str) -> &[Extension] {
        self.extensions
            .get(point)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Extensions of `point` in resolved loading order.
    ///
    /// # Errors
    /// Returns the two conflicting declarations when their orders form a cycle.
    #[instrument(skip(self))]
    pub fn sorted(&self, point: &str) -> Result<Vec<&Extension>, ConflictError<ExtensionDescriptor>> {
        let mut ordered: Vec<&Extension> = self.extensions(point).iter().collect();
        sort::sort(&mut ordered)?;
        Ok(ordered)
    }

    /// Resolves every extension point, stopping at the first conflict.
    pub fn sort_all(&self) -> Result<Vec<(&str, Vec<&Extension>)>> {
        let mut resolved = Vec::with_capacity(self.points.len());
        for point in self.points() {
            let ordered = self
                .sorted(point)
                .with_context(|| format!("failed to order extension point '{point}'"))?;
            resolved.push((point, ordered));
        }
        Ok(resolved)
    }
}
