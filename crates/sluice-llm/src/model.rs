use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model tier selected by the caller; the catalog maps it to a concrete model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Large,
    Small,
}

/// Snapshot of the selected model, as supplied by the model catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub default_max_tokens: u32,
    #[serde(default)]
    pub can_reason: bool,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, default_max_tokens: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            default_max_tokens,
            can_reason: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn reasoning(mut self, can_reason: bool) -> Self {
        self.can_reason = can_reason;
        self
    }
}

/// Catalog lookup keyed by tier
#[derive(Clone)]
pub struct ModelSelector(Arc<dyn Fn(ModelType) -> ModelDescriptor + Send + Sync>);

impl ModelSelector {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ModelType) -> ModelDescriptor + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Same descriptor for every tier
    pub fn fixed(model: ModelDescriptor) -> Self {
        Self::new(move |_| model.clone())
    }

    pub fn select(&self, model_type: ModelType) -> ModelDescriptor {
        (self.0)(model_type)
    }
}

impl fmt::Debug for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModelSelector(..)")
    }
}
