//! Model capability lookup.
//!
//! Sessions consult an injected [`CapabilityLookup`] to decide whether a model may receive
//! images or produce extended reasoning.  [`ModelRegistry`] is the in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Something a model can do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelFeature {
    /// Plain text chat.
    Text,
    /// Image understanding.
    Vision,
    /// Extended reasoning.
    Think,
}

impl std::str::FromStr for ModelFeature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ModelFeature::Text),
            "vision" => Ok(ModelFeature::Vision),
            "think" => Ok(ModelFeature::Think),
            _ => Err(Error::validation(
                format!("unknown model feature {s:?}"),
                Some("feature".to_string()),
            )),
        }
    }
}

/// Answers capability questions about models.
pub trait CapabilityLookup: Send + Sync {
    /// True if `model` supports `feature`.
    fn supports(&self, model: &str, feature: ModelFeature) -> bool;

    /// True if `model` accepts image input.
    fn is_vision_capable(&self, model: &str) -> bool {
        self.supports(model, ModelFeature::Vision)
    }

    /// True if `model` produces extended reasoning.
    fn is_reasoning_capable(&self, model: &str) -> bool {
        self.supports(model, ModelFeature::Think)
    }
}

/// In-memory registry of model capabilities.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, BTreeSet<ModelFeature>>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a model.  No features means text only.
    pub fn register(
        &self,
        model: impl Into<String>,
        features: impl IntoIterator<Item = ModelFeature>,
    ) -> Result<()> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(Error::validation(
                "model name cannot be empty",
                Some("model".to_string()),
            ));
        }
        let mut features: BTreeSet<ModelFeature> = features.into_iter().collect();
        if features.is_empty() {
            features.insert(ModelFeature::Text);
        }
        self.models
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(model, features);
        Ok(())
    }

    /// The registered features of a model.
    pub fn capabilities(&self, model: &str) -> Option<BTreeSet<ModelFeature>> {
        self.models
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(model)
            .cloned()
    }

    /// Registered model names, sorted.
    pub fn model_names(&self) -> Vec<String> {
        self.models
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl CapabilityLookup for ModelRegistry {
    fn supports(&self, model: &str, feature: ModelFeature) -> bool {
        self.capabilities(model)
            .is_some_and(|features| features.contains(&feature))
    }
}
