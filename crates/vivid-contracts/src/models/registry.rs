use indexmap::IndexMap;
use serde::Serialize;

use crate::config::ImageSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Baseline,
    Pro,
}

/// One generation model the studio can target. The pro tier requires an
/// authorized credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub tier: ModelTier,
    pub max_image_size: ImageSize,
}

impl ModelSpec {
    pub fn supports(&self, size: ImageSize) -> bool {
        size.long_edge() <= self.max_image_size.long_edge()
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    /// First registered model of the given tier; registration order is the
    /// preference order.
    pub fn first_for_tier(&self, tier: ModelTier) -> Option<ModelSpec> {
        self.models
            .values()
            .find(|model| model.tier == tier)
            .cloned()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, tier: ModelTier, max_image_size: ImageSize| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                tier,
                max_image_size,
            },
        );
    };

    insert("gemini-2.5-flash-image", ModelTier::Baseline, ImageSize::OneK);
    insert(
        "gemini-3-pro-image-preview",
        ModelTier::Pro,
        ImageSize::FourK,
    );

    map
}
