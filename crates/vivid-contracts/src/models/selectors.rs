use crate::config::ImageSize;

use super::registry::{ModelRegistry, ModelSpec, ModelTier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    /// The tier stored in the configuration.
    pub requested_size: ImageSize,
    /// What the request will actually ask for. Enhancement passes always
    /// render at the top tier.
    pub effective_size: ImageSize,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Tier policy: the pro model for 2K/4K output or any enhancement pass,
    /// the baseline model otherwise.
    pub fn select(
        &self,
        requested_size: ImageSize,
        enhancement: bool,
    ) -> Result<ModelSelection, String> {
        let effective_size = if enhancement {
            ImageSize::FourK
        } else {
            requested_size
        };
        let tier = if enhancement || requested_size.is_high_tier() {
            ModelTier::Pro
        } else {
            ModelTier::Baseline
        };
        let Some(model) = self.registry.first_for_tier(tier) else {
            return Err(format!("No model registered for tier '{tier:?}'."));
        };
        let reason = if enhancement && requested_size != ImageSize::FourK {
            Some(format!(
                "Enhancement pass renders at 4K; stored tier was {}.",
                requested_size.as_str()
            ))
        } else {
            None
        };
        Ok(ModelSelection {
            model,
            requested_size,
            effective_size,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_model_for_low_tier_composition() {
        let selection = ModelSelector::new(None)
            .select(ImageSize::OneK, false)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image");
        assert_eq!(selection.effective_size, ImageSize::OneK);
        assert!(selection.reason.is_none());
    }

    #[test]
    fn pro_model_for_high_tier_composition() {
        let selector = ModelSelector::new(None);
        for size in [ImageSize::TwoK, ImageSize::FourK] {
            let selection = selector.select(size, false).unwrap();
            assert_eq!(selection.model.name, "gemini-3-pro-image-preview");
            assert_eq!(selection.effective_size, size);
        }
    }

    #[test]
    fn enhancement_always_selects_pro_at_4k() {
        let selector = ModelSelector::new(None);
        for size in [ImageSize::OneK, ImageSize::TwoK, ImageSize::FourK] {
            let selection = selector.select(size, true).unwrap();
            assert_eq!(selection.model.name, "gemini-3-pro-image-preview");
            assert_eq!(selection.effective_size, ImageSize::FourK);
            assert_eq!(selection.requested_size, size);
        }
        let explained = selector.select(ImageSize::OneK, true).unwrap();
        assert!(explained.reason.is_some());
        let already_4k = selector.select(ImageSize::FourK, true).unwrap();
        assert!(already_4k.reason.is_none());
    }
}
