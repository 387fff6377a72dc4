mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, ModelTier};
pub use selectors::{ModelSelection, ModelSelector};
