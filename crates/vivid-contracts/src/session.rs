use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::{GenerationConfig, ReferenceImage, SceneAction, SceneItem};
use crate::instructions::InstructionMode;

/// The narrative a fresh workspace starts from.
pub const DEFAULT_NARRATIVE: &str = "Use the uploaded images strictly as references for the subjects. Preserve their identities, facial features, expressions, poses, skin tones, hairstyles, clothing patterns, and proportions exactly. \n\nA romantic, cinematic scene of the couple holding hands while walking through a lush garden walkway. The couple is captured from behind, mid-stride, walking forward confidently. Both gently turn their heads back toward the camera, making soft eye contact, while their bodies remain facing forward. The garden walkway is lined with manicured greenery, flowering plants, and elegant stone or tiled paths. Warm natural lighting, soft sunlight filtering through leaves, creating a dreamy glow. The atmosphere feels peaceful, intimate, and timeless. \n\nHigh realism, cinematic depth of field, natural skin tones, luxury lifestyle photography style, ultra-detailed, 4K quality, professional lens.";

pub const MISSING_SUBJECT_MESSAGE: &str = "Please upload at least one subject reference image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Idle,
    Generating,
    Upscaling,
    Success,
    Error,
    NeedsKey,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "IDLE",
            SessionStatus::Generating => "GENERATING",
            SessionStatus::Upscaling => "UPSCALING",
            SessionStatus::Success => "SUCCESS",
            SessionStatus::Error => "ERROR",
            SessionStatus::NeedsKey => "NEEDS_KEY",
        }
    }
}

/// The generated image as returned by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Output of one successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub image: ResultImage,
    pub advisory_text: Option<String>,
    /// Echo of the configuration the request was built from.
    pub config: GenerationConfig,
}

/// In-memory workspace state. Single owner, at most one outstanding request;
/// nothing here is ever persisted.
#[derive(Debug, Clone)]
pub struct Session {
    subject_references: Vec<ReferenceImage>,
    scene_references: Vec<ReferenceImage>,
    scene_items: Vec<SceneItem>,
    narrative: String,
    config: GenerationConfig,
    status: SessionStatus,
    result: Option<GenerationResult>,
    last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            subject_references: Vec::new(),
            scene_references: Vec::new(),
            scene_items: default_scene_items(),
            narrative: DEFAULT_NARRATIVE.to_string(),
            config: GenerationConfig::session_defaults(),
            status: SessionStatus::Idle,
            result: None,
            last_error: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn subject_references(&self) -> &[ReferenceImage] {
        &self.subject_references
    }

    pub fn scene_references(&self) -> &[ReferenceImage] {
        &self.scene_references
    }

    pub fn scene_items(&self) -> &[SceneItem] {
        &self.scene_items
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn add_subject_reference(&mut self, image: ReferenceImage) {
        self.subject_references.push(image);
    }

    pub fn remove_subject_reference(&mut self, id: &str) -> bool {
        let before = self.subject_references.len();
        self.subject_references.retain(|image| image.id != id);
        self.subject_references.len() != before
    }

    pub fn add_scene_reference(&mut self, image: ReferenceImage) {
        self.scene_references.push(image);
    }

    pub fn remove_scene_reference(&mut self, id: &str) -> bool {
        let before = self.scene_references.len();
        self.scene_references.retain(|image| image.id != id);
        self.scene_references.len() != before
    }

    pub fn push_scene_item(&mut self, item: SceneItem) {
        self.scene_items.push(item);
    }

    pub fn remove_scene_item(&mut self, id: &str) -> bool {
        let before = self.scene_items.len();
        self.scene_items.retain(|item| item.id != id);
        self.scene_items.len() != before
    }

    pub fn set_scene_items(&mut self, items: Vec<SceneItem>) {
        self.scene_items = items;
    }

    pub fn set_item_action(&mut self, id: &str, action: SceneAction) -> bool {
        for item in &mut self.scene_items {
            if item.id == id {
                item.action = action;
                return true;
            }
        }
        false
    }

    pub fn set_narrative(&mut self, narrative: impl Into<String>) {
        self.narrative = narrative.into();
    }

    /// The configuration is replaced wholesale; there is no field-level
    /// mutation surface.
    pub fn replace_config(&mut self, config: GenerationConfig) {
        self.config = config;
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Generating | SessionStatus::Upscaling
        )
    }

    pub fn can_submit(&self) -> bool {
        !self.is_busy() && !self.subject_references.is_empty()
    }

    /// Transition into the busy state for one request. Submission is gated
    /// here: re-entry while busy, composing without a subject reference, or
    /// enhancing without a prior result are all rejected.
    pub fn begin(&mut self, mode: InstructionMode) -> Result<()> {
        if self.is_busy() {
            bail!("a generation request is already in flight");
        }
        match mode {
            InstructionMode::Compose => {
                if self.subject_references.is_empty() {
                    bail!("{MISSING_SUBJECT_MESSAGE}");
                }
                self.status = SessionStatus::Generating;
            }
            InstructionMode::Enhance => {
                if self.result.is_none() {
                    bail!("no prior result to enhance");
                }
                self.status = SessionStatus::Upscaling;
            }
        }
        self.last_error = None;
        Ok(())
    }

    pub fn complete(&mut self, result: GenerationResult) {
        self.result = Some(result);
        self.status = SessionStatus::Success;
        self.last_error = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.status = SessionStatus::Error;
    }

    pub fn require_key(&mut self) {
        self.status = SessionStatus::NeedsKey;
    }

    /// Replace the subject references with the last result and return to
    /// idle, so the generated image can seed the next composition.
    pub fn adopt_result_as_reference(&mut self) -> Result<()> {
        let Some(result) = self.result.take() else {
            bail!("no result to adopt as a reference");
        };
        let reference = ReferenceImage::new(result.image.data, result.image.mime_type)?;
        self.subject_references = vec![reference];
        self.status = SessionStatus::Idle;
        Ok(())
    }

    /// Restore every default and discard images, items, result, and error.
    pub fn reset(&mut self) {
        *self = Session::default();
    }
}

fn default_scene_items() -> Vec<SceneItem> {
    vec![SceneItem {
        id: "1".to_string(),
        label: "Santa hat".to_string(),
        action: SceneAction::Add,
    }]
}
