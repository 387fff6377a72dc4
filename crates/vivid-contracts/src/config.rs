use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1:1" => Some(AspectRatio::Square),
            "3:4" => Some(AspectRatio::Portrait),
            "4:3" => Some(AspectRatio::Landscape),
            "9:16" => Some(AspectRatio::Tall),
            "16:9" => Some(AspectRatio::Wide),
            _ => None,
        }
    }

    pub fn dims(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Portrait => (3, 4),
            AspectRatio::Landscape => (4, 3),
            AspectRatio::Tall => (9, 16),
            AspectRatio::Wide => (16, 9),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "1K" => Some(ImageSize::OneK),
            "2K" => Some(ImageSize::TwoK),
            "4K" => Some(ImageSize::FourK),
            _ => None,
        }
    }

    /// Longest edge in pixels for this tier.
    pub fn long_edge(&self) -> u32 {
        match self {
            ImageSize::OneK => 1024,
            ImageSize::TwoK => 2048,
            ImageSize::FourK => 4096,
        }
    }

    pub fn is_high_tier(&self) -> bool {
        matches!(self, ImageSize::TwoK | ImageSize::FourK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SubjectAngle {
    #[default]
    Default,
    Portrait,
    #[serde(rename = "Low Angle")]
    LowAngle,
    #[serde(rename = "Side Profile")]
    SideProfile,
    #[serde(rename = "Three-Quarter")]
    ThreeQuarter,
}

impl SubjectAngle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectAngle::Default => "Default",
            SubjectAngle::Portrait => "Portrait",
            SubjectAngle::LowAngle => "Low Angle",
            SubjectAngle::SideProfile => "Side Profile",
            SubjectAngle::ThreeQuarter => "Three-Quarter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Default" => Some(SubjectAngle::Default),
            "Portrait" => Some(SubjectAngle::Portrait),
            "Low Angle" => Some(SubjectAngle::LowAngle),
            "Side Profile" => Some(SubjectAngle::SideProfile),
            "Three-Quarter" => Some(SubjectAngle::ThreeQuarter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ColorGrade {
    #[default]
    Natural,
    #[serde(rename = "Cinematic Teal & Orange")]
    CinematicTealOrange,
    #[serde(rename = "Vintage Film")]
    VintageFilm,
    #[serde(rename = "Noir B&W")]
    NoirBw,
    #[serde(rename = "Warm Golden Hour")]
    WarmGoldenHour,
    Cyberpunk,
    #[serde(rename = "Muted Professional")]
    MutedProfessional,
}

impl ColorGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorGrade::Natural => "Natural",
            ColorGrade::CinematicTealOrange => "Cinematic Teal & Orange",
            ColorGrade::VintageFilm => "Vintage Film",
            ColorGrade::NoirBw => "Noir B&W",
            ColorGrade::WarmGoldenHour => "Warm Golden Hour",
            ColorGrade::Cyberpunk => "Cyberpunk",
            ColorGrade::MutedProfessional => "Muted Professional",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Natural" => Some(ColorGrade::Natural),
            "Cinematic Teal & Orange" => Some(ColorGrade::CinematicTealOrange),
            "Vintage Film" => Some(ColorGrade::VintageFilm),
            "Noir B&W" => Some(ColorGrade::NoirBw),
            "Warm Golden Hour" => Some(ColorGrade::WarmGoldenHour),
            "Cyberpunk" => Some(ColorGrade::Cyberpunk),
            "Muted Professional" => Some(ColorGrade::MutedProfessional),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RetouchIntensity {
    Soft,
    #[default]
    Medium,
    High,
}

impl RetouchIntensity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetouchIntensity::Soft => "Soft",
            RetouchIntensity::Medium => "Medium",
            RetouchIntensity::High => "High",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Soft" => Some(RetouchIntensity::Soft),
            "Medium" => Some(RetouchIntensity::Medium),
            "High" => Some(RetouchIntensity::High),
            _ => None,
        }
    }
}

/// Per-subject rendering toggles. The session defaults enable everything
/// except an explicit camera angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfig {
    pub angle: SubjectAngle,
    pub face_refinement: bool,
    pub skin_detail: bool,
    pub lighting_match: bool,
    pub background_fidelity: bool,
    pub session_integrity: bool,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            angle: SubjectAngle::Default,
            face_refinement: true,
            skin_detail: true,
            lighting_match: true,
            background_fidelity: true,
            session_integrity: true,
        }
    }
}

/// Background extraction mode. Cutout and neutralize are mutually exclusive:
/// the only mutators are the toggles below, and each clears the other flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct BackgroundConfig {
    cutout: bool,
    neutralize: bool,
}

impl BackgroundConfig {
    pub fn cutout(&self) -> bool {
        self.cutout
    }

    pub fn neutralize(&self) -> bool {
        self.neutralize
    }

    pub fn toggle_cutout(&mut self) {
        self.cutout = !self.cutout;
        self.neutralize = false;
    }

    pub fn toggle_neutralize(&mut self) {
        self.neutralize = !self.neutralize;
        self.cutout = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetouchConfig {
    pub grade: ColorGrade,
    pub intensity: RetouchIntensity,
    pub background_harmonization: bool,
    // Carried in the model but deliberately absent from the instruction
    // rules, matching the product behavior.
    pub eye_enhancement: bool,
}

impl Default for RetouchConfig {
    fn default() -> Self {
        Self {
            grade: ColorGrade::Natural,
            intensity: RetouchIntensity::Medium,
            background_harmonization: true,
            eye_enhancement: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementConfig {
    pub upscale: bool,
    pub remove_artifacts: bool,
    pub hyperrealism: bool,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            upscale: true,
            remove_artifacts: true,
            hyperrealism: true,
        }
    }
}

/// Aggregate generation configuration. Treated as an immutable value:
/// callers replace the whole struct on any change, and reset is
/// `GenerationConfig::default()`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct GenerationConfig {
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
    pub subject: Option<SubjectConfig>,
    pub background: Option<BackgroundConfig>,
    pub retouch: Option<RetouchConfig>,
    pub enhancement: Option<EnhancementConfig>,
}

impl GenerationConfig {
    /// The configuration a fresh session starts from: every settings group
    /// present with its defaults.
    pub fn session_defaults() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            image_size: ImageSize::default(),
            subject: Some(SubjectConfig::default()),
            background: Some(BackgroundConfig::default()),
            retouch: Some(RetouchConfig::default()),
            enhancement: Some(EnhancementConfig::default()),
        }
    }

    pub fn cutout_enabled(&self) -> bool {
        self.background.map(|bg| bg.cutout()).unwrap_or(false)
    }

    pub fn neutralize_enabled(&self) -> bool {
        self.background.map(|bg| bg.neutralize()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneAction {
    Preserve,
    Add,
    Remove,
    Modify,
    GenerateSimilar,
}

impl SceneAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneAction::Preserve => "preserve",
            SceneAction::Add => "add",
            SceneAction::Remove => "remove",
            SceneAction::Modify => "modify",
            SceneAction::GenerateSimilar => "generate_similar",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "preserve" => Some(SceneAction::Preserve),
            "add" => Some(SceneAction::Add),
            "remove" => Some(SceneAction::Remove),
            "modify" => Some(SceneAction::Modify),
            "generate_similar" => Some(SceneAction::GenerateSimilar),
            _ => None,
        }
    }
}

/// A discrete, independently-actioned edit request applied atop the
/// narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneItem {
    pub id: String,
    pub label: String,
    pub action: SceneAction,
}

impl SceneItem {
    pub fn new(label: impl Into<String>, action: SceneAction) -> Result<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            bail!("scene item label must not be empty");
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            label,
            action,
        })
    }
}

/// An uploaded reference image: raw pixel data plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub id: String,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Result<Self> {
        Self::with_id(Uuid::new_v4().to_string(), data, mime_type)
    }

    pub fn with_id(
        id: impl Into<String>,
        data: Vec<u8>,
        mime_type: impl Into<String>,
    ) -> Result<Self> {
        if data.is_empty() {
            bail!("reference image data must not be empty");
        }
        Ok(Self {
            id: id.into(),
            data,
            mime_type: mime_type.into(),
        })
    }
}
