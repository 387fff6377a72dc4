use serde::Serialize;

use crate::config::{GenerationConfig, SceneAction, SceneItem, SubjectAngle};

pub const CUTOUT_DIRECTIVE: &str = "STRICT SUBJECT CUTOUT: Ignore the environment description in the prompt. Place the subject(s) on a completely empty, pure white professional studio background. The focus is entirely on the subject without any surrounding elements.";

pub const NEUTRALIZE_DIRECTIVE: &str = "BACKGROUND NEUTRALIZATION: Simplify the environment significantly. Use a minimalist studio backdrop with very soft gradients or a clean, non-distracting architectural surface. The background should be purely supportive and not attract any attention away from the subject.";

pub const SCENERY_DIRECTIVE: &str = "CRITICAL: Use the additional environment reference images provided specifically to define the background scenery.";

pub const ENHANCE_BASE: &str =
    "ACT AS A HIGH-END PHOTO RETOUCHER AND UPSCALER. Use the provided image as a strict base.";

pub const STRICT_PRESERVATION: &str = "STRICT RULE: Do not change the composition, poses, or colors of the subjects. Only improve the quality, clarity, and realism.";

pub const ULTIMATE_GOAL: &str = "ULTIMATE GOAL: Produce a high-end RAW studio session photograph. Total photographic realism.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionMode {
    Compose,
    Enhance,
}

/// Everything the instruction rules may look at. Immutable for the duration
/// of one composition; the rules have no other inputs.
#[derive(Debug, Clone, Copy)]
pub struct InstructionContext<'a> {
    pub narrative: &'a str,
    pub items: &'a [SceneItem],
    pub has_scene_references: bool,
    pub config: &'a GenerationConfig,
    pub mode: InstructionMode,
}

/// One evaluated rule. `Override` discards everything accumulated so far;
/// only the cutout rule produces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Append(String),
    Override(String),
}

type Rule = fn(&InstructionContext) -> Option<Clause>;

/// The rule table. Order is the contract: clauses are concatenated exactly
/// in this order, with no reordering or deduplication.
const RULES: &[Rule] = &[
    base_narrative,
    scene_item_refinements,
    scenery_grounding,
    cutout_override,
    background_neutralization,
    subject_protocol,
    post_production,
    enhancement_tasks,
    strict_preservation,
    ultimate_goal,
];

/// Evaluate every rule against the context, in order.
pub fn clause_plan(ctx: &InstructionContext) -> Vec<Clause> {
    RULES.iter().filter_map(|rule| rule(ctx)).collect()
}

/// Join a clause plan into the final instruction string. Appended clauses
/// are separated by a blank line; an override clears the accumulator.
pub fn render(plan: &[Clause]) -> String {
    let mut out = String::new();
    for clause in plan {
        match clause {
            Clause::Append(text) => {
                if !out.is_empty() && !text.is_empty() {
                    out.push_str("\n\n");
                }
                out.push_str(text);
            }
            Clause::Override(text) => {
                out.clear();
                out.push_str(text);
            }
        }
    }
    out
}

pub fn compose(ctx: &InstructionContext) -> String {
    render(&clause_plan(ctx))
}

/// The verb mapping for a single scene item.
pub fn refinement_fragment(item: &SceneItem) -> String {
    match item.action {
        SceneAction::Add => format!("ADD: {}", item.label),
        SceneAction::Remove => format!("REMOVE/ERASE: {}", item.label),
        SceneAction::Modify => format!("MODIFY/EDIT: {}", item.label),
        SceneAction::GenerateSimilar => format!(
            "GENERATE A CREATIVE VARIATION OF: {} (Make it look similar but with an artistic twist)",
            item.label
        ),
        SceneAction::Preserve => format!("PRESERVE: {}", item.label),
    }
}

fn base_narrative(ctx: &InstructionContext) -> Option<Clause> {
    match ctx.mode {
        InstructionMode::Compose => Some(Clause::Append(ctx.narrative.to_string())),
        InstructionMode::Enhance => Some(Clause::Append(ENHANCE_BASE.to_string())),
    }
}

fn scene_item_refinements(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Compose || ctx.items.is_empty() {
        return None;
    }
    let refinements = ctx
        .items
        .iter()
        .map(refinement_fragment)
        .collect::<Vec<String>>()
        .join(", ");
    Some(Clause::Append(format!(
        "SPECIFIC REFINEMENTS TO APPLY: {refinements}. Ensure these changes look natural and professional."
    )))
}

fn scenery_grounding(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Compose
        || !ctx.has_scene_references
        || ctx.config.cutout_enabled()
        || ctx.config.neutralize_enabled()
    {
        return None;
    }
    Some(Clause::Append(SCENERY_DIRECTIVE.to_string()))
}

// Cutout replaces the whole accumulated instruction; with it active the
// final string is the cutout directive plus the closing goal and nothing
// else.
fn cutout_override(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Compose || !ctx.config.cutout_enabled() {
        return None;
    }
    Some(Clause::Override(CUTOUT_DIRECTIVE.to_string()))
}

fn background_neutralization(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Compose
        || ctx.config.cutout_enabled()
        || !ctx.config.neutralize_enabled()
    {
        return None;
    }
    Some(Clause::Append(NEUTRALIZE_DIRECTIVE.to_string()))
}

fn subject_protocol(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Compose || ctx.config.cutout_enabled() {
        return None;
    }
    let subject = ctx.config.subject.as_ref()?;
    let mut lines = vec!["ADVANCED STUDIO PROTOCOL:".to_string()];
    if subject.angle != SubjectAngle::Default {
        lines.push(format!(
            "- PERSPECTIVE: Compose using a {} angle.",
            subject.angle.as_str()
        ));
    }
    if subject.face_refinement {
        lines.push("- FACE FIDELITY: Maintain 1:1 facial geometry.".to_string());
    }
    if subject.skin_detail {
        lines.push("- TEXTURE: Hyper-detailed skin with natural pores.".to_string());
    }
    if subject.lighting_match {
        lines.push(
            "- LIGHTING: Subjects must be lit by the environment's global illumination."
                .to_string(),
        );
    }
    if subject.background_fidelity && !ctx.config.cutout_enabled() {
        lines.push(
            "- BACKGROUND QUALITY: Sharp, professional architectural and natural rendering."
                .to_string(),
        );
    }
    if subject.session_integrity {
        lines.push("- SESSION INTEGRITY: No morphing between subject and background layers.".to_string());
    }
    Some(Clause::Append(lines.join("\n")))
}

fn post_production(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Compose || ctx.config.cutout_enabled() {
        return None;
    }
    let retouch = ctx.config.retouch.as_ref()?;
    let mut lines = vec![
        "POST-PRODUCTION LAB:".to_string(),
        format!("- COLOR GRADE: Apply \"{}\" aesthetic.", retouch.grade.as_str()),
        format!(
            "- RETOUCHING: Apply \"{}\" high-grade polishing.",
            retouch.intensity.as_str()
        ),
    ];
    if retouch.background_harmonization && !ctx.config.cutout_enabled() {
        lines.push(
            "- BACKGROUND ADJUSTMENT: Harmonize subjects with the background's color space and shadow tint."
                .to_string(),
        );
    }
    Some(Clause::Append(lines.join("\n")))
}

fn enhancement_tasks(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Enhance {
        return None;
    }
    let mut lines = vec!["TASKS:".to_string()];
    if let Some(enhancement) = ctx.config.enhancement.as_ref() {
        if enhancement.upscale {
            lines.push(
                "- INCREASE RESOLUTION: Re-render this scene at the highest possible pixel density (4K), adding micro-details that were missing in lower resolutions."
                    .to_string(),
            );
        }
        if enhancement.remove_artifacts {
            lines.push(
                "- ARTIFACT REMOVAL: Detect and erase any AI-generated noise, blurry edges, or unnatural warping. Clean up the geometry of the subjects and background."
                    .to_string(),
            );
        }
        if enhancement.hyperrealism {
            lines.push(
                "- HYPERREALISM: Enhance the surface textures. Make eyes look liquid and reflective, skin show fine pores, and fabrics show individual threads. Ensure the lighting is physically accurate."
                    .to_string(),
            );
        }
    }
    Some(Clause::Append(lines.join("\n")))
}

fn strict_preservation(ctx: &InstructionContext) -> Option<Clause> {
    if ctx.mode != InstructionMode::Enhance {
        return None;
    }
    Some(Clause::Append(STRICT_PRESERVATION.to_string()))
}

fn ultimate_goal(_ctx: &InstructionContext) -> Option<Clause> {
    Some(Clause::Append(ULTIMATE_GOAL.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackgroundConfig, EnhancementConfig, GenerationConfig, RetouchConfig, SceneAction,
        SceneItem, SubjectAngle,
    };

    fn item(label: &str, action: SceneAction) -> SceneItem {
        SceneItem::new(label, action).unwrap()
    }

    fn compose_ctx<'a>(
        narrative: &'a str,
        items: &'a [SceneItem],
        has_scene_references: bool,
        config: &'a GenerationConfig,
    ) -> InstructionContext<'a> {
        InstructionContext {
            narrative,
            items,
            has_scene_references,
            config,
            mode: InstructionMode::Compose,
        }
    }

    fn cutout_config() -> GenerationConfig {
        let mut config = GenerationConfig::session_defaults();
        let mut bg = BackgroundConfig::default();
        bg.toggle_cutout();
        config.background = Some(bg);
        config
    }

    fn neutralize_config() -> GenerationConfig {
        let mut config = GenerationConfig::session_defaults();
        let mut bg = BackgroundConfig::default();
        bg.toggle_neutralize();
        config.background = Some(bg);
        config
    }

    #[test]
    fn one_refinement_fragment_per_item_with_matching_verbs() {
        let items = vec![
            item("hat", SceneAction::Add),
            item("lamp", SceneAction::Remove),
            item("dress", SceneAction::Modify),
            item("vase", SceneAction::GenerateSimilar),
            item("pose", SceneAction::Preserve),
        ];
        let fragments: Vec<String> = items.iter().map(refinement_fragment).collect();
        assert_eq!(fragments.len(), items.len());
        assert_eq!(fragments[0], "ADD: hat");
        assert_eq!(fragments[1], "REMOVE/ERASE: lamp");
        assert_eq!(fragments[2], "MODIFY/EDIT: dress");
        assert_eq!(
            fragments[3],
            "GENERATE A CREATIVE VARIATION OF: vase (Make it look similar but with an artistic twist)"
        );
        assert_eq!(fragments[4], "PRESERVE: pose");

        let config = GenerationConfig::session_defaults();
        let instruction = compose(&compose_ctx("scene", &items, false, &config));
        assert!(instruction.contains(
            "SPECIFIC REFINEMENTS TO APPLY: ADD: hat, REMOVE/ERASE: lamp, MODIFY/EDIT: dress, \
             GENERATE A CREATIVE VARIATION OF: vase (Make it look similar but with an artistic twist), \
             PRESERVE: pose. Ensure these changes look natural and professional."
        ));
    }

    #[test]
    fn item_order_is_preserved_verbatim() {
        let items = vec![
            item("second", SceneAction::Add),
            item("first", SceneAction::Add),
        ];
        let config = GenerationConfig::session_defaults();
        let instruction = compose(&compose_ctx("", &items, false, &config));
        let second_at = instruction.find("ADD: second").unwrap();
        let first_at = instruction.find("ADD: first").unwrap();
        assert!(second_at < first_at);
    }

    #[test]
    fn no_refinement_clause_without_items() {
        let config = GenerationConfig::session_defaults();
        let instruction = compose(&compose_ctx("scene", &[], false, &config));
        assert!(!instruction.contains("SPECIFIC REFINEMENTS TO APPLY"));
    }

    #[test]
    fn cutout_discards_everything_but_the_goal() {
        let items = vec![item("hat", SceneAction::Add)];
        let config = cutout_config();
        let instruction = compose(&compose_ctx("a long narrative", &items, true, &config));
        assert_eq!(instruction, format!("{CUTOUT_DIRECTIVE}\n\n{ULTIMATE_GOAL}"));
    }

    #[test]
    fn cutout_plan_contains_a_single_override() {
        let config = cutout_config();
        let plan = clause_plan(&compose_ctx("narrative", &[], false, &config));
        let overrides = plan
            .iter()
            .filter(|clause| matches!(clause, Clause::Override(_)))
            .count();
        assert_eq!(overrides, 1);
    }

    #[test]
    fn neutralize_appends_instead_of_replacing() {
        let config = neutralize_config();
        let instruction = compose(&compose_ctx("my narrative", &[], false, &config));
        assert!(instruction.starts_with("my narrative"));
        assert!(instruction.contains(NEUTRALIZE_DIRECTIVE));
        assert!(instruction.contains("ADVANCED STUDIO PROTOCOL:"));
        assert!(instruction.ends_with(ULTIMATE_GOAL));
    }

    #[test]
    fn scenery_grounding_requires_scene_references_and_no_background_mode() {
        let config = GenerationConfig::session_defaults();
        let with_refs = compose(&compose_ctx("n", &[], true, &config));
        assert!(with_refs.contains(SCENERY_DIRECTIVE));

        let without_refs = compose(&compose_ctx("n", &[], false, &config));
        assert!(!without_refs.contains(SCENERY_DIRECTIVE));

        let neutralized = compose(&compose_ctx("n", &[], true, &neutralize_config()));
        assert!(!neutralized.contains(SCENERY_DIRECTIVE));
    }

    #[test]
    fn angle_clause_only_when_not_default() {
        let mut config = GenerationConfig::session_defaults();
        let instruction = compose(&compose_ctx("n", &[], false, &config));
        assert!(!instruction.contains("- PERSPECTIVE:"));

        let mut subject = config.subject.unwrap();
        subject.angle = SubjectAngle::LowAngle;
        config.subject = Some(subject);
        let instruction = compose(&compose_ctx("n", &[], false, &config));
        assert!(instruction.contains("- PERSPECTIVE: Compose using a Low Angle angle."));
    }

    #[test]
    fn worked_example_from_default_session() {
        let items = vec![item("Santa hat", SceneAction::Add)];
        let config = GenerationConfig::session_defaults();
        let instruction = compose(&compose_ctx("X", &items, false, &config));

        assert!(instruction.starts_with('X'));
        assert!(instruction.contains(
            "SPECIFIC REFINEMENTS TO APPLY: ADD: Santa hat. Ensure these changes look natural and professional."
        ));
        assert!(instruction.contains("- FACE FIDELITY: Maintain 1:1 facial geometry."));
        assert!(instruction.contains("- TEXTURE: Hyper-detailed skin with natural pores."));
        assert!(instruction
            .contains("- LIGHTING: Subjects must be lit by the environment's global illumination."));
        assert!(instruction.contains(
            "- BACKGROUND QUALITY: Sharp, professional architectural and natural rendering."
        ));
        assert!(instruction
            .contains("- SESSION INTEGRITY: No morphing between subject and background layers."));
        assert!(instruction.contains("- COLOR GRADE: Apply \"Natural\" aesthetic."));
        assert!(instruction.contains("- RETOUCHING: Apply \"Medium\" high-grade polishing."));
        assert!(instruction.contains(
            "- BACKGROUND ADJUSTMENT: Harmonize subjects with the background's color space and shadow tint."
        ));
        assert!(instruction.ends_with(ULTIMATE_GOAL));
    }

    #[test]
    fn enhance_mode_ignores_narrative_and_items() {
        let items = vec![item("hat", SceneAction::Add)];
        let config = GenerationConfig::session_defaults();
        let ctx = InstructionContext {
            narrative: "should not appear",
            items: &items,
            has_scene_references: true,
            config: &config,
            mode: InstructionMode::Enhance,
        };
        let instruction = compose(&ctx);
        assert!(instruction.starts_with(ENHANCE_BASE));
        assert!(!instruction.contains("should not appear"));
        assert!(!instruction.contains("SPECIFIC REFINEMENTS TO APPLY"));
        assert!(!instruction.contains(SCENERY_DIRECTIVE));
        assert!(instruction.contains("- INCREASE RESOLUTION:"));
        assert!(instruction.contains("- ARTIFACT REMOVAL:"));
        assert!(instruction.contains("- HYPERREALISM:"));
        assert!(instruction.contains(STRICT_PRESERVATION));
        assert!(instruction.ends_with(ULTIMATE_GOAL));
    }

    #[test]
    fn enhancement_tasks_are_independently_gated() {
        let mut config = GenerationConfig::session_defaults();
        config.enhancement = Some(EnhancementConfig {
            upscale: true,
            remove_artifacts: false,
            hyperrealism: false,
        });
        let ctx = InstructionContext {
            narrative: "",
            items: &[],
            has_scene_references: false,
            config: &config,
            mode: InstructionMode::Enhance,
        };
        let instruction = compose(&ctx);
        assert!(instruction.contains("- INCREASE RESOLUTION:"));
        assert!(!instruction.contains("- ARTIFACT REMOVAL:"));
        assert!(!instruction.contains("- HYPERREALISM:"));
        assert!(instruction.contains(STRICT_PRESERVATION));
    }

    #[test]
    fn harmonization_clause_follows_the_retouch_toggle() {
        let mut config = GenerationConfig::session_defaults();
        let mut retouch = RetouchConfig::default();
        retouch.background_harmonization = false;
        config.retouch = Some(retouch);
        let instruction = compose(&compose_ctx("n", &[], false, &config));
        assert!(!instruction.contains("- BACKGROUND ADJUSTMENT:"));
        assert!(instruction.contains("- COLOR GRADE: Apply \"Natural\" aesthetic."));
    }

    #[test]
    fn goal_clause_closes_every_mode() {
        let config = GenerationConfig::session_defaults();
        for mode in [InstructionMode::Compose, InstructionMode::Enhance] {
            let ctx = InstructionContext {
                narrative: "n",
                items: &[],
                has_scene_references: false,
                config: &config,
                mode,
            };
            assert!(compose(&ctx).ends_with(ULTIMATE_GOAL));
        }
        assert!(compose(&compose_ctx("n", &[], false, &cutout_config())).ends_with(ULTIMATE_GOAL));
    }
}
