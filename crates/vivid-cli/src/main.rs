use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use vivid_contracts::config::{
    AspectRatio, BackgroundConfig, ColorGrade, EnhancementConfig, GenerationConfig, ImageSize,
    ReferenceImage, RetouchConfig, RetouchIntensity, SceneAction, SceneItem, SubjectAngle,
    SubjectConfig,
};
use vivid_contracts::events::EventWriter;
use vivid_contracts::instructions::{compose, InstructionContext, InstructionMode};
use vivid_contracts::session::{GenerationResult, ResultImage, Session};
use vivid_engine::{
    extension_for_mime, mime_for_path, short_id, ComposeInputs, CredentialGate, GenerateError,
    StudioEngine,
};

#[derive(Debug, Parser)]
#[command(name = "vivid-rs", version, about = "Cinematic composite photo studio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compose a cinematic image from subject and scene references.
    Generate(GenerateArgs),
    /// Re-render a prior result at 4K with quality improvements.
    Enhance(EnhanceArgs),
    /// Print the composed instruction without dispatching anything.
    Compose(ComposeArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Subject reference image (repeatable).
    #[arg(long = "subject", required = true)]
    subjects: Vec<PathBuf>,
    /// Scene/background reference image (repeatable).
    #[arg(long = "scene")]
    scenes: Vec<PathBuf>,
    /// Scene narrative; defaults to the stock garden-walkway narrative.
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,
    /// Scene item as `action:label`, e.g. `add:Santa hat` (repeatable).
    /// Without the flag the default `add:Santa hat` item applies.
    #[arg(long = "item")]
    items: Vec<String>,
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Use the deterministic offline transport instead of the live endpoint.
    #[arg(long)]
    offline: bool,
}

#[derive(Debug, Parser)]
struct EnhanceArgs {
    /// The prior result image to enhance.
    #[arg(long)]
    base: PathBuf,
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    offline: bool,
}

#[derive(Debug, Parser)]
struct ComposeArgs {
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,
    #[arg(long = "item")]
    items: Vec<String>,
    /// Scene reference paths only count toward the scenery clause here; the
    /// files are not read.
    #[arg(long = "scene")]
    scenes: Vec<PathBuf>,
    #[command(flatten)]
    config: ConfigArgs,
    /// Preview the enhancement-pass instruction instead.
    #[arg(long)]
    enhance: bool,
}

#[derive(Debug, Parser)]
struct ConfigArgs {
    #[arg(long, default_value = "3:4")]
    aspect_ratio: String,
    #[arg(long, default_value = "1K")]
    image_size: String,
    #[arg(long, default_value = "Default")]
    angle: String,
    #[arg(long)]
    no_face_refinement: bool,
    #[arg(long)]
    no_skin_detail: bool,
    #[arg(long)]
    no_lighting_match: bool,
    #[arg(long)]
    no_background_fidelity: bool,
    #[arg(long)]
    no_session_integrity: bool,
    /// Studio cutout: pure white background, discards the narrative.
    #[arg(long, conflicts_with = "neutralize")]
    cutout: bool,
    /// Simplified minimalist backdrop, keeps the narrative.
    #[arg(long)]
    neutralize: bool,
    #[arg(long, default_value = "Natural")]
    grade: String,
    #[arg(long, default_value = "Medium")]
    intensity: String,
    #[arg(long)]
    no_harmonization: bool,
    #[arg(long)]
    no_eye_enhancement: bool,
    #[arg(long)]
    no_upscale: bool,
    #[arg(long)]
    no_artifact_removal: bool,
    #[arg(long)]
    no_hyperrealism: bool,
}

impl ConfigArgs {
    fn to_config(&self) -> Result<GenerationConfig> {
        let aspect_ratio = AspectRatio::parse(&self.aspect_ratio)
            .with_context(|| format!("unknown aspect ratio '{}'", self.aspect_ratio))?;
        let image_size = ImageSize::parse(&self.image_size)
            .with_context(|| format!("unknown image size '{}'", self.image_size))?;
        let angle = SubjectAngle::parse(&self.angle)
            .with_context(|| format!("unknown subject angle '{}'", self.angle))?;
        let grade = ColorGrade::parse(&self.grade)
            .with_context(|| format!("unknown color grade '{}'", self.grade))?;
        let intensity = RetouchIntensity::parse(&self.intensity)
            .with_context(|| format!("unknown retouch intensity '{}'", self.intensity))?;

        let mut background = BackgroundConfig::default();
        if self.cutout {
            background.toggle_cutout();
        }
        if self.neutralize {
            background.toggle_neutralize();
        }

        Ok(GenerationConfig {
            aspect_ratio,
            image_size,
            subject: Some(SubjectConfig {
                angle,
                face_refinement: !self.no_face_refinement,
                skin_detail: !self.no_skin_detail,
                lighting_match: !self.no_lighting_match,
                background_fidelity: !self.no_background_fidelity,
                session_integrity: !self.no_session_integrity,
            }),
            background: Some(background),
            retouch: Some(RetouchConfig {
                grade,
                intensity,
                background_harmonization: !self.no_harmonization,
                eye_enhancement: !self.no_eye_enhancement,
            }),
            enhancement: Some(EnhancementConfig {
                upscale: !self.no_upscale,
                remove_artifacts: !self.no_artifact_removal,
                hyperrealism: !self.no_hyperrealism,
            }),
        })
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("vivid-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Enhance(args) => run_enhance(args),
        Command::Compose(args) => run_compose(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    fs::create_dir_all(&args.out)?;
    let events = event_writer(&args.out, args.events.as_deref());
    events.emit(
        "session_started",
        map_object(json!({
            "command": "generate",
            "out_dir": args.out.to_string_lossy(),
            "offline": args.offline,
        })),
    )?;

    let mut session = Session::new();
    for path in &args.subjects {
        session.add_subject_reference(load_reference(path)?);
    }
    for path in &args.scenes {
        session.add_scene_reference(load_reference(path)?);
    }
    if !args.items.is_empty() {
        let items = args
            .items
            .iter()
            .map(|raw| parse_item(raw))
            .collect::<Result<Vec<SceneItem>>>()?;
        session.set_scene_items(items);
    }
    if let Some(narrative) = resolve_prompt(args.prompt.as_deref(), args.prompt_file.as_deref())? {
        session.set_narrative(narrative);
    }
    session.replace_config(args.config.to_config()?);

    session.begin(InstructionMode::Compose)?;
    let subjects = session.subject_references().to_vec();
    let scenes = session.scene_references().to_vec();
    let items = session.scene_items().to_vec();
    let narrative = session.narrative().to_string();
    let config = session.config().clone();
    let inputs = ComposeInputs {
        subject_references: &subjects,
        scene_references: &scenes,
        narrative: &narrative,
        items: &items,
    };

    let engine = build_engine(args.offline, events.clone());
    let gate = StdinKeyGate;
    let outcome = dispatch_with_key_retry(args.offline, &gate, &events, &mut session, || {
        engine.generate(&inputs, &config)
    });
    finish(outcome, &mut session, &events, &args.out)
}

fn run_enhance(args: EnhanceArgs) -> Result<i32> {
    fs::create_dir_all(&args.out)?;
    let events = event_writer(&args.out, args.events.as_deref());
    events.emit(
        "session_started",
        map_object(json!({
            "command": "enhance",
            "out_dir": args.out.to_string_lossy(),
            "offline": args.offline,
        })),
    )?;

    let config = args.config.to_config()?;
    let base = load_reference(&args.base)?;

    // Seed the session with the prior result so the upscaling transition is
    // subject to the same gating as the interactive flow.
    let mut session = Session::new();
    session.add_subject_reference(base.clone());
    session.begin(InstructionMode::Compose)?;
    session.complete(GenerationResult {
        image: ResultImage {
            data: base.data.clone(),
            mime_type: base.mime_type.clone(),
        },
        advisory_text: None,
        config: config.clone(),
    });
    session.begin(InstructionMode::Enhance)?;

    let engine = build_engine(args.offline, events.clone());
    let gate = StdinKeyGate;
    let outcome = dispatch_with_key_retry(args.offline, &gate, &events, &mut session, || {
        engine.enhance(&base, &config)
    });
    finish(outcome, &mut session, &events, &args.out)
}

fn run_compose(args: ComposeArgs) -> Result<i32> {
    let config = args.config.to_config()?;
    let items = if args.items.is_empty() {
        Session::new().scene_items().to_vec()
    } else {
        args.items
            .iter()
            .map(|raw| parse_item(raw))
            .collect::<Result<Vec<SceneItem>>>()?
    };
    let narrative = resolve_prompt(args.prompt.as_deref(), args.prompt_file.as_deref())?
        .unwrap_or_else(|| Session::new().narrative().to_string());

    let ctx = InstructionContext {
        narrative: &narrative,
        items: &items,
        has_scene_references: !args.scenes.is_empty(),
        config: &config,
        mode: if args.enhance {
            InstructionMode::Enhance
        } else {
            InstructionMode::Compose
        },
    };
    println!("{}", compose(&ctx));
    Ok(0)
}

fn finish(
    outcome: std::result::Result<GenerationResult, GenerateError>,
    session: &mut Session,
    events: &EventWriter,
    out_dir: &Path,
) -> Result<i32> {
    match outcome {
        Ok(result) => {
            let artifact = write_artifact(out_dir, &result)?;
            events.emit(
                "artifact_written",
                map_object(json!({
                    "path": artifact.to_string_lossy(),
                    "mime_type": result.image.mime_type.as_str(),
                    "bytes": result.image.data.len(),
                })),
            )?;
            if let Some(text) = result.advisory_text.as_deref() {
                println!("note: {text}");
            }
            println!("artifact: {}", artifact.display());
            session.complete(result);
            Ok(0)
        }
        Err(err) => {
            if err.is_recoverable() {
                session.require_key();
            } else {
                session.fail(err.to_string());
            }
            Err(err.into())
        }
    }
}

/// Pre-check the credential, run the attempt, and on an authorization
/// failure prompt for a key once and retry the same request.
fn dispatch_with_key_retry<F>(
    offline: bool,
    gate: &dyn CredentialGate,
    events: &EventWriter,
    session: &mut Session,
    attempt: F,
) -> std::result::Result<GenerationResult, GenerateError>
where
    F: Fn() -> std::result::Result<GenerationResult, GenerateError>,
{
    if !offline {
        // A failing probe is not fatal; only an explicit "no key" answer
        // pauses for selection.
        if let Ok(false) = gate.has_selected_key() {
            session.require_key();
            let _ = events.emit(
                "credential_required",
                map_object(json!({ "stage": "precheck" })),
            );
            if let Err(err) = gate.open_select_key() {
                return Err(GenerateError::Transport(format!("{err:#}")));
            }
        }
    }

    match attempt() {
        Err(GenerateError::AuthorizationRequired) if !offline => {
            session.require_key();
            let _ = events.emit(
                "credential_required",
                map_object(json!({ "stage": "retry" })),
            );
            gate.open_select_key()
                .map_err(|err| GenerateError::Transport(format!("{err:#}")))?;
            attempt()
        }
        other => other,
    }
}

fn build_engine(offline: bool, events: EventWriter) -> StudioEngine {
    if offline {
        StudioEngine::offline(events)
    } else {
        StudioEngine::new(events)
    }
}

fn event_writer(out_dir: &Path, events_path: Option<&Path>) -> EventWriter {
    let path = events_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out_dir.join("events.jsonl"));
    let session_id = out_dir
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("session")
        .to_string();
    EventWriter::new(path, session_id)
}

fn load_reference(path: &Path) -> Result<ReferenceImage> {
    let data = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    ReferenceImage::with_id(
        path.to_string_lossy().to_string(),
        data,
        mime_for_path(path),
    )
}

fn resolve_prompt(prompt: Option<&str>, prompt_file: Option<&Path>) -> Result<Option<String>> {
    if let Some(prompt) = prompt {
        return Ok(Some(prompt.to_string()));
    }
    if let Some(path) = prompt_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        return Ok(Some(text.trim_end().to_string()));
    }
    Ok(None)
}

/// `action:label` with a known action verb; anything else is an `add` item
/// with the whole argument as its label.
fn parse_item(raw: &str) -> Result<SceneItem> {
    if let Some((action, label)) = raw.split_once(':') {
        if let Some(action) = SceneAction::parse(action) {
            return SceneItem::new(label.trim(), action);
        }
    }
    SceneItem::new(raw.trim(), SceneAction::Add)
}

fn write_artifact(out_dir: &Path, result: &GenerationResult) -> Result<PathBuf> {
    let ext = extension_for_mime(&result.image.mime_type);
    let path = out_dir.join(format!(
        "artifact-{}-{}.{}",
        timestamp_millis(),
        short_id(&result.image.data),
        ext
    ));
    fs::write(&path, &result.image.data)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Key selection for a terminal session: keys live in the environment, and
/// selection reads one from stdin.
struct StdinKeyGate;

impl CredentialGate for StdinKeyGate {
    fn has_selected_key(&self) -> anyhow::Result<bool> {
        let present = ["GEMINI_API_KEY", "GOOGLE_API_KEY"].iter().any(|key| {
            env::var(key)
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false)
        });
        Ok(present)
    }

    fn open_select_key(&self) -> anyhow::Result<()> {
        eprint!("A key with access to the requested model tier is required. Paste one: ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        let key = line.trim();
        if key.is_empty() {
            bail!("no key provided");
        }
        env::set_var("GEMINI_API_KEY", key);
        Ok(())
    }
}
