//! Request composer and invoker for the Vivid studio. Packages reference
//! images and the composed instruction into a single multimodal
//! `generateContent` request, parses the response, and classifies failures.

use std::env;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use vivid_contracts::config::{AspectRatio, GenerationConfig, ImageSize, ReferenceImage, SceneItem};
use vivid_contracts::events::EventWriter;
use vivid_contracts::instructions::{compose, InstructionContext, InstructionMode};
use vivid_contracts::models::{ModelSelection, ModelSelector};
use vivid_contracts::session::{GenerationResult, ResultImage};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Substring the endpoint uses when the selected credential cannot see the
/// requested model.
pub const ENTITY_NOT_FOUND_MARKER: &str = "Requested entity was not found";

#[derive(Debug, Error)]
pub enum GenerateError {
    /// No subject reference supplied. Rejected before any request is made.
    #[error("Please upload at least one subject reference image.")]
    MissingInput,
    /// The selected credential lacks access to the requested model tier.
    /// Recoverable: select another key and retry the same request.
    #[error("the selected key lacks access to the requested model tier")]
    AuthorizationRequired,
    /// The endpoint answered without an inline image part. Terminal for this
    /// attempt.
    #[error("No image was generated.")]
    NoImageProduced,
    /// Any other transport or model failure, message passed through.
    #[error("{0}")]
    Transport(String),
}

impl GenerateError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::MissingInput => "missing_input",
            GenerateError::AuthorizationRequired => "authorization_required",
            GenerateError::NoImageProduced => "no_image_produced",
            GenerateError::Transport(_) => "transport",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, GenerateError::AuthorizationRequired)
    }
}

/// Boundary to the hosting environment's credential store. The engine treats
/// both calls as opaque.
pub trait CredentialGate {
    /// Has a usable credential been selected?
    fn has_selected_key(&self) -> anyhow::Result<bool>;
    /// Ask the environment to select one; returns once selection completed.
    fn open_select_key(&self) -> anyhow::Result<()>;
}

/// Gate backed by the process environment.
pub struct EnvCredentialGate;

impl CredentialGate for EnvCredentialGate {
    fn has_selected_key(&self) -> anyhow::Result<bool> {
        Ok(api_key_from_env().is_some())
    }

    fn open_select_key(&self) -> anyhow::Result<()> {
        anyhow::bail!("no key selection surface available; set GEMINI_API_KEY or GOOGLE_API_KEY")
    }
}

/// Inputs for one composition request. Subject references are sent first,
/// scene references after, exactly in this order.
#[derive(Debug, Clone, Copy)]
pub struct ComposeInputs<'a> {
    pub subject_references: &'a [ReferenceImage],
    pub scene_references: &'a [ReferenceImage],
    pub narrative: &'a str,
    pub items: &'a [SceneItem],
}

/// One dispatch of an assembled request; returns the raw response payload.
pub trait ImageTransport {
    fn name(&self) -> &str;
    fn dispatch(&self, model: &str, payload: &Value) -> Result<Value, GenerateError>;
}

/// Live transport against the generative-image endpoint.
pub struct StudioClient {
    api_base: String,
    http: HttpClient,
}

impl StudioClient {
    pub fn new() -> Self {
        let api_base = env::var("VIVID_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::with_api_base(api_base)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl Default for StudioClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransport for StudioClient {
    fn name(&self) -> &str {
        "live"
    }

    fn dispatch(&self, model: &str, payload: &Value) -> Result<Value, GenerateError> {
        let Some(api_key) = api_key_from_env() else {
            return Err(GenerateError::Transport(
                "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            ));
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .map_err(|err| GenerateError::Transport(format!("request failed ({endpoint}): {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| GenerateError::Transport(format!("response body read failed: {err}")))?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|err| {
            GenerateError::Transport(format!("endpoint returned invalid JSON payload: {err}"))
        })
    }
}

/// Map a failed response to the error taxonomy. The entity-not-found marker
/// means the credential cannot see the requested tier, not a generic fault.
pub fn classify_failure(code: u16, body: &str) -> GenerateError {
    if body.contains(ENTITY_NOT_FOUND_MARKER) {
        return GenerateError::AuthorizationRequired;
    }
    GenerateError::Transport(format!(
        "generation request failed ({code}): {}",
        truncate_text(body, 512)
    ))
}

/// Deterministic local transport: answers with a solid-colour PNG derived
/// from a hash of the instruction, so the full request/response path runs
/// with no network and no key.
pub struct OfflineTransport;

impl ImageTransport for OfflineTransport {
    fn name(&self) -> &str {
        "offline"
    }

    fn dispatch(&self, model: &str, payload: &Value) -> Result<Value, GenerateError> {
        let instruction = instruction_from_payload(payload).unwrap_or_default();
        let (aspect_ratio, image_size) = image_config_from_payload(payload);
        let (width, height) = swatch_dims(aspect_ratio, image_size);
        let png = render_swatch(width, height, &instruction)?;
        Ok(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": format!("Offline swatch rendered in place of {model}.") },
                        { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(png) } },
                    ]
                }
            }]
        }))
    }
}

/// Drives one invocation end to end: compose, package, dispatch, parse,
/// classify. One request per call; images are never split across requests.
pub struct StudioEngine {
    transport: Box<dyn ImageTransport>,
    selector: ModelSelector,
    events: EventWriter,
}

impl StudioEngine {
    pub fn new(events: EventWriter) -> Self {
        Self::with_transport(Box::new(StudioClient::new()), events)
    }

    pub fn offline(events: EventWriter) -> Self {
        Self::with_transport(Box::new(OfflineTransport), events)
    }

    pub fn with_transport(transport: Box<dyn ImageTransport>, events: EventWriter) -> Self {
        Self {
            transport,
            selector: ModelSelector::new(None),
            events,
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Compose a cinematic image from subject and scene references.
    pub fn generate(
        &self,
        inputs: &ComposeInputs,
        config: &GenerationConfig,
    ) -> Result<GenerationResult, GenerateError> {
        if inputs.subject_references.is_empty() {
            return Err(GenerateError::MissingInput);
        }
        let ctx = InstructionContext {
            narrative: inputs.narrative,
            items: inputs.items,
            has_scene_references: !inputs.scene_references.is_empty(),
            config,
            mode: InstructionMode::Compose,
        };
        let instruction = compose(&ctx);
        let images: Vec<&ReferenceImage> = inputs
            .subject_references
            .iter()
            .chain(inputs.scene_references.iter())
            .collect();
        let selection = self
            .selector
            .select(config.image_size, false)
            .map_err(GenerateError::Transport)?;
        self.invoke(&images, &instruction, &selection, config, InstructionMode::Compose)
    }

    /// Enhancement pass: exactly one input image (the prior result), always
    /// rendered at the top tier.
    pub fn enhance(
        &self,
        base: &ReferenceImage,
        config: &GenerationConfig,
    ) -> Result<GenerationResult, GenerateError> {
        let ctx = InstructionContext {
            narrative: "",
            items: &[],
            has_scene_references: false,
            config,
            mode: InstructionMode::Enhance,
        };
        let instruction = compose(&ctx);
        let selection = self
            .selector
            .select(config.image_size, true)
            .map_err(GenerateError::Transport)?;
        self.invoke(&[base], &instruction, &selection, config, InstructionMode::Enhance)
    }

    fn invoke(
        &self,
        images: &[&ReferenceImage],
        instruction: &str,
        selection: &ModelSelection,
        config: &GenerationConfig,
        mode: InstructionMode,
    ) -> Result<GenerationResult, GenerateError> {
        let payload = build_payload(
            images,
            instruction,
            config.aspect_ratio.as_str(),
            selection.effective_size.as_str(),
        );
        self.emit(
            "instruction_composed",
            json!({
                "mode": mode,
                "chars": instruction.chars().count(),
            }),
        );
        self.emit(
            "request_dispatched",
            json!({
                "model": selection.model.name.as_str(),
                "transport": self.transport.name(),
                "image_parts": images.len(),
                "aspect_ratio": config.aspect_ratio.as_str(),
                "image_size": selection.effective_size.as_str(),
                "tier_note": selection.reason.as_deref(),
            }),
        );

        let outcome = self
            .transport
            .dispatch(&selection.model.name, &payload)
            .and_then(|response| extract_result(&response));
        match outcome {
            Ok((image, advisory_text)) => {
                self.emit(
                    "generation_finished",
                    json!({
                        "model": selection.model.name.as_str(),
                        "mime_type": image.mime_type.as_str(),
                        "bytes": image.data.len(),
                        "advisory": advisory_text.is_some(),
                    }),
                );
                Ok(GenerationResult {
                    image,
                    advisory_text,
                    config: config.clone(),
                })
            }
            Err(err) => {
                self.emit(
                    "generation_failed",
                    json!({
                        "model": selection.model.name.as_str(),
                        "kind": err.kind(),
                        "message": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    // Event log writes are best-effort.
    fn emit(&self, event_type: &str, payload: Value) {
        let _ = self.events.emit(event_type, map_object(payload));
    }
}

/// Assemble the single multimodal request body: every image as an inline
/// part in list order, then one text part with the instruction.
pub fn build_payload(
    images: &[&ReferenceImage],
    instruction: &str,
    aspect_ratio: &str,
    image_size: &str,
) -> Value {
    let mut parts: Vec<Value> = images.iter().map(|image| inline_image_part(image)).collect();
    parts.push(json!({ "text": instruction }));
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "imageConfig": {
                "aspectRatio": aspect_ratio,
                "imageSize": image_size,
            }
        }
    })
}

fn inline_image_part(image: &ReferenceImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": BASE64.encode(&image.data),
        }
    })
}

/// Scan the first candidate's content parts in order. The last inline image
/// wins; text parts concatenate in order into the advisory text.
pub fn extract_result(
    response: &Value,
) -> Result<(ResultImage, Option<String>), GenerateError> {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut image: Option<ResultImage> = None;
    let mut advisory = String::new();
    for part in parts {
        if let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        {
            let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                GenerateError::Transport(format!("image payload base64 decode failed: {err}"))
            })?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            image = Some(ResultImage {
                data: bytes,
                mime_type,
            });
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            advisory.push_str(text);
        }
    }

    let Some(image) = image else {
        return Err(GenerateError::NoImageProduced);
    };
    let advisory_text = if advisory.is_empty() {
        None
    } else {
        Some(advisory)
    };
    Ok((image, advisory_text))
}

pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

/// Short stable id for artifact naming, from a hash of the seed bytes.
pub fn short_id(seed: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

fn api_key_from_env() -> Option<String> {
    non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn instruction_from_payload(payload: &Value) -> Option<String> {
    payload
        .get("contents")
        .and_then(Value::as_array)
        .and_then(|contents| contents.first())
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .and_then(|parts| {
            parts
                .iter()
                .rev()
                .find_map(|part| part.get("text").and_then(Value::as_str))
        })
        .map(str::to_string)
}

fn image_config_from_payload(payload: &Value) -> (AspectRatio, ImageSize) {
    let image_config = payload
        .get("generationConfig")
        .and_then(|config| config.get("imageConfig"));
    let aspect_ratio = image_config
        .and_then(|config| config.get("aspectRatio"))
        .and_then(Value::as_str)
        .and_then(AspectRatio::parse)
        .unwrap_or_default();
    let image_size = image_config
        .and_then(|config| config.get("imageSize"))
        .and_then(Value::as_str)
        .and_then(ImageSize::parse)
        .unwrap_or_default();
    (aspect_ratio, image_size)
}

fn swatch_dims(aspect_ratio: AspectRatio, image_size: ImageSize) -> (u32, u32) {
    let (ratio_w, ratio_h) = aspect_ratio.dims();
    let long_edge = image_size.long_edge();
    if ratio_w >= ratio_h {
        (long_edge, long_edge * ratio_h / ratio_w)
    } else {
        (long_edge * ratio_w / ratio_h, long_edge)
    }
}

fn render_swatch(width: u32, height: u32, instruction: &str) -> Result<Vec<u8>, GenerateError> {
    let (r, g, b) = color_from_instruction(instruction);
    let mut swatch = RgbImage::new(width, height);
    for pixel in swatch.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(swatch)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|err| GenerateError::Transport(format!("offline swatch encode failed: {err}")))?;
    Ok(buffer.into_inner())
}

fn color_from_instruction(instruction: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(instruction.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use serde_json::{json, Value};
    use vivid_contracts::config::{
        AspectRatio, GenerationConfig, ImageSize, ReferenceImage, SceneAction, SceneItem,
    };
    use vivid_contracts::events::EventWriter;
    use vivid_contracts::instructions::ULTIMATE_GOAL;

    use super::{
        build_payload, classify_failure, extension_for_mime, extract_result, mime_for_path,
        short_id, swatch_dims, ComposeInputs, GenerateError, StudioClient, StudioEngine, BASE64,
        ENTITY_NOT_FOUND_MARKER,
    };

    fn reference(data: &[u8], mime: &str) -> ReferenceImage {
        ReferenceImage::new(data.to_vec(), mime).unwrap()
    }

    fn event_rows(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    #[test]
    fn payload_carries_images_in_order_then_the_instruction() {
        let subject = reference(b"subject", "image/jpeg");
        let scene = reference(b"scene", "image/png");
        let payload = build_payload(&[&subject, &scene], "do the thing", "3:4", "1K");

        let parts = payload["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(
            parts[0]["inlineData"]["data"],
            json!(BASE64.encode(b"subject"))
        );
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[2]["text"], json!("do the thing"));

        let image_config = &payload["generationConfig"]["imageConfig"];
        assert_eq!(image_config["aspectRatio"], json!("3:4"));
        assert_eq!(image_config["imageSize"], json!("1K"));
    }

    #[test]
    fn parser_takes_the_last_inline_image_and_joins_text() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "first " },
                        { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(b"one") } },
                        { "text": "second" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": BASE64.encode(b"two") } },
                    ]
                }
            }]
        });
        let (image, advisory) = extract_result(&response).unwrap();
        assert_eq!(image.data, b"two");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(advisory.as_deref(), Some("first second"));
    }

    #[test]
    fn parser_accepts_snake_case_inline_data() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "inline_data": { "mime_type": "image/webp", "data": BASE64.encode(b"w") } },
                    ]
                }
            }]
        });
        let (image, advisory) = extract_result(&response).unwrap();
        assert_eq!(image.mime_type, "image/webp");
        assert!(advisory.is_none());
    }

    #[test]
    fn text_only_response_is_no_image_produced() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "refused, politely" }] }
            }]
        });
        let err = extract_result(&response).unwrap_err();
        assert!(matches!(err, GenerateError::NoImageProduced));

        let empty = json!({ "candidates": [] });
        assert!(matches!(
            extract_result(&empty).unwrap_err(),
            GenerateError::NoImageProduced
        ));
    }

    #[test]
    fn entity_not_found_classifies_as_authorization_required() {
        let body = format!("{{\"error\":{{\"message\":\"{ENTITY_NOT_FOUND_MARKER}.\"}}}}");
        let err = classify_failure(404, &body);
        assert!(matches!(err, GenerateError::AuthorizationRequired));
        assert!(err.is_recoverable());

        let other = classify_failure(500, "internal");
        assert!(matches!(other, GenerateError::Transport(_)));
        assert!(!other.is_recoverable());
        assert!(other.to_string().contains("500"));
        assert!(other.to_string().contains("internal"));
    }

    #[test]
    fn generate_without_subject_references_is_missing_input() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events = EventWriter::new(temp.path().join("events.jsonl"), "s1");
        let engine = StudioEngine::offline(events);
        let inputs = ComposeInputs {
            subject_references: &[],
            scene_references: &[],
            narrative: "x",
            items: &[],
        };
        let err = engine
            .generate(&inputs, &GenerationConfig::session_defaults())
            .unwrap_err();
        assert!(matches!(err, GenerateError::MissingInput));
        Ok(())
    }

    #[test]
    fn offline_generation_round_trips_and_respects_the_aspect_ratio() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let events = EventWriter::new(&events_path, "s1");
        let engine = StudioEngine::offline(events);

        let subject = reference(b"subject-bytes", "image/jpeg");
        let items = vec![SceneItem::new("Santa hat", SceneAction::Add)?];
        let inputs = ComposeInputs {
            subject_references: std::slice::from_ref(&subject),
            scene_references: &[],
            narrative: "a quiet garden",
            items: &items,
        };
        let config = GenerationConfig::session_defaults();
        let result = engine.generate(&inputs, &config)?;

        assert_eq!(result.image.mime_type, "image/png");
        assert_eq!(result.config, config);
        assert!(result.advisory_text.is_some());
        let decoded = image::load_from_memory(&result.image.data)?;
        assert_eq!(decoded.width(), 768);
        assert_eq!(decoded.height(), 1024);

        let again = engine.generate(&inputs, &config)?;
        assert_eq!(again.image.data, result.image.data);

        let types: Vec<String> = event_rows(&events_path)
            .iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert!(types.contains(&"instruction_composed".to_string()));
        assert!(types.contains(&"request_dispatched".to_string()));
        assert!(types.contains(&"generation_finished".to_string()));
        Ok(())
    }

    #[test]
    fn baseline_model_dispatched_for_low_tier_composition() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let engine = StudioEngine::offline(EventWriter::new(&events_path, "s1"));

        let subject = reference(b"s", "image/png");
        let inputs = ComposeInputs {
            subject_references: std::slice::from_ref(&subject),
            scene_references: &[],
            narrative: "n",
            items: &[],
        };
        engine.generate(&inputs, &GenerationConfig::session_defaults())?;

        let rows = event_rows(&events_path);
        let dispatched = rows
            .iter()
            .find(|row| row["type"] == json!("request_dispatched"))
            .unwrap();
        assert_eq!(dispatched["model"], json!("gemini-2.5-flash-image"));
        assert_eq!(dispatched["image_size"], json!("1K"));
        assert_eq!(dispatched["image_parts"], json!(1));
        Ok(())
    }

    #[test]
    fn enhancement_dispatches_one_image_at_4k_on_the_pro_model() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let engine = StudioEngine::offline(EventWriter::new(&events_path, "s1"));

        let base = reference(b"prior-result", "image/png");
        let mut config = GenerationConfig::session_defaults();
        config.image_size = ImageSize::OneK;
        let result = engine.enhance(&base, &config)?;
        assert_eq!(result.config.image_size, ImageSize::OneK);

        let rows = event_rows(&events_path);
        let dispatched = rows
            .iter()
            .find(|row| row["type"] == json!("request_dispatched"))
            .unwrap();
        assert_eq!(dispatched["model"], json!("gemini-3-pro-image-preview"));
        assert_eq!(dispatched["image_size"], json!("4K"));
        assert_eq!(dispatched["image_parts"], json!(1));
        Ok(())
    }

    #[test]
    fn offline_instruction_still_closes_with_the_goal_clause() -> anyhow::Result<()> {
        // The offline transport echoes nothing about the instruction, so pin
        // the composed text through the payload builder instead.
        let subject = reference(b"s", "image/png");
        let config = GenerationConfig::session_defaults();
        let ctx = vivid_contracts::instructions::InstructionContext {
            narrative: "n",
            items: &[],
            has_scene_references: false,
            config: &config,
            mode: vivid_contracts::instructions::InstructionMode::Compose,
        };
        let instruction = vivid_contracts::instructions::compose(&ctx);
        let payload = build_payload(&[&subject], &instruction, "3:4", "1K");
        let text = payload["contents"][0]["parts"][1]["text"].as_str().unwrap();
        assert!(text.ends_with(ULTIMATE_GOAL));
        Ok(())
    }

    #[test]
    fn endpoint_paths_are_normalized() {
        let client = StudioClient::with_api_base("https://example.test/v1beta");
        assert_eq!(
            client.endpoint_for_model("gemini-2.5-flash-image"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            client.endpoint_for_model("models/gemini-3-pro-image-preview"),
            "https://example.test/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
    }

    #[test]
    fn mime_helpers_cover_the_supported_formats() {
        assert_eq!(mime_for_path(std::path::Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(std::path::Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(mime_for_path(std::path::Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for_path(std::path::Path::new("a.png")), "image/png");
        assert_eq!(mime_for_path(std::path::Path::new("a")), "image/png");

        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("image/png"), "png");

        assert_eq!(short_id(b"abc").len(), 8);
        assert_eq!(short_id(b"abc"), short_id(b"abc"));
        assert_ne!(short_id(b"abc"), short_id(b"abd"));
    }

    #[test]
    fn swatch_dims_track_tier_and_orientation() {
        assert_eq!(swatch_dims(AspectRatio::Portrait, ImageSize::OneK), (768, 1024));
        assert_eq!(swatch_dims(AspectRatio::Wide, ImageSize::TwoK), (2048, 1152));
        assert_eq!(swatch_dims(AspectRatio::Square, ImageSize::FourK), (4096, 4096));
    }
}
