//! Gemini `generateContent` classifier.
//!
//! Images are sent inline (base64 JPEG) together with a prompt asking for a
//! bare JSON object. The reply text may still wrap that object in prose or a
//! code fence, so the outermost `{...}` is extracted before parsing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use super::{
    extract_json_object, ClassifierCapability, ClassifierPort, ImageVerdict, JointVerdict,
};
use crate::config::ClassifierSettings;
use crate::error::ClassifyError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const SINGLE_IMAGE_PROMPT: &str = "\
Analyze this surveillance camera image.
1. Is there a cat in the image?
2. If there is a cat, is it carrying prey (bird, mouse, ...) in its mouth?
Answer only with a JSON object of this form:
{\"cat\": true|false, \"prey\": true|false}
prey is always false when there is no cat.";

const BURST_PROMPT: &str = "\
These images are consecutive frames from a surveillance camera, in capture order \
(the first image has index 0).
1. Is there a cat in any of the images?
2. Is the cat carrying prey (bird, mouse, ...) in its mouth in any of the images?
3. Which single image shows the detection best? Prefer an image showing prey, \
then an image showing the cat.
Answer only with a JSON object of this form:
{\"cat\": true|false, \"prey\": true|false, \"best_index\": <index or -1>}
Use -1 for best_index when no image shows a cat.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiApiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerdictReply {
    cat: Option<bool>,
    prey: Option<bool>,
    #[serde(default)]
    best_index: Option<i64>,
}

pub struct GeminiClassifier {
    agent: ureq::Agent,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiClassifier {
    pub fn new(settings: &ClassifierSettings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Self {
            agent,
            api_base: GEMINI_API_BASE.to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    fn generate(&self, prompt: &str, images: &[&[u8]]) -> Result<String, ClassifyError> {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        parts.extend(images.iter().map(|image| Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/jpeg".to_string(),
                data: BASE64.encode(image),
            },
        }));
        let request = GeminiRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.0,
            },
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| ClassifyError::Request(format!("encode request: {}", e)))?;

        // Key goes in a header; ureq error strings include the URL.
        let url = format!("{}/{}:generateContent", self.api_base, self.model);
        log::debug!(
            target: "sentinel::classify",
            "gemini request: model={} images={}",
            self.model,
            images.len()
        );
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", &self.api_key)
            .send_string(&body)
            .map_err(ClassifyError::from_ureq)?;
        let text = response
            .into_string()
            .map_err(|e| ClassifyError::Request(format!("read response: {}", e)))?;
        reply_text(&text)
    }
}

impl ClassifierPort for GeminiClassifier {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn supports(&self, capability: ClassifierCapability) -> bool {
        matches!(
            capability,
            ClassifierCapability::SingleImage | ClassifierCapability::JointBurst
        )
    }

    fn classify_one(&mut self, image: &[u8]) -> Result<ImageVerdict, ClassifyError> {
        let text = self.generate(SINGLE_IMAGE_PROMPT, &[image])?;
        let verdict = parse_image_verdict(&text)?;
        log::info!(
            target: "sentinel::classify",
            "image analysis: cat={} prey={}",
            verdict.cat,
            verdict.prey
        );
        Ok(verdict)
    }

    fn classify_many(&mut self, images: &[Vec<u8>]) -> Result<JointVerdict, ClassifyError> {
        let refs: Vec<&[u8]> = images.iter().map(Vec::as_slice).collect();
        let text = self.generate(BURST_PROMPT, &refs)?;
        let verdict = parse_joint_verdict(&text)?;
        log::info!(
            target: "sentinel::classify",
            "burst analysis: cat={} prey={} best_index={:?}",
            verdict.cat,
            verdict.prey,
            verdict.best_index
        );
        Ok(verdict)
    }
}

/// Pull the first text part out of a `generateContent` response body.
fn reply_text(body: &str) -> Result<String, ClassifyError> {
    let response: GeminiApiResponse = serde_json::from_str(body)
        .map_err(|e| ClassifyError::Malformed(format!("response body: {}", e)))?;
    response
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| ClassifyError::Malformed("no text content in response".to_string()))
}

fn parse_reply(text: &str) -> Result<VerdictReply, ClassifyError> {
    let json = extract_json_object(text)
        .ok_or_else(|| ClassifyError::Malformed(format!("no JSON object in reply: {}", text)))?;
    serde_json::from_str(json)
        .map_err(|e| ClassifyError::Malformed(format!("{}: {}", e, json)))
}

fn parse_image_verdict(text: &str) -> Result<ImageVerdict, ClassifyError> {
    let reply = parse_reply(text)?;
    match (reply.cat, reply.prey) {
        (Some(cat), Some(prey)) => Ok(ImageVerdict { cat, prey }),
        _ => Err(ClassifyError::Malformed(format!(
            "reply missing cat or prey: {}",
            text
        ))),
    }
}

fn parse_joint_verdict(text: &str) -> Result<JointVerdict, ClassifyError> {
    let reply = parse_reply(text)?;
    match (reply.cat, reply.prey) {
        (Some(cat), Some(prey)) => Ok(JointVerdict {
            cat,
            prey,
            best_index: reply.best_index,
        }),
        _ => Err(ClassifyError::Malformed(format!(
            "reply missing cat or prey: {}",
            text
        ))),
    }
}
