use anyhow::{Context, Result};
use easel_contracts::prompt::Critique;
use serde_json::{json, Value};

use crate::artifact::Artifact;
use crate::gemini::{
    extract_candidate_text, json_generation_config, system_instruction_part, GeminiClient,
};

const CRITIQUE_TEMPERATURE: f64 = 0.1;

pub const CRITIC_SYSTEM_INSTRUCTION: &str = "You are an AI Art Quality Assurance Auditor.

Task:
Compare the provided IMAGE against the USER REQUEST.
Identify if any KEY subjects or specific details mentioned in the text are completely missing from the image.

Strictness:
- Ignore minor style differences.
- Focus on MISSING OBJECTS (e.g., User asked for \"a cat in a hat\", Image has no hat).
- Focus on WRONG COLORS (e.g., User asked for \"Red car\", Image is Blue).

Output Schema (JSON):
{
    \"passed\": boolean, (true if acceptable, false if major errors)
    \"reason\": \"Short explanation\",
    \"missing_elements\": \"What specifically needs to be added/fixed?\"
}";

/// Judges an artifact against the request that produced it.
pub trait Critic: Send + Sync {
    fn name(&self) -> &str;
    fn inspect(&self, artifact: &Artifact, user_request: &str) -> Result<Critique>;
}

pub struct GeminiCritic {
    client: GeminiClient,
    model: String,
}

impl GeminiCritic {
    pub fn new(model: impl Into<String>, api_key: Option<String>, timeout_s: f64) -> Self {
        Self {
            client: GeminiClient::new(api_key, timeout_s),
            model: model.into(),
        }
    }

    fn build_payload(artifact: &Artifact, user_request: &str) -> Value {
        let question =
            format!("User Request: '{user_request}'\nDoes the image satisfy this request?");
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": artifact.mime_type(),
                            "data": artifact.to_base64(),
                        }
                    },
                    { "text": question },
                ],
            }],
            "systemInstruction": system_instruction_part(CRITIC_SYSTEM_INSTRUCTION),
            "generationConfig": json_generation_config(
                Critique::response_schema(),
                CRITIQUE_TEMPERATURE,
            ),
        })
    }
}

impl Critic for GeminiCritic {
    fn name(&self) -> &str {
        "gemini"
    }

    fn inspect(&self, artifact: &Artifact, user_request: &str) -> Result<Critique> {
        let payload = Self::build_payload(artifact, user_request);
        let response = self.client.generate_content(&self.model, &payload)?;
        let text = extract_candidate_text(&response)?;
        Critique::from_response_text(&text).context("Gemini critique does not match the schema")
    }
}

pub struct DryrunCritic;

impl Critic for DryrunCritic {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn inspect(&self, artifact: &Artifact, _user_request: &str) -> Result<Critique> {
        if artifact.is_empty() {
            return Ok(Critique::fail("The image is empty.", "the requested subject"));
        }
        Ok(Critique::pass("Dryrun critic accepts every rendered image."))
    }
}
