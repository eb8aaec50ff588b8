use std::io::Cursor;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use easel_contracts::config::GenerationConfig;
use easel_contracts::prompt::StructuredPrompt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::ACCEPT;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::artifact::Artifact;
use crate::transport::{api_base_from_env, response_json_or_error, timeout_from_seconds};

/// Renders a structured prompt. Implementations never retry.
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    fn render(&self, prompt: &StructuredPrompt) -> Result<Artifact>;
}

pub struct StabilityGenerator {
    api_base: String,
    api_key: Option<String>,
    engine_id: String,
    params: GenerationConfig,
    timeout: Duration,
    http: HttpClient,
}

impl StabilityGenerator {
    pub fn new(
        engine_id: impl Into<String>,
        params: GenerationConfig,
        api_key: Option<String>,
        timeout_s: f64,
    ) -> Self {
        Self {
            api_base: api_base_from_env("STABILITY_API_BASE", "https://api.stability.ai"),
            api_key,
            engine_id: engine_id.into(),
            params,
            timeout: timeout_from_seconds(timeout_s),
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/generation/{}/text-to-image",
            self.api_base,
            self.engine_id.trim()
        )
    }

    fn build_body(&self, prompt: &StructuredPrompt) -> Value {
        json!({
            "steps": self.params.steps,
            "width": self.params.width,
            "height": self.params.height,
            "seed": self.params.seed,
            "cfg_scale": self.params.cfg_scale,
            "samples": 1,
            "text_prompts": [
                {"text": prompt.positive, "weight": 1},
                {"text": prompt.negative, "weight": -1},
            ],
        })
    }

    fn decode_response(payload: &Value) -> Result<Artifact> {
        let first = payload
            .get("artifacts")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or_else(|| anyhow::anyhow!("Stability response contained no artifacts"))?;
        let finish_reason = first
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("SUCCESS");
        if finish_reason == "ERROR" {
            bail!("Stability reported a generation error");
        }
        let encoded = first
            .get("base64")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Stability JSON response missing image bytes"))?;
        Artifact::from_base64(encoded, "image/png").context("Stability image decode failed")
    }
}

impl Generator for StabilityGenerator {
    fn name(&self) -> &str {
        "stability"
    }

    fn render(&self, prompt: &StructuredPrompt) -> Result<Artifact> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("STABILITY_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .json(&self.build_body(prompt))
            .send()
            .with_context(|| format!("Stability request failed ({endpoint})"))?;
        let payload = response_json_or_error("Stability", response)?;
        Self::decode_response(&payload)
    }
}

/// Offline generator: a solid PNG whose colour is derived from the prompt.
pub struct DryrunGenerator {
    width: u32,
    height: u32,
    seed: u64,
}

impl DryrunGenerator {
    pub fn new(params: &GenerationConfig) -> Self {
        Self {
            width: params.width.max(1),
            height: params.height.max(1),
            seed: params.seed,
        }
    }
}

impl Generator for DryrunGenerator {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn render(&self, prompt: &StructuredPrompt) -> Result<Artifact> {
        let (r, g, b) = color_from_prompt(prompt, self.seed);
        let mut image = RgbImage::new(self.width, self.height);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut encoded, ImageFormat::Png)
            .context("dryrun image encode failed")?;
        Ok(Artifact::new(encoded.into_inner(), "image/png"))
    }
}

fn color_from_prompt(prompt: &StructuredPrompt, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.positive.as_bytes());
    hasher.update(prompt.negative.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
