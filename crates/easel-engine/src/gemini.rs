use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::transport::{api_base_from_env, response_json_or_error, timeout_from_seconds};

/// Thin `generateContent` client shared by the synthesizer and the critic.
#[derive(Debug, Clone)]
pub(crate) struct GeminiClient {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiClient {
    pub(crate) fn new(api_key: Option<String>, timeout_s: f64) -> Self {
        Self {
            api_base: api_base_from_env(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            api_key,
            timeout: timeout_from_seconds(timeout_s),
            http: HttpClient::new(),
        }
    }

    pub(crate) fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub(crate) fn generate_content(&self, model: &str, payload: &Value) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

pub(crate) fn system_instruction_part(text: &str) -> Value {
    json!({ "parts": [{ "text": text }] })
}

pub(crate) fn json_generation_config(schema: Value, temperature: f64) -> Value {
    json!({
        "responseMimeType": "application/json",
        "responseSchema": schema,
        "temperature": temperature,
    })
}

/// Concatenated text parts of the first candidate.
pub(crate) fn extract_candidate_text(response: &Value) -> Result<String> {
    let candidate = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first());
    let Some(candidate) = candidate else {
        let block_reason = response
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str);
        match block_reason {
            Some(reason) => bail!("Gemini blocked the request ({reason})"),
            None => bail!("Gemini returned no candidates"),
        }
    };
    let text = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        let finish_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        bail!("Gemini returned an empty response (finish reason: {finish_reason})");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_candidate_text, GeminiClient};

    #[test]
    fn endpoint_prefixes_model_path_once() {
        let client = GeminiClient::new(None, 30.0);
        assert!(client
            .endpoint_for_model("gemini-2.5-flash")
            .ends_with("/models/gemini-2.5-flash:generateContent"));
        assert!(client
            .endpoint_for_model("models/gemini-2.5-flash")
            .ends_with("/models/gemini-2.5-flash:generateContent"));
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let client = GeminiClient::new(None, 30.0);
        let err = client
            .generate_content("gemini-2.5-flash", &json!({}))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "GEMINI_API_KEY or GOOGLE_API_KEY not set");
    }

    #[test]
    fn candidate_text_joins_parts() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"positive\":"}, {"text": "\"a\"}"}]},
                "finishReason": "STOP",
            }]
        });
        assert_eq!(extract_candidate_text(&response)?, "{\"positive\":\"a\"}");
        Ok(())
    }

    #[test]
    fn candidate_text_reports_blocks_and_empty_output() {
        let blocked = extract_candidate_text(&json!({"promptFeedback": {"blockReason": "SAFETY"}}))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(blocked, "Gemini blocked the request (SAFETY)");

        let empty = extract_candidate_text(&json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]
        }))
        .err()
        .map(|err| err.to_string())
        .unwrap_or_default();
        assert!(empty.contains("MAX_TOKENS"));
    }
}
