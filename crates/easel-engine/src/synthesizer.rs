use anyhow::{Context, Result};
use easel_contracts::conversation::{Conversation, Role, Turn};
use easel_contracts::prompt::StructuredPrompt;
use serde_json::{json, Value};

use crate::gemini::{
    extract_candidate_text, json_generation_config, system_instruction_part, GeminiClient,
};

const SYNTHESIS_TEMPERATURE: f64 = 0.7;

/// An open prompt-synthesis conversation.
///
/// Starts from the persisted history and grows by one user/model exchange per
/// successful `send`, so a correction request sees the draft it is correcting.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizerSession {
    system_instruction: String,
    history: Vec<Turn>,
}

impl SynthesizerSession {
    pub fn new(conversation: &Conversation, system_instruction: &str) -> Self {
        Self {
            system_instruction: system_instruction.to_string(),
            history: conversation.turns().to_vec(),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub prompt: StructuredPrompt,
    /// Raw model text, stored verbatim as the model turn.
    pub response_text: String,
}

pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the raw response text for `text` given the session context.
    fn complete(&self, session: &SynthesizerSession, text: &str) -> Result<String>;

    fn open(&self, conversation: &Conversation, system_instruction: &str) -> SynthesizerSession {
        SynthesizerSession::new(conversation, system_instruction)
    }

    fn send(&self, session: &mut SynthesizerSession, text: &str) -> Result<Synthesis> {
        let response_text = self.complete(session, text)?;
        let prompt = StructuredPrompt::from_response_text(&response_text).with_context(|| {
            format!("{} returned a prompt that does not match the schema", self.name())
        })?;
        session.history.push(Turn::user(text));
        session.history.push(Turn::model(response_text.clone()));
        Ok(Synthesis {
            prompt,
            response_text,
        })
    }
}

pub struct GeminiSynthesizer {
    client: GeminiClient,
    model: String,
}

impl GeminiSynthesizer {
    pub fn new(model: impl Into<String>, api_key: Option<String>, timeout_s: f64) -> Self {
        Self {
            client: GeminiClient::new(api_key, timeout_s),
            model: model.into(),
        }
    }

    fn build_payload(session: &SynthesizerSession, text: &str) -> Value {
        let mut contents: Vec<Value> = session
            .history()
            .iter()
            .map(|turn| {
                json!({
                    "role": turn.role().as_str(),
                    "parts": turn
                        .parts()
                        .iter()
                        .map(|part| json!({ "text": part }))
                        .collect::<Vec<Value>>(),
                })
            })
            .collect();
        contents.push(json!({
            "role": Role::User.as_str(),
            "parts": [{ "text": text }],
        }));

        let mut payload = json!({
            "contents": contents,
            "generationConfig": json_generation_config(
                StructuredPrompt::response_schema(),
                SYNTHESIS_TEMPERATURE,
            ),
        });
        if !session.system_instruction().trim().is_empty() {
            payload["systemInstruction"] = system_instruction_part(session.system_instruction());
        }
        payload
    }
}

impl Synthesizer for GeminiSynthesizer {
    fn name(&self) -> &str {
        "gemini"
    }

    fn complete(&self, session: &SynthesizerSession, text: &str) -> Result<String> {
        let payload = Self::build_payload(session, text);
        let response = self.client.generate_content(&self.model, &payload)?;
        extract_candidate_text(&response)
    }
}

/// Offline synthesizer that decorates the request text.
pub struct DryrunSynthesizer;

impl Synthesizer for DryrunSynthesizer {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn complete(&self, session: &SynthesizerSession, text: &str) -> Result<String> {
        let subject = text.split_whitespace().collect::<Vec<&str>>().join(" ");
        let previous = session
            .history()
            .iter()
            .rev()
            .find(|turn| turn.role() == Role::Model)
            .and_then(|turn| StructuredPrompt::from_response_text(&turn.text()).ok());
        let positive = match previous {
            Some(previous) if subject.len() < 40 => {
                format!("{}, {subject}", previous.positive)
            }
            _ => format!("{subject}, highly detailed, soft studio lighting"),
        };
        Ok(json!({
            "positive": positive,
            "negative": "blurry, low quality, distorted, watermark",
        })
        .to_string())
    }
}
