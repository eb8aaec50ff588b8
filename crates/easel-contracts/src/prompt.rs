use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response must be a JSON object")]
    NotAnObject,
    #[error("field '{0}' is missing")]
    MissingField(&'static str),
    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field '{0}' is empty")]
    EmptyField(&'static str),
}

/// Positive/negative prompt pair handed from the synthesizer to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredPrompt {
    pub positive: String,
    pub negative: String,
}

impl StructuredPrompt {
    /// Validates raw synthesizer output against the `{positive, negative}` schema.
    pub fn from_response_text(text: &str) -> Result<Self, SchemaError> {
        let object = parse_object(text)?;
        let positive = required_string(&object, "positive")?;
        let negative = required_string(&object, "negative")?;
        if positive.trim().is_empty() {
            return Err(SchemaError::EmptyField("positive"));
        }
        if negative.trim().is_empty() {
            return Err(SchemaError::EmptyField("negative"));
        }
        Ok(Self { positive, negative })
    }

    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "positive": {"type": "STRING"},
                "negative": {"type": "STRING"},
            },
            "required": ["positive", "negative"],
        })
    }
}

/// Verdict on whether an artifact satisfies the user's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub passed: bool,
    pub reason: String,
    pub missing_elements: String,
}

impl Critique {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
            missing_elements: String::new(),
        }
    }

    pub fn fail(reason: impl Into<String>, missing_elements: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            missing_elements: missing_elements.into(),
        }
    }

    pub fn from_response_text(text: &str) -> Result<Self, SchemaError> {
        let object = parse_object(text)?;
        let passed = match object.get("passed") {
            None | Some(Value::Null) => return Err(SchemaError::MissingField("passed")),
            Some(value) => value.as_bool().ok_or(SchemaError::WrongType {
                field: "passed",
                expected: "a boolean",
            })?,
        };
        let reason = required_string(&object, "reason")?;
        let missing_elements = match object.get("missing_elements") {
            None | Some(Value::Null) if passed => String::new(),
            _ => required_string(&object, "missing_elements")?,
        };
        Ok(Self {
            passed,
            reason,
            missing_elements,
        })
    }

    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "passed": {"type": "BOOLEAN"},
                "reason": {"type": "STRING"},
                "missing_elements": {"type": "STRING"},
            },
            "required": ["passed", "reason", "missing_elements"],
        })
    }
}

fn parse_object(text: &str) -> Result<serde_json::Map<String, Value>, SchemaError> {
    let cleaned = strip_code_fence(text);
    let value: Value =
        serde_json::from_str(cleaned).map_err(|err| SchemaError::InvalidJson(err.to_string()))?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(SchemaError::NotAnObject),
    }
}

fn required_string(
    object: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<String, SchemaError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(SchemaError::MissingField(field)),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(SchemaError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

// Models occasionally wrap JSON mode output in a markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
