use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;
use crate::prompt::{Critique, StructuredPrompt};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: String,
    pub mime_type: String,
    pub sha256: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// What one delivered run produced, written next to its artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReceipt {
    pub run_id: String,
    pub user_input: String,
    pub prompt: StructuredPrompt,
    pub critique: Option<Critique>,
    pub repair: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub artifact: ArtifactRecord,
    #[serde(default)]
    pub models: Map<String, Value>,
}

pub fn write_receipt(path: &Path, receipt: &RunReceipt) -> anyhow::Result<Value> {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Value::Object(fields) = sanitize_payload(&serde_json::to_value(receipt)?) {
        for (key, value) in fields {
            root.insert(key, value);
        }
    }
    let payload = Value::Object(root);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&payload)?)?;
    Ok(payload)
}

/// Replaces values under image-carrying keys with `<omitted>`.
pub fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "base64" | "b64_json" | "image" | "image_bytes" | "data" | "inlinedata"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}
