//! Request payloads accepted by the OCR endpoints.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Caller-supplied metadata attached to ingested pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: TagValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    List(Vec<String>),
}

/// Body of `POST /ocr`.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrInput {
    /// Base64-encoded image bytes.
    pub image: String,
    /// MIME type of the encoded image, e.g. `image/png`.
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// JSON body of `POST /ocr-pdf`.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrPdfInput {
    /// Base64-encoded PDF bytes.
    pub pdf: String,
    pub filename: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

pub fn validate_tags(tags: &[Tag]) -> Result<(), GatewayError> {
    match tags.iter().position(|t| t.name.trim().is_empty()) {
        Some(i) => Err(GatewayError::BadRequest(format!("tag {} has an empty name", i))),
        None => Ok(()),
    }
}

/// Flatten tags into ingestion metadata. A repeated name keeps its last value.
pub fn flatten_tags(tags: &[Tag]) -> Map<String, Value> {
    tags.iter()
        .map(|tag| {
            let value = match &tag.value {
                TagValue::Text(s) => Value::String(s.clone()),
                TagValue::List(items) => {
                    Value::Array(items.iter().cloned().map(Value::String).collect())
                }
            };
            (tag.name.clone(), value)
        })
        .collect()
}

pub fn decode_base64(field: &str, data: &str) -> Result<Vec<u8>, GatewayError> {
    let decoded = BASE64
        .decode(data.trim())
        .map_err(|e| GatewayError::BadRequest(format!("{} is not valid base64: {}", field, e)))?;
    if decoded.is_empty() {
        return Err(GatewayError::BadRequest(format!("{} is empty", field)));
    }
    Ok(decoded)
}
