//! Payload Builder
//!
//! Turns an extraction result into the JSON body for one destination:
//! default payload, shallow template overlay, then placeholder substitution
//! on the serialized text.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::types::WebhookConfig;
use crate::ocr::ExtractionResult;

/// Value of the `source` field in every payload
pub const PAYLOAD_SOURCE: &str = "paddleocr-microservice";

/// Payload construction errors. Recovered inside the builder, never returned.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Placeholder substitution produced invalid JSON: {0}")]
    Substitution(#[source] serde_json::Error),

    #[error("Failed to serialize payload: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Current UTC time in ISO-8601
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// "pdf" for `.pdf` names (any case), otherwise "image"
pub fn file_type(filename: Option<&str>) -> &'static str {
    match filename {
        Some(name) if name.to_lowercase().ends_with(".pdf") => "pdf",
        _ => "image",
    }
}

/// Build the body sent to `config` for `result`
pub fn build_payload(
    config: &WebhookConfig,
    result: &ExtractionResult,
    filename: Option<&str>,
) -> Value {
    let full_text = result.combined_text();
    let default_payload = default_payload(config, result, filename, &full_text);

    let Some(template) = config.payload_template.as_ref() else {
        return Value::Object(default_payload);
    };

    let merged = shallow_merge(default_payload, template);

    match substitute_placeholders(&merged, config, result, filename, &full_text) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(
                config_id = %config.id,
                error = %e,
                "Placeholder substitution failed, sending template without substitution"
            );
            Value::Object(merged)
        }
    }
}

fn default_payload(
    config: &WebhookConfig,
    result: &ExtractionResult,
    filename: Option<&str>,
    full_text: &str,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("timestamp".to_string(), Value::String(iso_timestamp()));
    payload.insert("source".to_string(), Value::from(PAYLOAD_SOURCE));
    payload.insert("filename".to_string(), json!(filename));
    payload.insert("ocr_result".to_string(), json!(result));
    payload.insert("full_text_content".to_string(), Value::from(full_text));
    payload.insert(
        "metadata".to_string(),
        json!({
            "text_count": result.text_count,
            "config_name": config.name,
            "processing_method": result.processing_method.as_deref().unwrap_or("unknown"),
            "file_type": file_type(filename),
        }),
    );
    payload
}

/// Overlay every top-level template key. Nested objects are replaced whole.
pub fn shallow_merge(mut base: Map<String, Value>, template: &Map<String, Value>) -> Map<String, Value> {
    for (key, value) in template {
        base.insert(key.clone(), value.clone());
    }
    base
}

/// Replace `{{...}}` tokens in the serialized payload and parse it back
fn substitute_placeholders(
    payload: &Map<String, Value>,
    config: &WebhookConfig,
    result: &ExtractionResult,
    filename: Option<&str>,
    full_text: &str,
) -> Result<Value, PayloadError> {
    let serialized = serde_json::to_string(payload).map_err(PayloadError::Serialize)?;
    let ocr_data = serde_json::to_string(result).map_err(PayloadError::Serialize)?;

    let replacements = [
        ("{{filename}}", filename.unwrap_or("unknown").to_string()),
        ("{{text_count}}", result.text_count.to_string()),
        ("{{config_name}}", config.name.clone()),
        ("{{timestamp}}", iso_timestamp()),
        ("{{ocr_data}}", ocr_data),
        ("{{full_text_content}}", full_text.to_string()),
    ];

    let substituted = replacements
        .iter()
        .fold(serialized, |text, (token, value)| {
            text.replace(token, &escape_json_string(value))
        });

    reparse(&substituted)
}

/// Parse substituted text back into a payload
pub(crate) fn reparse(text: &str) -> Result<Value, PayloadError> {
    serde_json::from_str(text).map_err(PayloadError::Substitution)
}

/// Escape `value` so it can sit inside a JSON string literal
fn escape_json_string(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::TextSegment;
    use std::collections::HashMap;

    fn config(template: Option<Value>) -> WebhookConfig {
        let now = Utc::now();
        WebhookConfig {
            id: "cfg-1".to_string(),
            name: "n8n production".to_string(),
            url: "https://hooks.example.com/ocr".to_string(),
            method: "POST".to_string(),
            enabled: true,
            headers: HashMap::new(),
            payload_template: template.and_then(|t| t.as_object().cloned()),
            timeout: 30,
            retry_attempts: 3,
            retry_delay: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn result() -> ExtractionResult {
        let mut result = ExtractionResult::from_segments(
            Some("a.png"),
            vec![
                TextSegment::new("Invoice", 0.98),
                TextSegment::new("", 0.2),
                TextSegment::new("Total: 42", 0.91),
            ],
        );
        result.text_count = 2;
        result.processing_method = Some("paddleocr".to_string());
        result
    }

    #[test]
    fn test_default_payload_without_template() {
        let payload = build_payload(&config(None), &result(), Some("a.png"));

        assert_eq!(payload["source"], PAYLOAD_SOURCE);
        assert_eq!(payload["filename"], "a.png");
        assert_eq!(payload["full_text_content"], "Invoice Total: 42");
        assert_eq!(payload["metadata"]["config_name"], "n8n production");
        assert_eq!(payload["metadata"]["text_count"], 2);
        assert_eq!(payload["metadata"]["processing_method"], "paddleocr");
        assert_eq!(payload["metadata"]["file_type"], "image");
        assert_eq!(payload["ocr_result"]["results"][0]["text"], "Invoice");
        assert!(payload["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_missing_filename_and_method() {
        let mut res = result();
        res.processing_method = None;

        let payload = build_payload(&config(None), &res, None);
        assert!(payload["filename"].is_null());
        assert_eq!(payload["metadata"]["processing_method"], "unknown");
    }

    #[test]
    fn test_file_type() {
        assert_eq!(file_type(Some("scan.PDF")), "pdf");
        assert_eq!(file_type(Some("scan.pdf")), "pdf");
        assert_eq!(file_type(Some("scan.png")), "image");
        assert_eq!(file_type(Some("pdf")), "image");
        assert_eq!(file_type(None), "image");
    }

    #[test]
    fn test_template_key_overrides_default() {
        let template = json!({"foo": 7, "source": "custom"});
        let payload = build_payload(&config(Some(template)), &result(), Some("a.png"));

        assert_eq!(payload["foo"], 7);
        assert_eq!(payload["source"], "custom");
        assert_eq!(payload["full_text_content"], "Invoice Total: 42");
    }

    #[test]
    fn test_nested_template_object_replaces_whole() {
        let template = json!({"metadata": {"team": "billing"}});
        let payload = build_payload(&config(Some(template)), &result(), Some("a.png"));

        assert_eq!(payload["metadata"], json!({"team": "billing"}));
    }

    #[test]
    fn test_placeholder_substitution() {
        let template = json!({"note": "File: {{filename}}, count: {{text_count}}"});
        let payload = build_payload(&config(Some(template)), &result(), Some("a.png"));

        assert_eq!(payload["note"], "File: a.png, count: 2");
    }

    #[test]
    fn test_all_placeholders() {
        let template = json!({
            "who": "{{config_name}}",
            "when": "{{timestamp}}",
            "file": "{{filename}}",
            "text": "{{full_text_content}}",
            "raw": "{{ocr_data}}"
        });
        let payload = build_payload(&config(Some(template)), &result(), None);

        assert_eq!(payload["who"], "n8n production");
        assert_eq!(payload["file"], "unknown");
        assert_eq!(payload["text"], "Invoice Total: 42");
        assert!(!payload["when"].as_str().unwrap().contains("{{"));

        let raw: Value = serde_json::from_str(payload["raw"].as_str().unwrap()).unwrap();
        assert_eq!(raw["results"][2]["text"], "Total: 42");
    }

    #[test]
    fn test_substituted_values_are_escaped() {
        let mut res = result();
        res.full_text_content = Some("He said \"hi\"\nthen left".to_string());

        let template = json!({"text": "{{full_text_content}}"});
        let payload = build_payload(&config(Some(template)), &res, Some("a.png"));

        assert_eq!(payload["text"], "He said \"hi\"\nthen left");
    }

    #[test]
    fn test_reparse_failure_is_substitution_error() {
        let result = reparse(r#"{"note": "File: "broken""}"#);
        assert!(matches!(result, Err(PayloadError::Substitution(_))));
    }
}
