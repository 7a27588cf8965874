//! Turn a captured strain payload into a [`StrainRecord`].
//!
//! The upstream payload shape is not guaranteed, so every field is read on
//! its own through a JSON pointer. Absence at any nesting level, or a value
//! of the wrong JSON type, yields that field's default instead of an error.

use crate::types::{ExtractError, ExtractResult, ExtractionRequest, StrainRecord};
use serde_json::Value;

/// Normalize a captured payload.
///
/// Fails with [`ExtractError::MissingData`] when nothing was captured; a
/// present payload always produces a complete record.
pub fn normalize(
    payload: Option<&Value>,
    request: &ExtractionRequest,
    url: &str,
) -> ExtractResult<StrainRecord> {
    let payload = payload.ok_or_else(|| ExtractError::MissingData {
        url: url.to_string(),
    })?;

    Ok(StrainRecord {
        name: non_empty_str(payload, "/name")
            .unwrap_or(request.slug())
            .to_string(),
        kind: str_or_empty(payload, "/category"),
        thc: str_or_empty(payload, "/thc/formatted"),
        description: str_or_empty(payload, "/description"),
        effects: effect_labels(payload),
        url: url.to_string(),
    })
}

fn non_empty_str<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn str_or_empty(payload: &Value, pointer: &str) -> String {
    non_empty_str(payload, pointer).unwrap_or_default().to_string()
}

/// Labels of `effects.primary`, skipping entries without a string label.
fn effect_labels(payload: &Value) -> Vec<String> {
    payload
        .pointer("/effects/primary")
        .and_then(Value::as_array)
        .map(|effects| {
            effects
                .iter()
                .filter_map(|e| e.get("label").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
