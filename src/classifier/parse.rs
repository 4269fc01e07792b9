//! Defensive parsing of the classification service's answer.
//!
//! Language models wrap JSON in code fences, prepend a sentence, or drift from the requested shape.
//! This module accepts all of that as long as a JSON object with an `items` array can be found,
//! and reads each item as leniently as it can without guessing.

use crate::error::ClassifyError;
use serde_json::Value;

/// One classification as reported by the service. `confidence` is `None` when the service left it
/// out or wrote something that is not a number.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceItem {
    pub row_id: usize,
    pub category: String,
    pub confidence: Option<f64>,
}

/// Parses the raw response text into items. Fails only when no JSON object can be recovered or the
/// object is not the expected shape; items that are individually unusable are dropped.
pub fn parse_response(text: &str) -> Result<Vec<ServiceItem>, ClassifyError> {
    let value = parse_object(text)?;
    let obj = value
        .as_object()
        .ok_or_else(|| ClassifyError::parse("the response is not a JSON object"))?;
    let items = match obj.get("items") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ClassifyError::parse("\"items\" is not an array")),
    };
    Ok(items.iter().filter_map(item).collect())
}

/// Finds the JSON document in `text`: as-is, inside code fences, or between the first `{` and the
/// last `}`.
fn parse_object(text: &str) -> Result<Value, ClassifyError> {
    let t = strip_fences(text.trim());
    if let Ok(value) = serde_json::from_str::<Value>(t) {
        return Ok(value);
    }

    let first = t.find('{');
    let last = t.rfind('}');
    match (first, last) {
        (Some(first), Some(last)) if last > first => serde_json::from_str(&t[first..=last])
            .map_err(|e| ClassifyError::parse(format!("invalid JSON object: {e}"))),
        _ => Err(ClassifyError::parse(format!(
            "no JSON object found in response: {}",
            preview(t)
        ))),
    }
}

/// Removes a leading ```` ``` ```` or ```` ```json ```` fence and a trailing ```` ``` ````.
fn strip_fences(t: &str) -> &str {
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.trim();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn item(value: &Value) -> Option<ServiceItem> {
    let obj = value.as_object()?;
    let row_id = match obj.get("row_id")? {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let category = obj.get("category")?.as_str()?.trim().to_string();
    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Some(ServiceItem {
        row_id,
        category,
        confidence,
    })
}

fn preview(t: &str) -> String {
    const MAX: usize = 80;
    match t.char_indices().nth(MAX) {
        Some((ix, _)) => format!("{}...", &t[..ix]),
        None => t.to_string(),
    }
}
