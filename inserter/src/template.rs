//! Entity construction from a JSON template and a payload.
//!
//! String values of the form `"{key}"` are replaced by the payload value at
//! `key`, keeping its JSON type. Placeholders embedded in longer strings are
//! substituted as text. Unknown embedded placeholders are left as they are.

use std::collections::HashMap;

use ngsi_client::format_entity_id;
use serde_json::{json, Map, Value};

/// Build the entity for `payload` from `template`.
///
/// `exceptions` maps attribute names to payload keys whose value is copied into
/// the attribute's `value` untouched (null when the key is missing). With `clean`,
/// attributes whose value resolved to null are dropped. When the template gives
/// no `id` or `type`, they come from the payload, the id in URN form.
pub fn build_entity_json(
    template: &Map<String, Value>,
    payload: &Value,
    exceptions: &HashMap<String, String>,
    clean: bool,
) -> Value {
    let mut entity: Map<String, Value> = template
        .iter()
        .map(|(key, value)| (key.clone(), substitute(value, payload)))
        .collect();

    for (attribute, payload_key) in exceptions {
        let value = payload.get(payload_key).cloned().unwrap_or(Value::Null);
        match entity.get_mut(attribute) {
            Some(Value::Object(fragment)) => {
                fragment.insert("value".to_string(), value);
            }
            _ => {
                entity.insert(attribute.clone(), json!({"type": "Property", "value": value}));
            }
        }
    }

    let payload_type = payload.get("type").and_then(Value::as_str);
    if !entity.contains_key("type") {
        if let Some(entity_type) = payload_type {
            entity.insert("type".to_string(), Value::String(entity_type.to_string()));
        }
    }
    if !entity.contains_key("id") {
        let raw_id = payload.get("id").and_then(Value::as_str);
        if let Some(id) = format_entity_id(payload_type.unwrap_or_default(), raw_id) {
            entity.insert("id".to_string(), Value::String(id));
        }
    }

    if clean {
        entity.retain(|key, value| key == "@context" || !resolves_to_null(value));
    }

    if !entity.contains_key("@context") {
        tracing::error!("Entity template has no @context, the entity will be sent without one");
    }

    Value::Object(entity)
}

fn substitute(template: &Value, payload: &Value) -> Value {
    match template {
        Value::String(text) => match whole_placeholder(text) {
            Some(key) => payload.get(key).cloned().unwrap_or(Value::Null),
            None => Value::String(substitute_embedded(text, payload)),
        },
        Value::Array(items) => Value::Array(items.iter().map(|item| substitute(item, payload)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), substitute(value, payload)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// `Some("key")` when `text` is exactly `{key}`.
fn whole_placeholder(text: &str) -> Option<&str> {
    let key = text.strip_prefix('{')?.strip_suffix('}')?;
    (!key.is_empty() && !key.contains(['{', '}'])).then_some(key)
}

fn substitute_embedded(text: &str, payload: &Value) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match payload.get(key).filter(|_| !key.contains('{')) {
                    Some(Value::String(value)) => result.push_str(value),
                    Some(value) => result.push_str(&value.to_string()),
                    None => {
                        result.push('{');
                        result.push_str(key);
                        result.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                result.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

fn resolves_to_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(fragment) => ["value", "object"]
            .iter()
            .any(|member| fragment.get(*member).is_some_and(Value::is_null)),
        _ => false,
    }
}
