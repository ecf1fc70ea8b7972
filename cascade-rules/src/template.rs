use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::condition::FieldPath;

/// What to do when a `{{path}}` token does not resolve against the event
/// context. Configurable per rule; the default substitutes an empty string so
/// a stale path degrades the message instead of blocking the action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingTokenPolicy {
    Empty,
    Fail,
}

impl Default for MissingTokenPolicy {
    fn default() -> Self {
        MissingTokenPolicy::Empty
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unresolved template token: {{{{{path}}}}}")]
pub struct TemplateError {
    pub path: String,
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid token pattern"))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Replaces every `{{path}}` token in the template with the stringified value
/// looked up from the context.
pub fn resolve_str(
    template: &str,
    context: &Value,
    policy: MissingTokenPolicy,
) -> Result<String, TemplateError> {
    let mut result = template.to_string();

    for capture in token_regex().captures_iter(template) {
        let path = capture[1].trim();
        let replacement = match FieldPath::from(path).locate(context) {
            Some(value) => stringify(value),
            None => match policy {
                MissingTokenPolicy::Empty => String::new(),
                MissingTokenPolicy::Fail => {
                    return Err(TemplateError {
                        path: path.to_string(),
                    })
                }
            },
        };
        result = result.replace(&capture[0], &replacement);
    }

    Ok(result)
}

/// Resolves templates recursively through a JSON config value: strings are
/// scanned for tokens, objects and arrays recurse, everything else passes
/// through unchanged.
pub fn resolve_value(
    value: &Value,
    context: &Value,
    policy: MissingTokenPolicy,
) -> Result<Value, TemplateError> {
    match value {
        Value::String(template) => Ok(Value::String(resolve_str(template, context, policy)?)),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, entry) in map {
                resolved.insert(key.clone(), resolve_value(entry, context, policy)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let resolved = items
                .iter()
                .map(|item| resolve_value(item, context, policy))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved))
        }
        other => Ok(other.clone()),
    }
}
