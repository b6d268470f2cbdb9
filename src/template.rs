//! Template interpolation for request definitions
//!
//! Handles `{{ variable }}` interpolation in async job paths and bodies.
//! Supports `{{ job_id }}`, slice values like `{{ slice.account }}` and
//! nested config access like `{{ config.report.type }}`.

use crate::error::{Error, Result};
use crate::partition::StreamSlice;
use crate::types::JsonValue;
use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}").unwrap()
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Connector configuration values
    pub config: JsonValue,
    /// Values of the slice being processed (partition and cursor window)
    pub slice: JsonValue,
    /// Remote job id, once the job exists
    pub job_id: Option<String>,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with config values
    pub fn with_config(config: JsonValue) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Expose a slice's partition and cursor values under `slice.*`
    #[must_use]
    pub fn with_slice(mut self, slice: &StreamSlice) -> Self {
        let values = slice
            .partition
            .iter()
            .chain(slice.cursor_slice.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.slice = JsonValue::Object(values);
        self
    }

    /// Set the job id
    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Get a value by path (e.g., "slice.account")
    pub fn get(&self, path: &str) -> Option<JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        let (root, rest) = parts.split_first()?;

        match *root {
            "job_id" if rest.is_empty() => self.job_id.clone().map(JsonValue::String),
            "slice" => get_nested_value(&self.slice, rest).cloned(),
            "config" => get_nested_value(&self.config, rest).cloned(),
            // Bare names fall back to config fields
            _ => get_nested_value(&self.config, &parts).cloned(),
        }
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = value;
    for part in path {
        match current {
            JsonValue::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut missing = Vec::new();
    let rendered = TEMPLATE_REGEX.replace_all(template, |caps: &regex::Captures<'_>| {
        let var_path = &caps[1];
        match ctx.get(var_path) {
            Some(value) => value_to_string(&value),
            None => {
                missing.push(var_path.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::config(format!(
            "Undefined template variable(s): {}",
            missing.join(", ")
        )))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        // For complex types, use JSON serialization
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render all string values in a JSON value
pub fn render_value(value: &JsonValue, ctx: &TemplateContext) -> Result<JsonValue> {
    match value {
        JsonValue::String(s) if has_templates(s) => Ok(JsonValue::String(render(s, ctx)?)),
        JsonValue::Object(map) => {
            let mut rendered = serde_json::Map::new();
            for (k, v) in map {
                rendered.insert(k.clone(), render_value(v, ctx)?);
            }
            Ok(JsonValue::Object(rendered))
        }
        JsonValue::Array(arr) => arr
            .iter()
            .map(|v| render_value(v, ctx))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        _ => Ok(value.clone()),
    }
}
