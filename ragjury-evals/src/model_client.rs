// Copyright 2025 Ragjury Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Model client abstraction for judge calls.
//!
//! One [`ModelClient::call`] is one unit of concurrent work in a step.
//! Replies are decoded then validated against the step's expected shape,
//! so every pipeline sees a well-formed `serde_json::Value` or a failure.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Expected JSON kind of one field in a judge reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Number,
    String,
    StringArray,
    BoolArray,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Number => value.is_f64() || value.is_i64() || value.is_u64(),
            FieldKind::String => value.is_string(),
            FieldKind::StringArray => value
                .as_array()
                .map(|a| a.iter().all(Value::is_string))
                .unwrap_or(false),
            FieldKind::BoolArray => value
                .as_array()
                .map(|a| a.iter().all(Value::is_boolean))
                .unwrap_or(false),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldKind::Bool => "boolean",
            FieldKind::Number => "number",
            FieldKind::String => "string",
            FieldKind::StringArray => "array of strings",
            FieldKind::BoolArray => "array of booleans",
        }
    }
}

/// Structured shape a judge reply must decode into.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    required: Vec<(&'static str, FieldKind)>,
}

impl ResponseShape {
    pub fn new() -> Self {
        Self {
            required: Vec::new(),
        }
    }

    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.required.push((name, kind));
        self
    }

    /// Decode raw reply text, then validate every required field.
    pub fn decode(&self, raw: &str) -> Result<Value, VerdictError> {
        let value: Value = serde_json::from_str(raw.trim())?;
        self.validate(&value)?;
        Ok(value)
    }

    /// Validate an already-decoded reply.
    pub fn validate(&self, value: &Value) -> Result<(), VerdictError> {
        for (name, kind) in &self.required {
            match value.get(name) {
                Some(field) if kind.matches(field) => {}
                Some(_) => {
                    return Err(VerdictError::Schema {
                        field: name.to_string(),
                        expected: kind.describe(),
                    })
                }
                None => {
                    return Err(VerdictError::Schema {
                        field: name.to_string(),
                        expected: kind.describe(),
                    })
                }
            }
        }
        Ok(())
    }
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure to turn a judge's textual reply into the expected shape.
#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("reply is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("reply field '{field}' missing or not a {expected}")]
    Schema {
        field: String,
        expected: &'static str,
    },
}

/// Errors from model clients.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API error: {0}")]
    Api(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Verdict(#[from] VerdictError),
}

/// Capability seam to the judge models.
///
/// The engine never talks to a provider directly; it is constructed with
/// an `Arc<dyn ModelClient>` and calls through it, one call per
/// (model, step) unit of work. Implementations own timeouts and retries;
/// the engine imposes neither.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send `prompt` to the model identified by `model_id` and return the
    /// decoded, shape-validated reply.
    async fn call(
        &self,
        model_id: &str,
        prompt: &str,
        shape: &ResponseShape,
    ) -> Result<Value, ModelError>;
}

/// Substitute `{name}` placeholders in a prompt template.
///
/// Unknown placeholders are left in place so a malformed template shows up
/// verbatim in the emitted prompt rather than silently vanishing.
pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in variables {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
