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

//! Aspect critic: single-step binary verdict on a user-defined aspect.
//!
//! Each judge answers yes/no to one question about the response (is it
//! harmful, is it concise, does it stay on topic, ...). With strictness
//! above one the verdict is k-sampled and majority-voted per model.

use std::collections::HashMap;
use std::sync::Arc;

use ragjury_core::MetadataValue;

use crate::model_client::{render, FieldKind, ResponseShape};
use crate::pipeline::{JudgeStep, MetricPipeline, Plan, StepSpec};

const ASPECT_PROMPT: &str = r#"Evaluate the response against a single criterion.

CRITERION:
{definition}

QUESTION:
{question}

RESPONSE:
{response}

Does the response satisfy the criterion?

Respond in JSON:
{
  "verdict": <boolean>,
  "reason": "<one-sentence justification>"
}"#;

/// Build an aspect-critic pipeline for the given criterion.
pub fn aspect_critic(aspect: impl Into<String>, definition: impl Into<String>) -> MetricPipeline {
    let aspect = aspect.into();
    let definition = definition.into();

    MetricPipeline {
        name: format!("aspect_critic/{aspect}"),
        guard: Arc::new(|sample| {
            match &sample.response {
                Some(response) if !response.trim().is_empty() => None,
                _ => Some("response is empty".to_string()),
            }
        }),
        plan: Arc::new(move |_config, _sample| {
            let definition = definition.clone();
            let mut metadata = HashMap::new();
            metadata.insert(
                "aspect".to_string(),
                MetadataValue::String(aspect.clone()),
            );

            Plan {
                steps: vec![StepSpec::Judge(JudgeStep {
                    name: "aspect_verdict".to_string(),
                    prompt: Arc::new(move |ctx| {
                        Ok(render(
                            ASPECT_PROMPT,
                            &[
                                ("definition", &definition),
                                ("question", ctx.sample.question.as_deref().unwrap_or("")),
                                ("response", ctx.sample.response.as_deref().unwrap_or("")),
                            ],
                        ))
                    }),
                    shape: ResponseShape::new().field("verdict", FieldKind::Bool),
                    vote_field: Some("verdict"),
                })],
                scoring: Arc::new(|value| {
                    value["verdict"]
                        .as_bool()
                        .map(|v| if v { 1.0 } else { 0.0 })
                        .ok_or_else(|| "missing verdict".to_string())
                }),
                metadata,
            }
        }),
    }
}
