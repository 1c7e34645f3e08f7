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

//! Faithfulness: is every statement in the response supported by the
//! retrieved contexts?
//!
//! State-carrying pipeline. Step one has each judge decompose the
//! response into atomic statements; step two has the same judge verify
//! *its own* statement list against the contexts; a final compute step
//! turns the verdicts into a supported fraction in [0, 1]. A response
//! with no extractable statements is vacuously faithful.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model_client::{render, FieldKind, ResponseShape};
use crate::pipeline::{ComputeStep, JudgeStep, MetricPipeline, Plan, StepSpec};

const EXTRACT_PROMPT: &str = r#"Break the response down into atomic factual statements.

QUESTION:
{question}

RESPONSE:
{response}

Rules:
- Extract only factual statements, not opinions or questions
- Each statement must be self-contained and independently verifiable
- Decompose compound statements into atomic parts

Respond in JSON:
{
  "statements": ["<statement>", ...]
}

If there are no factual statements, respond with: {"statements": []}"#;

const VERIFY_PROMPT: &str = r#"Verify each statement against the provided context.

CONTEXT:
{contexts}

STATEMENTS:
{statements}

For each statement, in order, answer true if it is supported by the
context and false otherwise.

Respond in JSON:
{
  "verdicts": [<boolean>, ...]
}"#;

pub fn faithfulness() -> MetricPipeline {
    MetricPipeline {
        name: "faithfulness".to_string(),
        guard: Arc::new(|sample| {
            match &sample.response {
                Some(response) if !response.trim().is_empty() => {}
                _ => return Some("response is empty".to_string()),
            }
            if sample.contexts.is_empty() {
                return Some("no retrieved contexts".to_string());
            }
            None
        }),
        plan: Arc::new(|_config, _sample| Plan {
            steps: vec![
                StepSpec::Judge(JudgeStep {
                    name: "extract_statements".to_string(),
                    prompt: Arc::new(|ctx| {
                        Ok(render(
                            EXTRACT_PROMPT,
                            &[
                                ("question", ctx.sample.question.as_deref().unwrap_or("")),
                                ("response", ctx.sample.response.as_deref().unwrap_or("")),
                            ],
                        ))
                    }),
                    shape: ResponseShape::new().field("statements", FieldKind::StringArray),
                    vote_field: None,
                }),
                // Each judge verifies the statements it extracted itself.
                StepSpec::Judge(JudgeStep {
                    name: "verify_statements".to_string(),
                    prompt: Arc::new(|ctx| {
                        let statements = ctx
                            .carried
                            .and_then(|v| v["statements"].as_array())
                            .ok_or_else(|| "no statements carried forward".to_string())?;
                        let listed = statements
                            .iter()
                            .filter_map(|s| s.as_str())
                            .enumerate()
                            .map(|(i, s)| format!("{}. {}", i + 1, s))
                            .collect::<Vec<_>>()
                            .join("\n");
                        Ok(render(
                            VERIFY_PROMPT,
                            &[
                                ("contexts", ctx.sample.contexts.join("\n\n").as_str()),
                                ("statements", listed.as_str()),
                            ],
                        ))
                    }),
                    shape: ResponseShape::new().field("verdicts", FieldKind::BoolArray),
                    vote_field: None,
                }),
                StepSpec::Compute(ComputeStep {
                    name: "supported_fraction".to_string(),
                    compute: Arc::new(|ctx| {
                        let verdicts = ctx
                            .carried
                            .and_then(|v| v["verdicts"].as_array())
                            .ok_or_else(|| "no verdicts carried forward".to_string())?;
                        let score = if verdicts.is_empty() {
                            1.0
                        } else {
                            let supported =
                                verdicts.iter().filter(|v| v.as_bool() == Some(true)).count();
                            supported as f64 / verdicts.len() as f64
                        };
                        Ok(serde_json::json!({ "score": score }))
                    }),
                }),
            ],
            scoring: Arc::new(|value| {
                value["score"]
                    .as_f64()
                    .ok_or_else(|| "missing score".to_string())
            }),
            metadata: HashMap::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragjury_core::{MetricConfiguration, Sample};

    fn rag_sample() -> Sample {
        Sample::new()
            .with_question("Where is the Eiffel Tower?")
            .with_response("The Eiffel Tower is in Paris. It was completed in 1889.")
            .with_contexts(vec![
                "The Eiffel Tower stands in Paris, France.".to_string(),
                "Construction finished in 1889.".to_string(),
            ])
    }

    #[test]
    fn guard_requires_response_and_contexts() {
        let metric = faithfulness();
        assert!((metric.guard)(&Sample::new()).is_some());
        assert!((metric.guard)(&Sample::new().with_response("Paris")).is_some());
        assert!((metric.guard)(&rag_sample()).is_none());
    }

    #[test]
    fn plan_is_extract_verify_reduce() {
        let metric = faithfulness();
        let plan = (metric.plan)(&MetricConfiguration::default(), &rag_sample());

        let names: Vec<_> = plan.steps.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["extract_statements", "verify_statements", "supported_fraction"]
        );
    }

    #[test]
    fn verify_prompt_lists_own_statements() {
        let metric = faithfulness();
        let sample = rag_sample();
        let config = MetricConfiguration::default();
        let plan = (metric.plan)(&config, &sample);

        let StepSpec::Judge(step) = &plan.steps[1] else {
            panic!("expected judge step");
        };
        let carried = serde_json::json!({
            "statements": ["The Eiffel Tower is in Paris.", "It was completed in 1889."]
        });
        let ctx = crate::pipeline::StepContext {
            sample: &sample,
            config: &config,
            model_id: "a",
            carried: Some(&carried),
        };
        let prompt = (step.prompt)(&ctx).unwrap();
        assert!(prompt.contains("1. The Eiffel Tower is in Paris."));
        assert!(prompt.contains("2. It was completed in 1889."));
        assert!(prompt.contains("stands in Paris, France"));
    }

    #[test]
    fn supported_fraction_counts_true_verdicts() {
        let metric = faithfulness();
        let sample = rag_sample();
        let config = MetricConfiguration::default();
        let plan = (metric.plan)(&config, &sample);

        let StepSpec::Compute(step) = &plan.steps[2] else {
            panic!("expected compute step");
        };

        let carried = serde_json::json!({"verdicts": [true, true, false, true]});
        let ctx = crate::pipeline::StepContext {
            sample: &sample,
            config: &config,
            model_id: "a",
            carried: Some(&carried),
        };
        let value = (step.compute)(&ctx).unwrap();
        assert_eq!(value["score"], 0.75);

        // no statements means vacuously faithful
        let carried = serde_json::json!({"verdicts": []});
        let ctx = crate::pipeline::StepContext {
            sample: &sample,
            config: &config,
            model_id: "a",
            carried: Some(&carried),
        };
        let value = (step.compute)(&ctx).unwrap();
        assert_eq!(value["score"], 1.0);
    }
}
