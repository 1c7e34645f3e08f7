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

//! Agent goal accuracy: did the interaction achieve the user's goal?
//!
//! Mode-branching pipeline. With a reference outcome on the sample the
//! judges compare the conversation's end state against it in one step.
//! Without one (or when explicitly requested) each judge first infers the
//! user goal from the transcript, then judges whether its own inferred
//! goal was achieved. The branch is fixed before any step runs; asking
//! for the reference branch without a reference silently downgrades.

use std::collections::HashMap;
use std::sync::Arc;

use ragjury_core::{GoalAccuracyMode, MetadataValue};

use crate::model_client::{render, FieldKind, ResponseShape};
use crate::pipeline::{JudgeStep, MetricPipeline, Plan, StepSpec};

const COMPARE_PROMPT: &str = r#"Compare the outcome of a conversation against the expected outcome.

CONVERSATION:
{transcript}

EXPECTED OUTCOME:
{reference}

Did the conversation achieve the expected outcome?

Respond in JSON:
{
  "verdict": <boolean>,
  "reason": "<one-sentence justification>"
}"#;

const INFER_PROMPT: &str = r#"Read the conversation and state the user's underlying goal.

CONVERSATION:
{transcript}

Respond in JSON:
{
  "goal": "<one-sentence statement of the user's goal>"
}"#;

const JUDGE_PROMPT: &str = r#"Judge whether the conversation achieved the user's goal.

USER GOAL:
{goal}

CONVERSATION:
{transcript}

Respond in JSON:
{
  "verdict": <boolean>,
  "reason": "<one-sentence justification>"
}"#;

fn verdict_scoring() -> crate::pipeline::ScoreFn {
    Arc::new(|value| {
        value["verdict"]
            .as_bool()
            .map(|v| if v { 1.0 } else { 0.0 })
            .ok_or_else(|| "missing verdict".to_string())
    })
}

pub fn goal_accuracy() -> MetricPipeline {
    MetricPipeline {
        name: "goal_accuracy".to_string(),
        guard: Arc::new(|sample| {
            if sample.conversation.is_empty() {
                Some("conversation is empty".to_string())
            } else {
                None
            }
        }),
        plan: Arc::new(|config, sample| {
            let use_reference = config.mode == GoalAccuracyMode::CompareToReference
                && sample.reference.is_some();

            let mut metadata = HashMap::new();
            metadata.insert(
                "branch".to_string(),
                MetadataValue::String(
                    if use_reference {
                        "compare_to_reference"
                    } else {
                        "infer_then_judge"
                    }
                    .to_string(),
                ),
            );

            let steps = if use_reference {
                vec![StepSpec::Judge(JudgeStep {
                    name: "compare_outcome".to_string(),
                    prompt: Arc::new(|ctx| {
                        let reference = ctx
                            .sample
                            .reference
                            .as_deref()
                            .ok_or_else(|| "reference missing".to_string())?;
                        Ok(render(
                            COMPARE_PROMPT,
                            &[
                                ("transcript", &ctx.sample.transcript()),
                                ("reference", reference),
                            ],
                        ))
                    }),
                    shape: ResponseShape::new().field("verdict", FieldKind::Bool),
                    vote_field: Some("verdict"),
                })]
            } else {
                vec![
                    StepSpec::Judge(JudgeStep {
                        name: "infer_goal".to_string(),
                        prompt: Arc::new(|ctx| {
                            Ok(render(
                                INFER_PROMPT,
                                &[("transcript", ctx.sample.transcript().as_str())],
                            ))
                        }),
                        shape: ResponseShape::new().field("goal", FieldKind::String),
                        vote_field: None,
                    }),
                    // Each judge grades against the goal it inferred itself.
                    StepSpec::Judge(JudgeStep {
                        name: "judge_goal".to_string(),
                        prompt: Arc::new(|ctx| {
                            let goal = ctx
                                .carried
                                .and_then(|v| v["goal"].as_str())
                                .ok_or_else(|| "no inferred goal carried forward".to_string())?;
                            Ok(render(
                                JUDGE_PROMPT,
                                &[
                                    ("goal", goal),
                                    ("transcript", ctx.sample.transcript().as_str()),
                                ],
                            ))
                        }),
                        shape: ResponseShape::new().field("verdict", FieldKind::Bool),
                        vote_field: Some("verdict"),
                    }),
                ]
            };

            Plan {
                steps,
                scoring: verdict_scoring(),
                metadata,
            }
        }),
    }
}
