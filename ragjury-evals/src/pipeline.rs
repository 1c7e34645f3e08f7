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

//! Declarative metric pipelines and the generic runner.
//!
//! A metric is data, not a subclass: an ordered list of step descriptors
//! plus a terminal scoring rule, chosen once per evaluation as a pure
//! function of `(config, sample)` and interpreted by [`JuryEngine`].
//! Steps run strictly in order; within a step, execution fans out
//! concurrently across the active models.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};
use uuid::Uuid;

use ragjury_core::{
    EvaluationResult, ExclusionRecord, MetadataValue, MetricConfiguration, Sample,
};

use crate::active_set::ActiveModelSet;
use crate::aggregate::aggregate;
use crate::executor::{run_compute_step, run_judge_step};
use crate::model_client::{ModelClient, ResponseShape};
use crate::notifier::{EvalEvent, EventSink};
use crate::EvalError;

/// Per-model view handed to prompt materializers and compute functions.
pub struct StepContext<'a> {
    pub sample: &'a Sample,
    pub config: &'a MetricConfiguration,
    pub model_id: &'a str,
    /// This model's output from the previous step, if any.
    pub carried: Option<&'a Value>,
}

/// Materializes one model's prompt for a judge step.
pub type PromptFn = Arc<dyn Fn(&StepContext) -> Result<String, String> + Send + Sync>;

/// Pure per-model reduction for a compute step.
pub type ComputeFn = Arc<dyn Fn(&StepContext) -> Result<Value, String> + Send + Sync>;

/// Turns a model's terminal step value into its score-board entry.
pub type ScoreFn = Arc<dyn Fn(&Value) -> Result<f64, String> + Send + Sync>;

/// Degenerate-input check, run before the pipeline starts. Returning
/// `Some(reason)` short-circuits to a `score: None` result.
pub type GuardFn = Arc<dyn Fn(&Sample) -> Option<String> + Send + Sync>;

/// Chooses the step sequence for one evaluation. Must be pure: identical
/// `(config, sample)` always yield the identical plan.
pub type PlanFn = Arc<dyn Fn(&MetricConfiguration, &Sample) -> Plan + Send + Sync>;

/// One judge-model step: a prompt per model plus the reply shape.
pub struct JudgeStep {
    pub name: String,
    pub prompt: PromptFn,
    pub shape: ResponseShape,
    /// Boolean reply field resolved by majority vote when the configured
    /// strictness is above one.
    pub vote_field: Option<&'static str>,
}

/// One local compute step mapped over the active set.
pub struct ComputeStep {
    pub name: String,
    pub compute: ComputeFn,
}

pub enum StepSpec {
    Judge(JudgeStep),
    Compute(ComputeStep),
}

impl StepSpec {
    pub fn name(&self) -> &str {
        match self {
            StepSpec::Judge(step) => &step.name,
            StepSpec::Compute(step) => &step.name,
        }
    }
}

/// The step sequence selected for one evaluation.
pub struct Plan {
    pub steps: Vec<StepSpec>,
    pub scoring: ScoreFn,
    /// Metric-specific extras copied into the result (chosen branch, ...).
    pub metadata: HashMap<String, MetadataValue>,
}

/// A metric definition. Stateless and safely shared across concurrent
/// evaluations of different samples.
pub struct MetricPipeline {
    pub name: String,
    pub guard: GuardFn,
    pub plan: PlanFn,
}

/// The evaluation engine: a panel of judge models behind one client.
///
/// All mutable state (active set, carried values, score board, sink) is
/// created fresh inside [`JuryEngine::evaluate`]; nothing is pooled or
/// reused across evaluations.
pub struct JuryEngine {
    client: Arc<dyn ModelClient>,
    model_ids: Vec<String>,
}

impl JuryEngine {
    pub fn new(client: Arc<dyn ModelClient>, model_ids: Vec<String>) -> Self {
        Self { client, model_ids }
    }

    /// Models configured for this engine.
    pub fn model_ids(&self) -> &[String] {
        &self.model_ids
    }

    /// Run one metric over one sample.
    ///
    /// Returns the aggregated result, or [`EvalError::AllModelsFailed`]
    /// when a step leaves no model standing. Per-model failures short of
    /// that are recorded as exclusions, never raised.
    pub async fn evaluate(
        &self,
        metric: &MetricPipeline,
        sample: &Sample,
        config: &MetricConfiguration,
        sink: &dyn EventSink,
    ) -> Result<EvaluationResult, EvalError> {
        let evaluation_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let models = if config.models.is_empty() {
            self.model_ids.clone()
        } else {
            config.models.clone()
        };
        if models.is_empty() {
            return Err(EvalError::NoModels);
        }

        sink.emit(EvalEvent::BeforeEvaluation {
            evaluation_id,
            metric_name: metric.name.clone(),
            models: models.clone(),
        });

        // Metric-specific degenerate inputs resolve before any step runs.
        if let Some(reason) = (metric.guard)(sample) {
            debug!(metric = %metric.name, %reason, "degenerate input, skipping pipeline");
            let mut metadata = HashMap::new();
            metadata.insert("skipped_reason".to_string(), MetadataValue::String(reason));
            let result = EvaluationResult {
                metric_name: metric.name.clone(),
                score: None,
                per_model_scores: HashMap::new(),
                excluded_models: Vec::new(),
                duration_ms: start.elapsed().as_millis() as u64,
                started_at,
                sample: sample.clone(),
                config: config.clone(),
                metadata,
            };
            sink.emit(EvalEvent::AfterEvaluation {
                evaluation_id,
                result: Box::new(result.clone()),
            });
            return Ok(result);
        }

        // Branch selection happens exactly once, before execution.
        let plan = (metric.plan)(config, sample);
        let total_steps = plan.steps.len();

        let mut active = ActiveModelSet::new(models);
        let mut carried: HashMap<String, Value> = HashMap::new();
        let limiter = config
            .max_concurrent
            .map(|bound| Arc::new(Semaphore::new(bound)));

        for (step_index, step) in plan.steps.iter().enumerate() {
            sink.emit(EvalEvent::BeforeStep {
                evaluation_id,
                step_name: step.name().to_string(),
                step_index,
                total_steps,
                active_models: active.ids().to_vec(),
            });

            let (results, prompt) = match step {
                StepSpec::Judge(judge) => {
                    run_judge_step(
                        Arc::clone(&self.client),
                        judge,
                        step_index,
                        sample,
                        config,
                        active.ids(),
                        &carried,
                        limiter.clone(),
                    )
                    .await
                }
                StepSpec::Compute(compute) => (
                    run_compute_step(compute, step_index, sample, config, active.ids(), &carried),
                    None,
                ),
            };

            sink.emit(EvalEvent::AfterStep {
                evaluation_id,
                step_name: step.name().to_string(),
                step_index,
                results: results.clone(),
                prompt,
            });

            for result in results {
                if let Some(value) = result.value {
                    carried.insert(result.model_id, value);
                } else {
                    let record = ExclusionRecord {
                        model_id: result.model_id.clone(),
                        failed_step_name: result.step_name.clone(),
                        failed_step_index: result.step_index,
                        cause: result.error.unwrap_or_else(|| "unknown".to_string()),
                    };
                    carried.remove(&record.model_id);
                    if active.exclude(record.clone()) {
                        sink.emit(EvalEvent::ModelExcluded {
                            evaluation_id,
                            record,
                        });
                    }
                }
            }

            if active.is_empty() {
                error!(metric = %metric.name, step = step.name(), "all models failed");
                return Err(EvalError::AllModelsFailed {
                    step_name: step.name().to_string(),
                    step_index,
                });
            }
        }

        // Terminal scoring populates the score board; a model whose final
        // value does not map to a score is excluded like any other failure.
        let last_index = total_steps.saturating_sub(1);
        let last_name = plan
            .steps
            .last()
            .map(|s| s.name().to_string())
            .unwrap_or_default();

        let mut score_board: HashMap<String, f64> = HashMap::new();
        for model_id in active.ids().to_vec() {
            let value = &carried[&model_id];
            match (plan.scoring)(value) {
                Ok(score) => {
                    score_board.insert(model_id, score);
                }
                Err(cause) => {
                    let record = ExclusionRecord {
                        model_id: model_id.clone(),
                        failed_step_name: last_name.clone(),
                        failed_step_index: last_index,
                        cause,
                    };
                    if active.exclude(record.clone()) {
                        sink.emit(EvalEvent::ModelExcluded {
                            evaluation_id,
                            record,
                        });
                    }
                }
            }
        }

        if score_board.is_empty() {
            error!(metric = %metric.name, step = %last_name, "all models failed");
            return Err(EvalError::AllModelsFailed {
                step_name: last_name,
                step_index: last_index,
            });
        }

        let score = aggregate(&score_board, config.aggregation);

        let result = EvaluationResult {
            metric_name: metric.name.clone(),
            score: Some(score),
            per_model_scores: score_board,
            excluded_models: active.into_exclusions(),
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
            sample: sample.clone(),
            config: config.clone(),
            metadata: plan.metadata,
        };

        info!(
            metric = %metric.name,
            score,
            excluded = result.excluded_models.len(),
            duration_ms = result.duration_ms,
            "evaluation complete"
        );

        sink.emit(EvalEvent::AfterEvaluation {
            evaluation_id,
            result: Box::new(result.clone()),
        });

        Ok(result)
    }

    /// Synchronous wrapper: blocks on [`JuryEngine::evaluate`] with a
    /// private runtime. Must not be called from inside a tokio runtime.
    pub fn evaluate_blocking(
        &self,
        metric: &MetricPipeline,
        sample: &Sample,
        config: &MetricConfiguration,
        sink: &dyn EventSink,
    ) -> Result<EvaluationResult, EvalError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.evaluate(metric, sample, config, sink))
    }
}
