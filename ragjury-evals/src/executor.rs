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

//! Step execution: concurrent fan-out of one step across the active set.
//!
//! A judge step spawns one task per active model and waits for all of
//! them; the step is a full barrier. One model's latency, failure, or
//! panic never blocks or corrupts another model's outcome, and a failed
//! sibling does not cancel in-flight peers. A compute step maps over the
//! active set synchronously.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use ragjury_core::{MetricConfiguration, Sample};

use crate::model_client::ModelClient;
use crate::pipeline::{ComputeStep, JudgeStep, StepContext};

/// Outcome of one model's participation in one step.
///
/// Produced exactly once per (model, step) pair. Consumers must index by
/// `model_id`; the order of results within a step carries no meaning.
#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub model_id: String,
    pub step_name: String,
    pub step_index: usize,
    /// Decoded, shape-validated value on success.
    pub value: Option<Value>,
    /// Failure cause when `value` is absent.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ModelResult {
    pub fn success(
        model_id: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        value: Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            step_name: step_name.into(),
            step_index,
            value: Some(value),
            error: None,
            duration_ms,
        }
    }

    pub fn failure(
        model_id: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        cause: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            step_name: step_name.into(),
            step_index,
            value: None,
            error: Some(cause.into()),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

/// Run one judge step over the active set.
///
/// Returns one [`ModelResult`] per active model plus the representative
/// prompt (the first one that materialized) for the `AfterStep` event.
pub(crate) async fn run_judge_step(
    client: Arc<dyn ModelClient>,
    step: &JudgeStep,
    step_index: usize,
    sample: &Sample,
    config: &MetricConfiguration,
    active: &[String],
    carried: &HashMap<String, Value>,
    limiter: Option<Arc<Semaphore>>,
) -> (Vec<ModelResult>, Option<String>) {
    let step_name = step.name.clone();
    let repeats = if step.vote_field.is_some() {
        config.strictness.max(1)
    } else {
        1
    };

    debug!(
        step = %step_name,
        models = active.len(),
        repeats,
        "dispatching judge step"
    );

    let mut representative_prompt: Option<String> = None;
    let mut results = Vec::with_capacity(active.len());
    let mut handles = Vec::new();

    for model_id in active {
        // Prompts are materialized per model up front, since a step may
        // embed that model's own prior-step output.
        let ctx = StepContext {
            sample,
            config,
            model_id,
            carried: carried.get(model_id),
        };
        let prompt = match (step.prompt)(&ctx) {
            Ok(prompt) => prompt,
            Err(cause) => {
                results.push(ModelResult::failure(
                    model_id,
                    &step_name,
                    step_index,
                    cause,
                    0,
                ));
                continue;
            }
        };
        if representative_prompt.is_none() {
            representative_prompt = Some(prompt.clone());
        }

        let client = Arc::clone(&client);
        let shape = step.shape.clone();
        let vote_field = step.vote_field;
        let name = step_name.clone();
        let model = model_id.clone();
        let limiter = limiter.clone();

        handles.push((
            model_id.clone(),
            tokio::spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let start = Instant::now();

                let mut votes: Vec<bool> = Vec::with_capacity(repeats);
                let mut last_value: Option<Value> = None;
                let mut last_error: Option<String> = None;

                for _ in 0..repeats {
                    match client.call(&model, &prompt, &shape).await {
                        Ok(value) => {
                            if let Some(field) = vote_field {
                                if let Some(vote) = value[field].as_bool() {
                                    votes.push(vote);
                                }
                            }
                            last_value = Some(value);
                        }
                        Err(e) => {
                            error!(model = %model, step = %name, "judge call failed: {e}");
                            last_error = Some(e.to_string());
                        }
                    }
                }

                let duration_ms = start.elapsed().as_millis() as u64;

                match last_value {
                    Some(mut value) => {
                        // Majority vote over the successful repetitions;
                        // a tie counts as a negative verdict.
                        if let Some(field) = vote_field {
                            let positives = votes.iter().filter(|v| **v).count();
                            let verdict = positives * 2 > votes.len();
                            value[field] = Value::Bool(verdict);
                        }
                        ModelResult::success(&model, &name, step_index, value, duration_ms)
                    }
                    None => ModelResult::failure(
                        &model,
                        &name,
                        step_index,
                        last_error.unwrap_or_else(|| "no response".to_string()),
                        duration_ms,
                    ),
                }
            }),
        ));
    }

    // Full barrier: every task is awaited, success or failure.
    let joined = join_all(
        handles
            .into_iter()
            .map(|(model_id, handle)| async move { (model_id, handle.await) }),
    )
    .await;

    for (model_id, outcome) in joined {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                error!(model = %model_id, step = %step_name, "judge task panicked: {e}");
                results.push(ModelResult::failure(
                    &model_id,
                    &step_name,
                    step_index,
                    format!("task panicked: {e}"),
                    0,
                ));
            }
        }
    }

    (results, representative_prompt)
}

/// Run one compute step over the active set.
///
/// Pure per-model reduction of already-gathered data; never suspends.
pub(crate) fn run_compute_step(
    step: &ComputeStep,
    step_index: usize,
    sample: &Sample,
    config: &MetricConfiguration,
    active: &[String],
    carried: &HashMap<String, Value>,
) -> Vec<ModelResult> {
    active
        .iter()
        .map(|model_id| {
            let ctx = StepContext {
                sample,
                config,
                model_id,
                carried: carried.get(model_id),
            };
            match (step.compute)(&ctx) {
                Ok(value) => ModelResult::success(model_id, &step.name, step_index, value, 0),
                Err(cause) => {
                    // A computation undefined for this model's data is a
                    // normal per-model failure, not a fatal condition.
                    ModelResult::failure(model_id, &step.name, step_index, cause, 0)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::{FieldKind, ModelError, ResponseShape};
    use crate::pipeline::JudgeStep;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Scripted client: per-model queue of canned replies.
    struct ScriptedClient {
        replies: Mutex<HashMap<String, Vec<Result<Value, String>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                replies: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn script(self, model_id: &str, replies: Vec<Result<Value, String>>) -> Self {
            self.replies.lock().insert(model_id.to_string(), replies);
            self
        }

        fn call_count(&self, model_id: &str) -> usize {
            self.calls.lock().iter().filter(|m| *m == model_id).count()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn call(
            &self,
            model_id: &str,
            _prompt: &str,
            shape: &ResponseShape,
        ) -> Result<Value, ModelError> {
            self.calls.lock().push(model_id.to_string());
            let reply = {
                let mut replies = self.replies.lock();
                let queue = replies
                    .get_mut(model_id)
                    .unwrap_or_else(|| panic!("no script for {model_id}"));
                if queue.len() > 1 {
                    queue.remove(0)
                } else {
                    queue[0].clone()
                }
            };
            match reply {
                Ok(value) => {
                    shape.validate(&value).map_err(ModelError::Verdict)?;
                    Ok(value)
                }
                Err(cause) => Err(ModelError::Api(cause)),
            }
        }
    }

    fn verdict_step(name: &str) -> JudgeStep {
        JudgeStep {
            name: name.to_string(),
            prompt: Arc::new(|_ctx| Ok("judge".to_string())),
            shape: ResponseShape::new().field("verdict", FieldKind::Bool),
            vote_field: Some("verdict"),
        }
    }

    fn active(models: &[&str]) -> Vec<String> {
        models.iter().map(|m| m.to_string()).collect()
    }

    #[tokio::test]
    async fn one_result_per_active_model() {
        let client = Arc::new(
            ScriptedClient::new()
                .script("a", vec![Ok(serde_json::json!({"verdict": true}))])
                .script("b", vec![Err("boom".to_string())]),
        );

        let sample = Sample::new();
        let config = MetricConfiguration::default();
        let (results, prompt) = run_judge_step(
            client,
            &verdict_step("step-1"),
            0,
            &sample,
            &config,
            &active(&["a", "b"]),
            &HashMap::new(),
            None,
        )
        .await;

        assert_eq!(results.len(), 2);
        assert!(prompt.is_some());

        let by_id: HashMap<_, _> = results.iter().map(|r| (r.model_id.as_str(), r)).collect();
        assert!(by_id["a"].is_success());
        assert!(!by_id["b"].is_success());
        assert!(by_id["b"].error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn majority_vote_produces_single_result() {
        let client = Arc::new(ScriptedClient::new().script(
            "a",
            vec![
                Ok(serde_json::json!({"verdict": true})),
                Ok(serde_json::json!({"verdict": false})),
                Ok(serde_json::json!({"verdict": true})),
            ],
        ));

        let sample = Sample::new();
        let config = MetricConfiguration::default().with_strictness(3);
        let (results, _) = run_judge_step(
            Arc::clone(&client) as Arc<dyn ModelClient>,
            &verdict_step("step-1"),
            0,
            &sample,
            &config,
            &active(&["a"]),
            &HashMap::new(),
            None,
        )
        .await;

        assert_eq!(results.len(), 1);
        assert_eq!(client.call_count("a"), 3);
        assert_eq!(results[0].value.as_ref().unwrap()["verdict"], Value::Bool(true));
    }

    #[tokio::test]
    async fn majority_vote_tie_is_negative() {
        let client = Arc::new(ScriptedClient::new().script(
            "a",
            vec![
                Ok(serde_json::json!({"verdict": true})),
                Ok(serde_json::json!({"verdict": false})),
            ],
        ));

        let sample = Sample::new();
        let config = MetricConfiguration::default().with_strictness(2);
        let (results, _) = run_judge_step(
            client,
            &verdict_step("step-1"),
            0,
            &sample,
            &config,
            &active(&["a"]),
            &HashMap::new(),
            None,
        )
        .await;

        assert_eq!(results[0].value.as_ref().unwrap()["verdict"], Value::Bool(false));
    }

    #[tokio::test]
    async fn prompt_failure_skips_model_without_calling() {
        let client = Arc::new(
            ScriptedClient::new().script("b", vec![Ok(serde_json::json!({"verdict": true}))]),
        );

        let step = JudgeStep {
            name: "step-1".to_string(),
            prompt: Arc::new(|ctx| {
                if ctx.model_id == "a" {
                    Err("no carried state".to_string())
                } else {
                    Ok("judge".to_string())
                }
            }),
            shape: ResponseShape::new().field("verdict", FieldKind::Bool),
            vote_field: None,
        };

        let sample = Sample::new();
        let config = MetricConfiguration::default();
        let (results, _) = run_judge_step(
            Arc::clone(&client) as Arc<dyn ModelClient>,
            &step,
            0,
            &sample,
            &config,
            &active(&["a", "b"]),
            &HashMap::new(),
            None,
        )
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(client.call_count("a"), 0);
        let by_id: HashMap<_, _> = results.iter().map(|r| (r.model_id.as_str(), r)).collect();
        assert!(!by_id["a"].is_success());
        assert!(by_id["b"].is_success());
    }

    #[test]
    fn compute_step_maps_carried_state() {
        let step = ComputeStep {
            name: "fraction".to_string(),
            compute: Arc::new(|ctx| {
                let carried = ctx.carried.ok_or("missing state")?;
                Ok(serde_json::json!({ "score": carried["n"].as_f64().unwrap_or(0.0) / 2.0 }))
            }),
        };

        let mut carried = HashMap::new();
        carried.insert("a".to_string(), serde_json::json!({"n": 1.0}));

        let sample = Sample::new();
        let config = MetricConfiguration::default();
        let results = run_compute_step(&step, 1, &sample, &config, &active(&["a", "b"]), &carried);

        let by_id: HashMap<_, _> = results.iter().map(|r| (r.model_id.as_str(), r)).collect();
        assert_eq!(by_id["a"].value.as_ref().unwrap()["score"], 0.5);
        assert!(!by_id["b"].is_success());
    }
}
