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

//! End-to-end pipeline runs against a scripted judge panel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ragjury_core::{
    ConversationTurn, GoalAccuracyMode, MetricConfiguration, Sample,
};
use ragjury_evals::metrics::{aspect_critic, faithfulness, goal_accuracy};
use ragjury_evals::{
    EvalError, EvalEvent, JuryEngine, ModelClient, ModelError, RecordingSink, ResponseShape,
};

/// Judge panel stub: each model consumes a queue of canned replies, one
/// per call, in step order.
struct ScriptedPanel {
    replies: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPanel {
    fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script(self, model_id: &str, replies: Vec<Result<Value, String>>) -> Self {
        self.replies
            .lock()
            .insert(model_id.to_string(), replies.into_iter().collect());
        self
    }

    fn calls_for(&self, model_id: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == model_id).count()
    }
}

#[async_trait]
impl ModelClient for ScriptedPanel {
    async fn call(
        &self,
        model_id: &str,
        _prompt: &str,
        shape: &ResponseShape,
    ) -> Result<Value, ModelError> {
        self.calls.lock().push(model_id.to_string());
        let reply = self
            .replies
            .lock()
            .get_mut(model_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted reply left for {model_id}"));
        match reply {
            Ok(value) => {
                shape.validate(&value).map_err(ModelError::Verdict)?;
                Ok(value)
            }
            Err(cause) => Err(ModelError::Api(cause)),
        }
    }
}

fn engine(panel: ScriptedPanel, models: &[&str]) -> (JuryEngine, Arc<ScriptedPanel>) {
    let panel = Arc::new(panel);
    let engine = JuryEngine::new(
        Arc::clone(&panel) as Arc<dyn ModelClient>,
        models.iter().map(|m| m.to_string()).collect(),
    );
    (engine, panel)
}

fn booking_sample() -> Sample {
    Sample::new().with_conversation(vec![
        ConversationTurn::user("Book me a table for two tonight"),
        ConversationTurn::assistant("Booked for 7pm at Chez Nous."),
    ])
}

fn rag_sample() -> Sample {
    Sample::new()
        .with_question("Where is the Eiffel Tower?")
        .with_response("The Eiffel Tower is in Paris. It opened in 1889.")
        .with_contexts(vec![
            "The Eiffel Tower stands in Paris, France.".to_string(),
            "It opened in 1889.".to_string(),
        ])
}

// Scenario A: two judges disagree on goal attainment; average is 0.5.
#[tokio::test]
async fn split_verdicts_average_to_half() {
    let panel = ScriptedPanel::new()
        .script("alpha", vec![Ok(json!({"verdict": true}))])
        .script("beta", vec![Ok(json!({"verdict": false}))]);
    let (engine, _) = engine(panel, &["alpha", "beta"]);

    let sample = booking_sample().with_reference("A table for two is booked tonight.");
    let config = MetricConfiguration::default().with_mode(GoalAccuracyMode::CompareToReference);
    let sink = RecordingSink::new();

    let result = engine
        .evaluate(&goal_accuracy(), &sample, &config, &sink)
        .await
        .unwrap();

    assert_eq!(result.score, Some(0.5));
    assert_eq!(result.per_model_scores.len(), 2);
    assert_eq!(result.per_model_scores["alpha"], 1.0);
    assert_eq!(result.per_model_scores["beta"], 0.0);
    assert!(result.excluded_models.is_empty());
}

// Scenario B: reference branch requested without a reference downgrades
// to the two-step infer-then-judge branch instead of failing.
#[tokio::test]
async fn missing_reference_downgrades_branch() {
    let panel = ScriptedPanel::new().script(
        "alpha",
        vec![
            Ok(json!({"goal": "book a table for two"})),
            Ok(json!({"verdict": true})),
        ],
    );
    let (engine, _) = engine(panel, &["alpha"]);

    let sample = booking_sample();
    let config = MetricConfiguration::default().with_mode(GoalAccuracyMode::CompareToReference);
    let sink = RecordingSink::new();

    let result = engine
        .evaluate(&goal_accuracy(), &sample, &config, &sink)
        .await
        .unwrap();

    assert_eq!(result.score, Some(1.0));

    let step_names: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            EvalEvent::BeforeStep { step_name, .. } => Some(step_name),
            _ => None,
        })
        .collect();
    assert_eq!(step_names, vec!["infer_goal", "judge_goal"]);
}

// Scenario C: one judge fails at the first step; the remaining two carry
// the evaluation and the failure is recorded once.
#[tokio::test]
async fn first_step_failure_excludes_model_for_good() {
    let panel = ScriptedPanel::new()
        .script(
            "alpha",
            vec![
                Ok(json!({"statements": ["The Eiffel Tower is in Paris.", "It opened in 1889."]})),
                Ok(json!({"verdicts": [true, true]})),
            ],
        )
        .script(
            "beta",
            vec![
                Ok(json!({"statements": ["The Eiffel Tower is in Paris."]})),
                Ok(json!({"verdicts": [false]})),
            ],
        )
        .script("gamma", vec![Err("503 from provider".to_string())]);
    let (engine, panel) = engine(panel, &["alpha", "beta", "gamma"]);

    let sink = RecordingSink::new();
    let result = engine
        .evaluate(
            &faithfulness(),
            &rag_sample(),
            &MetricConfiguration::default(),
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(result.excluded_models.len(), 1);
    let exclusion = &result.excluded_models[0];
    assert_eq!(exclusion.model_id, "gamma");
    assert_eq!(exclusion.failed_step_name, "extract_statements");
    assert_eq!(exclusion.failed_step_index, 0);

    assert_eq!(result.per_model_scores.len(), 2);
    assert_eq!(result.per_model_scores["alpha"], 1.0);
    assert_eq!(result.per_model_scores["beta"], 0.0);
    assert_eq!(result.score, Some(0.5));

    // gamma was never re-offered work after its first failure
    assert_eq!(panel.calls_for("gamma"), 1);

    // later steps ran over the shrunken active set only
    for event in sink.events() {
        if let EvalEvent::AfterStep {
            step_index,
            results,
            ..
        } = event
        {
            if step_index > 0 {
                assert_eq!(results.len(), 2);
                assert!(results.iter().all(|r| r.model_id != "gamma"));
            }
        }
    }
}

// Scenario D: every judge fails; the evaluation aborts with a fatal
// error and AfterEvaluation never fires.
#[tokio::test]
async fn all_models_failing_is_fatal() {
    let panel = ScriptedPanel::new()
        .script("alpha", vec![Err("timeout".to_string())])
        .script("beta", vec![Err("bad gateway".to_string())]);
    let (engine, _) = engine(panel, &["alpha", "beta"]);

    let sample = Sample::new()
        .with_question("Is this fine?")
        .with_response("Absolutely fine.");
    let sink = RecordingSink::new();

    let err = engine
        .evaluate(
            &aspect_critic("harmlessness", "The response is harmless."),
            &sample,
            &MetricConfiguration::default(),
            &sink,
        )
        .await
        .unwrap_err();

    match err {
        EvalError::AllModelsFailed {
            step_name,
            step_index,
        } => {
            assert_eq!(step_name, "aspect_verdict");
            assert_eq!(step_index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }

    let names = sink.event_names();
    assert!(!names.contains(&"after_evaluation"));
    // the step itself still ran to completion and was reported
    assert!(names.contains(&"after_step"));
}

// Scenario E: self-consistency with k=3 still yields exactly one result
// for the model in the step.
#[tokio::test]
async fn majority_vote_keeps_one_result_per_model() {
    let panel = ScriptedPanel::new().script(
        "alpha",
        vec![
            Ok(json!({"verdict": true})),
            Ok(json!({"verdict": false})),
            Ok(json!({"verdict": true})),
        ],
    );
    let (engine, panel) = engine(panel, &["alpha"]);

    let sample = Sample::new()
        .with_question("Is this fine?")
        .with_response("Absolutely fine.");
    let config = MetricConfiguration::default().with_strictness(3);
    let sink = RecordingSink::new();

    let result = engine
        .evaluate(
            &aspect_critic("harmlessness", "The response is harmless."),
            &sample,
            &config,
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(panel.calls_for("alpha"), 3);
    assert_eq!(result.score, Some(1.0));

    for event in sink.events() {
        if let EvalEvent::AfterStep { results, .. } = event {
            assert_eq!(results.len(), 1);
        }
    }
}

#[tokio::test]
async fn event_stream_is_ordered() {
    let panel = ScriptedPanel::new().script(
        "alpha",
        vec![
            Ok(json!({"goal": "book a table"})),
            Ok(json!({"verdict": true})),
        ],
    );
    let (engine, _) = engine(panel, &["alpha"]);

    let sink = RecordingSink::new();
    engine
        .evaluate(
            &goal_accuracy(),
            &booking_sample(),
            &MetricConfiguration::default().with_mode(GoalAccuracyMode::InferThenJudge),
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(
        sink.event_names(),
        vec![
            "before_evaluation",
            "before_step",
            "after_step",
            "before_step",
            "after_step",
            "after_evaluation",
        ]
    );
}

#[tokio::test]
async fn step_results_match_active_set_size() {
    let panel = ScriptedPanel::new()
        .script(
            "alpha",
            vec![
                Ok(json!({"statements": ["s1"]})),
                Ok(json!({"verdicts": [true]})),
            ],
        )
        .script(
            "beta",
            vec![
                Ok(json!({"statements": ["s1", "s2"]})),
                Err("flaky".to_string()),
            ],
        );
    let (engine, _) = engine(panel, &["alpha", "beta"]);

    let sink = RecordingSink::new();
    engine
        .evaluate(
            &faithfulness(),
            &rag_sample(),
            &MetricConfiguration::default(),
            &sink,
        )
        .await
        .unwrap();

    let mut active_sizes: HashMap<usize, usize> = HashMap::new();
    for event in sink.events() {
        match event {
            EvalEvent::BeforeStep {
                step_index,
                active_models,
                ..
            } => {
                active_sizes.insert(step_index, active_models.len());
            }
            EvalEvent::AfterStep {
                step_index,
                results,
                ..
            } => {
                assert_eq!(results.len(), active_sizes[&step_index]);
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn degenerate_input_returns_absent_score_before_any_step() {
    let panel = ScriptedPanel::new();
    let (engine, panel) = engine(panel, &["alpha"]);

    // faithfulness without contexts never reaches the panel
    let sample = Sample::new().with_response("Paris is nice.");
    let sink = RecordingSink::new();

    let result = engine
        .evaluate(
            &faithfulness(),
            &sample,
            &MetricConfiguration::default(),
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(result.score, None);
    assert!(!result.passed());
    assert_eq!(panel.calls_for("alpha"), 0);
    assert_eq!(
        sink.event_names(),
        vec!["before_evaluation", "after_evaluation"]
    );
}

#[tokio::test]
async fn config_model_override_narrows_panel() {
    let panel = ScriptedPanel::new().script("beta", vec![Ok(json!({"verdict": true}))]);
    let (engine, panel) = engine(panel, &["alpha", "beta"]);

    let sample = Sample::new()
        .with_question("Is this fine?")
        .with_response("Absolutely fine.");
    let config = MetricConfiguration::default().with_models(["beta"]);
    let sink = RecordingSink::new();

    let result = engine
        .evaluate(
            &aspect_critic("harmlessness", "The response is harmless."),
            &sample,
            &config,
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(result.per_model_scores.len(), 1);
    assert!(result.per_model_scores.contains_key("beta"));
    assert_eq!(panel.calls_for("alpha"), 0);
}

#[test]
fn blocking_entry_point_matches_async() {
    let panel = ScriptedPanel::new().script("alpha", vec![Ok(json!({"verdict": true}))]);
    let (engine, _) = engine(panel, &["alpha"]);

    let sample = Sample::new()
        .with_question("Is this fine?")
        .with_response("Absolutely fine.");
    let sink = RecordingSink::new();

    let result = engine
        .evaluate_blocking(
            &aspect_critic("harmlessness", "The response is harmless."),
            &sample,
            &MetricConfiguration::default(),
            &sink,
        )
        .unwrap();

    assert_eq!(result.score, Some(1.0));
}
