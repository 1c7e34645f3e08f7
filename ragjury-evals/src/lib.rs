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

//! # Ragjury evaluation engine
//!
//! Scores AI-generated conversational and retrieval responses by fanning
//! each judging step out to a panel of judge models in parallel, tolerating
//! individual model failures, and aggregating the surviving verdicts into
//! one score.
//!
//! ## Features
//!
//! - **Declarative pipelines**: each metric is an ordered list of step
//!   descriptors plus a scoring rule, interpreted by one generic runner
//! - **Failure isolation**: a model is excluded on its first failure; the
//!   evaluation continues with the rest and only aborts when no model is left
//! - **State-carrying steps**: a step may embed each model's own previous
//!   output in its prompt
//! - **Self-consistency**: judge verdicts can be k-sampled and majority-voted
//! - **Ordered event stream**: progress and explanations for external reporting
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragjury_evals::{metrics, JuryEngine, NullSink, OpenAiClient};
//! use ragjury_core::{MetricConfiguration, Sample};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(OpenAiClient::new(std::env::var("OPENAI_API_KEY")?));
//!     let engine = JuryEngine::new(client, vec![
//!         "gpt-4o-mini".to_string(),
//!         "gpt-4o".to_string(),
//!     ]);
//!
//!     let sample = Sample::new()
//!         .with_question("What is the capital of France?")
//!         .with_response("Paris.")
//!         .with_contexts(vec!["Paris is the capital of France.".to_string()]);
//!
//!     let metric = metrics::faithfulness();
//!     let result = engine
//!         .evaluate(&metric, &sample, &MetricConfiguration::default(), &NullSink)
//!         .await?;
//!     println!("faithfulness: {:?}", result.score);
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod active_set;
pub mod aggregate;
pub mod executor;
pub mod metrics;
pub mod model_client;
pub mod notifier;
pub mod openai;
pub mod pipeline;

pub use active_set::ActiveModelSet;
pub use aggregate::aggregate;
pub use executor::ModelResult;
pub use model_client::{render, FieldKind, ModelClient, ModelError, ResponseShape, VerdictError};
pub use notifier::{ChannelSink, EvalEvent, EventSink, NullSink, RecordingSink};
pub use openai::OpenAiClient;
pub use pipeline::{
    ComputeStep, JudgeStep, JuryEngine, MetricPipeline, Plan, StepContext, StepSpec,
};

/// Errors that abort a whole evaluation.
///
/// Individual model failures are never raised; they surface as exclusions
/// on the result. Only a step with zero surviving models is fatal.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("all models failed at step '{step_name}' (index {step_index})")]
    AllModelsFailed {
        step_name: String,
        step_index: usize,
    },

    #[error("no judge models configured")]
    NoModels,

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
