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

//! Result contract consumed by reporting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MetricConfiguration;
use crate::sample::Sample;

/// Type-safe metric-specific metadata values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    Array(Vec<MetadataValue>),
    Json(serde_json::Value),
}

/// Record of a judge model's first failure during one evaluation.
///
/// Appended at most once per model; a model excluded at step N is never
/// offered work at any later step of the same evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionRecord {
    pub model_id: String,
    pub failed_step_name: String,
    pub failed_step_index: usize,
    pub cause: String,
}

/// Terminal output of one metric evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Name of the metric pipeline that produced this result.
    pub metric_name: String,

    /// Aggregated final score. `None` only for metric-specific degenerate
    /// inputs detected before the pipeline started; an evaluation that ran
    /// any step either produces a score or fails with an error.
    pub score: Option<f64>,

    /// Per-model terminal verdicts for every model that survived all steps.
    pub per_model_scores: HashMap<String, f64>,

    /// Models dropped after their first failure, in exclusion order.
    #[serde(default)]
    pub excluded_models: Vec<ExclusionRecord>,

    /// Wall-clock duration of the whole evaluation in milliseconds.
    pub duration_ms: u64,

    /// When the evaluation started.
    pub started_at: DateTime<Utc>,

    /// The evaluated input bundle, echoed back for reporting.
    pub sample: Sample,

    /// The configuration the evaluation ran with.
    pub config: MetricConfiguration,

    /// Metric-specific extras (chosen branch, statement counts, ...).
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

impl EvaluationResult {
    /// Whether the score clears the configured threshold.
    ///
    /// `None` scores never pass.
    pub fn passed(&self) -> bool {
        self.score.map(|s| s >= self.config.threshold).unwrap_or(false)
    }
}
