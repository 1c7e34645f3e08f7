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

//! Per-metric evaluation configuration.

use serde::{Deserialize, Serialize};

/// Reduction rule turning the surviving per-model verdicts into one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Arithmetic mean of all per-model scores.
    #[default]
    Average,
    /// Middle value of the sorted scores; mean of the two middle values
    /// for an even count.
    Median,
}

/// Which step sequence the goal-accuracy metric should prefer.
///
/// `CompareToReference` silently downgrades to `InferThenJudge` when the
/// sample carries no reference; the branch is fixed before any step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalAccuracyMode {
    #[default]
    CompareToReference,
    InferThenJudge,
}

/// Caller-supplied knobs for one metric evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfiguration {
    /// Judge models to consult. Empty means "every model the engine was
    /// constructed with".
    #[serde(default)]
    pub models: Vec<String>,

    /// Preferred branch for mode-branching metrics.
    #[serde(default)]
    pub mode: GoalAccuracyMode,

    /// Pass threshold recorded in result metadata; the engine itself does
    /// not gate on it.
    pub threshold: f64,

    /// Self-consistency count: each judge call is repeated this many times
    /// and resolved by majority vote before one verdict per model is kept.
    /// Ties count as a negative verdict, so odd values are recommended.
    pub strictness: usize,

    /// How surviving per-model scores reduce to the final score.
    #[serde(default)]
    pub aggregation: AggregationStrategy,

    /// Upper bound on concurrently in-flight judge calls within one step.
    /// `None` leaves the fan-out unbounded.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

impl Default for MetricConfiguration {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            mode: GoalAccuracyMode::default(),
            threshold: 0.5,
            strictness: 1,
            aggregation: AggregationStrategy::default(),
            max_concurrent: None,
        }
    }
}

impl MetricConfiguration {
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: GoalAccuracyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_strictness(mut self, strictness: usize) -> Self {
        self.strictness = strictness.max(1);
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationStrategy) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_max_concurrent(mut self, bound: usize) -> Self {
        self.max_concurrent = Some(bound.max(1));
        self
    }
}
