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

//! # Ragjury core contracts
//!
//! Shared, immutable data types exchanged between the evaluation engine
//! (`ragjury-evals`) and its callers: the input bundle for one evaluation,
//! the per-metric configuration, and the result contract consumed by
//! reporting.
//!
//! Nothing in this crate performs I/O or holds mutable evaluation state.

pub mod config;
pub mod result;
pub mod sample;

pub use config::{AggregationStrategy, GoalAccuracyMode, MetricConfiguration};
pub use result::{EvaluationResult, ExclusionRecord, MetadataValue};
pub use sample::{ConversationTurn, Role, Sample, ToolCall};
