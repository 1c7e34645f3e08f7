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

//! Reduction of the surviving per-model verdicts into one score.

use std::collections::HashMap;

use ragjury_core::AggregationStrategy;

/// Reduce a non-empty score board to a single scalar.
///
/// The pipeline invariant guarantees a non-empty input (an evaluation with
/// zero surviving models aborts before aggregation), so emptiness is not
/// special-cased here.
pub fn aggregate(score_board: &HashMap<String, f64>, strategy: AggregationStrategy) -> f64 {
    debug_assert!(!score_board.is_empty());

    match strategy {
        AggregationStrategy::Average => {
            score_board.values().sum::<f64>() / score_board.len() as f64
        }
        AggregationStrategy::Median => {
            let mut scores: Vec<f64> = score_board.values().copied().collect();
            scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = scores.len() / 2;
            if scores.len() % 2 == 0 {
                (scores[mid - 1] + scores[mid]) / 2.0
            } else {
                scores[mid]
            }
        }
    }
}
