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

//! Per-evaluation set of judge models still eligible to participate.

use ragjury_core::ExclusionRecord;

/// Shrinking set of model ids, private to one evaluation.
///
/// A model is excluded on its first failure and never re-offered work.
/// The set only ever shrinks; exclusion order is preserved for reporting.
#[derive(Debug)]
pub struct ActiveModelSet {
    models: Vec<String>,
    exclusions: Vec<ExclusionRecord>,
}

impl ActiveModelSet {
    pub fn new(models: Vec<String>) -> Self {
        Self {
            models,
            exclusions: Vec::new(),
        }
    }

    /// Models currently eligible, in configuration order.
    pub fn ids(&self) -> &[String] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m == model_id)
    }

    /// Record a model's first failure and drop it from the set.
    ///
    /// Returns `false` (and records nothing) if the model was already
    /// excluded or never part of this evaluation.
    pub fn exclude(&mut self, record: ExclusionRecord) -> bool {
        let Some(pos) = self.models.iter().position(|m| *m == record.model_id) else {
            return false;
        };
        self.models.remove(pos);
        self.exclusions.push(record);
        true
    }

    /// Exclusions so far, in the order they happened.
    pub fn exclusions(&self) -> &[ExclusionRecord] {
        &self.exclusions
    }

    pub fn into_exclusions(self) -> Vec<ExclusionRecord> {
        self.exclusions
    }
}
