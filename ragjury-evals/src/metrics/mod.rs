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

//! Built-in metric pipelines.
//!
//! Each constructor returns a stateless [`crate::MetricPipeline`] value
//! that can be shared across concurrent evaluations.

pub mod aspect_critic;
pub mod faithfulness;
pub mod goal_accuracy;

pub use aspect_critic::aspect_critic;
pub use faithfulness::faithfulness;
pub use goal_accuracy::goal_accuracy;
