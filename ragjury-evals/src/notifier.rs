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

//! Ordered progress event stream for external reporting.
//!
//! Per evaluation the stream is:
//! `BeforeEvaluation`, then per step `BeforeStep` / `AfterStep` followed by
//! zero or more `ModelExcluded`, then `AfterEvaluation` exactly once on
//! non-fatal completion. A fatal all-models-failed abort never emits
//! `AfterEvaluation`; the returned error is the only signal.

use parking_lot::Mutex;
use ragjury_core::{EvaluationResult, ExclusionRecord};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::executor::ModelResult;

/// Closed set of progress messages, in emission order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvalEvent {
    BeforeEvaluation {
        evaluation_id: Uuid,
        metric_name: String,
        models: Vec<String>,
    },
    BeforeStep {
        evaluation_id: Uuid,
        step_name: String,
        step_index: usize,
        total_steps: usize,
        active_models: Vec<String>,
    },
    AfterStep {
        evaluation_id: Uuid,
        step_name: String,
        step_index: usize,
        results: Vec<ModelResult>,
        /// Prompt sent to the first model whose prompt materialized, as a
        /// representative sample for reporting.
        prompt: Option<String>,
    },
    ModelExcluded {
        evaluation_id: Uuid,
        record: ExclusionRecord,
    },
    AfterEvaluation {
        evaluation_id: Uuid,
        result: Box<EvaluationResult>,
    },
}

impl EvalEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EvalEvent::BeforeEvaluation { .. } => "before_evaluation",
            EvalEvent::BeforeStep { .. } => "before_step",
            EvalEvent::AfterStep { .. } => "after_step",
            EvalEvent::ModelExcluded { .. } => "model_excluded",
            EvalEvent::AfterEvaluation { .. } => "after_evaluation",
        }
    }
}

/// Caller-supplied handler for the event stream.
///
/// A sink is used by exactly one evaluation at a time; concurrent
/// evaluations get their own sink so streams never interleave.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EvalEvent);
}

/// Sink that drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EvalEvent) {}
}

/// Sink forwarding events over an unbounded channel, e.g. to an SSE
/// bridge. Events are dropped once the receiver is gone.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<EvalEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<EvalEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EvalEvent) {
        let _ = self.sender.send(event);
    }
}

/// Sink that records every event in order; used by tests and report
/// builders that want the full stream after the fact.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EvalEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EvalEvent> {
        self.events.lock().clone()
    }

    /// Event names in emission order, for ordering assertions.
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(EvalEvent::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EvalEvent) {
        self.events.lock().push(event);
    }
}
