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

//! Immutable input bundle for one evaluation.

use serde::{Deserialize, Serialize};

/// Speaker of a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One turn of the conversation preceding the response under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Record of a tool invocation made while producing the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Everything the caller supplies about one response under evaluation.
///
/// Created once before the evaluation starts and never mutated by the
/// engine. Fields a given metric does not need may be left empty; each
/// metric validates its own requirements up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sample {
    /// The user question or instruction the response answers.
    pub question: Option<String>,

    /// The AI-generated response being evaluated.
    pub response: Option<String>,

    /// Retrieved context chunks, in retrieval order.
    #[serde(default)]
    pub contexts: Vec<String>,

    /// Reference (ground-truth) answer or outcome, when available.
    pub reference: Option<String>,

    /// Ordered conversation preceding (and including) the response.
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,

    /// Tool invocations recorded during the interaction.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Reference topics the response is expected to stay within.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_contexts(mut self, contexts: Vec<String>) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_conversation(mut self, turns: Vec<ConversationTurn>) -> Self {
        self.conversation = turns;
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Conversation rendered as a plain transcript for judge prompts.
    pub fn transcript(&self) -> String {
        self.conversation
            .iter()
            .map(|turn| {
                let speaker = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                format!("{}: {}", speaker, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
