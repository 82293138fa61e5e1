//! Bounded tool-calling loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//!             ┌──────────── tool results ─────────────┐
//!             ▼                                       │
//!   ┌─────────────────┐  tool calls   ┌───────────────┴─┐
//!   │ AwaitingModel   │──────────────▶│ ExecutingTools  │
//!   └────────┬────────┘               └─────────────────┘
//!            │ answer
//!            ▼
//!         ┌──────┐
//!         │ Done │
//!         └──────┘
//! ```
//!
//! At most `max_tool_rounds` rounds of tool execution happen. Once they are
//! used up the model is asked once more with tool use disabled, so it must
//! answer. Invalid tool calls are reported to the model as error results
//! and count as a round.
//!
//! Sources are per-call: each tool execution replaces the outcome's source
//! list, and the list is returned with the answer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use course_rag_core::models::SourceRef;
use course_rag_core::{RagError, Result};

use crate::llm::{
    ChatMessage, GenerateRequest, LanguageModel, ModelReply, ToolChoice, ToolDefinition,
    ToolResult, ToolUse,
};
use crate::session::{Role, Turn};
use crate::tools::{self, CourseTools, ToolCall};

pub const SYSTEM_PROMPT: &str = "You are an AI assistant specialized in course materials and educational content, with tools for searching course information.

Tool usage:
- search_course_content: questions about specific course content, lessons, or detailed material.
- get_course_outline: questions about course structure, lesson lists, or a course overview. Include the course title, course link, and every lesson number and title in the answer.
- After a tool call you see its result and may call another tool if more information is needed.
- If a search yields no results, say so plainly without offering alternatives.

Response protocol:
- General knowledge questions: answer from your own knowledge without using tools.
- Course-specific questions: search first, then answer.
- No meta-commentary: do not describe your reasoning or tool use, and do not say \"based on the search results\".

Answers must be brief and focused, educational, clear, and supported by examples where they help. Provide only the direct answer to what was asked.";

pub const FALLBACK_ANSWER: &str = "I apologize, but I was unable to generate a complete response. Please try rephrasing your question.";

/// Result of one completed loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub answer: String,
    /// Sources recorded by the last tool execution, if any.
    pub sources: Vec<SourceRef>,
    /// Number of tool rounds executed.
    pub tool_rounds: usize,
}

enum State {
    AwaitingModel,
    ExecutingTools(Vec<ToolUse>),
    Done(String),
}

/// Drives one question through the model and the course tools.
#[derive(Clone)]
pub struct ToolLoop {
    model: Arc<dyn LanguageModel>,
    tools: CourseTools,
    definitions: Vec<ToolDefinition>,
    max_tool_rounds: usize,
    timeout: Duration,
}

impl ToolLoop {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: CourseTools,
        max_tool_rounds: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            tools,
            definitions: tools::definitions(),
            max_tool_rounds,
            timeout,
        }
    }

    /// Run the loop to completion.
    ///
    /// # Errors
    ///
    /// [`RagError::Generation`] if a model call fails or times out, and
    /// [`RagError::IndexUnavailable`] if a tool cannot reach the index.
    /// Bad tool arguments are never errors here.
    pub async fn run(&self, history: &[Turn], query: &str) -> Result<LoopOutcome> {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|turn| match turn.role {
                Role::User => ChatMessage::User(turn.text.clone()),
                Role::Assistant => ChatMessage::assistant(turn.text.clone()),
            })
            .collect();
        messages.push(ChatMessage::User(query.to_string()));

        let mut sources = Vec::new();
        let mut rounds = 0usize;
        let mut state = State::AwaitingModel;

        loop {
            state = match state {
                State::AwaitingModel => {
                    let tool_choice = if rounds < self.max_tool_rounds {
                        ToolChoice::Auto
                    } else {
                        ToolChoice::None
                    };
                    match self.call_model(&messages, tool_choice).await? {
                        ModelReply::Answer(text) => State::Done(text),
                        // Tool use was disabled; whatever text came back is the answer.
                        ModelReply::ToolUse { text, .. } if tool_choice == ToolChoice::None => {
                            State::Done(text)
                        }
                        ModelReply::ToolUse { text, calls } => {
                            messages.push(ChatMessage::Assistant {
                                text,
                                tool_calls: calls.clone(),
                            });
                            State::ExecutingTools(calls)
                        }
                    }
                }
                State::ExecutingTools(calls) => {
                    rounds += 1;
                    info!(
                        round = rounds,
                        max = self.max_tool_rounds,
                        calls = calls.len(),
                        "executing tool round"
                    );
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        results.push(self.execute(call, &mut sources).await?);
                    }
                    messages.push(ChatMessage::ToolResults(results));
                    State::AwaitingModel
                }
                State::Done(text) => {
                    let answer = if text.trim().is_empty() {
                        FALLBACK_ANSWER.to_string()
                    } else {
                        text
                    };
                    return Ok(LoopOutcome {
                        answer,
                        sources,
                        tool_rounds: rounds,
                    });
                }
            };
        }
    }

    async fn call_model(
        &self,
        messages: &[ChatMessage],
        tool_choice: ToolChoice,
    ) -> Result<ModelReply> {
        let request = GenerateRequest {
            system: SYSTEM_PROMPT,
            messages,
            tools: &self.definitions,
            tool_choice,
        };
        debug!(model = self.model.name(), messages = messages.len(), ?tool_choice, "calling model");

        tokio::time::timeout(self.timeout, self.model.generate(&request))
            .await
            .map_err(|_| {
                RagError::generation(format!(
                    "model call timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })?
    }

    async fn execute(&self, call: &ToolUse, sources: &mut Vec<SourceRef>) -> Result<ToolResult> {
        let parsed = match ToolCall::parse(&call.name, &call.arguments) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "rejected tool call");
                return Ok(ToolResult {
                    tool_use_id: call.id.clone(),
                    content: e.to_string(),
                    is_error: true,
                });
            }
        };

        debug!(tool = parsed.name(), arguments = %call.arguments, "running tool");
        let output = self.tools.execute(&parsed).await?;
        *sources = output.sources;

        Ok(ToolResult {
            tool_use_id: call.id.clone(),
            content: output.text,
            is_error: false,
        })
    }
}
