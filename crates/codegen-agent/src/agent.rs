//! The tool-calling loop
//!
//! One `run` appends the user's message to the transcript and then cycles:
//! ask the provider for a completion, execute every requested tool in the
//! order it was requested, append the results, ask again. It stops on the
//! first reply without tool requests, or after `max_iterations` round trips.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conversation::Conversation;
use crate::errors::AgentResult;
use crate::models::message::{Message, ToolRequest};
use crate::models::output::ToolOutput;
use crate::providers::base::Provider;
use crate::providers::utils::INVALID_TOOL_CALL_NAME;
use crate::registry::ToolRegistry;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Returned as `final_response` when the iteration budget runs out
pub const EXHAUSTED_RESPONSE: &str = "Execution timed out, please retry";
const EXHAUSTED_ERROR: &str = "maximum iterations reached";

/// One executed tool call, kept for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: AgentResult<ToolOutput>,
}

/// The outcome of a single `run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub final_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_call_log: Vec<ToolCallRecord>,
    /// Completion round trips consumed
    pub iterations: usize,
}

impl RunResult {
    fn completed(final_response: String, tool_call_log: Vec<ToolCallRecord>, iterations: usize) -> Self {
        Self {
            success: true,
            final_response,
            error: None,
            tool_call_log,
            iterations,
        }
    }

    fn exhausted(tool_call_log: Vec<ToolCallRecord>, iterations: usize) -> Self {
        Self {
            success: false,
            final_response: EXHAUSTED_RESPONSE.to_string(),
            error: Some(EXHAUSTED_ERROR.to_string()),
            tool_call_log,
            iterations,
        }
    }
}

/// Agent drives a chat provider through the tools of a registry.
///
/// The agent owns its transcript; it is not meant to be shared between
/// concurrent callers. The registry can be shared by many agents.
pub struct Agent {
    provider: Box<dyn Provider>,
    registry: Arc<ToolRegistry>,
    conversation: Conversation,
    system_prompt: Option<String>,
    max_iterations: usize,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            conversation: Conversation::new(),
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Instruction sent ahead of the transcript on every request
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn transcript(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// Drop the whole transcript. The registry is left untouched.
    pub fn reset(&mut self) {
        self.conversation.clear();
        debug!("conversation history cleared");
    }

    /// Run one user request with the agent's default iteration budget
    pub async fn run(&mut self, user_message: &str) -> Result<RunResult> {
        self.run_with_limit(user_message, self.max_iterations).await
    }

    /// Run one user request, making at most `max_iterations` completion requests.
    ///
    /// Tool failures never end the run, the model sees them as tool output.
    /// Provider errors are returned as-is, with the transcript kept up to
    /// the last completed step.
    pub async fn run_with_limit(
        &mut self,
        user_message: &str,
        max_iterations: usize,
    ) -> Result<RunResult> {
        self.conversation.push(Message::user().with_text(user_message));
        info!(max_iterations, "agent run started");

        let mut tool_call_log = Vec::new();

        for iteration in 1..=max_iterations {
            let tools = self.registry.schemas();
            let advertised = if tools.is_empty() {
                None
            } else {
                Some(tools.as_slice())
            };

            debug!(iteration, messages = self.conversation.len(), "requesting completion");
            let (response, usage) = self
                .provider
                .complete(
                    self.system_prompt.as_deref(),
                    self.conversation.messages(),
                    advertised,
                )
                .await?;
            debug!(iteration, ?usage, "completion received");

            // Kept even when it only carries tool requests, the tool
            // messages below refer back to its request ids
            self.conversation.push(response.clone());

            if !response.has_tool_requests() {
                info!(
                    iterations = iteration,
                    tool_calls = tool_call_log.len(),
                    "agent run finished"
                );
                return Ok(RunResult::completed(
                    response.content,
                    tool_call_log,
                    iteration,
                ));
            }

            debug!(iteration, count = response.tool_requests().len(), "executing tool calls");
            for request in response.tool_requests() {
                let record = self.execute(request).await;
                let content = match &record.result {
                    Ok(output) => output.to_transcript_text(),
                    Err(e) => format!("Tool execution error: {}", e),
                };
                self.conversation
                    .push(Message::tool(record.id.clone(), record.name.clone()).with_text(content));
                tool_call_log.push(record);
            }
        }

        warn!(
            max_iterations,
            tool_calls = tool_call_log.len(),
            "agent run hit iteration limit"
        );
        Ok(RunResult::exhausted(tool_call_log, max_iterations))
    }

    async fn execute(&self, request: &ToolRequest) -> ToolCallRecord {
        let (name, arguments, result) = match &request.tool_call {
            Ok(call) => {
                info!(tool = %call.name, arguments = %call.arguments, "calling tool");
                let result = self.registry.dispatch(&call.name, &call.arguments).await;
                (call.name.clone(), call.arguments.clone(), result)
            }
            Err(e) => (
                INVALID_TOOL_CALL_NAME.to_string(),
                Value::Null,
                Err(e.clone()),
            ),
        };

        if let Err(e) = &result {
            warn!(tool = %name, error = %e, "tool call failed");
        }

        ToolCallRecord {
            id: request.id.clone(),
            name,
            arguments,
            result,
        }
    }
}
