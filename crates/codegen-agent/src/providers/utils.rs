use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::errors::AgentError;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Name sent back for a tool request whose own name could not be decoded
pub const INVALID_TOOL_CALL_NAME: &str = "invalid_tool_call";

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::with_capacity(messages.len());

    for message in messages {
        let converted = match message.role {
            Role::User => json!({
                "role": "user",
                "content": message.content,
            }),
            Role::Assistant => {
                // Tool-only turns carry a null content, as the endpoint sends them
                let content = if message.content.is_empty() && message.has_tool_requests() {
                    Value::Null
                } else {
                    json!(message.content)
                };
                let mut converted = json!({
                    "role": "assistant",
                    "content": content,
                });

                if message.has_tool_requests() {
                    let tool_calls: Vec<Value> = message
                        .tool_requests()
                        .iter()
                        .map(|request| {
                            let (name, arguments) = match &request.tool_call {
                                Ok(call) => (
                                    sanitize_function_name(&call.name),
                                    call.arguments.to_string(),
                                ),
                                Err(_) => (INVALID_TOOL_CALL_NAME.to_string(), "{}".to_string()),
                            };
                            json!({
                                "id": request.id,
                                "type": "function",
                                "function": {
                                    "name": name,
                                    "arguments": arguments,
                                }
                            })
                        })
                        .collect();
                    converted["tool_calls"] = json!(tool_calls);
                }
                converted
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id,
                "name": message.tool_name,
                "content": message.content,
            }),
        };
        messages_spec.push(converted);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(tools.len());

    for tool in tools {
        if !seen.insert(tool.name.as_str()) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        specs.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(specs)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .cloned()
        .ok_or_else(|| anyhow!("No choices in response: {}", response))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(Value::as_str) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            if !is_valid_function_name(&function_name) {
                let error = AgentError::ToolNotFound(format!(
                    "tool name '{}' contains characters outside [a-zA-Z0-9_-]",
                    function_name
                ));
                message = message.with_tool_request(id, Err(error));
                continue;
            }

            // An empty argument string means a call without parameters
            let parsed = if arguments.trim().is_empty() {
                Ok(json!({}))
            } else {
                serde_json::from_str::<Value>(arguments)
            };

            message = match parsed {
                Ok(params) => message.with_tool_request(id, Ok(ToolCall::new(function_name, params))),
                Err(e) => {
                    let error = AgentError::InvalidParameters(format!(
                        "arguments of tool call {} are not valid JSON: {}",
                        id, e
                    ));
                    message.with_tool_request(id, Err(error))
                }
            };
        }
    }

    Ok(message)
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
