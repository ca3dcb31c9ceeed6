use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::output::ToolOutput;
use crate::models::tool::Tool;

/// The executable half of a registered tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with arguments that already passed schema validation
    async fn call(&self, arguments: Map<String, Value>) -> AgentResult<ToolOutput>;
}

/// Adapts an async closure into a `ToolHandler`
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AgentResult<ToolOutput>> + Send + 'static,
{
    async fn call(&self, arguments: Map<String, Value>) -> AgentResult<ToolOutput> {
        (self.0)(arguments).await
    }
}

struct RegisteredTool {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// Maps tool names to their handler and advertised schema.
///
/// Entries keep their registration order. Registering a name that already
/// exists swaps the entry in place.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the tool registered under `name`
    pub fn register<N, D>(
        &mut self,
        name: N,
        handler: Arc<dyn ToolHandler>,
        description: D,
        parameters: Value,
    ) where
        N: Into<String>,
        D: Into<String>,
    {
        let tool = Tool::new(name, description, parameters);
        match self.position(&tool.name) {
            Some(index) => {
                tracing::debug!(tool = %tool.name, "replacing registered tool");
                self.entries[index] = RegisteredTool { tool, handler };
            }
            None => {
                tracing::debug!(tool = %tool.name, "registered tool");
                self.entries.push(RegisteredTool { tool, handler });
            }
        }
    }

    /// Register an async closure as a tool
    pub fn register_fn<N, D, F, Fut>(&mut self, name: N, description: D, parameters: Value, f: F)
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult<ToolOutput>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler(f)), description, parameters);
    }

    /// All advertised schemas, in registration order
    pub fn schemas(&self) -> Vec<Tool> {
        self.entries.iter().map(|entry| entry.tool.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Execute the tool registered under `name`.
    ///
    /// Every failure comes back as an `AgentError` value: unknown names,
    /// arguments that do not match the declared schema, handler errors and
    /// handler panics alike.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> AgentResult<ToolOutput> {
        let entry = self
            .position(name)
            .map(|index| &self.entries[index])
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        let arguments = validate_arguments(&entry.tool.parameters, arguments)?;

        match AssertUnwindSafe(entry.handler.call(arguments))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::warn!(tool = name, %reason, "tool handler panicked");
                Err(AgentError::ExecutionError(reason))
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.tool.name == name)
    }
}

/// Check an argument payload against a JSON-Schema style parameter object.
///
/// Only the subset the tools declare is checked: the payload must be an
/// object, required keys must be present, no undeclared keys may appear and
/// declared primitive types must match.
fn validate_arguments(schema: &Value, arguments: &Value) -> AgentResult<Map<String, Value>> {
    let arguments = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(AgentError::InvalidParameters(format!(
                "expected an object of named arguments, got {}",
                other
            )))
        }
    };

    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if arguments.get(key).map_or(true, Value::is_null) {
                return Err(AgentError::InvalidParameters(format!(
                    "missing required parameter '{}'",
                    key
                )));
            }
        }
    }

    if let Some(properties) = properties {
        let allow_extra = schema
            .get("additionalProperties")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        for (key, value) in &arguments {
            let Some(declared) = properties.get(key) else {
                if allow_extra {
                    continue;
                }
                return Err(AgentError::InvalidParameters(format!(
                    "unexpected parameter '{}'",
                    key
                )));
            };

            if let Some(expected) = declared.get("type").and_then(Value::as_str) {
                if !value.is_null() && !matches_type(expected, value) {
                    return Err(AgentError::InvalidParameters(format!(
                        "parameter '{}' should be of type {}",
                        key, expected
                    )));
                }
            }
        }
    }

    Ok(arguments)
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            "echo",
            "Echoes back the input",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
            |args| async move {
                Ok(ToolOutput::text(
                    args["message"].as_str().unwrap_or_default(),
                ))
            },
        );
        registry
    }

    #[tokio::test]
    async fn test_dispatch_registered_tool() -> anyhow::Result<()> {
        let registry = echo_registry();
        let output = registry.dispatch("echo", &json!({"message": "hi"})).await?;
        assert_eq!(output, ToolOutput::text("hi"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_value() {
        let registry = echo_registry();
        for name in ["", "missing", "ECHO", "echo "] {
            let result = registry.dispatch(name, &json!({})).await;
            assert_eq!(result, Err(AgentError::ToolNotFound(name.to_string())));
        }
    }

    #[tokio::test]
    async fn test_reregistration_replaces_in_place() -> anyhow::Result<()> {
        let mut registry = echo_registry();
        registry.register_fn("other", "Another tool", json!({"type": "object"}), |_| async {
            Ok(ToolOutput::text("other"))
        });
        registry.register_fn(
            "echo",
            "Shouts",
            json!({"type": "object", "properties": {"message": {"type": "string"}}}),
            |_| async { Ok(ToolOutput::text("LOUD")) },
        );

        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0].name, "echo");
        assert_eq!(schemas[0].description, "Shouts");
        assert_eq!(schemas[1].name, "other");

        let output = registry.dispatch("echo", &json!({"message": "x"})).await?;
        assert_eq!(output, ToolOutput::text("LOUD"));
        Ok(())
    }

    #[tokio::test]
    async fn test_schema_validation() {
        let registry = echo_registry();

        let missing = registry.dispatch("echo", &json!({})).await;
        assert!(matches!(missing, Err(AgentError::InvalidParameters(msg)) if msg.contains("message")));

        let wrong_type = registry.dispatch("echo", &json!({"message": 5})).await;
        assert!(matches!(wrong_type, Err(AgentError::InvalidParameters(_))));

        let extra = registry
            .dispatch("echo", &json!({"message": "a", "loud": true}))
            .await;
        assert!(matches!(extra, Err(AgentError::InvalidParameters(msg)) if msg.contains("loud")));

        let not_object = registry.dispatch("echo", &json!("hi")).await;
        assert!(matches!(not_object, Err(AgentError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_handler_errors_and_panics_are_contained() {
        let mut registry = ToolRegistry::new();
        registry.register_fn("fails", "Always fails", json!({"type": "object"}), |_| async {
            Err(AgentError::ExecutionError("connection refused".into()))
        });
        registry.register_fn("panics", "Always panics", json!({"type": "object"}), |_| async {
            let missing: Option<ToolOutput> = None;
            Ok(missing.expect("boom"))
        });

        let failed = registry.dispatch("fails", &json!({})).await;
        assert_eq!(
            failed,
            Err(AgentError::ExecutionError("connection refused".into()))
        );

        let panicked = registry.dispatch("panics", &Value::Null).await;
        assert_eq!(panicked, Err(AgentError::ExecutionError("boom".into())));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.schemas().is_empty());
        assert!(!registry.contains("echo"));
    }
}
