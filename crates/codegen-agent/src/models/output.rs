use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// The value a tool hands back to the agent
pub enum ToolOutput {
    Text(String),
    Structured(Map<String, Value>),
    Number(Number),
    Bool(bool),
}

impl ToolOutput {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ToolOutput::Text(text.into())
    }

    /// Render the output the way it is embedded into a tool-role message.
    ///
    /// Text is passed through untouched. Structured values are written as
    /// pretty JSON with keys in sorted order, so the same result always
    /// produces the same transcript text.
    pub fn to_transcript_text(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Structured(map) => {
                let canonical = canonicalize(&Value::Object(map.clone()));
                serde_json::to_string_pretty(&canonical)
                    .unwrap_or_else(|_| canonical.to_string())
            }
            ToolOutput::Number(number) => number.to_string(),
            ToolOutput::Bool(flag) => flag.to_string(),
        }
    }

    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            ToolOutput::Structured(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ToolOutput::Structured(map),
            Value::String(text) => ToolOutput::Text(text),
            Value::Number(number) => ToolOutput::Number(number),
            Value::Bool(flag) => ToolOutput::Bool(flag),
            // Arrays and null have no variant of their own, keep them as json text
            other => ToolOutput::Text(other.to_string()),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

/// Rebuild a value with every object's keys inserted in sorted order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
