use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::AgentResult;

/// Primitive type of a tool argument, as declared to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

/// A single named argument of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
    /// Element type, only meaningful for arrays
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<ParamKind>,
}

impl ToolParam {
    pub fn required<N, D>(name: N, kind: ParamKind, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolParam {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
            items: None,
        }
    }

    pub fn optional<N, D>(name: N, kind: ParamKind, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolParam {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_items(mut self, items: ParamKind) -> Self {
        self.items = Some(items);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if self.kind == ParamKind::Array {
            let items = self.items.unwrap_or(ParamKind::String);
            schema["items"] = json!({ "type": items.as_str() });
        }
        schema
    }
}

/// A tool that can be used by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// Arguments the tool accepts, in declaration order
    pub params: Vec<ToolParam>,
}

impl Tool {
    /// Create a new tool with the given name and description and no arguments
    pub fn new<N, D>(name: N, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn param(&self, name: &str) -> Option<&ToolParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The JSON schema of the arguments, in the subset every provider accepts
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(param.name.clone(), param.schema());
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A tool call request that the adapter can execute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution, a JSON object
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new ToolCall with the given name and arguments
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// A tool call as returned by the model, tagged with the provider's call id.
///
/// The call is an error when the provider returned something we could not
/// interpret, such as a malformed name or unparsable arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_call: AgentResult<ToolCall>,
}

impl ToolRequest {
    pub fn new<S: Into<String>>(id: S, tool_call: AgentResult<ToolCall>) -> Self {
        Self {
            id: id.into(),
            tool_call,
        }
    }
}

/// A completed tool call and its raw result, fed back to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExchange {
    pub id: String,
    pub call: ToolCall,
    pub result: Value,
}
