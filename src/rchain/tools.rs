use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// JSON schema primitive types supported for tool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolParamType {
    String,
}

impl ToolParamType {
    fn as_str(self) -> &'static str {
        match self {
            ToolParamType::String => "string",
        }
    }
}

/// One function parameter definition.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub description: Option<String>,
    pub kind: ToolParamType,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, kind: ToolParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            description: Some(description.to_string()),
            kind,
            required: true,
        }
    }
}

/// Callable function declared to the model.
#[derive(Debug, Clone)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolFunction {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    /// JSON schema object describing the parameters. Extra properties are
    /// rejected so the model cannot invent fields.
    fn parameters_schema(&self) -> Value {
        let properties = self
            .params
            .iter()
            .map(|param| {
                let mut def = Map::new();
                def.insert("type".into(), json!(param.kind.as_str()));
                if let Some(description) = &param.description {
                    def.insert("description".into(), json!(description));
                }
                (param.name.clone(), Value::Object(def))
            })
            .collect::<Map<_, _>>();
        let required = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| json!(param.name))
            .collect::<Vec<_>>();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Tool declaration in chat-completions function-calling format.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub function: ToolFunction,
}

impl ToolDefinition {
    pub fn from_function(function: ToolFunction) -> Self {
        Self { function }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.function.name,
                "description": self.function.description,
                "parameters": self.function.parameters_schema(),
            }
        })
    }
}

/// Tool call requested by a model.
///
/// `arguments` holds the decoded JSON object when the model sent valid JSON,
/// or the raw argument string otherwise, so nothing the model said is lost
/// before the invoker validates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    /// Builds a call from the wire representation, where arguments arrive
    /// as a JSON-encoded string.
    pub fn from_wire(id: impl Into<String>, name: impl Into<String>, raw_arguments: &str) -> Self {
        let arguments = serde_json::from_str(raw_arguments)
            .unwrap_or_else(|_| Value::String(raw_arguments.to_string()));
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments re-encoded as the string the wire format expects.
    pub fn arguments_json(&self) -> String {
        match &self.arguments {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        }
    }
}
