use minijinja::Environment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
	pub role: String,
	pub content: Value,
}

/// An LLM prompt configuration supplied as an evaluator parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	pub messages: Vec<PromptMessage>,
	pub model: String,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub params: Map<String, Value>,
}

impl Prompt {
	pub const DEFAULT_MODEL: &'static str = "gpt-4o";

	/// Single user message forwarding the case input.
	pub fn skeleton() -> Self {
		Self {
			name: None,
			messages: vec![PromptMessage {
				role: "user".to_string(),
				content: Value::String("{{input}}".to_string()),
			}],
			model: Self::DEFAULT_MODEL.to_string(),
			params: Map::new(),
		}
	}

	pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
		serde_json::from_value(value.clone())
	}

	pub fn to_value(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}

	/// Renders string message contents as templates against `vars`.
	/// Structured contents are passed through untouched.
	pub fn render(&self, vars: &Value) -> Result<Vec<PromptMessage>, minijinja::Error> {
		let env = Environment::new();
		self.messages
			.iter()
			.map(|m| {
				let content = match &m.content {
					Value::String(template) => Value::String(env.render_str(template, vars)?),
					other => other.clone(),
				};
				Ok(PromptMessage {
					role: m.role.clone(),
					content,
				})
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_skeleton_renders_input() {
		let prompt = Prompt::skeleton();
		assert_eq!(prompt.model, "gpt-4o");

		let messages = prompt.render(&json!({"input": "What is 2+2?"})).unwrap();
		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].role, "user");
		assert_eq!(messages[0].content, json!("What is 2+2?"));
	}

	#[test]
	fn test_from_value_requires_model() {
		assert!(Prompt::from_value(&json!({"messages": []})).is_err());

		let prompt = Prompt::from_value(&json!({
			"messages": [{"role": "system", "content": "Be terse."}],
			"model": "gpt-4o-mini",
			"params": {"temperature": 0.2}
		}))
		.unwrap();
		assert_eq!(prompt.params["temperature"], json!(0.2));
		assert_eq!(Prompt::from_value(&prompt.to_value()).unwrap(), prompt);
	}
}
