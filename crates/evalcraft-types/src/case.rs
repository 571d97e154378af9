use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key under which a row's transaction id is kept.
pub const XACT_ID_KEY: &str = "_xact_id";

/// One test row: the task's input plus what scorers compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
	pub input: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expected: Option<Value>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tags: Option<Vec<String>>,
}

impl EvalCase {
	pub fn new(input: impl Into<Value>) -> Self {
		Self {
			input: input.into(),
			expected: None,
			metadata: Map::new(),
			id: None,
			created: None,
			tags: None,
		}
	}

	pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
		self.expected = Some(expected.into());
		self
	}

	pub fn with_id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.metadata.insert(key.into(), value.into());
		self
	}

	/// Builds a case from a decoded request or dataset row.
	///
	/// Missing `input` becomes `null`; a non-object `metadata` is dropped.
	/// A `_xact_id` field on the row is folded into the metadata.
	pub fn from_record(record: &Map<String, Value>) -> Self {
		let mut metadata = record
			.get("metadata")
			.and_then(Value::as_object)
			.cloned()
			.unwrap_or_default();
		if let Some(xact_id) = record.get(XACT_ID_KEY).filter(|v| !v.is_null()) {
			metadata.insert(XACT_ID_KEY.to_string(), xact_id.clone());
		}

		let tags = record.get("tags").and_then(Value::as_array).map(|tags| {
			tags.iter()
				.filter_map(|t| t.as_str().map(str::to_string))
				.collect()
		});

		Self {
			input: record.get("input").cloned().unwrap_or(Value::Null),
			expected: record.get("expected").filter(|v| !v.is_null()).cloned(),
			metadata,
			id: record.get("id").and_then(scalar_to_string),
			created: record.get("created").and_then(scalar_to_string),
			tags,
		}
	}

	/// Transaction id carried over from the source dataset row, if any.
	pub fn xact_id(&self) -> Option<String> {
		self.metadata.get(XACT_ID_KEY).and_then(scalar_to_string)
	}
}

fn scalar_to_string(v: &Value) -> Option<String> {
	match v {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

/// A data element before normalisation: either a ready case or a raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
	Case(EvalCase),
	Value(Value),
}

impl From<EvalCase> for Row {
	fn from(case: EvalCase) -> Self {
		Row::Case(case)
	}
}

impl From<Value> for Row {
	fn from(value: Value) -> Self {
		Row::Value(value)
	}
}

impl Row {
	/// Cases pass through, objects are converted, anything else is rejected.
	pub fn into_case(self) -> Result<EvalCase, InvalidRow> {
		match self {
			Row::Case(case) => Ok(case),
			Row::Value(Value::Object(record)) => Ok(EvalCase::from_record(&record)),
			Row::Value(other) => Err(InvalidRow {
				kind: json_type_name(&other),
			}),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
	pub kind: &'static str,
}

impl fmt::Display for InvalidRow {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "expected an EvalCase or an object, got {}", self.kind)
	}
}

impl std::error::Error for InvalidRow {}

pub fn json_type_name(v: &Value) -> &'static str {
	match v {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
