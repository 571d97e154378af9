//! Typed evaluator parameters.
//!
//! An evaluator declares its parameters once with [`Parameters::builder`].
//! Each request's raw `parameters` object is then checked with
//! [`Parameters::validate`], which yields [`ValidatedParameters`] for the task,
//! and the declarations are published to the playground via
//! [`Parameters::to_json_schema`].

use evalcraft_types::{json_type_name, Prompt};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
	String,
	Number,
	Integer,
	Boolean,
}

impl ItemType {
	fn schema_type(self) -> &'static str {
		match self {
			ItemType::String => "string",
			ItemType::Number => "number",
			ItemType::Integer => "integer",
			ItemType::Boolean => "boolean",
		}
	}

	fn accepts(self, v: &Value) -> bool {
		match self {
			ItemType::String => v.is_string(),
			ItemType::Number => v.is_number(),
			ItemType::Integer => as_integer(v).is_some(),
			ItemType::Boolean => v.is_boolean(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
	Prompt,
	String,
	Number { min: Option<f64>, max: Option<f64> },
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	Array { items: Option<ItemType> },
	Enum { values: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
	pub name: String,
	pub kind: ParameterKind,
	pub default: Option<Value>,
	pub description: Option<String>,
}

/// A parameter value after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
	Prompt(Prompt),
	String(String),
	Number(f64),
	Integer(i64),
	Boolean(bool),
	Array(Vec<Value>),
	Enum(String),
}

impl ParameterValue {
	pub fn to_value(&self) -> Value {
		match self {
			ParameterValue::Prompt(p) => p.to_value(),
			ParameterValue::String(s) | ParameterValue::Enum(s) => Value::String(s.clone()),
			ParameterValue::Number(n) => json!(n),
			ParameterValue::Integer(i) => json!(i),
			ParameterValue::Boolean(b) => Value::Bool(*b),
			ParameterValue::Array(items) => Value::Array(items.clone()),
		}
	}
}

impl ParameterDefinition {
	pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
		Self {
			name: name.into(),
			kind,
			default: None,
			description: None,
		}
	}

	/// Validates `raw`, falling back to the declared default only when `raw`
	/// is absent or `null`. Returns `None` when neither is present, except for
	/// prompts, which fall back to [`Prompt::skeleton`].
	pub fn validate(&self, raw: Option<&Value>) -> Result<Option<ParameterValue>, ValidationError> {
		let value = raw
			.filter(|v| !v.is_null())
			.or_else(|| self.default.as_ref().filter(|v| !v.is_null()));

		match value {
			Some(v) => self.coerce(v).map(Some),
			None if self.kind == ParameterKind::Prompt => Ok(Some(ParameterValue::Prompt(Prompt::skeleton()))),
			None => Ok(None),
		}
	}

	fn coerce(&self, v: &Value) -> Result<ParameterValue, ValidationError> {
		match &self.kind {
			ParameterKind::Prompt => match v {
				Value::Object(_) => Prompt::from_value(v)
					.map(ParameterValue::Prompt)
					.map_err(|e| self.error(format!("invalid prompt: {e}"))),
				other => Err(self.mistyped("a prompt object", other)),
			},
			ParameterKind::String => v
				.as_str()
				.map(|s| ParameterValue::String(s.to_string()))
				.ok_or_else(|| self.mistyped("a string", v)),
			ParameterKind::Number { min, max } => {
				let n = v.as_f64().ok_or_else(|| self.mistyped("a number", v))?;
				self.check_bounds(n, *min, *max)?;
				Ok(ParameterValue::Number(n))
			}
			ParameterKind::Integer { min, max } => {
				let i = as_integer(v).ok_or_else(|| self.mistyped("an integer", v))?;
				self.check_bounds(i, *min, *max)?;
				Ok(ParameterValue::Integer(i))
			}
			ParameterKind::Boolean => v
				.as_bool()
				.map(ParameterValue::Boolean)
				.ok_or_else(|| self.mistyped("a boolean", v)),
			ParameterKind::Array { items } => {
				let arr = v.as_array().ok_or_else(|| self.mistyped("an array", v))?;
				if let Some(item_type) = items {
					if let Some((idx, bad)) = arr.iter().enumerate().find(|(_, item)| !item_type.accepts(item)) {
						return Err(self.error(format!(
							"item {idx} must be of type {}, got {}",
							item_type.schema_type(),
							json_type_name(bad)
						)));
					}
				}
				Ok(ParameterValue::Array(arr.clone()))
			}
			ParameterKind::Enum { values } => {
				let s = v.as_str().ok_or_else(|| self.mistyped("a string", v))?;
				if values.iter().any(|allowed| allowed == s) {
					Ok(ParameterValue::Enum(s.to_string()))
				} else {
					Err(self.error(format!("'{s}' is not one of [{}]", values.join(", "))))
				}
			}
		}
	}

	fn check_bounds<T>(&self, n: T, min: Option<T>, max: Option<T>) -> Result<(), ValidationError>
	where
		T: PartialOrd + std::fmt::Display + Copy,
	{
		if let Some(min) = min {
			if n < min {
				return Err(self.error(format!("{n} is below the minimum of {min}")));
			}
		}
		if let Some(max) = max {
			if n > max {
				return Err(self.error(format!("{n} is above the maximum of {max}")));
			}
		}
		Ok(())
	}

	fn mistyped(&self, expected: &str, got: &Value) -> ValidationError {
		self.error(format!("expected {expected}, got {}", json_type_name(got)))
	}

	fn error(&self, message: String) -> ValidationError {
		ValidationError::new(&self.name, message)
	}

	/// Wire description of this parameter for the evaluator listing.
	pub fn to_json_schema(&self) -> Value {
		let mut out = Map::new();
		match &self.kind {
			ParameterKind::Prompt => {
				out.insert("type".into(), json!("prompt"));
			}
			kind => {
				out.insert("type".into(), json!("data"));
				out.insert("schema".into(), data_schema(kind));
			}
		}
		if let Some(default) = &self.default {
			out.insert("default".into(), default.clone());
		}
		if let Some(description) = &self.description {
			out.insert("description".into(), json!(description));
		}
		Value::Object(out)
	}
}

fn data_schema(kind: &ParameterKind) -> Value {
	let mut schema = Map::new();
	match kind {
		ParameterKind::Prompt => {}
		ParameterKind::String => {
			schema.insert("type".into(), json!("string"));
		}
		ParameterKind::Number { min, max } => {
			schema.insert("type".into(), json!("number"));
			insert_bounds(&mut schema, min.map(|v| json!(v)), max.map(|v| json!(v)));
		}
		ParameterKind::Integer { min, max } => {
			schema.insert("type".into(), json!("integer"));
			insert_bounds(&mut schema, min.map(|v| json!(v)), max.map(|v| json!(v)));
		}
		ParameterKind::Boolean => {
			schema.insert("type".into(), json!("boolean"));
		}
		ParameterKind::Array { items } => {
			schema.insert("type".into(), json!("array"));
			if let Some(items) = items {
				schema.insert("items".into(), json!({ "type": items.schema_type() }));
			}
		}
		ParameterKind::Enum { values } => {
			schema.insert("type".into(), json!("string"));
			schema.insert("enum".into(), json!(values));
		}
	}
	Value::Object(schema)
}

fn insert_bounds(schema: &mut Map<String, Value>, min: Option<Value>, max: Option<Value>) {
	if let Some(min) = min {
		schema.insert("minimum".into(), min);
	}
	if let Some(max) = max {
		schema.insert("maximum".into(), max);
	}
}

/// Integers, and floats with no fractional part.
fn as_integer(v: &Value) -> Option<i64> {
	if let Some(i) = v.as_i64() {
		return Some(i);
	}
	let f = v.as_f64()?;
	if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
		Some(f as i64)
	} else {
		None
	}
}

/// The declared parameters of one evaluator, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
	definitions: IndexMap<String, ParameterDefinition>,
}

impl Parameters {
	pub fn builder() -> ParametersBuilder {
		ParametersBuilder::default()
	}

	pub fn is_empty(&self) -> bool {
		self.definitions.is_empty()
	}

	pub fn len(&self) -> usize {
		self.definitions.len()
	}

	pub fn get(&self, name: &str) -> Option<&ParameterDefinition> {
		self.definitions.get(name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &ParameterDefinition> {
		self.definitions.values()
	}

	/// Validates every declared parameter against the raw request map.
	/// Undeclared keys are ignored.
	pub fn validate(&self, raw: Option<&Value>) -> Result<ValidatedParameters, ValidationError> {
		let empty = Map::new();
		let raw = match raw {
			None | Some(Value::Null) => &empty,
			Some(Value::Object(map)) => map,
			Some(other) => {
				return Err(ValidationError::new(
					"parameters",
					format!("expected an object, got {}", json_type_name(other)),
				))
			}
		};

		let mut values = IndexMap::new();
		for def in self.definitions.values() {
			if let Some(value) = def.validate(raw.get(&def.name))? {
				values.insert(def.name.clone(), value);
			}
		}
		Ok(ValidatedParameters { values })
	}

	pub fn to_json_schema(&self) -> Value {
		Value::Object(
			self.definitions
				.iter()
				.map(|(name, def)| (name.clone(), def.to_json_schema()))
				.collect(),
		)
	}
}

/// Typed parameter values handed to a task through its hooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParameters {
	values: IndexMap<String, ParameterValue>,
}

impl ValidatedParameters {
	pub fn get(&self, name: &str) -> Option<&ParameterValue> {
		self.values.get(name)
	}

	pub fn str(&self, name: &str) -> Option<&str> {
		match self.values.get(name)? {
			ParameterValue::String(s) | ParameterValue::Enum(s) => Some(s),
			_ => None,
		}
	}

	pub fn f64(&self, name: &str) -> Option<f64> {
		match self.values.get(name)? {
			ParameterValue::Number(n) => Some(*n),
			ParameterValue::Integer(i) => Some(*i as f64),
			_ => None,
		}
	}

	pub fn i64(&self, name: &str) -> Option<i64> {
		match self.values.get(name)? {
			ParameterValue::Integer(i) => Some(*i),
			_ => None,
		}
	}

	pub fn bool(&self, name: &str) -> Option<bool> {
		match self.values.get(name)? {
			ParameterValue::Boolean(b) => Some(*b),
			_ => None,
		}
	}

	pub fn array(&self, name: &str) -> Option<&[Value]> {
		match self.values.get(name)? {
			ParameterValue::Array(items) => Some(items),
			_ => None,
		}
	}

	pub fn prompt(&self, name: &str) -> Option<&Prompt> {
		match self.values.get(name)? {
			ParameterValue::Prompt(p) => Some(p),
			_ => None,
		}
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn to_value(&self) -> Value {
		Value::Object(
			self.values
				.iter()
				.map(|(name, value)| (name.clone(), value.to_value()))
				.collect(),
		)
	}
}

/// Accumulates parameter declarations in order.
///
/// ```ignore
/// let params = Parameters::builder()
///     .string("prefix", |p| p.default("Answer: "))
///     .number("temperature", |p| p.min(0.0).max(2.0).default(0.7))
///     .enumeration("tone", ["formal", "casual"], |p| p.default("formal"))
///     .prompt("main", |p| p.description("System prompt under test"))
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ParametersBuilder {
	definitions: IndexMap<String, ParameterDefinition>,
}

impl ParametersBuilder {
	pub fn string(self, name: &str, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self {
		self.declare(name, ParameterKind::String, f)
	}

	pub fn number(self, name: &str, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self {
		self.declare(name, ParameterKind::Number { min: None, max: None }, f)
	}

	pub fn integer(self, name: &str, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self {
		self.declare(name, ParameterKind::Integer { min: None, max: None }, f)
	}

	pub fn boolean(self, name: &str, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self {
		self.declare(name, ParameterKind::Boolean, f)
	}

	pub fn array(self, name: &str, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self {
		self.declare(name, ParameterKind::Array { items: None }, f)
	}

	pub fn enumeration<I, S>(self, name: &str, values: I, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let values = values.into_iter().map(Into::into).collect();
		self.declare(name, ParameterKind::Enum { values }, f)
	}

	pub fn prompt(self, name: &str, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self {
		self.declare(name, ParameterKind::Prompt, f)
	}

	/// Adds an already-built definition. A later declaration replaces an
	/// earlier one with the same name but keeps its position.
	pub fn definition(mut self, definition: ParameterDefinition) -> Self {
		self.definitions.insert(definition.name.clone(), definition);
		self
	}

	fn declare(self, name: &str, kind: ParameterKind, f: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder) -> Self {
		let builder = f(DefinitionBuilder {
			definition: ParameterDefinition::new(name, kind),
		});
		self.definition(builder.definition)
	}

	pub fn build(self) -> Parameters {
		Parameters {
			definitions: self.definitions,
		}
	}
}

/// Refines one declaration. Bounds only apply to numeric kinds and item types
/// only to arrays; elsewhere they are ignored.
#[derive(Debug)]
pub struct DefinitionBuilder {
	definition: ParameterDefinition,
}

impl DefinitionBuilder {
	pub fn default(mut self, value: impl Into<Value>) -> Self {
		self.definition.default = Some(value.into());
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.definition.description = Some(description.into());
		self
	}

	pub fn min(mut self, bound: f64) -> Self {
		match &mut self.definition.kind {
			ParameterKind::Number { min, .. } => *min = Some(bound),
			ParameterKind::Integer { min, .. } => *min = Some(bound.ceil() as i64),
			_ => {}
		}
		self
	}

	pub fn max(mut self, bound: f64) -> Self {
		match &mut self.definition.kind {
			ParameterKind::Number { max, .. } => *max = Some(bound),
			ParameterKind::Integer { max, .. } => *max = Some(bound.floor() as i64),
			_ => {}
		}
		self
	}

	pub fn items(mut self, item_type: ItemType) -> Self {
		if let ParameterKind::Array { items } = &mut self.definition.kind {
			*items = Some(item_type);
		}
		self
	}
}
