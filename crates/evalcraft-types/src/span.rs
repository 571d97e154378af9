use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowIds {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default)]
	pub span_id: Option<String>,
	#[serde(default)]
	pub root_span_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagatedEvent {
	#[serde(default)]
	pub span_attributes: Map<String, Value>,
}

/// Correlation handle supplied by the playground for the trace a run belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentDescriptor {
	pub object_type: String,
	pub object_id: String,
	#[serde(default)]
	pub row_ids: Option<RowIds>,
	#[serde(default)]
	pub propagated_event: Option<PropagatedEvent>,
}

/// Where span events for a parent get written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanRoute {
	PromptSession(String),
	ProjectLogs(String),
	Experiment(String),
	Unknown,
}

impl SpanRoute {
	pub fn log_id(&self) -> &'static str {
		match self {
			SpanRoute::ProjectLogs(_) => "g",
			SpanRoute::Experiment(_) => "e",
			SpanRoute::PromptSession(_) | SpanRoute::Unknown => "x",
		}
	}
}

impl ParentDescriptor {
	pub fn route(&self) -> SpanRoute {
		let id = self.object_id.clone();
		match self.object_type.as_str() {
			"playground_logs" => SpanRoute::PromptSession(id),
			"project_logs" => SpanRoute::ProjectLogs(id),
			"experiment" => SpanRoute::Experiment(id),
			_ => SpanRoute::Unknown,
		}
	}

	pub fn span_id(&self) -> Option<&str> {
		self.row_ids.as_ref().and_then(|r| r.span_id.as_deref())
	}

	pub fn root_span_id(&self) -> Option<&str> {
		self.row_ids.as_ref().and_then(|r| r.root_span_id.as_deref())
	}

	pub fn propagated_span_attributes(&self) -> Option<&Map<String, Value>> {
		self.propagated_event.as_ref().map(|e| &e.span_attributes)
	}
}

/// Dataset row a span was produced from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanOrigin {
	pub object_type: String,
	pub object_id: String,
	pub id: String,
	pub created: Option<String>,
	#[serde(rename = "_xact_id", default, skip_serializing_if = "Option::is_none")]
	pub xact_id: Option<String>,
}

impl SpanOrigin {
	pub fn dataset(dataset_id: impl Into<String>, row_id: impl Into<String>) -> Self {
		Self {
			object_type: "dataset".to_string(),
			object_id: dataset_id.into(),
			id: row_id.into(),
			created: None,
			xact_id: None,
		}
	}
}

/// Wall-clock seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanMetrics {
	pub start: f64,
	pub end: f64,
}

/// One case's execution, correlated with a parent trace.
///
/// Optional payload fields serialise as `null` so every row has the same keys;
/// only the routing id matching `log_id` is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
	pub id: String,
	pub span_id: String,
	pub root_span_id: String,
	pub span_parents: Vec<String>,
	pub span_attributes: Map<String, Value>,
	pub input: Value,
	pub output: Value,
	pub expected: Option<Value>,
	pub scores: IndexMap<String, Option<f64>>,
	pub metadata: Map<String, Value>,
	pub error: Option<String>,
	pub origin: Option<SpanOrigin>,
	pub metrics: SpanMetrics,
	pub created: String,
	pub log_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_session_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub project_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub experiment_id: Option<String>,
}

impl SpanEvent {
	/// Sets `log_id` and the matching routing id.
	pub fn route_to(&mut self, route: SpanRoute) {
		self.log_id = route.log_id().to_string();
		match route {
			SpanRoute::PromptSession(id) => self.prompt_session_id = Some(id),
			SpanRoute::ProjectLogs(id) => self.project_id = Some(id),
			SpanRoute::Experiment(id) => self.experiment_id = Some(id),
			SpanRoute::Unknown => {}
		}
	}
}
