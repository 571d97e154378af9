use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::summary::ScoreRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressObjectType {
	Task,
	Scorer,
	Experiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
	JsonDelta,
	Error,
	Start,
}

/// A live update emitted while a run is in flight.
///
/// `data` is always a string: JSON-encoded output for deltas, the message for errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
	pub id: String,
	pub object_type: ProgressObjectType,
	pub name: String,
	pub format: String,
	pub output_type: String,
	pub event: ProgressKind,
	pub data: String,
}

impl ProgressEvent {
	pub fn task_output(span_id: &str, evaluator: &str, output: &Value) -> Self {
		Self::new(
			span_id,
			ProgressObjectType::Task,
			evaluator,
			"completion",
			ProgressKind::JsonDelta,
			output.to_string(),
		)
	}

	pub fn task_error(span_id: &str, evaluator: &str, message: &str) -> Self {
		Self::new(
			span_id,
			ProgressObjectType::Task,
			evaluator,
			"completion",
			ProgressKind::Error,
			message.to_string(),
		)
	}

	pub fn scorer(span_id: &str, scorer: &str, record: &ScoreRecord) -> Self {
		match &record.error {
			Some(message) => Self::new(
				span_id,
				ProgressObjectType::Scorer,
				scorer,
				"score",
				ProgressKind::Error,
				message.clone(),
			),
			None => Self::new(
				span_id,
				ProgressObjectType::Scorer,
				scorer,
				"score",
				ProgressKind::JsonDelta,
				serde_json::to_string(record).unwrap_or_default(),
			),
		}
	}

	pub fn experiment_started(experiment_id: &str, experiment_name: &str, info: &Value) -> Self {
		Self::new(
			experiment_id,
			ProgressObjectType::Experiment,
			experiment_name,
			"start",
			ProgressKind::Start,
			info.to_string(),
		)
	}

	fn new(
		id: &str,
		object_type: ProgressObjectType,
		name: &str,
		output_type: &str,
		event: ProgressKind,
		data: String,
	) -> Self {
		Self {
			id: id.to_string(),
			object_type,
			name: name.to_string(),
			format: "code".to_string(),
			output_type: output_type.to_string(),
			event,
			data,
		}
	}

	pub fn is_task(&self) -> bool {
		self.object_type == ProgressObjectType::Task
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_task_output_encodes_payload() {
		let event = ProgressEvent::task_output("span", "upper", &json!({"text": "HI"}));
		assert!(event.is_task());
		assert_eq!(event.data, r#"{"text":"HI"}"#);

		let v = serde_json::to_value(&event).unwrap();
		assert_eq!(v["object_type"], json!("task"));
		assert_eq!(v["event"], json!("json_delta"));
		assert_eq!(v["format"], json!("code"));
	}

	#[test]
	fn test_scorer_error_event() {
		let event = ProgressEvent::scorer("span", "judge", &ScoreRecord::failed("timeout"));
		assert!(!event.is_task());
		assert_eq!(event.event, ProgressKind::Error);
		assert_eq!(event.data, "timeout");
	}
}
