//! Turns the `data` field of a run request into cases.
//!
//! Accepted shapes, first match wins:
//!
//! 1. `[row, ...]`
//! 2. `{"data": [row, ...]}`
//! 3. `{"dataset_id": "..."}`
//! 4. `{"project_name": "...", "dataset_name": "..."}`

use evalcraft_types::{json_type_name, EvalCase, Row};
use serde_json::Value;
use tracing::debug;

use crate::api::ApiClient;
use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedData {
	pub cases: Vec<EvalCase>,
	/// Set when the rows came from a stored dataset.
	pub dataset_id: Option<String>,
}

pub struct DataResolver;

impl DataResolver {
	/// `None`/`null` resolves to `None`, leaving the evaluator's own data in effect.
	pub async fn resolve(spec: Option<&Value>, client: Option<&dyn ApiClient>) -> Result<Option<ResolvedData>, EvalError> {
		let spec = match spec {
			None | Some(Value::Null) => return Ok(None),
			Some(spec) => spec,
		};

		if let Value::Array(rows) = spec {
			return Ok(Some(ResolvedData {
				cases: rows_to_cases(rows)?,
				dataset_id: None,
			}));
		}

		let Value::Object(map) = spec else {
			return Err(unsupported(format!("got {}", json_type_name(spec))));
		};

		if let Some(Value::Array(rows)) = map.get("data") {
			return Ok(Some(ResolvedData {
				cases: rows_to_cases(rows)?,
				dataset_id: None,
			}));
		}

		if let Some(dataset_id) = Self::dataset_id(spec) {
			let client = require_client(client)?;
			let rows = client.fetch_rows(&dataset_id).await?;
			debug!(dataset_id = %dataset_id, rows = rows.len(), "Resolved dataset by id");
			return Ok(Some(ResolvedData {
				cases: rows_to_cases(&rows)?,
				dataset_id: Some(dataset_id),
			}));
		}

		if let (Some(project_name), Some(dataset_name)) = (
			map.get("project_name").and_then(Value::as_str),
			map.get("dataset_name").and_then(Value::as_str),
		) {
			let client = require_client(client)?;
			let dataset = client.get_dataset(project_name, dataset_name).await?;
			let rows = client.fetch_rows(&dataset.id).await?;
			debug!(project_name, dataset_name, dataset_id = %dataset.id, rows = rows.len(), "Resolved dataset by name");
			return Ok(Some(ResolvedData {
				cases: rows_to_cases(&rows)?,
				dataset_id: Some(dataset.id),
			}));
		}

		let keys: Vec<&str> = map.keys().map(String::as_str).collect();
		Err(unsupported(format!("got object with keys [{}]", keys.join(", "))))
	}

	/// The `dataset_id` named by a spec, if it names one directly.
	pub fn dataset_id(spec: &Value) -> Option<String> {
		spec.get("dataset_id").and_then(Value::as_str).map(str::to_string)
	}
}

fn require_client(client: Option<&dyn ApiClient>) -> Result<&dyn ApiClient, EvalError> {
	client.ok_or_else(|| EvalError::argument("Resolving a stored dataset requires an authenticated session"))
}

fn unsupported(detail: String) -> EvalError {
	EvalError::argument(format!(
		"Unsupported data spec: expected an array of rows, {{data: [...]}}, {{dataset_id}} or {{project_name, dataset_name}}; {detail}"
	))
}

pub(crate) fn rows_to_cases(rows: &[Value]) -> Result<Vec<EvalCase>, EvalError> {
	rows.iter()
		.enumerate()
		.map(|(idx, row)| {
			Row::Value(row.clone())
				.into_case()
				.map_err(|e| EvalError::argument(format!("Invalid data row at index {idx}: {e}")))
		})
		.collect()
}
