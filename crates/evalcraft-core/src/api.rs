//! The slice of the remote API the engine consumes, and its HTTP implementation.

use std::sync::Arc;

use async_trait::async_trait;
use evalcraft_types::SpanEvent;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const FETCH_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("request to {url} failed: {source}")]
	Http {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("{url} returned HTTP {status}: {body}")]
	Status { url: String, status: u16, body: String },

	#[error("unexpected response from {url}: {message}")]
	Decode { url: String, message: String },

	#[error("dataset '{dataset_name}' not found in project '{project_name}'")]
	DatasetNotFound {
		project_name: String,
		dataset_name: String,
	},

	#[error("{0}")]
	Other(String),
}

/// Reference to a remotely hosted function, either a bare id or `{function_id, version?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionRef {
	Id(String),
	Object {
		function_id: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		version: Option<String>,
	},
}

impl FunctionRef {
	pub fn id(&self) -> &str {
		match self {
			FunctionRef::Id(id) => id,
			FunctionRef::Object { function_id, .. } => function_id,
		}
	}

	pub fn version(&self) -> Option<&str> {
		match self {
			FunctionRef::Id(_) => None,
			FunctionRef::Object { version, .. } => version.as_deref(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExperimentRequest {
	pub project_name: Option<String>,
	pub project_id: Option<String>,
	pub experiment_name: Option<String>,
	pub dataset_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
	pub id: String,
	pub name: String,
	pub project_id: String,
	pub project_name: String,
	#[serde(default)]
	pub url: Option<String>,
}

#[async_trait]
pub trait ApiClient: Send + Sync {
	/// Every row of a dataset, in server order.
	async fn fetch_rows(&self, dataset_id: &str) -> Result<Vec<Value>, ApiError>;

	async fn get_dataset(&self, project_name: &str, dataset_name: &str) -> Result<DatasetInfo, ApiError>;

	async fn invoke_scorer(&self, function: &FunctionRef, args: &Value) -> Result<Value, ApiError>;

	async fn create_experiment(&self, request: &ExperimentRequest) -> Result<Experiment, ApiError>;

	/// Writes a batch of span events in one request.
	async fn insert_span_events(&self, events: &[SpanEvent]) -> Result<(), ApiError>;
}

/// An authenticated caller: who they are and the client acting on their behalf.
#[derive(Clone)]
pub struct Session {
	pub org_name: Option<String>,
	pub project_id: Option<String>,
	pub client: Arc<dyn ApiClient>,
}

impl Session {
	pub fn new(client: Arc<dyn ApiClient>) -> Self {
		Self {
			org_name: None,
			project_id: None,
			client,
		}
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("org_name", &self.org_name)
			.field("project_id", &self.project_id)
			.finish_non_exhaustive()
	}
}

/// Body of a span-event insert. Rows are JSON strings nested in the outer
/// document, not objects.
pub fn logs3_payload(events: &[SpanEvent]) -> Result<Value, serde_json::Error> {
	let rows = events
		.iter()
		.map(serde_json::to_string)
		.collect::<Result<Vec<_>, _>>()?;
	Ok(json!({ "rows": rows, "api_version": 2 }))
}

#[derive(Debug, Clone)]
pub struct HttpApiClient {
	http: reqwest::Client,
	api_url: String,
	api_key: String,
	org_name: Option<String>,
}

impl HttpApiClient {
	pub fn new(http: reqwest::Client, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
		Self {
			http,
			api_url: api_url.into().trim_end_matches('/').to_string(),
			api_key: api_key.into(),
			org_name: None,
		}
	}

	pub fn with_org_name(mut self, org_name: Option<String>) -> Self {
		self.org_name = org_name;
		self
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.api_url, path)
	}

	fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
		let req = req.bearer_auth(&self.api_key);
		match &self.org_name {
			Some(org) => req.header("x-bt-org-name", org),
			None => req,
		}
	}

	async fn send(&self, req: RequestBuilder, url: &str) -> Result<String, ApiError> {
		let resp = self.authorize(req).send().await.map_err(|source| ApiError::Http {
			url: url.to_string(),
			source,
		})?;
		let status = resp.status();
		let body = resp.text().await.map_err(|source| ApiError::Http {
			url: url.to_string(),
			source,
		})?;
		if !status.is_success() {
			return Err(ApiError::Status {
				url: url.to_string(),
				status: status.as_u16(),
				body,
			});
		}
		Ok(body)
	}

	async fn send_json<T: for<'de> Deserialize<'de>>(&self, req: RequestBuilder, url: &str) -> Result<T, ApiError> {
		let body = self.send(req, url).await?;
		serde_json::from_str(&body).map_err(|e| ApiError::Decode {
			url: url.to_string(),
			message: e.to_string(),
		})
	}
}

#[derive(Deserialize)]
struct FetchPage {
	#[serde(default)]
	events: Vec<Value>,
	#[serde(default)]
	cursor: Option<String>,
}

#[derive(Deserialize)]
struct DatasetList {
	#[serde(default)]
	objects: Vec<DatasetInfo>,
}

#[derive(Deserialize)]
struct NamedObject {
	id: String,
	name: String,
}

#[derive(Deserialize)]
struct RegisterResponse {
	project: NamedObject,
	experiment: NamedObject,
}

#[async_trait]
impl ApiClient for HttpApiClient {
	async fn fetch_rows(&self, dataset_id: &str) -> Result<Vec<Value>, ApiError> {
		let url = self.url(&format!("/v1/dataset/{dataset_id}/fetch"));
		let mut rows = Vec::new();
		let mut cursor: Option<String> = None;
		loop {
			let body = json!({ "limit": FETCH_PAGE_SIZE, "cursor": cursor });
			let page: FetchPage = self.send_json(self.http.post(&url).json(&body), &url).await?;
			let fetched = page.events.len();
			rows.extend(page.events);
			match page.cursor {
				Some(next) if fetched > 0 => cursor = Some(next),
				_ => break,
			}
		}
		debug!(dataset_id, rows = rows.len(), "Fetched dataset rows");
		Ok(rows)
	}

	async fn get_dataset(&self, project_name: &str, dataset_name: &str) -> Result<DatasetInfo, ApiError> {
		let url = self.url("/v1/dataset");
		let req = self
			.http
			.get(&url)
			.query(&[("project_name", project_name), ("dataset_name", dataset_name)]);
		let list: DatasetList = self.send_json(req, &url).await?;
		list.objects.into_iter().next().ok_or_else(|| ApiError::DatasetNotFound {
			project_name: project_name.to_string(),
			dataset_name: dataset_name.to_string(),
		})
	}

	async fn invoke_scorer(&self, function: &FunctionRef, args: &Value) -> Result<Value, ApiError> {
		let url = self.url(&format!("/v1/function/{}/invoke", function.id()));
		let mut body = json!({ "input": args });
		if let Some(version) = function.version() {
			body["version"] = json!(version);
		}
		self.send_json(self.http.post(&url).json(&body), &url).await
	}

	async fn create_experiment(&self, request: &ExperimentRequest) -> Result<Experiment, ApiError> {
		let url = self.url("/api/experiment/register");
		let resp: RegisterResponse = self.send_json(self.http.post(&url).json(request), &url).await?;
		Ok(Experiment {
			id: resp.experiment.id,
			name: resp.experiment.name,
			project_id: resp.project.id,
			project_name: resp.project.name,
			url: None,
		})
	}

	async fn insert_span_events(&self, events: &[SpanEvent]) -> Result<(), ApiError> {
		let url = self.url("/logs3");
		let payload = logs3_payload(events).map_err(|e| ApiError::Other(format!("failed to encode span events: {e}")))?;
		self.send(self.http.post(&url).json(&payload), &url).await?;
		debug!(rows = events.len(), "Flushed span events");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use evalcraft_types::SpanMetrics;
	use indexmap::IndexMap;
	use serde_json::Map;

	fn event(id: &str) -> SpanEvent {
		SpanEvent {
			id: id.to_string(),
			span_id: format!("{id}-span"),
			root_span_id: format!("{id}-span"),
			span_parents: vec![],
			span_attributes: Map::new(),
			input: json!("in"),
			output: json!("out"),
			expected: None,
			scores: IndexMap::new(),
			metadata: Map::new(),
			error: None,
			origin: None,
			metrics: SpanMetrics { start: 0.0, end: 1.0 },
			created: "2024-01-01T00:00:00Z".to_string(),
			log_id: "x".to_string(),
			prompt_session_id: Some("ps".to_string()),
			project_id: None,
			experiment_id: None,
		}
	}

	#[test]
	fn test_logs3_rows_are_json_strings() {
		let payload = logs3_payload(&[event("a"), event("b")]).unwrap();
		assert_eq!(payload["api_version"], json!(2));

		let rows = payload["rows"].as_array().unwrap();
		assert_eq!(rows.len(), 2);
		let first = rows[0].as_str().expect("row must be a string");
		let decoded: Value = serde_json::from_str(first).unwrap();
		assert_eq!(decoded["id"], json!("a"));
		assert_eq!(decoded["prompt_session_id"], json!("ps"));
	}

	#[test]
	fn test_function_ref_shapes() {
		let bare: FunctionRef = serde_json::from_value(json!("fn-1")).unwrap();
		assert_eq!(bare.id(), "fn-1");
		assert_eq!(bare.version(), None);

		let obj: FunctionRef = serde_json::from_value(json!({"function_id": "fn-2", "version": "3"})).unwrap();
		assert_eq!(obj.id(), "fn-2");
		assert_eq!(obj.version(), Some("3"));
	}

	#[test]
	fn test_api_url_trailing_slash_trimmed() {
		let client = HttpApiClient::new(reqwest::Client::new(), "https://api.example.com/", "key");
		assert_eq!(client.url("/logs3"), "https://api.example.com/logs3");
	}
}
