use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use evalcraft_core::{
	ApiClient, DataResolver, EvalError, EvalRunner, EvaluatorRegistry, HttpApiClient, ProgressSink, RemoteScorer,
	ScorerSpec, Session,
};
use evalcraft_types::{ParentDescriptor, ProgressEvent, Summary};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::auth::AuthContext;
use crate::sse::EventSink;

const INTERNAL_ERROR: &str = "Internal server error";

/// A failure surfaced to the caller as `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
	pub status: StatusCode,
	pub message: String,
}

impl HandlerError {
	pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
		Self {
			status,
			message: message.into(),
		}
	}

	pub fn bad_request(message: impl Into<String>) -> Self {
		Self::new(StatusCode::BAD_REQUEST, message)
	}

	pub fn unauthorized() -> Self {
		Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
	}
}

impl From<EvalError> for HandlerError {
	fn from(err: EvalError) -> Self {
		match err {
			EvalError::Validation(_) | EvalError::Argument(_) => Self::bad_request(err.to_string()),
			EvalError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
			other => {
				error!(error = ?other, "Evaluation failed");
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
			}
		}
	}
}

impl IntoResponse for HandlerError {
	fn into_response(self) -> Response {
		(self.status, Json(json!({ "error": self.message }))).into_response()
	}
}

/// Body of `POST /eval`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalRequest {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub data: Option<Value>,
	#[serde(default)]
	pub parameters: Option<Value>,
	#[serde(default, deserialize_with = "null_as_empty")]
	pub scores: Vec<ScorerSpec>,
	#[serde(default)]
	pub parent: Option<ParentDescriptor>,
	#[serde(default)]
	pub experiment_name: Option<String>,
	#[serde(default)]
	pub project_id: Option<String>,
	#[serde(default, deserialize_with = "true_only")]
	pub stream: bool,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ScorerSpec>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(Option::<Vec<ScorerSpec>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Only a literal `true` turns streaming on.
fn true_only<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(Value::deserialize(deserializer)? == Value::Bool(true))
}

#[derive(Debug, Clone)]
pub struct PreparedRequest {
	pub request: EvalRequest,
	pub stream: bool,
}

/// Authenticates and decodes a run request without touching any evaluator.
pub fn prepare_request(auth: &AuthContext, body: &[u8]) -> Result<PreparedRequest, HandlerError> {
	if !auth.is_authenticated() {
		return Err(HandlerError::unauthorized());
	}
	let raw: Value =
		serde_json::from_slice(body).map_err(|e| HandlerError::bad_request(format!("Invalid JSON body: {e}")))?;
	if !raw.is_object() {
		return Err(HandlerError::bad_request("Request body must be a JSON object"));
	}
	let stream = raw.get("stream") == Some(&Value::Bool(true));
	let request: EvalRequest =
		serde_json::from_value(raw).map_err(|e| HandlerError::bad_request(format!("Invalid request body: {e}")))?;
	Ok(PreparedRequest { request, stream })
}

/// Builds the API session for an authenticated caller.
pub trait SessionFactory: Send + Sync {
	fn session(&self, auth: &AuthContext) -> Option<Session>;
}

pub struct HttpSessionFactory {
	http: reqwest::Client,
	api_url: String,
}

impl HttpSessionFactory {
	pub fn new(http: reqwest::Client, api_url: impl Into<String>) -> Self {
		Self {
			http,
			api_url: api_url.into(),
		}
	}
}

impl SessionFactory for HttpSessionFactory {
	fn session(&self, auth: &AuthContext) -> Option<Session> {
		let token = auth.token.as_ref()?;
		let client = HttpApiClient::new(self.http.clone(), self.api_url.clone(), token.clone())
			.with_org_name(auth.org_name.clone());
		let client: Arc<dyn ApiClient> = Arc::new(client);
		Some(Session {
			org_name: auth.org_name.clone(),
			project_id: auth.project_id.clone(),
			client,
		})
	}
}

/// Everything that can fail before the first case runs.
#[instrument(skip_all, fields(evaluator = request.name.as_deref().unwrap_or_default()))]
async fn preflight(
	registry: &EvaluatorRegistry,
	session: Option<Session>,
	request: EvalRequest,
) -> Result<EvalRunner, HandlerError> {
	let name = request
		.name
		.filter(|n| !n.is_empty())
		.ok_or_else(|| HandlerError::bad_request("Missing required field: name"))?;
	let evaluator = registry.get(&name).ok_or(EvalError::NotFound(name))?;
	let parameters = evaluator
		.parameters()
		.validate(request.parameters.as_ref())
		.map_err(EvalError::from)?;

	let client = session.as_ref().map(|s| s.client.clone());
	let resolved = DataResolver::resolve(request.data.as_ref(), client.as_deref()).await?;

	let extra_scorers = match (&client, request.scores.is_empty()) {
		(_, true) => Vec::new(),
		(Some(client), false) => RemoteScorer::build_from_specs(&request.scores, client),
		(None, false) => {
			return Err(HandlerError::bad_request("Remote scorers require an authenticated session"));
		}
	};

	// A parent means the caller already owns where results are logged.
	let no_send_logs = request.parent.is_some();
	let mut runner = EvalRunner::new(evaluator)
		.session(session)
		.parameters(parameters)
		.parent(request.parent)
		.extra_scorers(extra_scorers)
		.experiment_name(request.experiment_name)
		.project_id(request.project_id)
		.no_send_logs(no_send_logs);
	if let Some(resolved) = resolved {
		debug!(cases = resolved.cases.len(), "Using request-supplied data");
		runner = runner.data(resolved.cases).dataset_id(resolved.dataset_id);
	}
	Ok(runner)
}

/// Runs an evaluation and returns the full summary.
pub async fn run_eval(
	registry: &EvaluatorRegistry,
	session: Option<Session>,
	request: EvalRequest,
) -> Result<Summary, HandlerError> {
	let runner = preflight(registry, session, request).await?;
	let summary = runner.run().await?;
	info!(experiment = %summary.experiment_name, "Evaluation finished");
	Ok(summary)
}

/// Runs an evaluation, writing `progress` events for task completions, then
/// exactly one `summary` or `error`, then `done`.
pub async fn run_eval_streaming(
	registry: &EvaluatorRegistry,
	session: Option<Session>,
	request: EvalRequest,
	sink: Arc<dyn EventSink>,
) {
	let outcome = match preflight(registry, session, request).await {
		Ok(runner) => {
			let progress = Arc::new(TaskProgress { sink: sink.clone() });
			runner.progress(progress).run().await.map_err(HandlerError::from)
		}
		Err(e) => Err(e),
	};

	match outcome.and_then(summary_event) {
		Ok(summary) => sink.push("summary", &summary).await,
		Err(e) => {
			debug!(status = %e.status, error = %e.message, "Streaming run failed");
			sink.push("error", &Value::String(e.message)).await;
		}
	}
	sink.push("done", &Value::Null).await;
	sink.close().await;
}

fn summary_event(summary: Summary) -> Result<Value, HandlerError> {
	serde_json::to_value(summary.without_results()).map_err(|e| {
		error!(error = %e, "Failed to encode summary");
		HandlerError::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
	})
}

/// Forwards task progress to the stream; per-scorer events stay server-side.
struct TaskProgress {
	sink: Arc<dyn EventSink>,
}

#[async_trait]
impl ProgressSink for TaskProgress {
	async fn send(&self, event: ProgressEvent) {
		if !event.is_task() {
			return;
		}
		match serde_json::to_value(&event) {
			Ok(data) => self.sink.push("progress", &data).await,
			Err(e) => error!(error = %e, "Failed to encode progress event"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sse::{parse_events, BufferedSse};
	use evalcraft_core::testing::StubApiClient;
	use evalcraft_core::{from_async_fn, Evaluator, ExactMatchScorer, Parameters};

	fn registry() -> EvaluatorRegistry {
		let registry = EvaluatorRegistry::new();
		registry.register(
			Evaluator::builder("upper")
				.data(vec![json!({"input": "a", "expected": "A"})])
				.task(from_async_fn(|input| async move {
					Ok(json!(input.as_str().unwrap_or_default().to_uppercase()))
				}))
				.add_scorer(Arc::new(ExactMatchScorer))
				.parameters(Parameters::builder().integer("retries", |p| p.min(0.0).max(3.0)).build())
				.build()
				.unwrap(),
		);
		registry
	}

	fn session(stub: Arc<StubApiClient>) -> Option<Session> {
		let client: Arc<dyn ApiClient> = stub;
		Some(Session::new(client))
	}

	fn request(body: Value) -> EvalRequest {
		serde_json::from_value(body).unwrap()
	}

	fn authed() -> AuthContext {
		AuthContext {
			token: Some("tok".into()),
			..Default::default()
		}
	}

	#[test]
	fn test_prepare_request() {
		let err = prepare_request(&AuthContext::default(), b"{}").unwrap_err();
		assert_eq!(err.status, StatusCode::UNAUTHORIZED);

		let err = prepare_request(&authed(), b"{not json").unwrap_err();
		assert_eq!(err.status, StatusCode::BAD_REQUEST);

		let err = prepare_request(&authed(), b"[1]").unwrap_err();
		assert_eq!(err.status, StatusCode::BAD_REQUEST);

		let prepared = prepare_request(&authed(), br#"{"name": "upper", "stream": true}"#).unwrap();
		assert!(prepared.stream);
		assert_eq!(prepared.request.name.as_deref(), Some("upper"));

		let prepared = prepare_request(&authed(), br#"{"name": "upper", "scores": null}"#).unwrap();
		assert!(prepared.request.scores.is_empty());
		assert!(!prepared.stream);

		for body in [
			br#"{"name": "upper", "stream": null}"#.as_slice(),
			br#"{"name": "upper", "stream": "true"}"#.as_slice(),
			br#"{"name": "upper", "stream": 1}"#.as_slice(),
		] {
			let prepared = prepare_request(&authed(), body).unwrap();
			assert!(!prepared.stream);
			assert!(!prepared.request.stream);
		}
	}

	#[tokio::test]
	async fn test_preflight_errors_map_to_statuses() {
		let registry = registry();
		let stub = Arc::new(StubApiClient::new());

		let err = run_eval(&registry, session(stub.clone()), request(json!({}))).await.unwrap_err();
		assert_eq!(err.status, StatusCode::BAD_REQUEST);

		let err = run_eval(&registry, session(stub.clone()), request(json!({"name": "nope"})))
			.await
			.unwrap_err();
		assert_eq!(err.status, StatusCode::NOT_FOUND);

		let err = run_eval(
			&registry,
			session(stub.clone()),
			request(json!({"name": "upper", "parameters": {"retries": 7}})),
		)
		.await
		.unwrap_err();
		assert_eq!(err.status, StatusCode::BAD_REQUEST);
		assert!(err.message.contains("retries"));

		let err = run_eval(&registry, session(stub), request(json!({"name": "upper", "data": {"rows": []}})))
			.await
			.unwrap_err();
		assert_eq!(err.status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_run_eval_with_inline_data_and_remote_scorer() {
		let registry = registry();
		let stub = Arc::new(StubApiClient::new().with_scorer_result("fn-1", json!(0.5)));
		let summary = run_eval(
			&registry,
			session(stub.clone()),
			request(json!({
				"name": "upper",
				"data": [{"input": "x", "expected": "X"}, {"input": "y", "expected": "Y"}],
				"scores": [{"name": "judge", "function_id": "fn-1"}],
			})),
		)
		.await
		.unwrap();

		assert_eq!(summary.results.as_ref().unwrap().len(), 2);
		assert_eq!(summary.scores["exact_match"].score, 1.0);
		assert_eq!(summary.scores["judge"].score, 0.5);
		assert_eq!(stub.scorer_calls().len(), 2);
		assert_eq!(stub.experiment_requests().len(), 1);
	}

	#[tokio::test]
	async fn test_parent_suppresses_experiment_creation() {
		let registry = registry();
		let stub = Arc::new(StubApiClient::new());
		run_eval(
			&registry,
			session(stub.clone()),
			request(json!({
				"name": "upper",
				"parent": {"object_type": "playground_logs", "object_id": "ps-1"},
			})),
		)
		.await
		.unwrap();
		assert!(stub.experiment_requests().is_empty());
		assert_eq!(stub.inserted_batches().len(), 1);
		assert_eq!(stub.inserted_batches()[0][0].prompt_session_id.as_deref(), Some("ps-1"));
	}

	#[tokio::test]
	async fn test_streaming_forwards_only_task_progress() {
		let registry = registry();
		let sink = Arc::new(BufferedSse::new());
		run_eval_streaming(
			&registry,
			session(Arc::new(StubApiClient::new())),
			request(json!({
				"name": "upper",
				"data": [{"input": "a"}, {"input": "b"}, {"input": "c"}],
				"parent": {"object_type": "playground_logs", "object_id": "ps-1"},
			})),
			sink.clone(),
		)
		.await;

		let events = parse_events(&sink.frames().concat());
		let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
		assert_eq!(names, vec!["progress", "progress", "progress", "summary", "done"]);
		for event in &events[..3] {
			let progress: Value = serde_json::from_str(&event.data).unwrap();
			assert_eq!(progress["object_type"], json!("task"));
		}
		let summary: Value = serde_json::from_str(&events[3].data).unwrap();
		assert!(summary.get("results").is_none());
		assert!(summary["scores"].get("exact_match").is_some());
		assert!(sink.is_closed());
	}

	#[tokio::test]
	async fn test_streaming_preflight_failure_emits_error_then_done() {
		let registry = registry();
		let sink = Arc::new(BufferedSse::new());
		run_eval_streaming(&registry, None, request(json!({"name": "missing"})), sink.clone()).await;

		let events = parse_events(&sink.frames().concat());
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].event, "error");
		assert_eq!(events[0].data, "Evaluator 'missing' not found");
		assert_eq!(events[1].event, "done");
	}

	#[tokio::test]
	async fn test_streaming_error_cannot_forge_events() {
		let name = "x\n\nevent: summary\ndata: {\"scores\":{}}";
		let sink = Arc::new(BufferedSse::new());
		run_eval_streaming(&EvaluatorRegistry::new(), None, request(json!({"name": name})), sink.clone()).await;

		let events = parse_events(&sink.frames().concat());
		let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
		assert_eq!(names, vec!["error", "done"]);
		let message: String = serde_json::from_str(&events[0].data).unwrap();
		assert_eq!(message, format!("Evaluator '{name}' not found"));
	}
}
