use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use evalcraft_types::{
	CaseResult, EvalCase, ParentDescriptor, ProgressEvent, ScoreRecord, ScoreSummary, SpanEvent, SpanMetrics,
	SpanOrigin, Summary,
};
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::api::{Experiment, ExperimentRequest, Session};
use crate::error::EvalError;
use crate::evaluator::Evaluator;
use crate::hooks::{EvalHooks, ProgressSink};
use crate::parameters::ValidatedParameters;
use crate::scorer::{resolve_name, Scorer, ScorerArgs};

/// One run of an evaluator: resolve data, run every case in order, score,
/// flush spans, summarise.
pub struct EvalRunner {
	evaluator: Arc<Evaluator>,
	session: Option<Session>,
	parameters: Arc<ValidatedParameters>,
	progress: Option<Arc<dyn ProgressSink>>,
	parent: Option<ParentDescriptor>,
	data: Option<Vec<EvalCase>>,
	extra_scorers: Vec<Arc<dyn Scorer>>,
	experiment_name: Option<String>,
	project_id: Option<String>,
	dataset_id: Option<String>,
	no_send_logs: bool,
	pending_spans: Vec<SpanEvent>,
}

impl EvalRunner {
	pub fn new(evaluator: Arc<Evaluator>) -> Self {
		Self {
			evaluator,
			session: None,
			parameters: Arc::default(),
			progress: None,
			parent: None,
			data: None,
			extra_scorers: Vec::new(),
			experiment_name: None,
			project_id: None,
			dataset_id: None,
			no_send_logs: false,
			pending_spans: Vec::new(),
		}
	}

	pub fn session(mut self, session: Option<Session>) -> Self {
		self.session = session;
		self
	}

	pub fn parameters(mut self, parameters: ValidatedParameters) -> Self {
		self.parameters = Arc::new(parameters);
		self
	}

	pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
		self.progress = Some(progress);
		self
	}

	pub fn parent(mut self, parent: Option<ParentDescriptor>) -> Self {
		self.parent = parent;
		self
	}

	/// Cases to run instead of the evaluator's own data.
	pub fn data(mut self, cases: Vec<EvalCase>) -> Self {
		self.data = Some(cases);
		self
	}

	/// Scorers appended after the evaluator's own.
	pub fn extra_scorers(mut self, scorers: Vec<Arc<dyn Scorer>>) -> Self {
		self.extra_scorers = scorers;
		self
	}

	pub fn experiment_name(mut self, name: Option<String>) -> Self {
		self.experiment_name = name;
		self
	}

	pub fn project_id(mut self, project_id: Option<String>) -> Self {
		self.project_id = project_id;
		self
	}

	pub fn dataset_id(mut self, dataset_id: Option<String>) -> Self {
		self.dataset_id = dataset_id;
		self
	}

	/// Skip experiment registration; the caller owns where results are logged.
	pub fn no_send_logs(mut self, no_send_logs: bool) -> Self {
		self.no_send_logs = no_send_logs;
		self
	}

	#[instrument(skip_all, fields(evaluator = %self.evaluator.name()))]
	pub async fn run(mut self) -> Result<Summary, EvalError> {
		let cases = match self.data.take() {
			Some(cases) => cases,
			None => self.evaluator.resolve_data().await?,
		};

		let scorers: Vec<Arc<dyn Scorer>> = self
			.evaluator
			.scorers()
			.iter()
			.chain(self.extra_scorers.iter())
			.cloned()
			.collect();
		let scorer_names: Vec<String> = scorers
			.iter()
			.enumerate()
			.map(|(idx, s)| resolve_name(s.as_ref(), idx))
			.collect();

		let experiment = self.create_experiment().await;
		info!(cases = cases.len(), scorers = scorers.len(), "Starting evaluation run");

		let mut results = Vec::with_capacity(cases.len());
		for case in cases {
			let result = self.run_case(case, &scorers, &scorer_names).await;
			results.push(result);
		}

		self.flush_spans().await;

		let summary = self.summarize(experiment, &scorer_names, results);
		debug!("\n{}", summary.summary_table());
		Ok(summary)
	}

	async fn create_experiment(&self) -> Option<Experiment> {
		let session = self.session.as_ref()?;
		if self.no_send_logs {
			return None;
		}
		let request = ExperimentRequest {
			project_name: Some(self.project_name().to_string()),
			project_id: self.project_id.clone().or_else(|| session.project_id.clone()),
			experiment_name: self
				.experiment_name
				.clone()
				.or_else(|| self.evaluator.experiment_name().map(str::to_string)),
			dataset_id: self.dataset_id.clone(),
		};
		match session.client.create_experiment(&request).await {
			Ok(experiment) => {
				info!(experiment_id = %experiment.id, experiment = %experiment.name, "Registered experiment");
				let info = json!({
					"experiment_id": experiment.id,
					"experiment_name": experiment.name,
					"project_name": experiment.project_name,
					"experiment_url": experiment.url,
				});
				self.report(ProgressEvent::experiment_started(&experiment.id, &experiment.name, &info))
					.await;
				Some(experiment)
			}
			Err(e) => {
				warn!(error = %e, "Failed to register experiment; continuing without one");
				None
			}
		}
	}

	async fn run_case(&mut self, case: EvalCase, scorers: &[Arc<dyn Scorer>], scorer_names: &[String]) -> CaseResult {
		let row_id = Uuid::new_v4().to_string();
		let span_id = Uuid::new_v4().to_string();
		let root_span_id = self
			.parent
			.as_ref()
			.and_then(|p| p.root_span_id())
			.map(str::to_string)
			.unwrap_or_else(|| span_id.clone());

		let hooks = EvalHooks::new(self.parameters.clone(), case.metadata.clone(), self.progress.clone());
		let start = epoch_seconds();
		let outcome = AssertUnwindSafe(self.evaluator.run_task(case.input.clone(), hooks.clone()))
			.catch_unwind()
			.await
			.unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(panic))));
		let metadata = hooks.metadata();

		let (output, task_error) = match outcome {
			Ok(output) => {
				self.report(ProgressEvent::task_output(&span_id, self.evaluator.name(), &output))
					.await;
				(output, None)
			}
			Err(e) => {
				let message = e.to_string();
				debug!(error = %message, "Task failed");
				self.report(ProgressEvent::task_error(&span_id, self.evaluator.name(), &message))
					.await;
				(Value::Null, Some(message))
			}
		};

		let mut scores = IndexMap::new();
		if task_error.is_none() {
			let args = ScorerArgs {
				input: case.input.clone(),
				output: output.clone(),
				expected: case.expected.clone(),
				metadata: metadata.clone(),
			};
			for (scorer, name) in scorers.iter().zip(scorer_names) {
				let record = score_isolated(scorer.as_ref(), &args).await;
				if let Some(message) = &record.error {
					debug!(scorer = %name, error = %message, "Scorer failed");
				}
				self.report(ProgressEvent::scorer(&span_id, name, &record)).await;
				scores.insert(name.clone(), record);
			}
		}
		let end = epoch_seconds();

		if let Some(parent) = &self.parent {
			let span = self.build_span(
				parent,
				SpanIds {
					row_id,
					span_id,
					root_span_id,
				},
				&case,
				&output,
				&scores,
				&metadata,
				task_error.clone(),
				SpanMetrics { start, end },
			);
			self.pending_spans.push(span);
		}

		CaseResult {
			input: case.input,
			output,
			expected: case.expected,
			error: task_error,
			scores,
			metadata,
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn build_span(
		&self,
		parent: &ParentDescriptor,
		ids: SpanIds,
		case: &EvalCase,
		output: &Value,
		scores: &IndexMap<String, ScoreRecord>,
		metadata: &Map<String, Value>,
		error: Option<String>,
		metrics: SpanMetrics,
	) -> SpanEvent {
		let mut span_attributes = Map::new();
		span_attributes.insert("name".to_string(), json!("eval"));
		span_attributes.insert("type".to_string(), json!("eval"));
		if let Some(propagated) = parent.propagated_span_attributes() {
			for (key, value) in propagated {
				span_attributes.insert(key.clone(), value.clone());
			}
		}

		let origin = match (&self.dataset_id, &case.id) {
			(Some(dataset_id), Some(row_id)) => {
				let mut origin = SpanOrigin::dataset(dataset_id.clone(), row_id.clone());
				origin.created = case.created.clone();
				origin.xact_id = case.xact_id();
				Some(origin)
			}
			_ => None,
		};

		let mut event = SpanEvent {
			id: ids.row_id,
			span_id: ids.span_id,
			root_span_id: ids.root_span_id,
			span_parents: parent.span_id().map(str::to_string).into_iter().collect(),
			span_attributes,
			input: case.input.clone(),
			output: output.clone(),
			expected: case.expected.clone(),
			scores: scores.iter().map(|(name, r)| (name.clone(), r.score)).collect(),
			metadata: metadata.clone(),
			error,
			origin,
			metrics,
			created: Utc::now().to_rfc3339(),
			log_id: String::new(),
			prompt_session_id: None,
			project_id: None,
			experiment_id: None,
		};
		event.route_to(parent.route());
		event
	}

	async fn flush_spans(&mut self) {
		if self.pending_spans.is_empty() {
			return;
		}
		let events = std::mem::take(&mut self.pending_spans);
		let Some(session) = &self.session else {
			debug!(spans = events.len(), "No session; dropping buffered span events");
			return;
		};
		match session.client.insert_span_events(&events).await {
			Ok(()) => debug!(spans = events.len(), "Flushed span events"),
			Err(e) => error!(error = %e, spans = events.len(), "Failed to flush span events"),
		}
	}

	fn summarize(&self, experiment: Option<Experiment>, scorer_names: &[String], results: Vec<CaseResult>) -> Summary {
		let longest_score_name = scorer_names.iter().map(String::len).max().unwrap_or(0);
		let mut scores = IndexMap::new();
		for name in scorer_names {
			if scores.contains_key(name) {
				continue;
			}
			let values: Vec<f64> = results
				.iter()
				.filter_map(|r| r.scores.get(name).and_then(|s| s.score))
				.collect();
			let mean = if values.is_empty() {
				0.0
			} else {
				values.iter().sum::<f64>() / values.len() as f64
			};
			scores.insert(
				name.clone(),
				ScoreSummary {
					name: name.clone(),
					score: mean,
					improvements: 0,
					regressions: 0,
					diff: None,
					longest_score_name,
				},
			);
		}

		let (project_name, project_id, experiment_name, experiment_id, experiment_url) = match experiment {
			Some(e) => (e.project_name, Some(e.project_id), e.name, Some(e.id), e.url),
			None => (
				self.project_name().to_string(),
				self.project_id.clone(),
				self.experiment_name
					.clone()
					.or_else(|| self.evaluator.experiment_name().map(str::to_string))
					.unwrap_or_else(|| self.evaluator.name().to_string()),
				None,
				None,
			),
		};

		Summary {
			project_name,
			project_id,
			experiment_name,
			experiment_id,
			experiment_url,
			scores,
			results: Some(results),
		}
	}

	fn project_name(&self) -> &str {
		self.evaluator.project_name().unwrap_or_else(|| self.evaluator.name())
	}

	async fn report(&self, event: ProgressEvent) {
		if let Some(progress) = &self.progress {
			progress.send(event).await;
		}
	}
}

struct SpanIds {
	row_id: String,
	span_id: String,
	root_span_id: String,
}

async fn score_isolated(scorer: &dyn Scorer, args: &ScorerArgs) -> ScoreRecord {
	match AssertUnwindSafe(scorer.score(args)).catch_unwind().await {
		Ok(Ok(output)) => output.normalize(),
		Ok(Err(e)) => ScoreRecord::failed(e.to_string()),
		Err(panic) => ScoreRecord::failed(panic_message(panic)),
	}
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s.clone()
	} else {
		"panicked".to_string()
	}
}

fn epoch_seconds() -> f64 {
	Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
