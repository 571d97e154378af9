//! Test doubles and assertions for code built on evalcraft-core.
//!
//! Enabled with the `testing` feature.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use evalcraft_types::{ProgressEvent, SpanEvent, Summary};
use serde_json::Value;

use crate::api::{ApiClient, ApiError, DatasetInfo, Experiment, ExperimentRequest, FunctionRef};
use crate::hooks::ProgressSink;

/// In-memory [`ApiClient`] with canned datasets and scorer results that
/// records every write it receives.
#[derive(Debug, Default)]
pub struct StubApiClient {
	datasets: HashMap<String, Vec<Value>>,
	named_datasets: HashMap<(String, String), String>,
	scorer_results: HashMap<String, Value>,
	fail_experiments: bool,
	fail_inserts: bool,
	experiments: Mutex<Vec<ExperimentRequest>>,
	inserts: Mutex<Vec<Vec<SpanEvent>>>,
	scorer_calls: Mutex<Vec<(String, Value)>>,
}

impl StubApiClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_dataset(mut self, dataset_id: &str, rows: Vec<Value>) -> Self {
		self.datasets.insert(dataset_id.to_string(), rows);
		self
	}

	pub fn with_named_dataset(mut self, project_name: &str, dataset_name: &str, dataset_id: &str) -> Self {
		self.named_datasets
			.insert((project_name.to_string(), dataset_name.to_string()), dataset_id.to_string());
		self
	}

	pub fn with_scorer_result(mut self, function_id: &str, result: Value) -> Self {
		self.scorer_results.insert(function_id.to_string(), result);
		self
	}

	pub fn failing_experiments(mut self) -> Self {
		self.fail_experiments = true;
		self
	}

	pub fn failing_inserts(mut self) -> Self {
		self.fail_inserts = true;
		self
	}

	pub fn experiment_requests(&self) -> Vec<ExperimentRequest> {
		lock(&self.experiments).clone()
	}

	/// One entry per `insert_span_events` call.
	pub fn inserted_batches(&self) -> Vec<Vec<SpanEvent>> {
		lock(&self.inserts).clone()
	}

	pub fn scorer_calls(&self) -> Vec<(String, Value)> {
		lock(&self.scorer_calls).clone()
	}
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ApiClient for StubApiClient {
	async fn fetch_rows(&self, dataset_id: &str) -> Result<Vec<Value>, ApiError> {
		self.datasets
			.get(dataset_id)
			.cloned()
			.ok_or_else(|| ApiError::Other(format!("unknown dataset {dataset_id}")))
	}

	async fn get_dataset(&self, project_name: &str, dataset_name: &str) -> Result<DatasetInfo, ApiError> {
		let key = (project_name.to_string(), dataset_name.to_string());
		match self.named_datasets.get(&key) {
			Some(id) => Ok(DatasetInfo {
				id: id.clone(),
				name: dataset_name.to_string(),
				project_id: None,
			}),
			None => Err(ApiError::DatasetNotFound {
				project_name: project_name.to_string(),
				dataset_name: dataset_name.to_string(),
			}),
		}
	}

	async fn invoke_scorer(&self, function: &FunctionRef, args: &Value) -> Result<Value, ApiError> {
		lock(&self.scorer_calls).push((function.id().to_string(), args.clone()));
		self.scorer_results
			.get(function.id())
			.cloned()
			.ok_or_else(|| ApiError::Other(format!("unknown function {}", function.id())))
	}

	async fn create_experiment(&self, request: &ExperimentRequest) -> Result<Experiment, ApiError> {
		lock(&self.experiments).push(request.clone());
		if self.fail_experiments {
			return Err(ApiError::Other("experiment registration unavailable".to_string()));
		}
		let project_name = request.project_name.clone().unwrap_or_else(|| "stub-project".to_string());
		let name = request.experiment_name.clone().unwrap_or_else(|| "stub-experiment".to_string());
		Ok(Experiment {
			id: format!("exp-{}", lock(&self.experiments).len()),
			name,
			project_id: "proj-1".to_string(),
			project_name,
			url: None,
		})
	}

	async fn insert_span_events(&self, events: &[SpanEvent]) -> Result<(), ApiError> {
		lock(&self.inserts).push(events.to_vec());
		if self.fail_inserts {
			return Err(ApiError::Other("logs unavailable".to_string()));
		}
		Ok(())
	}
}

/// Records every progress event in arrival order.
#[derive(Debug, Default)]
pub struct ProgressCollector {
	events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressCollector {
	pub fn events(&self) -> Vec<ProgressEvent> {
		lock(&self.events).clone()
	}
}

#[async_trait]
impl ProgressSink for ProgressCollector {
	async fn send(&self, event: ProgressEvent) {
		lock(&self.events).push(event);
	}
}

/// Assert a scorer's mean meets a threshold.
pub fn assert_mean_score(summary: &Summary, scorer: &str, min_score: f64) -> Result<()> {
	let Some(score) = summary.scores.get(scorer) else {
		anyhow::bail!("Scorer '{}' missing from summary\n{}", scorer, summary.summary_table());
	};
	if score.score < min_score {
		anyhow::bail!(
			"Evaluation failed: {} mean {:.3} is below threshold {:.3}\n{}",
			scorer,
			score.score,
			min_score,
			summary.summary_table()
		);
	}
	Ok(())
}

/// Assert no case's task raised.
pub fn assert_no_task_errors(summary: &Summary) -> Result<()> {
	let failed = summary
		.results
		.iter()
		.flatten()
		.filter(|r| r.error.is_some())
		.count();
	if failed > 0 {
		anyhow::bail!("Evaluation failed: {} case(s) raised\n{}", failed, summary.summary_table());
	}
	Ok(())
}
