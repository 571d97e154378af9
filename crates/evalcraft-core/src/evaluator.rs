use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use evalcraft_types::{EvalCase, Row};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::datasource::DataSource;
use crate::error::EvalError;
use crate::hooks::EvalHooks;
use crate::parameters::Parameters;
use crate::scorer::{resolve_name, Scorer};
use crate::task::Task;

type DataProducer = Arc<dyn Fn() -> Result<Vec<Row>> + Send + Sync>;

#[derive(Clone, Default)]
enum EvaluatorData {
	#[default]
	Empty,
	Literal(Vec<Row>),
	Producer(DataProducer),
	Source(Arc<dyn DataSource>),
}

/// A named evaluation: data, a task, scorers and the parameters it accepts.
pub struct Evaluator {
	name: String,
	project_name: Option<String>,
	experiment_name: Option<String>,
	description: Option<String>,
	data: EvaluatorData,
	task: Option<Arc<dyn Task>>,
	scorers: Vec<Arc<dyn Scorer>>,
	parameters: Parameters,
}

impl Evaluator {
	pub fn builder(name: impl Into<String>) -> EvaluatorBuilder {
		EvaluatorBuilder::new(name)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn project_name(&self) -> Option<&str> {
		self.project_name.as_deref()
	}

	pub fn experiment_name(&self) -> Option<&str> {
		self.experiment_name.as_deref()
	}

	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	pub fn scorers(&self) -> &[Arc<dyn Scorer>] {
		&self.scorers
	}

	pub fn parameters(&self) -> &Parameters {
		&self.parameters
	}

	/// Loads the evaluator's own rows and normalises them into cases.
	pub async fn resolve_data(&self) -> Result<Vec<EvalCase>, EvalError> {
		let rows = match &self.data {
			EvaluatorData::Empty => Vec::new(),
			EvaluatorData::Literal(rows) => rows.clone(),
			EvaluatorData::Producer(produce) => produce()?,
			EvaluatorData::Source(source) => source.load().await?,
		};
		rows.into_iter()
			.enumerate()
			.map(|(idx, row)| {
				row.into_case().map_err(|e| {
					EvalError::argument(format!("Evaluator '{}' data item {idx} is invalid: {e}", self.name))
				})
			})
			.collect()
	}

	pub async fn run_task(&self, input: Value, hooks: EvalHooks) -> Result<Value> {
		let Some(task) = &self.task else {
			return Err(EvalError::MissingTask(self.name.clone()).into());
		};
		task.run(input, hooks).await
	}

	pub fn parameters_to_json_schema(&self) -> Value {
		self.parameters.to_json_schema()
	}

	pub fn scorer_info(&self) -> Vec<Value> {
		self.scorers
			.iter()
			.enumerate()
			.map(|(idx, s)| json!({ "name": resolve_name(s.as_ref(), idx) }))
			.collect()
	}
}

impl std::fmt::Debug for Evaluator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Evaluator")
			.field("name", &self.name)
			.field("project_name", &self.project_name)
			.field("scorers", &self.scorers.len())
			.field("parameters", &self.parameters.len())
			.finish_non_exhaustive()
	}
}

pub struct EvaluatorBuilder {
	name: String,
	project_name: Option<String>,
	experiment_name: Option<String>,
	description: Option<String>,
	data: EvaluatorData,
	task: Option<Arc<dyn Task>>,
	scorers: Vec<Arc<dyn Scorer>>,
	parameters: Parameters,
}

impl EvaluatorBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			project_name: None,
			experiment_name: None,
			description: None,
			data: EvaluatorData::Empty,
			task: None,
			scorers: Vec::new(),
			parameters: Parameters::default(),
		}
	}

	pub fn project_name(mut self, project_name: impl Into<String>) -> Self {
		self.project_name = Some(project_name.into());
		self
	}

	pub fn experiment_name(mut self, experiment_name: impl Into<String>) -> Self {
		self.experiment_name = Some(experiment_name.into());
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	/// Literal rows: `EvalCase`s, JSON objects, or a mix.
	pub fn data<I, R>(mut self, rows: I) -> Self
	where
		I: IntoIterator<Item = R>,
		R: Into<Row>,
	{
		self.data = EvaluatorData::Literal(rows.into_iter().map(Into::into).collect());
		self
	}

	/// Rows produced on demand, once per run.
	pub fn data_fn<F>(mut self, produce: F) -> Self
	where
		F: Fn() -> Result<Vec<Row>> + Send + Sync + 'static,
	{
		self.data = EvaluatorData::Producer(Arc::new(produce));
		self
	}

	pub fn data_source(mut self, source: Arc<dyn DataSource>) -> Self {
		self.data = EvaluatorData::Source(source);
		self
	}

	pub fn task(mut self, task: Arc<dyn Task>) -> Self {
		self.task = Some(task);
		self
	}

	pub fn scorers<I>(mut self, scorers: I) -> Self
	where
		I: IntoIterator<Item = Arc<dyn Scorer>>,
	{
		self.scorers = scorers.into_iter().collect();
		self
	}

	pub fn add_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
		self.scorers.push(scorer);
		self
	}

	pub fn parameters(mut self, parameters: Parameters) -> Self {
		self.parameters = parameters;
		self
	}

	pub fn build(self) -> Result<Evaluator, EvalError> {
		if self.name.trim().is_empty() {
			return Err(EvalError::argument("Evaluator name must not be empty"));
		}
		Ok(Evaluator {
			name: self.name,
			project_name: self.project_name,
			experiment_name: self.experiment_name,
			description: self.description,
			data: self.data,
			task: self.task,
			scorers: self.scorers,
			parameters: self.parameters,
		})
	}
}

/// Evaluators available to the server, keyed by name.
#[derive(Debug, Default)]
pub struct EvaluatorRegistry {
	evaluators: RwLock<IndexMap<String, Arc<Evaluator>>>,
}

impl EvaluatorRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an evaluator, replacing any earlier one with the same name.
	pub fn register(&self, evaluator: Evaluator) -> Arc<Evaluator> {
		let evaluator = Arc::new(evaluator);
		let mut evaluators = self.evaluators.write().unwrap_or_else(PoisonError::into_inner);
		if evaluators
			.insert(evaluator.name().to_string(), evaluator.clone())
			.is_some()
		{
			warn!(evaluator = evaluator.name(), "Replacing previously registered evaluator");
		} else {
			info!(evaluator = evaluator.name(), "Registered evaluator");
		}
		evaluator
	}

	pub fn get(&self, name: &str) -> Option<Arc<Evaluator>> {
		self.evaluators
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(name)
			.cloned()
	}

	/// Every registered evaluator, in registration order.
	pub fn list(&self) -> Vec<Arc<Evaluator>> {
		self.evaluators
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.values()
			.cloned()
			.collect()
	}

	pub fn names(&self) -> Vec<String> {
		self.evaluators
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.keys()
			.cloned()
			.collect()
	}

	pub fn len(&self) -> usize {
		self.evaluators.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drops every registration. Meant for test harnesses.
	pub fn clear(&self) {
		self.evaluators.write().unwrap_or_else(PoisonError::into_inner).clear();
	}

	/// `{name: {parameters, scores}}` for every registered evaluator.
	pub fn describe(&self) -> Value {
		let evaluators = self.evaluators.read().unwrap_or_else(PoisonError::into_inner);
		let mut out = Map::new();
		for (name, evaluator) in evaluators.iter() {
			out.insert(
				name.clone(),
				json!({
					"parameters": evaluator.parameters_to_json_schema(),
					"scores": evaluator.scorer_info(),
				}),
			);
		}
		Value::Object(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scorer;
	use crate::scorers::exact::ExactMatchScorer;
	use crate::task::{from_async_fn, from_async_fn_with_hooks};
	use crate::ScoreOutput;

	fn hooks() -> EvalHooks {
		EvalHooks::new(Arc::default(), Map::new(), None)
	}

	#[tokio::test]
	async fn test_resolve_literal_and_producer_data() {
		let literal = Evaluator::builder("literal")
			.data(vec![Row::from(EvalCase::new("a")), Row::from(json!({"input": "b", "expected": "B"}))])
			.build()
			.unwrap();
		let cases = literal.resolve_data().await.unwrap();
		assert_eq!(cases.len(), 2);
		assert_eq!(cases[1].expected, Some(json!("B")));

		let produced = Evaluator::builder("produced")
			.data_fn(|| Ok(vec![Row::from(json!({"input": 1}))]))
			.build()
			.unwrap();
		assert_eq!(produced.resolve_data().await.unwrap().len(), 1);

		let empty = Evaluator::builder("empty").build().unwrap();
		assert!(empty.resolve_data().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_resolve_rejects_non_object_rows() {
		let evaluator = Evaluator::builder("bad")
			.data(vec![json!({"input": 1}), json!(42)])
			.build()
			.unwrap();
		let err = evaluator.resolve_data().await.unwrap_err();
		assert!(matches!(err, EvalError::Argument(_)));
		assert!(err.to_string().contains("item 1"));
	}

	#[tokio::test]
	async fn test_run_task_dispatch() {
		let plain = Evaluator::builder("plain")
			.task(from_async_fn(|input| async move { Ok(input) }))
			.build()
			.unwrap();
		assert_eq!(plain.run_task(json!("x"), hooks()).await.unwrap(), json!("x"));

		let hooked = Evaluator::builder("hooked")
			.task(from_async_fn_with_hooks(|_input, hooks: EvalHooks| async move {
				Ok(json!(hooks.is_streaming()))
			}))
			.build()
			.unwrap();
		assert_eq!(hooked.run_task(json!("x"), hooks()).await.unwrap(), json!(false));

		let missing = Evaluator::builder("no-task").build().unwrap();
		let err = missing.run_task(json!("x"), hooks()).await.unwrap_err();
		assert!(err.to_string().contains("no task"));
	}

	#[test]
	fn test_empty_name_rejected() {
		assert!(Evaluator::builder("  ").build().is_err());
	}

	#[test]
	fn test_registry_describe_and_clear() {
		let registry = EvaluatorRegistry::new();
		registry.register(
			Evaluator::builder("upper")
				.add_scorer(Arc::new(ExactMatchScorer))
				.add_scorer(scorer::anonymous(|_| async { Ok(ScoreOutput::from(1.0)) }))
				.parameters(Parameters::builder().boolean("shout", |p| p.default(true)).build())
				.build()
				.unwrap(),
		);
		assert!(registry.get("upper").is_some());
		assert!(registry.get("lower").is_none());

		let listing = registry.describe();
		assert_eq!(listing["upper"]["scores"], json!([{"name": "exact_match"}, {"name": "scorer_1"}]));
		assert_eq!(listing["upper"]["parameters"]["shout"]["schema"], json!({"type": "boolean"}));

		registry.register(Evaluator::builder("upper").build().unwrap());
		assert_eq!(registry.len(), 1);

		registry.clear();
		assert!(registry.is_empty());
	}
}
