use std::path::PathBuf;
use std::sync::Arc;

use evalcraft_core::{
	from_async_fn_with_hooks, EvalError, EvalHooks, Evaluator, ExactMatchScorer, JsonlDataSource, LevenshteinScorer,
	Parameters,
};
use serde_json::{json, Value};

pub const DEMO_EVALUATOR: &str = "echo-upper";

/// Uppercases string inputs, optionally prefixed. Scored by exact match and
/// edit-distance similarity. Rows come from `data` when given, else three
/// built-in cases.
pub fn echo_evaluator(data: Option<PathBuf>) -> Result<Evaluator, EvalError> {
	let task = from_async_fn_with_hooks(|input: Value, hooks: EvalHooks| async move {
		let text = input
			.as_str()
			.ok_or_else(|| anyhow::anyhow!("expected a string input"))?;
		let prefix = hooks.parameters().str("prefix").unwrap_or_default().to_string();
		let shout = hooks.parameters().bool("shout").unwrap_or(true);
		let body = if shout { text.to_uppercase() } else { text.to_string() };
		hooks.set_metadata("shout", shout);
		Ok::<_, anyhow::Error>(json!(format!("{prefix}{body}")))
	});

	let parameters = Parameters::builder()
		.string("prefix", |p| p.default("").description("Prepended to every output"))
		.boolean("shout", |p| p.default(true).description("Uppercase the input"))
		.build();

	let builder = Evaluator::builder(DEMO_EVALUATOR)
		.project_name("evalcraft-demo")
		.description("Uppercases its input")
		.task(task)
		.add_scorer(Arc::new(ExactMatchScorer))
		.add_scorer(Arc::new(LevenshteinScorer::new(0.8)))
		.parameters(parameters);

	let builder = match data {
		Some(path) => builder.data_source(Arc::new(JsonlDataSource::new(path))),
		None => builder.data(vec![
			json!({"input": "hello", "expected": "HELLO"}),
			json!({"input": "rust", "expected": "RUST"}),
			json!({"input": "evals", "expected": "EVALS"}),
		]),
	};
	builder.build()
}

#[cfg(test)]
mod tests {
	use super::*;
	use evalcraft_core::EvalRunner;

	#[tokio::test]
	async fn test_demo_scores_perfectly_on_builtin_rows() {
		let evaluator = Arc::new(echo_evaluator(None).unwrap());
		let summary = EvalRunner::new(evaluator).run().await.unwrap();
		assert_eq!(summary.scores["exact_match"].score, 1.0);
		assert_eq!(summary.scores["levenshtein"].score, 1.0);
		assert_eq!(summary.project_name, "evalcraft-demo");
	}

	#[tokio::test]
	async fn test_demo_parameters_shape_output() {
		let evaluator = Arc::new(echo_evaluator(None).unwrap());
		let parameters = evaluator
			.parameters()
			.validate(Some(&json!({"prefix": "> ", "shout": false})))
			.unwrap();
		let summary = EvalRunner::new(evaluator).parameters(parameters).run().await.unwrap();
		let results = summary.results.unwrap();
		assert_eq!(results[0].output, json!("> hello"));
		assert_eq!(results[0].metadata["shout"], json!(false));
		assert_eq!(summary.scores["exact_match"].score, 0.0);
	}
}
