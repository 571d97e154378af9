use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{ApiClient, FunctionRef};
use crate::scorer::{ScoreOutput, Scorer, ScorerArgs};

/// A request-supplied scorer reference: `{name?, function_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerSpec {
	#[serde(default)]
	pub name: Option<String>,
	pub function_id: FunctionRef,
}

/// Forwards scoring to a function hosted by the remote API.
pub struct RemoteScorer {
	name: Option<String>,
	function: FunctionRef,
	client: Arc<dyn ApiClient>,
}

impl RemoteScorer {
	pub fn new(name: Option<String>, function: FunctionRef, client: Arc<dyn ApiClient>) -> Self {
		Self { name, function, client }
	}

	pub fn build_from_specs(specs: &[ScorerSpec], client: &Arc<dyn ApiClient>) -> Vec<Arc<dyn Scorer>> {
		specs
			.iter()
			.map(|spec| {
				Arc::new(RemoteScorer::new(spec.name.clone(), spec.function_id.clone(), client.clone()))
					as Arc<dyn Scorer>
			})
			.collect()
	}
}

#[async_trait]
impl Scorer for RemoteScorer {
	fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	fn fallback_name(&self) -> Option<&str> {
		Some(self.function.id())
	}

	async fn score(&self, args: &ScorerArgs) -> Result<ScoreOutput> {
		let payload = json!({
			"input": args.input,
			"output": args.output,
			"expected": args.expected,
			"metadata": args.metadata,
		});
		let result = self.client.invoke_scorer(&self.function, &payload).await?;
		Ok(ScoreOutput::from(result))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scorer::resolve_name;
	use crate::testing::StubApiClient;
	use serde_json::{Map, Value};

	#[tokio::test]
	async fn test_forwards_args_and_normalises_result() {
		let stub = Arc::new(StubApiClient::new().with_scorer_result("fn-1", json!({"score": 0.8, "name": "judge"})));
		let client: Arc<dyn ApiClient> = stub.clone();
		let specs: Vec<ScorerSpec> =
			serde_json::from_value(json!([{"name": "judge", "function_id": {"function_id": "fn-1"}}])).unwrap();
		let scorers = RemoteScorer::build_from_specs(&specs, &client);
		assert_eq!(scorers.len(), 1);

		let args = ScorerArgs {
			input: json!("q"),
			output: json!("a"),
			expected: None,
			metadata: Map::new(),
		};
		let record = scorers[0].score(&args).await.unwrap().normalize();
		assert_eq!(record.score, Some(0.8));

		let calls = stub.scorer_calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0, "fn-1");
		assert_eq!(calls[0].1["output"], json!("a"));
		assert_eq!(calls[0].1["expected"], Value::Null);
	}

	#[tokio::test]
	async fn test_unnamed_spec_falls_back_to_function_id() {
		let client: Arc<dyn ApiClient> = Arc::new(StubApiClient::new());
		let specs: Vec<ScorerSpec> = serde_json::from_value(json!([{"function_id": "fn-9"}])).unwrap();
		let scorers = RemoteScorer::build_from_specs(&specs, &client);
		assert_eq!(resolve_name(scorers[0].as_ref(), 4), "fn-9");
	}

	#[tokio::test]
	async fn test_remote_failure_is_an_error() {
		let client: Arc<dyn ApiClient> = Arc::new(StubApiClient::new());
		let scorer = RemoteScorer::new(None, FunctionRef::Id("missing".into()), client);
		let args = ScorerArgs {
			input: json!(1),
			output: json!(2),
			expected: None,
			metadata: Map::new(),
		};
		assert!(scorer.score(&args).await.is_err());
	}
}
