use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use evalcraft_types::{json_type_name, ScoreRecord};
use serde_json::{Map, Value};

/// Everything a scorer gets to see about one case.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerArgs {
	pub input: Value,
	pub output: Value,
	pub expected: Option<Value>,
	pub metadata: Map<String, Value>,
}

impl ScorerArgs {
	/// `expected`, with a missing value read as `null`.
	pub fn expected_or_null(&self) -> &Value {
		self.expected.as_ref().unwrap_or(&Value::Null)
	}
}

/// What a scorer returned, before normalisation into a [`ScoreRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutput {
	Number(f64),
	Bool(bool),
	Record(Map<String, Value>),
	Other(Value),
}

impl From<f64> for ScoreOutput {
	fn from(score: f64) -> Self {
		ScoreOutput::Number(score)
	}
}

impl From<bool> for ScoreOutput {
	fn from(passed: bool) -> Self {
		ScoreOutput::Bool(passed)
	}
}

impl From<Value> for ScoreOutput {
	fn from(value: Value) -> Self {
		match value {
			Value::Number(n) => n.as_f64().map_or(ScoreOutput::Other(Value::Number(n)), ScoreOutput::Number),
			Value::Bool(b) => ScoreOutput::Bool(b),
			Value::Object(map) => ScoreOutput::Record(map),
			other => ScoreOutput::Other(other),
		}
	}
}

impl ScoreOutput {
	pub fn normalize(self) -> ScoreRecord {
		match self {
			ScoreOutput::Number(n) => ScoreRecord::value(n),
			ScoreOutput::Bool(b) => ScoreRecord::value(if b { 1.0 } else { 0.0 }),
			ScoreOutput::Record(mut map) => {
				let score = map.remove("score");
				let error = match map.remove("error") {
					Some(Value::String(message)) => Some(message),
					Some(Value::Null) | None => None,
					Some(other) => Some(other.to_string()),
				};
				let score = match score {
					None | Some(Value::Null) => Ok(None),
					Some(v) => coerce_score(&v).map(Some),
				};
				match score {
					Ok(score) => ScoreRecord {
						score,
						error,
						extra: map,
					},
					Err(message) => ScoreRecord {
						score: None,
						error: Some(message),
						extra: map,
					},
				}
			}
			ScoreOutput::Other(v) => match coerce_score(&v) {
				Ok(score) => ScoreRecord::value(score),
				Err(message) => ScoreRecord::failed(message),
			},
		}
	}
}

/// Numbers pass through, booleans map to 1/0, numeric strings parse, `null`
/// and other strings read as 0.0. Arrays and objects cannot be scores.
fn coerce_score(v: &Value) -> std::result::Result<f64, String> {
	match v {
		Value::Number(n) => n.as_f64().ok_or_else(|| format!("score {n} is not representable as f64")),
		Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
		Value::String(s) => Ok(s.trim().parse::<f64>().unwrap_or(0.0)),
		Value::Null => Ok(0.0),
		other => Err(format!("cannot use {} as a score", json_type_name(other))),
	}
}

#[async_trait]
pub trait Scorer: Send + Sync {
	fn name(&self) -> Option<&str> {
		None
	}

	/// Used when `name` is absent, e.g. the id of a remote function.
	fn fallback_name(&self) -> Option<&str> {
		None
	}

	async fn score(&self, args: &ScorerArgs) -> Result<ScoreOutput>;
}

/// Display name of the scorer at `index` in a run's combined scorer list.
pub fn resolve_name(scorer: &dyn Scorer, index: usize) -> String {
	scorer
		.name()
		.or_else(|| scorer.fallback_name())
		.map(str::to_string)
		.unwrap_or_else(|| format!("scorer_{index}"))
}

/// Wrap an async closure as a named `Scorer`.
pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Scorer>
where
	F: Send + Sync + 'static + Fn(ScorerArgs) -> Fut,
	Fut: Future<Output = Result<ScoreOutput>> + Send + 'static,
{
	Arc::new(ClosureScorer {
		name: Some(name.into()),
		f,
	})
}

/// Wrap an async closure as a `Scorer` named after its position in the run.
pub fn anonymous<F, Fut>(f: F) -> Arc<dyn Scorer>
where
	F: Send + Sync + 'static + Fn(ScorerArgs) -> Fut,
	Fut: Future<Output = Result<ScoreOutput>> + Send + 'static,
{
	Arc::new(ClosureScorer { name: None, f })
}

struct ClosureScorer<F> {
	name: Option<String>,
	f: F,
}

#[async_trait]
impl<F, Fut> Scorer for ClosureScorer<F>
where
	F: Send + Sync + 'static + Fn(ScorerArgs) -> Fut,
	Fut: Future<Output = Result<ScoreOutput>> + Send + 'static,
{
	fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	async fn score(&self, args: &ScorerArgs) -> Result<ScoreOutput> {
		(self.f)(args.clone()).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_normalize_numbers_and_bools() {
		assert_eq!(ScoreOutput::from(0.25).normalize(), ScoreRecord::value(0.25));
		assert_eq!(ScoreOutput::from(true).normalize(), ScoreRecord::value(1.0));
		assert_eq!(ScoreOutput::from(json!(false)).normalize(), ScoreRecord::value(0.0));
		assert_eq!(ScoreOutput::from(json!(1)).normalize(), ScoreRecord::value(1.0));
	}

	#[test]
	fn test_normalize_record_keeps_extra_keys() {
		let record = ScoreOutput::from(json!({"score": 0.5, "name": "judge", "metadata": {"why": "close"}})).normalize();
		assert_eq!(record.score, Some(0.5));
		assert_eq!(record.error, None);
		assert_eq!(record.extra["name"], json!("judge"));
		assert_eq!(record.extra["metadata"]["why"], json!("close"));

		let unscored = ScoreOutput::from(json!({"note": "skipped"})).normalize();
		assert_eq!(unscored.score, None);
	}

	#[test]
	fn test_normalize_coerces_everything_else() {
		assert_eq!(ScoreOutput::from(json!("0.75")).normalize(), ScoreRecord::value(0.75));
		assert_eq!(ScoreOutput::from(json!("great")).normalize(), ScoreRecord::value(0.0));
		assert_eq!(ScoreOutput::from(Value::Null).normalize(), ScoreRecord::value(0.0));

		let bad = ScoreOutput::from(json!([1, 2])).normalize();
		assert_eq!(bad.score, None);
		assert!(bad.error.unwrap().contains("array"));
	}

	#[tokio::test]
	async fn test_name_resolution_order() {
		struct Fallback;

		#[async_trait]
		impl Scorer for Fallback {
			fn fallback_name(&self) -> Option<&str> {
				Some("fn-123")
			}

			async fn score(&self, _args: &ScorerArgs) -> Result<ScoreOutput> {
				Ok(ScoreOutput::from(1.0))
			}
		}

		let named = from_fn("exact", |_args| async { Ok(ScoreOutput::from(1.0)) });
		let unnamed = anonymous(|_args| async { Ok(ScoreOutput::from(1.0)) });

		assert_eq!(resolve_name(named.as_ref(), 0), "exact");
		assert_eq!(resolve_name(&Fallback, 1), "fn-123");
		assert_eq!(resolve_name(unnamed.as_ref(), 2), "scorer_2");
	}
}
