use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::scorer::{ScoreOutput, Scorer, ScorerArgs};

/// Checks if output matches a regex pattern.
pub struct RegexScorer {
	pattern: Regex,
}

impl RegexScorer {
	/// Creates a regex scorer with the given pattern.
	pub fn new(pattern: &str) -> Result<Self> {
		Ok(Self {
			pattern: Regex::new(pattern)?,
		})
	}
}

#[async_trait]
impl Scorer for RegexScorer {
	fn name(&self) -> Option<&str> {
		Some("regex")
	}

	async fn score(&self, args: &ScorerArgs) -> Result<ScoreOutput> {
		let output_str = match &args.output {
			Value::String(s) => s.clone(),
			other => serde_json::to_string(other)?,
		};

		let captures: Option<Vec<String>> = self.pattern.captures(&output_str).map(|caps| {
			caps.iter()
				.skip(1)
				.map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
				.collect()
		});

		let mut record = Map::new();
		record.insert("score".into(), json!(if captures.is_some() { 1.0 } else { 0.0 }));
		record.insert(
			"metadata".into(),
			json!({
				"pattern": self.pattern.as_str(),
				"captures": captures,
			}),
		);
		Ok(ScoreOutput::Record(record))
	}
}
