use anyhow::Result;
use async_trait::async_trait;

use crate::scorer::{ScoreOutput, Scorer, ScorerArgs};

/// 1.0 when the output equals `expected`, 0.0 otherwise.
pub struct ExactMatchScorer;

#[async_trait]
impl Scorer for ExactMatchScorer {
	fn name(&self) -> Option<&str> {
		Some("exact_match")
	}

	async fn score(&self, args: &ScorerArgs) -> Result<ScoreOutput> {
		Ok(ScoreOutput::Bool(args.expected_or_null() == &args.output))
	}
}
