use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use strsim::levenshtein;

use crate::scorer::{ScoreOutput, Scorer, ScorerArgs};

/// Normalised edit-distance similarity between output and expected.
pub struct LevenshteinScorer {
    pub min_similarity: f64,
}

impl LevenshteinScorer {
    pub fn new(min_similarity: f64) -> Self {
        Self { min_similarity }
    }
}

#[async_trait]
impl Scorer for LevenshteinScorer {
    fn name(&self) -> Option<&str> {
        Some("levenshtein")
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScoreOutput> {
        let e = stringify(args.expected_or_null());
        let o = stringify(&args.output);
        let max_len = e.chars().count().max(o.chars().count()).max(1) as f64;
        let similarity = 1.0 - (levenshtein(&e, &o) as f64 / max_len);
        let mut record = Map::new();
        record.insert("score".into(), json!(similarity));
        record.insert("passed".into(), json!(similarity >= self.min_similarity));
        Ok(ScoreOutput::Record(record))
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        _ => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_similarity() {
        let args = ScorerArgs {
            input: Value::Null,
            output: json!("kitten"),
            expected: Some(json!("sitting")),
            metadata: Map::new(),
        };
        let record = LevenshteinScorer::new(0.5).score(&args).await.unwrap().normalize();
        let score = record.score.unwrap();
        assert!((score - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
        assert_eq!(record.extra["passed"], json!(true));
    }
}
