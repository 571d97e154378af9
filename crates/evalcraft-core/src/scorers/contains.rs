use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::scorer::{ScoreOutput, Scorer, ScorerArgs};

/// Checks if output contains a substring.
pub struct ContainsScorer {
    substring: String,
    case_sensitive: bool,
}

impl ContainsScorer {
    /// Creates a case-sensitive contains scorer.
    pub fn new(substring: impl Into<String>) -> Self {
        Self {
            substring: substring.into(),
            case_sensitive: true,
        }
    }

    /// Creates a case-insensitive contains scorer.
    pub fn case_insensitive(substring: impl Into<String>) -> Self {
        Self {
            substring: substring.into(),
            case_sensitive: false,
        }
    }
}

#[async_trait]
impl Scorer for ContainsScorer {
    fn name(&self) -> Option<&str> {
        Some("contains")
    }

    async fn score(&self, args: &ScorerArgs) -> Result<ScoreOutput> {
        let output_str = match &args.output {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other)?,
        };

        let found = if self.case_sensitive {
            output_str.contains(&self.substring)
        } else {
            output_str
                .to_lowercase()
                .contains(&self.substring.to_lowercase())
        };

        let mut record = Map::new();
        record.insert("score".into(), json!(if found { 1.0 } else { 0.0 }));
        record.insert(
            "metadata".into(),
            json!({
                "substring": self.substring,
                "case_sensitive": self.case_sensitive,
            }),
        );
        Ok(ScoreOutput::Record(record))
    }
}
