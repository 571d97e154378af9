use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabled::{Table, Tabled};

/// Normalised outcome of one scorer on one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
	pub score: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Any other keys a scorer returned alongside `score`.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl ScoreRecord {
	pub fn value(score: f64) -> Self {
		Self {
			score: Some(score),
			error: None,
			extra: Map::new(),
		}
	}

	pub fn failed(message: impl Into<String>) -> Self {
		Self {
			score: None,
			error: Some(message.into()),
			extra: Map::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
	pub input: Value,
	pub output: Value,
	pub expected: Option<Value>,
	pub error: Option<String>,
	pub scores: IndexMap<String, ScoreRecord>,
	pub metadata: Map<String, Value>,
}

/// Aggregate for one scorer across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
	pub name: String,
	pub score: f64,
	pub improvements: u32,
	pub regressions: u32,
	pub diff: Option<f64>,
	#[serde(rename = "_longest_score_name")]
	pub longest_score_name: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
	pub project_name: String,
	pub project_id: Option<String>,
	pub experiment_name: String,
	pub experiment_id: Option<String>,
	pub experiment_url: Option<String>,
	pub scores: IndexMap<String, ScoreSummary>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub results: Option<Vec<CaseResult>>,
}

#[derive(Debug, Clone, Tabled)]
struct ScoreRow {
	scorer: String,
	score: String,
	improvements: u32,
	regressions: u32,
}

#[derive(Debug, Clone, Tabled)]
struct CaseRow {
	#[tabled(rename = "#")]
	index: usize,
	input: String,
	output: String,
	error: String,
}

impl Summary {
	/// Drops the per-case results, keeping only the aggregates.
	pub fn without_results(mut self) -> Self {
		self.results = None;
		self
	}

	pub fn summary_table(&self) -> String {
		let rows: Vec<ScoreRow> = self
			.scores
			.values()
			.map(|s| ScoreRow {
				scorer: format!("{:<width$}", s.name, width = s.longest_score_name),
				score: format!("{:.2}%", s.score * 100.0),
				improvements: s.improvements,
				regressions: s.regressions,
			})
			.collect();

		let mut out = format!(
			"Experiment: {}  Project: {}\n\n{}\n",
			self.experiment_name,
			self.project_name,
			Table::new(rows)
		);

		if let Some(results) = &self.results {
			let case_rows: Vec<CaseRow> = results
				.iter()
				.enumerate()
				.map(|(index, r)| CaseRow {
					index,
					input: truncate(value_preview(&r.input), 48),
					output: truncate(value_preview(&r.output), 48),
					error: r.error.clone().unwrap_or_default(),
				})
				.collect();
			let errors = results.iter().filter(|r| r.error.is_some()).count();
			out.push_str(&format!(
				"\n{}\n\nCases: {}  Task errors: {}\n",
				Table::new(case_rows),
				results.len(),
				errors
			));
		}
		out
	}
}

fn value_preview(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		_ => v.to_string(),
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn sample() -> Summary {
		let mut scores = IndexMap::new();
		scores.insert(
			"exact_match".to_string(),
			ScoreSummary {
				name: "exact_match".to_string(),
				score: 0.5,
				improvements: 0,
				regressions: 0,
				diff: None,
				longest_score_name: 11,
			},
		);
		Summary {
			project_name: "demo".to_string(),
			project_id: None,
			experiment_name: "demo".to_string(),
			experiment_id: None,
			experiment_url: None,
			scores,
			results: Some(vec![CaseResult {
				input: json!("hello"),
				output: json!("HELLO"),
				expected: Some(json!("HELLO")),
				error: None,
				scores: IndexMap::new(),
				metadata: Map::new(),
			}]),
		}
	}

	#[test]
	fn test_summary_wire_shape() {
		let v = serde_json::to_value(sample()).unwrap();
		let score = &v["scores"]["exact_match"];
		assert_eq!(score["_longest_score_name"], json!(11));
		assert_eq!(score["improvements"], json!(0));
		assert_eq!(score["diff"], Value::Null);
		assert_eq!(v["experiment_id"], Value::Null);
		assert_eq!(v["results"][0]["error"], Value::Null);

		let stripped = serde_json::to_value(sample().without_results()).unwrap();
		assert!(stripped.get("results").is_none());
	}

	#[test]
	fn test_score_record_flattens_extra_keys() {
		let mut record = ScoreRecord::value(1.0);
		record.extra.insert("rationale".to_string(), json!("matched"));
		let v = serde_json::to_value(&record).unwrap();
		assert_eq!(v, json!({"score": 1.0, "rationale": "matched"}));

		let failed = serde_json::to_value(ScoreRecord::failed("bad")).unwrap();
		assert_eq!(failed, json!({"score": null, "error": "bad"}));
	}

	#[test]
	fn test_summary_table_mentions_scorers() {
		let table = sample().summary_table();
		assert!(table.contains("exact_match"));
		assert!(table.contains("50.00%"));
		assert!(table.contains("Cases: 1"));
	}
}
