use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use evalcraft_types::Row;
use serde_json::Value;

/// Something an evaluator can load its rows from at run time.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Row>>;
}

pub struct VecDataSource {
    rows: Vec<Row>,
}

impl VecDataSource {
    pub fn new<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Row>,
    {
        Self {
            rows: rows.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl DataSource for VecDataSource {
    async fn load(&self) -> Result<Vec<Row>> {
        Ok(self.rows.clone())
    }
}

/// Read JSONL where each non-blank line is one object row, e.g.
/// `{"id": "...", "input": ..., "expected": ..., "metadata": {...}}`.
pub struct JsonlDataSource {
    path: PathBuf,
}

impl JsonlDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource for JsonlDataSource {
    async fn load(&self) -> Result<Vec<Row>> {
        let content = tokio_fs_read_to_string(&self.path).await?;
        let mut rows = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON on line {}", idx + 1))?;
            if !value.is_object() {
                return Err(anyhow!("Line {}: expected object", idx + 1));
            }
            rows.push(Row::Value(value));
        }
        Ok(rows)
    }
}

#[cfg(not(feature = "sync-fs"))]
async fn tokio_fs_read_to_string(path: &PathBuf) -> Result<String> {
    use tokio::fs;
    fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}

#[cfg(feature = "sync-fs")]
async fn tokio_fs_read_to_string(path: &PathBuf) -> Result<String> {
    use std::fs;
    use tokio::task;
    let path_clone = path.clone();
    let content = task::spawn_blocking(move || {
        fs::read_to_string(&path_clone).with_context(|| format!("Failed to read {:?}", path_clone))
    })
    .await
    .map_err(|e| anyhow!(e))??;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalcraft_types::EvalCase;
    use serde_json::json;

    #[tokio::test]
    async fn test_jsonl_rows() {
        let path = std::env::temp_dir().join(format!("evalcraft-jsonl-{}.jsonl", std::process::id()));
        tokio::fs::write(
            &path,
            "{\"id\": \"a\", \"input\": \"hi\", \"expected\": \"HI\"}\n\n{\"input\": \"yo\"}\n",
        )
        .await
        .unwrap();

        let rows = JsonlDataSource::new(&path).load().await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(rows.len(), 2);
        let first = rows[0].clone().into_case().unwrap();
        assert_eq!(first.id.as_deref(), Some("a"));
        assert_eq!(first.expected, Some(json!("HI")));
    }

    #[tokio::test]
    async fn test_jsonl_rejects_non_objects() {
        let path = std::env::temp_dir().join(format!("evalcraft-jsonl-bad-{}.jsonl", std::process::id()));
        tokio::fs::write(&path, "[1, 2]\n").await.unwrap();
        let err = JsonlDataSource::new(&path).load().await.unwrap_err();
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(err.to_string().contains("Line 1"));
    }

    #[tokio::test]
    async fn test_vec_source_mixes_cases_and_values() {
        let source = VecDataSource::new(vec![Row::from(EvalCase::new("a")), Row::from(json!({"input": "b"}))]);
        assert_eq!(source.load().await.unwrap().len(), 2);
    }
}
