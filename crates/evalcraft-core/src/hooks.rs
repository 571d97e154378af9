use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use evalcraft_types::ProgressEvent;
use serde_json::{Map, Value};

use crate::parameters::ValidatedParameters;

/// Receives live progress while a run is in flight.
#[async_trait]
pub trait ProgressSink: Send + Sync {
	async fn send(&self, event: ProgressEvent);
}

/// Per-case context handed to a task.
///
/// Clones share the same metadata map, so additions made by the task are
/// visible to the runner once the task returns.
#[derive(Clone)]
pub struct EvalHooks {
	parameters: Arc<ValidatedParameters>,
	metadata: Arc<Mutex<Map<String, Value>>>,
	progress: Option<Arc<dyn ProgressSink>>,
}

impl EvalHooks {
	pub fn new(
		parameters: Arc<ValidatedParameters>,
		metadata: Map<String, Value>,
		progress: Option<Arc<dyn ProgressSink>>,
	) -> Self {
		Self {
			parameters,
			metadata: Arc::new(Mutex::new(metadata)),
			progress,
		}
	}

	pub fn parameters(&self) -> &ValidatedParameters {
		&self.parameters
	}

	/// Snapshot of the case metadata, including anything the task added.
	pub fn metadata(&self) -> Map<String, Value> {
		self.metadata.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
		self.metadata
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(key.into(), value.into());
	}

	pub fn is_streaming(&self) -> bool {
		self.progress.is_some()
	}

	/// Forwards an event to the active stream, if any.
	pub async fn report(&self, event: ProgressEvent) {
		if let Some(progress) = &self.progress {
			progress.send(event).await;
		}
	}
}

impl std::fmt::Debug for EvalHooks {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EvalHooks")
			.field("parameters", &self.parameters)
			.field("metadata", &self.metadata())
			.field("streaming", &self.is_streaming())
			.finish()
	}
}
