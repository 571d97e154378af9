use thiserror::Error;

use crate::api::ApiError;

/// A parameter value that is missing a required shape, mistyped or out of range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid parameter '{parameter}': {message}")]
pub struct ValidationError {
	pub parameter: String,
	pub message: String,
}

impl ValidationError {
	pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			parameter: parameter.into(),
			message: message.into(),
		}
	}
}

#[derive(Debug, Error)]
pub enum EvalError {
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// Malformed data spec or evaluator misconfiguration.
	#[error("{0}")]
	Argument(String),

	#[error("Evaluator '{0}' not found")]
	NotFound(String),

	#[error("Evaluator '{0}' has no task defined")]
	MissingTask(String),

	#[error(transparent)]
	Api(#[from] ApiError),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl EvalError {
	pub fn argument(message: impl Into<String>) -> Self {
		EvalError::Argument(message.into())
	}

	/// Whether the caller sent something unusable, as opposed to a server-side failure.
	pub fn is_client_error(&self) -> bool {
		matches!(self, EvalError::Validation(_) | EvalError::Argument(_) | EvalError::NotFound(_))
	}
}
