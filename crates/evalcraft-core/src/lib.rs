//! evalcraft-core: the remote evaluation engine.
//! Define evaluators (data, a task, scorers and typed parameters), register
//! them, and run them case by case into a `Summary`.

pub mod api;
pub mod datasource;
pub mod error;
pub mod evaluator;
pub mod hooks;
pub mod parameters;
pub mod resolver;
pub mod runner;
pub mod scorer;
pub mod task;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub mod scorers {
	pub mod contains;
	pub mod exact;
	pub mod levenshtein;
	pub mod regex;
	pub mod remote;
}

pub use api::{ApiClient, ApiError, Experiment, ExperimentRequest, FunctionRef, HttpApiClient, Session};
pub use datasource::{DataSource, JsonlDataSource, VecDataSource};
pub use error::{EvalError, ValidationError};
pub use evaluator::{Evaluator, EvaluatorBuilder, EvaluatorRegistry};
pub use hooks::{EvalHooks, ProgressSink};
pub use parameters::{ItemType, ParameterDefinition, ParameterKind, ParameterValue, Parameters, ValidatedParameters};
pub use resolver::{DataResolver, ResolvedData};
pub use runner::EvalRunner;
pub use scorer::{ScoreOutput, Scorer, ScorerArgs};
pub use scorers::{
	contains::ContainsScorer,
	exact::ExactMatchScorer,
	levenshtein::LevenshteinScorer,
	regex::RegexScorer,
	remote::{RemoteScorer, ScorerSpec},
};
pub use task::{from_async_fn, from_async_fn_with_hooks, Task};

pub use evalcraft_types::{CaseResult, EvalCase, ParentDescriptor, ProgressEvent, Prompt, Row, ScoreRecord, Summary};
