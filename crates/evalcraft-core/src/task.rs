use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::hooks::EvalHooks;

#[async_trait]
pub trait Task: Send + Sync {
	async fn run(&self, input: Value, hooks: EvalHooks) -> Result<Value>;
}

/// Wrap an async closure that only needs the case input as a `Task`.
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn Task>
where
	F: Send + Sync + 'static + Fn(Value) -> Fut,
	Fut: Future<Output = Result<Value>> + Send + 'static,
{
	struct InputTask<F> {
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Task for InputTask<F>
	where
		F: Send + Sync + 'static + Fn(Value) -> Fut,
		Fut: Future<Output = Result<Value>> + Send + 'static,
	{
		async fn run(&self, input: Value, _hooks: EvalHooks) -> Result<Value> {
			(self.f)(input).await
		}
	}

	Arc::new(InputTask { f })
}

/// Wrap an async closure that takes the case input and the per-case hooks.
pub fn from_async_fn_with_hooks<F, Fut>(f: F) -> Arc<dyn Task>
where
	F: Send + Sync + 'static + Fn(Value, EvalHooks) -> Fut,
	Fut: Future<Output = Result<Value>> + Send + 'static,
{
	struct HookedTask<F> {
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Task for HookedTask<F>
	where
		F: Send + Sync + 'static + Fn(Value, EvalHooks) -> Fut,
		Fut: Future<Output = Result<Value>> + Send + 'static,
	{
		async fn run(&self, input: Value, hooks: EvalHooks) -> Result<Value> {
			(self.f)(input, hooks).await
		}
	}

	Arc::new(HookedTask { f })
}
