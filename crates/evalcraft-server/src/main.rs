use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use evalcraft_core::EvaluatorRegistry;
use evalcraft_server::demo::echo_evaluator;
use evalcraft_server::{init_tracing, router, AppState, CorsPolicy, HttpSessionFactory, ServerConfig};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
	let config = ServerConfig::parse();
	init_tracing(config.log_format)?;

	let registry = Arc::new(EvaluatorRegistry::new());
	registry.register(echo_evaluator(config.data.clone())?);

	let cors = CorsPolicy::new(config.whitelisted_origin.as_deref(), config.app_url.as_deref())
		.context("Failed to build CORS policy")?;
	let state = AppState {
		registry: registry.clone(),
		sessions: Arc::new(HttpSessionFactory::new(reqwest::Client::new(), config.api_url.clone())),
		cors: Arc::new(cors),
	};

	let listener = tokio::net::TcpListener::bind(config.bind)
		.await
		.with_context(|| format!("Failed to bind {}", config.bind))?;
	info!(
		addr = %config.bind,
		api_url = %config.api_url,
		evaluators = ?registry.names(),
		"evalcraft-server listening"
	);

	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("Server error")?;
	info!("Server stopped");
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			tracing::error!(error = %e, "Failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => info!("Received Ctrl+C, shutting down"),
		() = terminate => info!("Received SIGTERM, shutting down"),
	}
}
