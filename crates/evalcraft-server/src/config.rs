use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_DIRECTIVES: &str = "evalcraft_server=info,evalcraft_core=info,warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "evalcraft-server", version, about = "Serve registered evaluators for remote runs")]
pub struct ServerConfig {
	/// Address to listen on.
	#[arg(long, env = "EVALCRAFT_BIND", default_value = "127.0.0.1:8300")]
	pub bind: SocketAddr,

	/// Base URL of the API used for datasets, remote scorers, experiments and logs.
	#[arg(long, env = "BRAINTRUST_API_URL", default_value = "https://api.braintrust.dev")]
	pub api_url: String,

	/// Extra origin allowed to make credentialed cross-origin requests.
	#[arg(long, env = "WHITELISTED_ORIGIN")]
	pub whitelisted_origin: Option<String>,

	/// Origin of a self-hosted app, also allowed for credentialed requests.
	#[arg(long, env = "BRAINTRUST_APP_URL")]
	pub app_url: Option<String>,

	#[arg(long, value_enum, default_value_t = LogFormat::default())]
	pub log_format: LogFormat,

	/// JSONL rows for the bundled demo evaluator.
	#[arg(long)]
	pub data: Option<PathBuf>,
}

/// Installs the global subscriber. `RUST_LOG` overrides the default directives.
pub fn init_tracing(log_format: LogFormat) -> anyhow::Result<()> {
	let filter = match std::env::var("RUST_LOG") {
		Ok(directives) => EnvFilter::try_new(directives)?,
		Err(_) => EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES)?,
	};
	let builder = tracing_subscriber::fmt().with_env_filter(filter);
	let installed = match log_format {
		LogFormat::Pretty => builder.try_init(),
		LogFormat::Json => builder.json().try_init(),
	};
	installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
