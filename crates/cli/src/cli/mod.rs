#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fetchkit::{FetchOptions, Method, RequestDescriptor};

use crate::error::{CliError, Result};
use crate::output::OutputFormat;

/// Root CLI for fk.
#[derive(Parser, Debug)]
#[command(name = "fk")]
#[command(about = "fetchkit client - HTTP requests with a persistent session")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default), ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	/// Base URL relative request paths are appended to
	#[arg(long, global = true, value_name = "URL")]
	pub base_url: Option<String>,

	/// Default request timeout
	#[arg(long, global = true, value_name = "MS")]
	pub timeout_ms: Option<u64>,

	/// Config file (default: $XDG_CONFIG_HOME/fetchkit/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Directory holding the session file (default: $XDG_DATA_HOME/fetchkit)
	#[arg(long, global = true, value_name = "DIR")]
	pub data_dir: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Send a request, retrying transient failures.
	Request(RequestCmd),
	/// Log in and persist the session.
	Login(LoginArgs),
	/// End the session (server call is best effort).
	Logout,
	/// Show the current user as reported by the server.
	Whoami,
	/// Show the local session state and offline queue size.
	Status,
	/// Queue a request for later replay.
	Queue(RequestArgs),
	/// Replay the offline queue.
	Sync,
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Request(_) => "request",
			Commands::Login(_) => "login",
			Commands::Logout => "logout",
			Commands::Whoami => "whoami",
			Commands::Status => "status",
			Commands::Queue(_) => "queue",
			Commands::Sync => "sync",
		}
	}
}

/// A request on the command line.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
	/// HTTP method (GET, POST, ...)
	#[arg(value_name = "METHOD")]
	pub method: Method,

	/// Path relative to the base URL, or an absolute URL
	#[arg(value_name = "PATH")]
	pub path: String,

	/// Header, repeatable
	#[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
	pub headers: Vec<String>,

	/// Query parameter, repeatable
	#[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
	pub query: Vec<String>,

	/// JSON request body
	#[arg(short = 'd', long = "json", value_name = "JSON")]
	pub json: Option<String>,

	/// Attach the session's bearer token
	#[arg(long)]
	pub auth: bool,
}

impl RequestArgs {
	pub fn descriptor(&self) -> Result<RequestDescriptor> {
		let mut descriptor = RequestDescriptor::new(self.method, self.path.clone());

		for header in &self.headers {
			let (name, value) = header
				.split_once(':')
				.ok_or_else(|| CliError::InvalidInput(format!("header must be NAME:VALUE, got {header:?}")))?;
			let name = name.trim();
			if name.is_empty() {
				return Err(CliError::InvalidInput(format!("empty header name in {header:?}")));
			}
			descriptor = descriptor.with_header(name, value.trim());
		}

		for param in &self.query {
			let (key, value) = param
				.split_once('=')
				.ok_or_else(|| CliError::InvalidInput(format!("query must be KEY=VALUE, got {param:?}")))?;
			descriptor = descriptor.with_query(key, value);
		}

		if let Some(json) = &self.json {
			let value = serde_json::from_str(json)
				.map_err(|err| CliError::InvalidInput(format!("--json is not valid JSON: {err}")))?;
			descriptor = descriptor.with_json(value);
		}

		if self.auth {
			descriptor = descriptor.authenticated();
		}
		Ok(descriptor)
	}
}

#[derive(Args, Debug, Clone)]
pub struct RequestCmd {
	#[command(flatten)]
	pub request: RequestArgs,

	/// Retries after the first attempt
	#[arg(long, default_value_t = 0)]
	pub retries: u32,

	/// Base backoff delay; doubles per retry
	#[arg(long, value_name = "MS", default_value_t = 1000)]
	pub retry_delay_ms: u64,

	/// Also retry unclassified failures (404, 5xx, ...)
	#[arg(long)]
	pub retry_system: bool,
}

impl RequestCmd {
	pub fn options(&self) -> FetchOptions {
		let mut options =
			FetchOptions::manual().with_retries(self.retries, Duration::from_millis(self.retry_delay_ms));
		if self.retry_system {
			options = options.retry_system_errors();
		}
		options
	}
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
	#[arg(long)]
	pub email: String,

	#[arg(long)]
	pub password: String,
}
