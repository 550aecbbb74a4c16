//! Structured output envelope for all CLI commands.
//!
//! ## Output Contract
//!
//! Every command produces a result envelope on stdout:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "ok": true,
//!   "command": "request",
//!   "data": { ... },
//!   "timings": { "durationMs": 42 }
//! }
//! ```
//!
//! On failure:
//!
//! ```json
//! {
//!   "ok": false,
//!   "command": "request",
//!   "error": {
//!     "code": "NETWORK_ERROR",
//!     "message": "connection refused",
//!     "details": { "status": null, "isNetworkError": true, ... }
//!   }
//! }
//! ```


use std::io::{self, Write};
use std::time::Duration;

use fetchkit::{OfflineAction, SessionState, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current schema version for command output.
pub const SCHEMA_VERSION: u32 = 1;

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Pretty-printed JSON envelope
	#[default]
	Json,
	/// Single-line JSON envelope
	Ndjson,
	/// Data only, human-readable
	Text,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Ndjson => write!(f, "ndjson"),
			OutputFormat::Text => write!(f, "text"),
		}
	}
}

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	pub ok: bool,

	/// Command name (e.g., "request", "login", "sync")
	pub command: String,

	/// Only present on success
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	/// Only present on failure
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

/// Error information for failed commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// Standardized error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Malformed arguments or request
	InvalidInput,
	/// Missing or rejected credential
	AuthError,
	/// Credential lacks the required permission
	PermissionDenied,
	/// Server unreachable
	NetworkError,
	/// Request deadline exceeded
	Timeout,
	/// Server answered with an error status
	HttpError,
	/// Session file could not be read or written
	StorageError,
	/// Config or other file I/O failed
	IoError,
	/// Request was cancelled
	Cancelled,
	/// Unknown/internal error
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let code = match self {
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::AuthError => "AUTH_ERROR",
			ErrorCode::PermissionDenied => "PERMISSION_DENIED",
			ErrorCode::NetworkError => "NETWORK_ERROR",
			ErrorCode::Timeout => "TIMEOUT",
			ErrorCode::HttpError => "HTTP_ERROR",
			ErrorCode::StorageError => "STORAGE_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::Cancelled => "CANCELLED",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		f.write_str(code)
	}
}

/// Timing information for the command
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: duration.as_millis() as u64,
		}
	}
}

/// Builder for [`CommandResult`].
pub struct ResultBuilder<T: Serialize> {
	command: String,
	data: Option<T>,
	error: Option<CommandError>,
	timings: Option<Timings>,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			timings: None,
		}
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn timings(mut self, timings: impl Into<Timings>) -> Self {
		self.timings = Some(timings.into());
		self
	}

	pub fn build(self) -> CommandResult<T> {
		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok: self.error.is_none(),
			command: self.command,
			data: self.data,
			error: self.error,
			timings: self.timings,
		}
	}
}

/// Renders `result` in `format`.
///
/// Text mode prints only the payload: a string data value prints raw, any
/// other value as pretty JSON, and a failure as one `Error [CODE]: ...` line.
pub fn render<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) -> serde_json::Result<String> {
	match format {
		OutputFormat::Json => serde_json::to_string_pretty(result),
		OutputFormat::Ndjson => serde_json::to_string(result),
		OutputFormat::Text => match (&result.data, &result.error) {
			(Some(data), _) => match serde_json::to_value(data)? {
				Value::String(text) => Ok(text),
				value => serde_json::to_string_pretty(&value),
			},
			(None, Some(error)) => Ok(format!("Error [{}]: {}", error.code, error.message)),
			(None, None) => Ok(String::new()),
		},
	}
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	match render(result, format) {
		Ok(text) if text.is_empty() => {}
		Ok(text) => {
			let _ = writeln!(io::stdout().lock(), "{text}");
		}
		Err(err) => tracing::error!(error = %err, command = %result.command, "failed to render result"),
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("error [{}]: {}", error.code, error.message);
}

/// `request` output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
	/// `None` when served from cache
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	pub body: Value,
}

/// `login`, `whoami` output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
	pub user: User,
}

/// `status` output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
	pub session: SessionState,
	pub queued: usize,
}

/// `queue` output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueData {
	pub action: OfflineAction,
	pub queued: usize,
}

/// `sync` output.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncData {
	pub replayed: Vec<u64>,
	pub failed: Vec<u64>,
	pub remaining: usize,
}
