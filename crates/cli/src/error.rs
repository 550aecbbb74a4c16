use std::path::PathBuf;

use fetchkit::ErrorKind;
use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("failed to load config {path}")]
	Config {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("not logged in")]
	NotLoggedIn,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Fetch(#[from] fetchkit::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

fn code_for(kind: ErrorKind, status: Option<u16>) -> ErrorCode {
	match kind {
		ErrorKind::Authentication => ErrorCode::AuthError,
		ErrorKind::Authorization => ErrorCode::PermissionDenied,
		ErrorKind::Network => ErrorCode::NetworkError,
		ErrorKind::Timeout => ErrorCode::Timeout,
		ErrorKind::Cancelled => ErrorCode::Cancelled,
		_ if status.is_some() => ErrorCode::HttpError,
		ErrorKind::Validation => ErrorCode::InvalidInput,
		ErrorKind::System => ErrorCode::InternalError,
	}
}

impl CliError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::InvalidInput(_) => (ErrorCode::InvalidInput, None),
			CliError::Config { path, .. } => (ErrorCode::InvalidInput, Some(serde_json::json!({ "path": path }))),
			CliError::NotLoggedIn => (ErrorCode::AuthError, None),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Json(_) => (ErrorCode::InvalidInput, None),
			CliError::Fetch(fetchkit::Error::Storage(_)) => (ErrorCode::StorageError, None),
			CliError::Fetch(err) => (
				code_for(err.kind(), err.status()),
				serde_json::to_value(err.to_shape()).ok(),
			),
			CliError::Anyhow(_) => (ErrorCode::InternalError, None),
		};

		let message = match self {
			CliError::Config { path, source } => format!("failed to load config {}: {source}", path.display()),
			other => other.to_string(),
		};

		CommandError {
			code,
			message,
			details,
		}
	}
}
