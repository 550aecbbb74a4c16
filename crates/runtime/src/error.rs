//! Error types for the fetchkit runtime.
//!
//! Every failure carries an [`ErrorKind`] so that the retry policy and callers
//! can branch on the class of failure without matching on messages.

use std::time::Duration;

use fk_protocol::ErrorShape;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes shared by the transport, the session manager and the
/// fetch coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Malformed input. Never retried.
	Validation,
	/// Missing or rejected credential. Terminal for the call.
	Authentication,
	/// Credential accepted but not allowed. Terminal.
	Authorization,
	/// Server unreachable. Retryable.
	Network,
	/// Deadline exceeded. Retryable.
	Timeout,
	/// Anything else. Retryable only when the caller opts in.
	System,
	/// Caller-initiated cancellation. Never retried.
	Cancelled,
}

impl ErrorKind {
	/// Maps an HTTP status to its failure class.
	pub fn from_status(status: u16) -> Self {
		match status {
			400 | 405 | 409 | 413 | 415 | 422 => ErrorKind::Validation,
			401 => ErrorKind::Authentication,
			403 => ErrorKind::Authorization,
			408 => ErrorKind::Timeout,
			_ => ErrorKind::System,
		}
	}
}

/// How a transport call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
	/// The request could not be built (bad locator, header or body).
	Invalid,
	/// The server could not be reached or the connection broke.
	Network,
	/// The per-call timer elapsed.
	Timeout,
	/// The caller cancelled the call.
	Cancelled,
	/// The server answered with a non-2xx status.
	Status(u16),
}

/// Classified transport failure.
///
/// Carries the best-effort message, the HTTP status and status text, and the
/// raw response body when one was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
	pub failure: TransportFailure,
	pub message: String,
	pub status: Option<u16>,
	pub status_text: Option<String>,
	pub body: Option<String>,
}

impl TransportError {
	fn bare(failure: TransportFailure, message: String) -> Self {
		Self {
			failure,
			message,
			status: None,
			status_text: None,
			body: None,
		}
	}

	pub fn invalid(message: impl Into<String>) -> Self {
		Self::bare(TransportFailure::Invalid, message.into())
	}

	pub fn network(message: impl Into<String>) -> Self {
		Self::bare(TransportFailure::Network, message.into())
	}

	pub fn timeout(after: Duration) -> Self {
		Self::bare(
			TransportFailure::Timeout,
			format!("Request timed out after {}ms", after.as_millis()),
		)
	}

	pub fn cancelled() -> Self {
		Self::bare(TransportFailure::Cancelled, "Request cancelled".to_string())
	}

	/// Builds the error for a non-2xx response.
	///
	/// The message is taken from a JSON body's `message` or `error` field,
	/// then the raw text, then the status text.
	pub fn http(status: u16, status_text: impl Into<String>, body: Option<String>) -> Self {
		let status_text = status_text.into();
		let message = body
			.as_deref()
			.and_then(extract_message)
			.or_else(|| (!status_text.is_empty()).then(|| status_text.clone()))
			.unwrap_or_else(|| format!("Request failed with status {status}"));

		Self {
			failure: TransportFailure::Status(status),
			message,
			status: Some(status),
			status_text: Some(status_text),
			body,
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self.failure {
			TransportFailure::Invalid => ErrorKind::Validation,
			TransportFailure::Network => ErrorKind::Network,
			TransportFailure::Timeout => ErrorKind::Timeout,
			TransportFailure::Cancelled => ErrorKind::Cancelled,
			TransportFailure::Status(status) => ErrorKind::from_status(status),
		}
	}

	pub fn is_network_error(&self) -> bool {
		self.failure == TransportFailure::Network
	}

	pub fn is_timeout_error(&self) -> bool {
		self.failure == TransportFailure::Timeout
	}

	pub fn to_shape(&self) -> ErrorShape {
		ErrorShape {
			message: self.message.clone(),
			status: self.status,
			status_text: self.status_text.clone(),
			is_network_error: self.is_network_error(),
			is_timeout_error: self.is_timeout_error(),
		}
	}
}

fn extract_message(body: &str) -> Option<String> {
	let trimmed = body.trim();
	if trimmed.is_empty() {
		return None;
	}

	if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
		let field = value
			.get("message")
			.and_then(|m| m.as_str())
			.or_else(|| value.get("error").and_then(|e| e.as_str()))
			.or_else(|| value.pointer("/error/message").and_then(|m| m.as_str()));
		if let Some(message) = field {
			return Some(message.to_string());
		}
	}

	Some(trimmed.to_string())
}

/// Errors produced by the fetchkit runtime.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// Transport-level failure (network, timeout, HTTP status).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Request rejected before it reached the network.
	#[error("Invalid request: {0}")]
	InvalidRequest(String),

	/// Operation needs an authenticated session.
	#[error("Not authenticated: {0}")]
	NotAuthenticated(String),

	/// Current user lacks the required role or permission.
	#[error("Permission denied: {0}")]
	PermissionDenied(String),

	/// The caller cancelled the operation.
	#[error("Operation cancelled")]
	Cancelled,

	/// Storage port failure.
	#[error("Storage error: {0}")]
	Storage(String),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(String),

	/// Unclassified failure.
	#[error("{0}")]
	Internal(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Json(err.to_string())
	}
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Transport(err) => err.kind(),
			Error::InvalidRequest(_) => ErrorKind::Validation,
			Error::NotAuthenticated(_) => ErrorKind::Authentication,
			Error::PermissionDenied(_) => ErrorKind::Authorization,
			Error::Cancelled => ErrorKind::Cancelled,
			Error::Storage(_) | Error::Json(_) | Error::Internal(_) => ErrorKind::System,
		}
	}

	/// Returns true if the retry policy may try again.
	///
	/// Network and timeout failures always qualify; system failures only when
	/// `retry_system` is set.
	pub fn is_retryable(&self, retry_system: bool) -> bool {
		match self.kind() {
			ErrorKind::Network | ErrorKind::Timeout => true,
			ErrorKind::System => retry_system,
			_ => false,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.kind() == ErrorKind::Cancelled
	}

	/// Returns the HTTP status if the server answered.
	pub fn status(&self) -> Option<u16> {
		match self {
			Error::Transport(err) => err.status,
			_ => None,
		}
	}

	pub fn to_shape(&self) -> ErrorShape {
		match self {
			Error::Transport(err) => err.to_shape(),
			other => ErrorShape {
				message: other.to_string(),
				status: None,
				status_text: None,
				is_network_error: false,
				is_timeout_error: false,
			},
		}
	}
}
