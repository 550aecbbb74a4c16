//! Response envelopes, payloads and the flattened error shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::Headers;

/// Parsed response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Payload {
	/// No content (204/205, or an empty body).
	#[default]
	Empty,
	/// Structured text parsed as JSON.
	Json(Value),
	/// Plain text.
	Text(String),
	/// Opaque bytes for any other content type.
	Binary(#[serde(with = "crate::request::base64_bytes")] Vec<u8>),
}

impl Payload {
	pub fn is_empty(&self) -> bool {
		matches!(self, Payload::Empty)
	}

	pub fn as_json(&self) -> Option<&Value> {
		match self {
			Payload::Json(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Payload::Text(text) => Some(text),
			_ => None,
		}
	}

	/// Decodes the payload into `T`.
	///
	/// Empty payloads decode as JSON `null`; text and binary payloads are
	/// parsed as JSON documents.
	pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
		match self {
			Payload::Empty => serde_json::from_value(Value::Null),
			Payload::Json(value) => T::deserialize(value),
			Payload::Text(text) => serde_json::from_str(text),
			Payload::Binary(bytes) => serde_json::from_slice(bytes),
		}
	}
}

impl From<Value> for Payload {
	fn from(value: Value) -> Self {
		Payload::Json(value)
	}
}

/// Response handed back to callers. Produced once per successful transport
/// call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
	pub data: Payload,
	pub status: u16,
	pub status_text: String,
	#[serde(default)]
	pub headers: Headers,
}

impl ResponseEnvelope {
	pub fn new(data: Payload, status: u16, status_text: impl Into<String>) -> Self {
		Self {
			data,
			status,
			status_text: status_text.into(),
			headers: Headers::new(),
		}
	}

	/// Convenience constructor for a `200 OK` JSON response.
	pub fn ok_json(value: Value) -> Self {
		Self::new(Payload::Json(value), 200, "OK")
	}

	pub fn with_headers(mut self, headers: Headers) -> Self {
		self.headers = headers;
		self
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the payload into `T`. See [`Payload::decode`].
	pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
		self.data.decode()
	}
}

/// Flattened error view exposed to callers that want plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorShape {
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status_text: Option<String>,
	pub is_network_error: bool,
	pub is_timeout_error: bool,
}
