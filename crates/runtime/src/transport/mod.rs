//! HTTP transport layer.
//!
//! A [`Transport`] executes exactly one request: it resolves the locator,
//! applies the body policy, races the call against the caller's cancel
//! signal and the per-call timer, and classifies whatever comes back. It
//! keeps no state beyond its configuration.
//!
//! # Components
//!
//! - [`Transport`]: object-safe seam the coordinator and session talk to
//! - [`HttpTransport`]: reqwest implementation
//! - [`InterceptedTransport`]: decorator running an [`InterceptorPipeline`]

mod interceptors;
pub mod locator;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use fk_protocol::{Body, FormValue, Headers, Method, Payload, RequestDescriptor, ResponseEnvelope};
pub use interceptors::{
	ErrorInterceptor, InterceptedTransport, InterceptorPipeline, RequestInterceptor, ResponseInterceptor,
};
pub use locator::DEFAULT_SAME_ORIGIN_PREFIX;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::cancel::{CancelReason, CancelSignal};
use crate::error::TransportError;

/// Per-call timeout used when neither the descriptor nor the config sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ResponseEnvelope, TransportError>> + Send + 'a>>;

/// Executes a single request.
pub trait Transport: Send + Sync {
	/// Sends `descriptor`, failing with [`TransportError`].
	///
	/// A firing `cancel` aborts the call: [`CancelReason::Caller`] yields a
	/// cancelled error and [`CancelReason::Timeout`] a timed-out one.
	fn execute(&self, descriptor: RequestDescriptor, cancel: CancelSignal) -> TransportFuture<'_>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// Static transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
	/// Base locator prepended to relative paths.
	pub base_url: String,
	/// Origin that same-origin API paths are joined to when sent.
	pub origin: Option<String>,
	pub same_origin_prefix: String,
	/// Sent with every request; descriptor headers win.
	pub default_headers: Headers,
	pub default_timeout: Duration,
}

impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			base_url: String::new(),
			origin: None,
			same_origin_prefix: DEFAULT_SAME_ORIGIN_PREFIX.to_string(),
			default_headers: Headers::new(),
			default_timeout: DEFAULT_TIMEOUT,
		}
	}
}

impl TransportConfig {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			..Self::default()
		}
	}

	pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	pub fn with_same_origin_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.same_origin_prefix = prefix.into();
		self
	}

	pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.insert(name, value);
		self
	}

	pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
		self.default_timeout = timeout;
		self
	}

	/// Resolves the locator for `path` without joining the origin.
	pub fn resolve(&self, path: &str) -> String {
		locator::resolve(&self.base_url, &self.same_origin_prefix, path)
	}
}

/// Transport backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: reqwest::Client,
	config: TransportConfig,
}

impl HttpTransport {
	pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
		let client = reqwest::Client::builder()
			.build()
			.map_err(|err| TransportError::invalid(format!("Failed to build HTTP client: {err}")))?;
		Ok(Self::with_client(client, config))
	}

	pub fn with_client(client: reqwest::Client, config: TransportConfig) -> Self {
		Self { client, config }
	}

	pub fn config(&self) -> &TransportConfig {
		&self.config
	}

	fn build(&self, descriptor: &RequestDescriptor) -> Result<reqwest::RequestBuilder, TransportError> {
		let locator = self.config.resolve(descriptor.path());
		let url = locator::to_url(&locator, self.config.origin.as_deref(), descriptor.query())?;

		let mut headers = self.config.default_headers.clone();
		for (name, value) in descriptor.headers().iter() {
			headers.insert(name, value);
		}

		let mut request = self.client.request(to_reqwest_method(descriptor.method()), url);
		match descriptor.body() {
			None => {}
			Some(Body::Json(value)) => {
				headers.insert_if_absent("content-type", "application/json");
				let bytes = serde_json::to_vec(value)
					.map_err(|err| TransportError::invalid(format!("Failed to encode JSON body: {err}")))?;
				request = request.body(bytes);
			}
			Some(Body::Text(text)) => request = request.body(text.clone()),
			Some(Body::Binary(bytes)) => request = request.body(bytes.clone()),
			Some(Body::Multipart(parts)) => {
				headers.remove("content-type");
				let mut form = reqwest::multipart::Form::new();
				for part in parts {
					form = match &part.value {
						FormValue::Text { value } => form.text(part.name.clone(), value.clone()),
						FormValue::File {
							file_name,
							content_type,
							bytes,
						} => {
							let mut file = reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
							if let Some(content_type) = content_type {
								file = file.mime_str(content_type).map_err(|err| {
									TransportError::invalid(format!("Invalid content type {content_type}: {err}"))
								})?;
							}
							form.part(part.name.clone(), file)
						}
					};
				}
				request = request.multipart(form);
			}
		}

		Ok(request.headers(to_header_map(&headers)?))
	}
}

impl Transport for HttpTransport {
	fn execute(&self, descriptor: RequestDescriptor, cancel: CancelSignal) -> TransportFuture<'_> {
		Box::pin(async move {
			let timeout = descriptor.timeout().unwrap_or(self.config.default_timeout);
			let request = self.build(&descriptor)?;
			tracing::debug!(
				method = %descriptor.method(),
				path = descriptor.path(),
				timeout_ms = timeout.as_millis() as u64,
				"sending request"
			);

			tokio::select! {
				biased;
				reason = cancel.cancelled() => Err(match reason {
					CancelReason::Caller => TransportError::cancelled(),
					CancelReason::Timeout => TransportError::timeout(timeout),
				}),
				_ = tokio::time::sleep(timeout) => Err(TransportError::timeout(timeout)),
				result = send(request, timeout) => result,
			}
		})
	}
}

async fn send(request: reqwest::RequestBuilder, timeout: Duration) -> Result<ResponseEnvelope, TransportError> {
	let response = request.send().await.map_err(|err| classify(err, timeout))?;

	let status = response.status();
	let status_text = status.canonical_reason().unwrap_or_default().to_string();
	let headers: Headers = response
		.headers()
		.iter()
		.filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
		.collect();
	let content_type = headers.get("content-type").unwrap_or_default().to_ascii_lowercase();
	let bytes = response.bytes().await.map_err(|err| classify(err, timeout))?;

	if !status.is_success() {
		let body = String::from_utf8_lossy(&bytes).into_owned();
		tracing::debug!(status = status.as_u16(), "request failed");
		return Err(TransportError::http(
			status.as_u16(),
			status_text,
			(!body.is_empty()).then_some(body),
		));
	}

	let data = parse_payload(status.as_u16(), &content_type, &bytes);
	Ok(ResponseEnvelope::new(data, status.as_u16(), status_text).with_headers(headers))
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
	if err.is_timeout() {
		TransportError::timeout(timeout)
	} else if err.is_builder() {
		TransportError::invalid(err.to_string())
	} else {
		TransportError::network(err.to_string())
	}
}

/// Decodes a successful response body.
///
/// 204/205 and empty bodies are empty; JSON content types parse as JSON and
/// fall back to text; `text/*` is text; anything else is opaque bytes.
pub fn parse_payload(status: u16, content_type: &str, bytes: &[u8]) -> Payload {
	if matches!(status, 204 | 205) || bytes.is_empty() {
		return Payload::Empty;
	}

	let content_type = content_type.to_ascii_lowercase();
	if content_type.contains("application/json") || content_type.contains("+json") {
		return match serde_json::from_slice(bytes) {
			Ok(value) => Payload::Json(value),
			Err(_) => Payload::Text(String::from_utf8_lossy(bytes).into_owned()),
		};
	}
	if content_type.starts_with("text/") {
		return Payload::Text(String::from_utf8_lossy(bytes).into_owned());
	}
	Payload::Binary(bytes.to_vec())
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Head => reqwest::Method::HEAD,
		Method::Post => reqwest::Method::POST,
		Method::Put => reqwest::Method::PUT,
		Method::Patch => reqwest::Method::PATCH,
		Method::Delete => reqwest::Method::DELETE,
		Method::Options => reqwest::Method::OPTIONS,
	}
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, TransportError> {
	let mut map = HeaderMap::with_capacity(headers.len());
	for (name, value) in headers.iter() {
		let name = HeaderName::from_bytes(name.as_bytes())
			.map_err(|_| TransportError::invalid(format!("Invalid header name {name:?}")))?;
		let value = HeaderValue::from_str(value)
			.map_err(|_| TransportError::invalid(format!("Invalid value for header {name}")))?;
		map.insert(name, value);
	}
	Ok(map)
}
