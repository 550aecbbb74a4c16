//! Interceptor pipeline and the transport decorator that runs it.
//!
//! Interceptors are pure transforms. Request interceptors see each descriptor
//! before it is sent, response interceptors see each successful envelope, and
//! error interceptors see every failure, all in registration order.

use std::sync::Arc;

use fk_protocol::{RequestDescriptor, ResponseEnvelope};
use parking_lot::RwLock;

use super::{SharedTransport, Transport, TransportFuture};
use crate::cancel::CancelSignal;
use crate::error::TransportError;

pub type RequestInterceptor =
	Arc<dyn Fn(RequestDescriptor) -> Result<RequestDescriptor, TransportError> + Send + Sync>;

pub type ResponseInterceptor =
	Arc<dyn Fn(ResponseEnvelope) -> Result<ResponseEnvelope, TransportError> + Send + Sync>;

pub type ErrorInterceptor = Arc<dyn Fn(TransportError) -> TransportError + Send + Sync>;

/// Ordered request, response and error transforms.
#[derive(Clone, Default)]
pub struct InterceptorPipeline {
	request: Vec<RequestInterceptor>,
	response: Vec<ResponseInterceptor>,
	error: Vec<ErrorInterceptor>,
}

impl InterceptorPipeline {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_request<F>(mut self, f: F) -> Self
	where
		F: Fn(RequestDescriptor) -> Result<RequestDescriptor, TransportError> + Send + Sync + 'static,
	{
		self.request.push(Arc::new(f));
		self
	}

	pub fn on_response<F>(mut self, f: F) -> Self
	where
		F: Fn(ResponseEnvelope) -> Result<ResponseEnvelope, TransportError> + Send + Sync + 'static,
	{
		self.response.push(Arc::new(f));
		self
	}

	pub fn on_error<F>(mut self, f: F) -> Self
	where
		F: Fn(TransportError) -> TransportError + Send + Sync + 'static,
	{
		self.error.push(Arc::new(f));
		self
	}

	pub fn apply_request(&self, descriptor: RequestDescriptor) -> Result<RequestDescriptor, TransportError> {
		self.request.iter().try_fold(descriptor, |descriptor, f| f(descriptor))
	}

	pub fn apply_response(&self, envelope: ResponseEnvelope) -> Result<ResponseEnvelope, TransportError> {
		self.response.iter().try_fold(envelope, |envelope, f| f(envelope))
	}

	pub fn apply_error(&self, error: TransportError) -> TransportError {
		self.error.iter().fold(error, |error, f| f(error))
	}

	pub fn is_empty(&self) -> bool {
		self.request.is_empty() && self.response.is_empty() && self.error.is_empty()
	}
}

impl std::fmt::Debug for InterceptorPipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InterceptorPipeline")
			.field("request", &self.request.len())
			.field("response", &self.response.len())
			.field("error", &self.error.len())
			.finish()
	}
}

/// Runs an [`InterceptorPipeline`] around another transport.
///
/// Interceptors may be added after construction; each call snapshots the
/// pipeline when it starts.
pub struct InterceptedTransport {
	inner: SharedTransport,
	pipeline: RwLock<InterceptorPipeline>,
}

impl InterceptedTransport {
	pub fn new(inner: SharedTransport) -> Self {
		Self::with_pipeline(inner, InterceptorPipeline::new())
	}

	pub fn with_pipeline(inner: SharedTransport, pipeline: InterceptorPipeline) -> Self {
		Self {
			inner,
			pipeline: RwLock::new(pipeline),
		}
	}

	pub fn add_request_interceptor<F>(&self, f: F)
	where
		F: Fn(RequestDescriptor) -> Result<RequestDescriptor, TransportError> + Send + Sync + 'static,
	{
		self.pipeline.write().request.push(Arc::new(f));
	}

	pub fn add_response_interceptor<F>(&self, f: F)
	where
		F: Fn(ResponseEnvelope) -> Result<ResponseEnvelope, TransportError> + Send + Sync + 'static,
	{
		self.pipeline.write().response.push(Arc::new(f));
	}

	pub fn add_error_interceptor<F>(&self, f: F)
	where
		F: Fn(TransportError) -> TransportError + Send + Sync + 'static,
	{
		self.pipeline.write().error.push(Arc::new(f));
	}

	pub fn inner(&self) -> &SharedTransport {
		&self.inner
	}
}

impl std::fmt::Debug for InterceptedTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InterceptedTransport")
			.field("pipeline", &*self.pipeline.read())
			.finish_non_exhaustive()
	}
}

impl Transport for InterceptedTransport {
	fn execute(&self, descriptor: RequestDescriptor, cancel: CancelSignal) -> TransportFuture<'_> {
		let pipeline = self.pipeline.read().clone();
		Box::pin(async move {
			let outcome = match pipeline.apply_request(descriptor) {
				Ok(descriptor) => match self.inner.execute(descriptor, cancel).await {
					Ok(envelope) => pipeline.apply_response(envelope),
					Err(err) => Err(err),
				},
				Err(err) => Err(err),
			};
			outcome.map_err(|err| pipeline.apply_error(err))
		})
	}
}
