//! Wire types shared between the fetchkit runtime and its callers.
//!
//! Everything here is plain data: request descriptors issued by callers,
//! response envelopes handed back, session-facing payloads exchanged with the
//! `/auth/*` endpoints, and the session snapshot published to subscribers.
//!
//! # Main Types
//!
//! - [`RequestDescriptor`] - Declarative, immutable description of one request
//! - [`RequestSignature`] - Deterministic identity used for dedup and caching
//! - [`ResponseEnvelope`] - Parsed response with [`Payload`], status and headers
//! - [`ErrorShape`] - Flattened error view for callers that want plain data
//! - [`AuthToken`], [`User`], [`SessionState`] - Session model
//! - [`OfflineAction`] - Work captured while disconnected

pub mod endpoints;
pub mod request;
pub mod response;
pub mod session;

pub use request::{Body, CachePolicy, FormPart, FormValue, Headers, Method, RequestDescriptor, RequestSignature};
pub use response::{ErrorShape, Payload, ResponseEnvelope};
pub use session::{
	AuthResponse, AuthToken, Credentials, OfflineAction, RefreshRequest, SessionState, SessionStatus, User,
	ValidateResponse,
};
