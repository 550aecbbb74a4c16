//! fetchkit runtime - transport, caching and deduplication primitives
//!
//! This crate provides the building blocks the fetch coordinator and the
//! session manager are assembled from:
//!
//! - **Transport**: single-request execution over reqwest with interceptors
//! - **Result cache**: keyed TTL store with lazy eviction
//! - **Pending registry**: one in-flight call per request signature
//! - **Storage port**: persistent key-value store with cross-context change
//!   notification
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  fetchkit   │  Fetch coordinator, session manager, client
//! └──────┬──────┘
//!        │ uses
//! ┌──────▼──────┐
//! │  fk-runtime │  This crate
//! │  ┌────────┐ │
//! │  │ Trans  │ │  reqwest + interceptor pipeline
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Cache  │ │  TTL results, pending calls
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Store  │ │  Storage port
//! │  └────────┘ │
//! └─────────────┘
//! ```

pub mod cache;
pub mod cancel;
pub mod clock;
pub mod error;
pub mod handlers;
pub mod pending;
pub mod storage;
pub mod transport;

pub use cache::{CacheEntry, DEFAULT_TTL, ResultCache};
pub use cancel::{CancelHandle, CancelReason, CancelSignal};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Error, ErrorKind, Result, TransportError, TransportFailure};
pub use handlers::{HandlerId, Subscription};
pub use pending::{PendingCall, PendingRegistry, SharedCall};
pub use storage::{
	MemoryStorage, StorageChange, StorageListener, StoragePort, UnavailableStorage, read_json, write_json,
};
pub use transport::{
	DEFAULT_TIMEOUT, HttpTransport, InterceptedTransport, InterceptorPipeline, SharedTransport, Transport,
	TransportConfig, TransportFuture,
};
