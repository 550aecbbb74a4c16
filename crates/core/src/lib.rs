//! fetchkit: client runtime for HTTP APIs
//!
//! Mediates every network call of an application: executes requests,
//! manages the authenticated session over time and keeps a small result
//! cache consistent across overlapping callers.
//!
//! # Examples
//!
//! ## Fetching with cache and retries
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use fetchkit::{Client, ClientConfig, FetchOptions, RequestDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::new("https://api.example.com"))?;
//!
//!     let options = FetchOptions::manual()
//!         .with_cache_key("posts")
//!         .with_retries(2, Duration::from_millis(250));
//!     let posts = client.fetch(RequestDescriptor::get("/posts"), options).await?;
//!     println!("{posts:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Session lifecycle
//!
//! ```ignore
//! use fetchkit::{Client, ClientConfig, Credentials, RequestDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::new("https://api.example.com"))?;
//!     let session = client.session();
//!
//!     let _expiring = session.on_expiring_soon(|remaining_ms| {
//!         eprintln!("session ends in {}s", remaining_ms / 1000);
//!     });
//!
//!     session.login(&Credentials::new("ada@example.com", "secret")).await?;
//!
//!     // Auth-required descriptors get the bearer token attached.
//!     let orders = client.send(RequestDescriptor::get("/orders").authenticated()).await?;
//!     println!("{}", orders.status);
//!
//!     session.logout().await;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
pub mod coordinator;
pub mod session;
#[cfg(test)]
mod testing;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, DEFAULT_STORAGE_PREFIX, SessionConfig};
pub use coordinator::{FetchCoordinator, FetchOptions, FetchState};
pub use fk_protocol::{
	AuthToken, Body, CachePolicy, Credentials, ErrorShape, FormPart, FormValue, Headers, Method, OfflineAction, Payload,
	RequestDescriptor, RequestSignature, ResponseEnvelope, SessionState, SessionStatus, User,
};
pub use fk_runtime::{
	CancelHandle, CancelSignal, Error, ErrorKind, HttpTransport, InterceptedTransport, MemoryStorage, Result,
	ResultCache, StorageChange, StorageListener, StoragePort, Subscription, Transport, TransportConfig,
	TransportError, UnavailableStorage,
};
pub use session::{OfflineReplayer, SessionManager, StorageKeys, SyncReport, TransportReplayer};
