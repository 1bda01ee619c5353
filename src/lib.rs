#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Waypoint
//!
//! Client-side load-balanced dispatch for async Rust: per-call
//! service-instance selection, pluggable retry and backoff policies, and
//! lifecycle observers.
//!
//! ## Features
//!
//! - **Per-attempt instance binding**: a logical service name resolves to
//!   a concrete endpoint on every call; policies choose between pinning the
//!   failed instance and rotating to a fresh one on retry
//! - **Pluggable retry policies** with per-service providers; retry fails
//!   closed when no policy is configured
//! - **Backoff strategies** (constant, linear, exponential) with jitter and
//!   a testable sleep abstraction
//! - **Lifecycle observers** that see one logical request: exactly one
//!   start and one completion notification per invocation, with observer
//!   failures isolated from the response path
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use http::StatusCode;
//! use waypoint::{
//!     Dispatcher, RequestExecutor, RoundRobinSelector, ServiceInstance, ServiceRequest,
//!     ServiceResponse, TransportError,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl RequestExecutor for Echo {
//!     async fn execute(
//!         &self,
//!         _instance: &ServiceInstance,
//!         _request: &ServiceRequest,
//!     ) -> Result<ServiceResponse, TransportError> {
//!         Ok(ServiceResponse::new(StatusCode::OK))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let selector = RoundRobinSelector::new()
//!         .with_service("orders", vec![ServiceInstance::new("orders", "10.0.0.1", 8080)]);
//!     let dispatcher = Dispatcher::builder()
//!         .selector(selector)
//!         .executor(Echo)
//!         .build()
//!         .expect("selector and executor are set");
//!
//!     let response = dispatcher
//!         .execute("orders", ServiceRequest::get("/api/orders"))
//!         .await
//!         .expect("dispatch succeeds");
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

pub mod backoff;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod instance;
pub mod jitter;
pub mod lifecycle;
pub mod policy;
pub mod request;
pub mod sleeper;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use context::RetryContext;
pub use dispatch::{BuildError, Dispatcher, DispatcherBuilder};
pub use error::{AttemptFailure, DispatchError};
pub use executor::{RequestExecutor, TransportError};
pub use instance::{
    InstanceSelector, NoInstanceAvailable, RoundRobinSelector, ServiceInstance, ServiceName,
};
pub use jitter::Jitter;
pub use lifecycle::{
    CompletionEvent, CompletionOutcome, CompletionStatus, LifecycleObserver, LogObserver,
    ObserverRegistry, RecordingObserver, RequestContext,
};
pub use policy::{
    FixedRetryFactory, NeverRetryFactory, RetryFactory, RetryPolicy, SimpleRetryPolicy,
};
pub use request::{ServiceRequest, ServiceResponse};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
