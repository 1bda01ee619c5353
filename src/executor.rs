//! The request-execution boundary.
//!
//! A [`RequestExecutor`] performs one network attempt against a bound
//! instance and reports the raw outcome without interpreting retryability.
//! The per-attempt outcome is the plain `Result`: `Ok` carries a response
//! with *any* status code (a 5xx is a valid transport-level success), `Err`
//! carries a [`TransportError`]. Classification happens in the policy layer.

use crate::instance::ServiceInstance;
use crate::request::{ServiceRequest, ServiceResponse};
use async_trait::async_trait;
use std::time::Duration;

/// A transport-level failure from a single attempt.
///
/// Carried by value so it can be retained in the retry context, embedded in
/// completion events, and wrapped by terminal errors without borrowing the
/// attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection to the instance could not be established.
    #[error("connect to {authority} failed: {message}")]
    Connect { authority: String, message: String },
    /// The attempt ran out of time.
    #[error("attempt timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    /// The connection failed mid-exchange.
    #[error("transport i/o failure: {message}")]
    Io { message: String },
}

impl TransportError {
    pub fn connect(authority: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect { authority: authority.into(), message: message.into() }
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }
}

/// Executes one attempt against a bound instance.
///
/// Cancellation follows the usual async contract: if the caller drops the
/// dispatch future, the in-flight `execute` future is dropped with it and
/// the implementation is responsible for abandoning its I/O.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(
        &self,
        instance: &ServiceInstance,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse, TransportError>;
}
