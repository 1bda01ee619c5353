//! Retry policies and retryability evaluation.
//!
//! A [`RetryPolicy`] answers two independent questions for the dispatch
//! loop: whether an outcome (status code or transport error) counts as a
//! retryable failure, and whether the budget permits another attempt, either
//! on the instance that just failed or on a freshly selected one. Policies
//! are provided per service by a [`RetryFactory`]; a factory returning
//! `None` means the service is never retried.
//!
//! Evaluation fails closed: with no policy in play nothing is retryable,
//! and a panicking policy predicate is treated as "do not retry".
//!
//! Example
//! ```rust
//! use http::StatusCode;
//! use waypoint::SimpleRetryPolicy;
//!
//! // one extra attempt on the failed instance, then two rotations
//! let policy = SimpleRetryPolicy::new(1, 2)
//!     .with_retryable_status(StatusCode::SERVICE_UNAVAILABLE)
//!     .with_retryable_status(StatusCode::BAD_GATEWAY);
//! # let _ = policy;
//! ```

use crate::backoff::Backoff;
use crate::context::RetryContext;
use crate::executor::TransportError;
use http::StatusCode;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Decides continuation and retryability for one service's dispatches.
///
/// The two `can_retry_*` methods are consulted only after a failure has
/// already been classified retryable; they see the invocation's
/// [`RetryContext`] read-only.
pub trait RetryPolicy: Send + Sync {
    /// May another attempt target the instance that just failed?
    fn can_retry_same_instance(&self, context: &RetryContext) -> bool;

    /// May another attempt proceed against a freshly selected instance?
    fn can_retry_next_instance(&self, context: &RetryContext) -> bool;

    /// Is a response with this status a retryable failure?
    fn retryable_status(&self, status: StatusCode) -> bool;

    /// Is this transport failure retryable?
    ///
    /// Defaults to `true`: transport-level failures are presumed transient
    /// unless the policy says otherwise.
    fn retryable_error(&self, _error: &TransportError) -> bool {
        true
    }
}

/// Counter-based policy: a same-instance budget, then rotation, then stop.
///
/// Each bound instance gets `1 + retries_same_instance` attempts; dispatch
/// then rotates, up to `retries_next_instance` times. Setting
/// `retries_same_instance = 0` rotates on every retry; setting
/// `retries_next_instance = 0` pins every retry to the first instance.
#[derive(Debug, Clone)]
pub struct SimpleRetryPolicy {
    retries_same_instance: usize,
    retries_next_instance: usize,
    retryable_statuses: Vec<StatusCode>,
    retry_transport_errors: bool,
}

impl SimpleRetryPolicy {
    pub fn new(retries_same_instance: usize, retries_next_instance: usize) -> Self {
        Self {
            retries_same_instance,
            retries_next_instance,
            retryable_statuses: Vec::new(),
            retry_transport_errors: true,
        }
    }

    /// Classify responses with this status as retryable failures.
    pub fn with_retryable_status(mut self, status: StatusCode) -> Self {
        self.retryable_statuses.push(status);
        self
    }

    /// Whether transport errors count as retryable (default: yes).
    pub fn retry_transport_errors(mut self, retry: bool) -> Self {
        self.retry_transport_errors = retry;
        self
    }
}

impl RetryPolicy for SimpleRetryPolicy {
    fn can_retry_same_instance(&self, context: &RetryContext) -> bool {
        context.attempts_on_instance() <= self.retries_same_instance
    }

    fn can_retry_next_instance(&self, context: &RetryContext) -> bool {
        context.rotations() < self.retries_next_instance
    }

    fn retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_statuses.contains(&status)
    }

    fn retryable_error(&self, _error: &TransportError) -> bool {
        self.retry_transport_errors
    }
}

/// Per-service policy provider.
///
/// `None` from [`retry_policy`](Self::retry_policy) means the service is
/// never retried; `None` from [`backoff_policy`](Self::backoff_policy)
/// means retries proceed without delay.
pub trait RetryFactory: Send + Sync {
    fn retry_policy(&self, service: &str) -> Option<Arc<dyn RetryPolicy>>;

    fn backoff_policy(&self, _service: &str) -> Option<Backoff> {
        None
    }
}

/// Factory that never retries any service. The default when a dispatcher is
/// built without a factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRetryFactory;

impl RetryFactory for NeverRetryFactory {
    fn retry_policy(&self, _service: &str) -> Option<Arc<dyn RetryPolicy>> {
        None
    }
}

/// Factory handing every service the same policy and backoff.
#[derive(Clone, Default)]
pub struct FixedRetryFactory {
    policy: Option<Arc<dyn RetryPolicy>>,
    backoff: Option<Backoff>,
}

impl FixedRetryFactory {
    pub fn new() -> Self {
        Self { policy: None, backoff: None }
    }

    pub fn with_policy<P: RetryPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

impl std::fmt::Debug for FixedRetryFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedRetryFactory")
            .field("policy", &self.policy.as_ref().map(|_| "<policy>"))
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl RetryFactory for FixedRetryFactory {
    fn retry_policy(&self, _service: &str) -> Option<Arc<dyn RetryPolicy>> {
        self.policy.clone()
    }

    fn backoff_policy(&self, _service: &str) -> Option<Backoff> {
        self.backoff.clone()
    }
}

/// Classify a response status against the active policy.
///
/// Pure: no policy means not retryable, and a panic inside the policy
/// predicate is caught and treated as not retryable.
pub fn retryable_status(policy: Option<&Arc<dyn RetryPolicy>>, status: StatusCode) -> bool {
    let Some(policy) = policy else {
        return false;
    };
    catch_unwind(AssertUnwindSafe(|| policy.retryable_status(status))).unwrap_or_else(|_| {
        tracing::warn!(
            %status,
            "retry policy panicked classifying a status; treating as non-retryable"
        );
        false
    })
}

/// Classify a transport error against the active policy.
///
/// Same contract as [`retryable_status`]: fails closed.
pub fn retryable_error(policy: Option<&Arc<dyn RetryPolicy>>, error: &TransportError) -> bool {
    let Some(policy) = policy else {
        return false;
    };
    catch_unwind(AssertUnwindSafe(|| policy.retryable_error(error))).unwrap_or_else(|_| {
        tracing::warn!(
            error = %error,
            "retry policy panicked classifying an error; treating as non-retryable"
        );
        false
    })
}
