//! The dispatch loop: per-attempt instance binding, retry, and lifecycle
//! notification.
//!
//! [`Dispatcher::execute`] resolves a logical service name to a concrete
//! instance, runs the attempt through the injected [`RequestExecutor`], and
//! loops under the service's retry policy. Three concerns stay consistent
//! across attempts:
//!
//! - which instance an attempt targets (the policy chooses between pinning
//!   the bound instance and rotating to a freshly selected one);
//! - whether an outcome is a retryable failure (policy again, failing
//!   closed when no policy is configured);
//! - lifecycle notification, which fires exactly once at start and exactly
//!   once at completion no matter which path the invocation takes out of
//!   the loop.
//!
//! Every `Dispatcher` field is `Arc`-shared, so the dispatcher clones
//! cheaply and dispatches run concurrently and independently; the only
//! mutable state of an invocation is its own [`RetryContext`]. No lock is
//! held across an `.await`.

use crate::context::RetryContext;
use crate::error::{AttemptFailure, DispatchError};
use crate::executor::RequestExecutor;
use crate::instance::{InstanceSelector, ServiceInstance};
use crate::jitter::Jitter;
use crate::lifecycle::{
    notify_complete, notify_start, CompletionEvent, ObserverRegistry, RequestContext,
};
use crate::policy::{retryable_error, retryable_status, NeverRetryFactory, RetryFactory};
use crate::request::{ServiceRequest, ServiceResponse};
use crate::sleeper::{Sleeper, TokioSleeper};
use std::fmt;
use std::sync::Arc;

/// Dispatcher configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("an instance selector is required")]
    MissingSelector,
    #[error("a request executor is required")]
    MissingExecutor,
}

enum Continuation {
    SameInstance,
    NextInstance,
    Stop,
}

/// Client-side load-balanced dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    selector: Arc<dyn InstanceSelector>,
    executor: Arc<dyn RequestExecutor>,
    retries: Arc<dyn RetryFactory>,
    observers: Arc<ObserverRegistry>,
    retry_enabled: bool,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("retry_enabled", &self.retry_enabled)
            .field("jitter", &self.jitter)
            .field("observers", &self.observers.len())
            .field("selector", &"<selector>")
            .field("executor", &"<executor>")
            .finish()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatch `request` to `service`, selecting the attempt-1 instance
    /// through the configured selector.
    pub async fn execute(
        &self,
        service: &str,
        request: ServiceRequest,
    ) -> Result<ServiceResponse, DispatchError> {
        self.dispatch(service, request, None).await
    }

    /// Dispatch with a pre-bound attempt-1 instance.
    ///
    /// The recovery path for callers re-entering with a fixed target: the
    /// pinned instance is used for the first attempt instead of asking the
    /// selector; retries may still rotate away from it if the policy says so.
    pub async fn execute_pinned(
        &self,
        service: &str,
        instance: Arc<ServiceInstance>,
        request: ServiceRequest,
    ) -> Result<ServiceResponse, DispatchError> {
        self.dispatch(service, request, Some(instance)).await
    }

    async fn dispatch(
        &self,
        service: &str,
        request: ServiceRequest,
        pinned: Option<Arc<ServiceInstance>>,
    ) -> Result<ServiceResponse, DispatchError> {
        if service.trim().is_empty() {
            return Err(DispatchError::InvalidRequest {
                reason: "service name must be non-empty".into(),
            });
        }

        // Disabled retry behaves exactly like an absent policy: one attempt.
        let policy = if self.retry_enabled { self.retries.retry_policy(service) } else { None };
        let backoff = self.retries.backoff_policy(service);
        let observers = self.observers.observers_for(service);

        let mut context = RetryContext::new(service);
        let mut instance = match pinned {
            Some(instance) => instance,
            None => self
                .selector
                .choose(service, &request)
                .await
                .map_err(|e| DispatchError::NoInstanceAvailable { service: e.service })?,
        };
        context.bind(instance.clone());

        // One start notification per invocation, not per attempt.
        notify_start(&observers, &RequestContext::new(service, Some(instance.clone())));

        loop {
            context.begin_attempt();
            tracing::debug!(
                service,
                attempt = context.attempts(),
                instance = %instance.authority(),
                "dispatch attempt"
            );

            let failure = match self.executor.execute(&instance, &request).await {
                Ok(response) => {
                    if !retryable_status(policy.as_ref(), response.status()) {
                        // Error-range statuses land here too when the policy
                        // does not claim them; the caller gets the response.
                        let event = CompletionEvent::success(
                            service,
                            Some(instance.clone()),
                            context.attempts(),
                            response.clone(),
                        );
                        notify_complete(&observers, &event);
                        return Ok(response);
                    }
                    AttemptFailure::Status(response)
                }
                Err(error) => {
                    if !retryable_error(policy.as_ref(), &error) {
                        let event = CompletionEvent::failed(
                            service,
                            Some(instance.clone()),
                            context.attempts(),
                            AttemptFailure::Transport(error.clone()),
                        );
                        notify_complete(&observers, &event);
                        return Err(DispatchError::Transport(error));
                    }
                    AttemptFailure::Transport(error)
                }
            };
            context.record_failure(failure.clone());

            // Only a policy that classified the failure retryable gets us
            // here, so an absent policy maps to Stop.
            let continuation = match policy.as_ref() {
                Some(policy) if policy.can_retry_same_instance(&context) => {
                    Continuation::SameInstance
                }
                Some(policy) if policy.can_retry_next_instance(&context) => {
                    Continuation::NextInstance
                }
                _ => Continuation::Stop,
            };

            match continuation {
                Continuation::SameInstance => {}
                Continuation::NextInstance => {
                    match self.selector.choose(service, &request).await {
                        Ok(next) => {
                            instance = next;
                            context.rotate(instance.clone());
                        }
                        Err(e) => {
                            // Start already fired, so this exit still owes a
                            // completion event; the last network failure is
                            // its outcome.
                            let event = CompletionEvent::failed(
                                service,
                                Some(instance.clone()),
                                context.attempts(),
                                failure,
                            );
                            notify_complete(&observers, &event);
                            return Err(DispatchError::NoInstanceAvailable { service: e.service });
                        }
                    }
                }
                Continuation::Stop => {
                    tracing::debug!(
                        service,
                        attempts = context.attempts(),
                        "retry budget exhausted"
                    );
                    let event = CompletionEvent::failed(
                        service,
                        Some(instance.clone()),
                        context.attempts(),
                        failure.clone(),
                    );
                    notify_complete(&observers, &event);
                    return Err(DispatchError::RetryExhausted {
                        attempts: context.attempts(),
                        last: Box::new(failure),
                    });
                }
            }

            if let Some(backoff) = &backoff {
                let delay = self.jitter.apply(backoff.delay(context.attempts()));
                self.sleeper.sleep(delay).await;
            }
        }
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    selector: Option<Arc<dyn InstanceSelector>>,
    executor: Option<Arc<dyn RequestExecutor>>,
    retries: Arc<dyn RetryFactory>,
    observers: Arc<ObserverRegistry>,
    retry_enabled: bool,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            selector: None,
            executor: None,
            retries: Arc::new(NeverRetryFactory),
            observers: Arc::new(ObserverRegistry::new()),
            retry_enabled: true,
            jitter: Jitter::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// The instance selector (required).
    pub fn selector<S>(mut self, selector: S) -> Self
    where
        S: InstanceSelector + 'static,
    {
        self.selector = Some(Arc::new(selector));
        self
    }

    /// The request executor (required).
    pub fn executor<X>(mut self, executor: X) -> Self
    where
        X: RequestExecutor + 'static,
    {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Per-service retry and backoff provider. Defaults to never retrying.
    pub fn retry_factory<F>(mut self, factory: F) -> Self
    where
        F: RetryFactory + 'static,
    {
        self.retries = Arc::new(factory);
        self
    }

    /// The process-wide observer set. Defaults to empty.
    pub fn observers(mut self, registry: ObserverRegistry) -> Self {
        self.observers = Arc::new(registry);
        self
    }

    /// Deployment-wide retry switch. When off, every service behaves as if
    /// it had no retry policy: a single attempt, no loop.
    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    /// Jitter applied to backoff delays. Defaults to full jitter.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Custom sleeper, e.g. for deterministic tests.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let selector = self.selector.ok_or(BuildError::MissingSelector)?;
        let executor = self.executor.ok_or(BuildError::MissingExecutor)?;
        Ok(Dispatcher {
            selector,
            executor,
            retries: self.retries,
            observers: self.observers,
            retry_enabled: self.retry_enabled,
            jitter: self.jitter,
            sleeper: self.sleeper,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
