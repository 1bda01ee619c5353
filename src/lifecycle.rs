//! Lifecycle observation of dispatches.
//!
//! Observers see one *logical* request: a single start notification before
//! the first attempt and a single [`CompletionEvent`] when the invocation
//! ends, never one per physical attempt. The observer set lives in a
//! process-wide [`ObserverRegistry`], populated at startup and immutable
//! afterwards; it is filtered once per invocation by
//! [`LifecycleObserver::supports`], and fan-out runs in registration order.
//!
//! Observer failures are isolated: a panicking observer is logged at WARN
//! and skipped, and can neither block other observers nor the response path.

use crate::error::AttemptFailure;
use crate::instance::{ServiceInstance, ServiceName};
use crate::request::ServiceResponse;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Snapshot handed to [`LifecycleObserver::on_start`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    service: ServiceName,
    instance: Option<Arc<ServiceInstance>>,
}

impl RequestContext {
    pub(crate) fn new(
        service: impl Into<ServiceName>,
        instance: Option<Arc<ServiceInstance>>,
    ) -> Self {
        Self { service: service.into(), instance }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// The instance selected for attempt 1, when known at start time.
    pub fn instance(&self) -> Option<&Arc<ServiceInstance>> {
        self.instance.as_ref()
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    Failed,
}

/// What ended it.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// The response handed back to the caller.
    Response(ServiceResponse),
    /// The terminal failure.
    Failure(AttemptFailure),
}

/// Value describing a finished invocation.
///
/// Built exactly once per invocation, immediately before completion
/// fan-out, and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    status: CompletionStatus,
    service: ServiceName,
    instance: Option<Arc<ServiceInstance>>,
    attempts: usize,
    outcome: CompletionOutcome,
}

impl CompletionEvent {
    pub(crate) fn success(
        service: impl Into<ServiceName>,
        instance: Option<Arc<ServiceInstance>>,
        attempts: usize,
        response: ServiceResponse,
    ) -> Self {
        Self {
            status: CompletionStatus::Success,
            service: service.into(),
            instance,
            attempts,
            outcome: CompletionOutcome::Response(response),
        }
    }

    pub(crate) fn failed(
        service: impl Into<ServiceName>,
        instance: Option<Arc<ServiceInstance>>,
        attempts: usize,
        failure: AttemptFailure,
    ) -> Self {
        Self {
            status: CompletionStatus::Failed,
            service: service.into(),
            instance,
            attempts,
            outcome: CompletionOutcome::Failure(failure),
        }
    }

    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// The instance involved in the terminal outcome.
    pub fn instance(&self) -> Option<&Arc<ServiceInstance>> {
        self.instance.as_ref()
    }

    /// Total attempts the invocation made.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// The triggering outcome.
    pub fn outcome(&self) -> &CompletionOutcome {
        &self.outcome
    }
}

/// Observes dispatch lifecycles.
pub trait LifecycleObserver: Send + Sync {
    /// Scope this observer to particular services. Defaults to all.
    fn supports(&self, _service: &str) -> bool {
        true
    }

    /// Fired once per invocation, before the first attempt.
    fn on_start(&self, context: &RequestContext);

    /// Fired once per invocation, after the terminal outcome.
    fn on_complete(&self, event: &CompletionEvent);
}

/// Process-wide observer set.
///
/// Populated at startup with builder-style registration, then shared
/// read-only; nothing registers mid-invocation.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The observers that support `service`, in registration order.
    pub fn observers_for(&self, service: &str) -> Vec<Arc<dyn LifecycleObserver>> {
        self.observers.iter().filter(|o| o.supports(service)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry").field("observers", &self.observers.len()).finish()
    }
}

pub(crate) fn notify_start(observers: &[Arc<dyn LifecycleObserver>], context: &RequestContext) {
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| observer.on_start(context))).is_err() {
            tracing::warn!(
                service = context.service(),
                "lifecycle observer panicked in on_start; skipping"
            );
        }
    }
}

pub(crate) fn notify_complete(observers: &[Arc<dyn LifecycleObserver>], event: &CompletionEvent) {
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| observer.on_complete(event))).is_err() {
            tracing::warn!(
                service = event.service(),
                "lifecycle observer panicked in on_complete; skipping"
            );
        }
    }
}

/// Logs lifecycle transitions through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LifecycleObserver for LogObserver {
    fn on_start(&self, context: &RequestContext) {
        tracing::info!(
            service = context.service(),
            instance = ?context.instance().map(|i| i.authority()),
            "dispatch started"
        );
    }

    fn on_complete(&self, event: &CompletionEvent) {
        match event.status() {
            CompletionStatus::Success => tracing::info!(
                service = event.service(),
                attempts = event.attempts(),
                "dispatch completed"
            ),
            CompletionStatus::Failed => tracing::warn!(
                service = event.service(),
                attempts = event.attempts(),
                "dispatch failed"
            ),
        }
    }
}

/// Records lifecycle events in memory, for tests and debugging.
///
/// Clones share storage, so keep one handle and register another.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    starts: Arc<Mutex<Vec<RequestContext>>>,
    completions: Arc<Mutex<Vec<CompletionEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> Vec<RequestContext> {
        self.starts.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<CompletionEvent> {
        self.completions.lock().unwrap().clone()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_start(&self, context: &RequestContext) {
        self.starts.lock().unwrap().push(context.clone());
    }

    fn on_complete(&self, event: &CompletionEvent) {
        self.completions.lock().unwrap().push(event.clone());
    }
}
