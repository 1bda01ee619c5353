//! Per-invocation retry state.

use crate::error::AttemptFailure;
use crate::instance::{ServiceInstance, ServiceName};
use std::sync::Arc;

/// Mutable state owned by exactly one in-flight dispatch.
///
/// The dispatcher is the only writer; retry policies observe the context
/// read-only to decide continuation. The context is a local of the dispatch
/// future and is dropped when the invocation returns or fails terminally;
/// it never crosses invocations or threads.
#[derive(Debug)]
pub struct RetryContext {
    service: ServiceName,
    attempts: usize,
    attempts_on_instance: usize,
    rotations: usize,
    instance: Option<Arc<ServiceInstance>>,
    last_failure: Option<AttemptFailure>,
}

impl RetryContext {
    pub(crate) fn new(service: impl Into<ServiceName>) -> Self {
        Self {
            service: service.into(),
            attempts: 0,
            attempts_on_instance: 0,
            rotations: 0,
            instance: None,
            last_failure: None,
        }
    }

    /// The logical service being dispatched.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Total attempts begun so far. Never decremented.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Attempts begun against the currently bound instance.
    ///
    /// Resets when dispatch rotates to a freshly selected instance.
    pub fn attempts_on_instance(&self) -> usize {
        self.attempts_on_instance
    }

    /// How many times dispatch moved to a freshly selected instance.
    pub fn rotations(&self) -> usize {
        self.rotations
    }

    /// The instance the next attempt will target, once one is bound.
    pub fn instance(&self) -> Option<&Arc<ServiceInstance>> {
        self.instance.as_ref()
    }

    /// The most recent failure, if any attempt has failed.
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        self.last_failure.as_ref()
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.attempts_on_instance += 1;
    }

    pub(crate) fn bind(&mut self, instance: Arc<ServiceInstance>) {
        self.instance = Some(instance);
    }

    pub(crate) fn rotate(&mut self, instance: Arc<ServiceInstance>) {
        self.rotations += 1;
        self.attempts_on_instance = 0;
        self.instance = Some(instance);
    }

    pub(crate) fn record_failure(&mut self, failure: AttemptFailure) {
        self.last_failure = Some(failure);
    }
}
