#![allow(dead_code)]

use async_trait::async_trait;
use http::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use waypoint::{
    InstanceSelector, NoInstanceAvailable, RequestExecutor, RoundRobinSelector, ServiceInstance,
    ServiceRequest, ServiceResponse, TransportError,
};

/// Executor that replays a scripted sequence of outcomes and records which
/// instances it was pointed at. Clones share state, so keep one handle for
/// assertions and hand another to the dispatcher builder.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    script: Arc<Mutex<VecDeque<Result<ServiceResponse, TransportError>>>>,
    calls: Arc<AtomicUsize>,
    targets: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<Result<ServiceResponse, TransportError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            calls: Arc::new(AtomicUsize::new(0)),
            targets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Authorities hit, one per attempt, in order.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        instance: &ServiceInstance,
        _request: &ServiceRequest,
    ) -> Result<ServiceResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(instance.authority());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ServiceResponse::new(StatusCode::OK)))
    }
}

/// Selector that answers a bounded number of times, then reports the pool
/// as exhausted.
pub struct DrainingSelector {
    service: String,
    remaining: Arc<Mutex<usize>>,
}

impl DrainingSelector {
    pub fn new(service: &str, answers: usize) -> Self {
        Self { service: service.to_string(), remaining: Arc::new(Mutex::new(answers)) }
    }
}

#[async_trait]
impl InstanceSelector for DrainingSelector {
    async fn choose(
        &self,
        service: &str,
        _request: &ServiceRequest,
    ) -> Result<Arc<ServiceInstance>, NoInstanceAvailable> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return Err(NoInstanceAvailable::new(service));
        }
        *remaining -= 1;
        Ok(Arc::new(ServiceInstance::new(&self.service, "10.0.0.1", 8080)))
    }
}

pub fn status(code: StatusCode) -> Result<ServiceResponse, TransportError> {
    Ok(ServiceResponse::new(code))
}

pub fn io_error(message: &str) -> Result<ServiceResponse, TransportError> {
    Err(TransportError::io(message))
}

/// `count` instances of `service` at 10.0.0.1..=count, behind round robin.
pub fn pool(service: &str, count: usize) -> RoundRobinSelector {
    let instances =
        (1..=count).map(|n| ServiceInstance::new(service, format!("10.0.0.{}", n), 8080)).collect();
    RoundRobinSelector::new().with_service(service, instances)
}
