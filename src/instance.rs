//! Service instances and instance selection.
//!
//! A [`ServiceInstance`] is an immutable description of one concrete endpoint
//! of a logical service. Instances are produced by an [`InstanceSelector`]
//! and shared as `Arc` between the dispatch loop, the request executor, and
//! lifecycle observers; nothing mutates an instance after selection.
//!
//! The selector itself is a consumed capability: the dispatcher calls it at
//! least once per invocation (and again on each rotation) and never caches
//! its answers across invocations. Service discovery, health checking, and
//! registry refresh all live behind the trait.

use crate::request::ServiceRequest;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Logical name of a load-balanced target service.
///
/// Must be non-empty; the dispatcher rejects blank names before entering the
/// retry loop.
pub type ServiceName = String;

/// One concrete endpoint of a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    instance_id: String,
    service: ServiceName,
    host: String,
    port: u16,
    secure: bool,
    metadata: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// Create an instance for `service` at `host:port`.
    ///
    /// The instance id defaults to `host:port`; override it with
    /// [`with_instance_id`](Self::with_instance_id) when the registry assigns
    /// its own identifiers.
    pub fn new(service: impl Into<ServiceName>, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            instance_id: format!("{}:{}", host, port),
            service: service.into(),
            host,
            port,
            secure: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = id.into();
        self
    }

    /// Mark the endpoint as TLS-terminated.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Attach one metadata entry (zone, weight, version, ...).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The logical service this instance belongs to.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// `host:port`, the address half a transport needs to dial.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

/// The selector produced no endpoint for a service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no instance available for service `{service}`")]
pub struct NoInstanceAvailable {
    /// The service that could not be resolved.
    pub service: ServiceName,
}

impl NoInstanceAvailable {
    pub fn new(service: impl Into<ServiceName>) -> Self {
        Self { service: service.into() }
    }
}

/// Chooses a concrete instance for a logical service name.
///
/// Implementations may use the request (headers, path) as a routing hint,
/// e.g. for session affinity. They must be safe for concurrent calls from
/// many in-flight dispatches.
#[async_trait]
pub trait InstanceSelector: Send + Sync {
    async fn choose(
        &self,
        service: &str,
        request: &ServiceRequest,
    ) -> Result<Arc<ServiceInstance>, NoInstanceAvailable>;
}

struct Pool {
    instances: Vec<Arc<ServiceInstance>>,
    cursor: AtomicUsize,
}

/// Round-robin selection over a fixed instance table.
///
/// Suitable for static topologies and tests; dynamic discovery belongs in a
/// registry-backed [`InstanceSelector`] implementation. The table is built
/// up front and read-only afterwards, so selection takes no lock.
#[derive(Default)]
pub struct RoundRobinSelector {
    table: HashMap<ServiceName, Pool>,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self { table: HashMap::new() }
    }

    /// Register the instances of one service.
    pub fn with_service(
        mut self,
        service: impl Into<ServiceName>,
        instances: Vec<ServiceInstance>,
    ) -> Self {
        self.table.insert(
            service.into(),
            Pool {
                instances: instances.into_iter().map(Arc::new).collect(),
                cursor: AtomicUsize::new(0),
            },
        );
        self
    }
}

impl std::fmt::Debug for RoundRobinSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobinSelector").field("services", &self.table.len()).finish()
    }
}

#[async_trait]
impl InstanceSelector for RoundRobinSelector {
    async fn choose(
        &self,
        service: &str,
        _request: &ServiceRequest,
    ) -> Result<Arc<ServiceInstance>, NoInstanceAvailable> {
        let pool = self.table.get(service).ok_or_else(|| NoInstanceAvailable::new(service))?;
        if pool.instances.is_empty() {
            return Err(NoInstanceAvailable::new(service));
        }
        let index = pool.cursor.fetch_add(1, Ordering::Relaxed) % pool.instances.len();
        Ok(pool.instances[index].clone())
    }
}
