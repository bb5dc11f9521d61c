//! Service registry
//!
//! The name-to-service mapping seeded during startup and immutable
//! afterwards, which is why lookups need no lock. Resolution is triggered
//! when an initial filter criterion designates a host of the form
//! `<service>.<home-domain>`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use trellis_infra_common::Counter;

use crate::service::AppServer;

/// Per-service request/response counters, exported through the telemetry
/// surface.
#[derive(Debug, Default)]
pub struct ServiceCounters {
    pub requests: Counter,
    pub responses: Counter,
}

struct RegisteredService {
    server: Arc<dyn AppServer>,
    counters: Arc<ServiceCounters>,
}

/// Immutable name-to-service lookup. Build with
/// [`ServiceRegistryBuilder`].
pub struct ServiceRegistry {
    home_domain: String,
    services: HashMap<String, RegisteredService>,
}

/// Collects service registrations during startup.
pub struct ServiceRegistryBuilder {
    home_domain: String,
    services: HashMap<String, RegisteredService>,
}

impl ServiceRegistryBuilder {
    pub fn new(home_domain: impl Into<String>) -> Self {
        ServiceRegistryBuilder {
            home_domain: home_domain.into().to_ascii_lowercase(),
            services: HashMap::new(),
        }
    }

    /// Registers a service under its own (lowercased) name. A second
    /// registration with the same name replaces the first.
    pub fn register(mut self, server: Arc<dyn AppServer>) -> Self {
        let name = server.service_name().to_ascii_lowercase();
        info!(service = %name, "registering application service");
        self.services.insert(
            name,
            RegisteredService {
                server,
                counters: Arc::new(ServiceCounters::default()),
            },
        );
        self
    }

    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry {
            home_domain: self.home_domain,
            services: self.services,
        }
    }
}

impl ServiceRegistry {
    /// Looks a service up by name (case-insensitive).
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn AppServer>> {
        self.services
            .get(&name.to_ascii_lowercase())
            .map(|s| Arc::clone(&s.server))
    }

    /// The counters for a registered service.
    pub fn counters(&self, name: &str) -> Option<Arc<ServiceCounters>> {
        self.services
            .get(&name.to_ascii_lowercase())
            .map(|s| Arc::clone(&s.counters))
    }

    /// Resolves an initial-filter-criterion host of the form
    /// `<service>.<home-domain>` to its service.
    ///
    /// Hosts outside the home domain, bare home-domain hosts, and service
    /// labels containing further dots all resolve to nothing.
    pub fn resolve_ifc_host(&self, host: &str) -> Option<Arc<dyn AppServer>> {
        let host = host.to_ascii_lowercase();
        let label = host
            .strip_suffix(&self.home_domain)?
            .strip_suffix('.')?;
        if label.is_empty() || label.contains('.') {
            debug!(%host, "IFC host does not name a single service label");
            return None;
        }
        self.lookup(label)
    }

    /// The home domain this registry serves.
    pub fn home_domain(&self) -> &str {
        &self.home_domain
    }
}
