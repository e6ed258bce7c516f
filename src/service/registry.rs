//! Process-scoped registry of primary-only services.
//!
//! Owns the fan-out of node role transitions: step-up rebuilds instances
//! from durable documents that are not yet terminal, step-down
//! cooperatively cancels live instances without touching documents.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

use crate::service::service::Service;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service name already registered: {0}")]
    DuplicateName(String),
}

/// Registry of named services for one process (or one test fixture).
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service under its name. Names are unique per registry.
    pub fn register_service(&self, service: Service) -> Result<(), RegistryError> {
        let mut services = self.services.lock().expect("service registry poisoned");
        let name = service.name().to_string();
        if services.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        services.insert(name, service);
        Ok(())
    }

    pub fn lookup_service_by_name(&self, name: &str) -> Option<Service> {
        self.services
            .lock()
            .expect("service registry poisoned")
            .get(name)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Service> {
        self.services
            .lock()
            .expect("service registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Prepare backing storage for every registered service.
    pub async fn on_startup(&self) -> Result<(), StoreError> {
        for service in self.snapshot() {
            service.ensure_ready().await?;
        }
        Ok(())
    }

    /// The local node completed a step-up to `term`: every service
    /// rebuilds instances from its non-terminal durable documents, bound
    /// to the new term. Only the current primary term drives a migration;
    /// anything older is fenced at the store.
    pub async fn on_step_up_complete(&self, term: i64) -> Result<(), StoreError> {
        info!(term, "step-up complete, resuming primary-only services");
        for service in self.snapshot() {
            service.step_up(term).await?;
        }
        Ok(())
    }

    /// The local node is stepping down: signal every live instance across
    /// all services to cancel cooperatively. Never touches documents and
    /// never blocks on workflow completion.
    pub fn on_step_down(&self) {
        info!("step-down, cancelling primary-only service instances");
        for service in self.snapshot() {
            service.step_down();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RecipientConfig;
    use crate::donor::mock::MockDonorDirectory;
    use crate::service::context::RecipientContext;
    use crate::service::service::{RecipientService, RECIPIENT_SERVICE_NAME};
    use crate::store::memory::{LocalRole, MemoryStateStore};

    fn recipient_service() -> Service {
        let context = Arc::new(RecipientContext::new(
            Arc::new(MemoryStateStore::new(LocalRole::new())),
            Arc::new(MockDonorDirectory::new()),
            RecipientConfig::default(),
        ));
        Service::Recipient(RecipientService::new(context))
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let registry = ServiceRegistry::new();
        registry
            .register_service(recipient_service())
            .expect("first registration");
        let err = registry
            .register_service(recipient_service())
            .expect_err("duplicate");
        assert_eq!(
            err,
            RegistryError::DuplicateName(RECIPIENT_SERVICE_NAME.to_string())
        );
    }

    #[tokio::test]
    async fn lookup_finds_registered_services() {
        let registry = ServiceRegistry::new();
        assert!(registry.lookup_service_by_name(RECIPIENT_SERVICE_NAME).is_none());
        registry
            .register_service(recipient_service())
            .expect("register");
        let found = registry
            .lookup_service_by_name(RECIPIENT_SERVICE_NAME)
            .expect("lookup");
        assert_eq!(found.name(), RECIPIENT_SERVICE_NAME);
    }
}
