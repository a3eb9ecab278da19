/// Central registry for all service integrations
///
/// Maps a service id to the one registered ServiceIntegration. Populated
/// once at startup in server setup, then shared read-only behind an Arc;
/// concurrent lookups need no synchronization.

use crate::error::EngineError;
use crate::integration::{ActionDefinition, ReactionDefinition, ServiceIntegration};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of service integrations, keyed by service id
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<&'static str, Arc<dyn ServiceIntegration>>,
}

/// Serializable description of one registered service, for the catalog API
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub requires_oauth: bool,
    pub supports_webhooks: bool,
    pub actions: Vec<ActionDefinition>,
    pub reactions: Vec<ReactionDefinition>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration. Fails if the service id is already taken.
    pub fn register(
        &mut self,
        integration: Arc<dyn ServiceIntegration>,
    ) -> Result<(), EngineError> {
        let id = integration.service_id();
        if self.services.contains_key(id) {
            return Err(EngineError::DuplicateService(id.to_string()));
        }
        tracing::info!("Registered service integration: {}", id);
        self.services.insert(id, integration);
        Ok(())
    }

    /// Look up the integration for a service id.
    pub fn lookup(&self, service_id: &str) -> Result<Arc<dyn ServiceIntegration>, EngineError> {
        self.services
            .get(service_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownService(service_id.to_string()))
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Side-effect-free catalog of every registered service, sorted by id.
    /// This is the "list available actions/reactions per service" query
    /// the rest of the application presents to end users.
    pub fn catalog(&self) -> Vec<ServiceDescriptor> {
        let mut descriptors: Vec<ServiceDescriptor> = self
            .services
            .values()
            .map(|service| ServiceDescriptor {
                id: service.service_id().to_string(),
                name: service.service_name().to_string(),
                description: service.service_description().to_string(),
                requires_oauth: service.requires_oauth(),
                supports_webhooks: service.supports_webhooks(),
                actions: service.actions(),
                reactions: service.reactions(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::timer::TimerIntegration;

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(TimerIntegration)).unwrap();

        let err = registry.register(Arc::new(TimerIntegration)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateService(id) if id == "timer"));
    }

    #[test]
    fn unknown_service_lookup_is_an_error() {
        let registry = ServiceRegistry::new();
        // The Ok side is a trait object without Debug, so unwrap the Err
        // arm explicitly.
        let err = registry.lookup("nope").map(|_| ()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownService(id) if id == "nope"));
    }

    #[test]
    fn catalog_lists_registered_services() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(TimerIntegration)).unwrap();

        let catalog = registry.catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].id, "timer");
        assert!(!catalog[0].requires_oauth);
        assert!(!catalog[0].actions.is_empty());
        assert!(catalog[0].reactions.is_empty());
    }
}
