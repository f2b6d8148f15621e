use std::sync::Arc;

use afcdisk_types::Status;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

/// Server side of one RPC service.
///
/// `handle` receives the raw request body for `method_id` and returns the
/// raw response body or a `Status`.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    fn service_id(&self) -> u16;

    /// Used in logs.
    fn service_name(&self) -> &str;

    async fn handle(&self, method_id: u16, request: Bytes) -> Result<Bytes, Status>;
}

/// Services hosted by a [`Server`](crate::Server), keyed by service id.
pub struct ServiceRegistry {
    services: DashMap<u16, Arc<dyn ServiceHandler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Replaces any handler already registered under the same id.
    pub fn register(&self, service: Arc<dyn ServiceHandler>) {
        let id = service.service_id();
        tracing::debug!(service_id = id, name = service.service_name(), "service registered");
        self.services.insert(id, service);
    }

    /// Clone the handler out so no map guard is held across an await.
    pub fn get(&self, service_id: u16) -> Option<Arc<dyn ServiceHandler>> {
        self.services.get(&service_id).map(|r| Arc::clone(r.value()))
    }

    pub fn unregister(&self, service_id: u16) -> bool {
        self.services.remove(&service_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afcdisk_types::StatusCode;

    struct EchoService;

    #[async_trait]
    impl ServiceHandler for EchoService {
        fn service_id(&self) -> u16 {
            1
        }
        fn service_name(&self) -> &str {
            "echo"
        }
        async fn handle(&self, _method_id: u16, request: Bytes) -> Result<Bytes, Status> {
            Ok(request)
        }
    }

    struct RefuseService(u16);

    #[async_trait]
    impl ServiceHandler for RefuseService {
        fn service_id(&self) -> u16 {
            self.0
        }
        fn service_name(&self) -> &str {
            "refuse"
        }
        async fn handle(&self, _method_id: u16, _request: Bytes) -> Result<Bytes, Status> {
            Err(Status::new(StatusCode::NOT_IMPLEMENTED))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(EchoService));
        registry.register(Arc::new(RefuseService(2)));

        assert_eq!(registry.get(1).unwrap().service_name(), "echo");
        assert!(registry.get(99).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_replaces_and_unregister() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(EchoService));
        registry.register(Arc::new(RefuseService(1)));
        assert_eq!(registry.get(1).unwrap().service_name(), "refuse");
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(1));
        assert!(!registry.unregister(1));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_handler_dispatch() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(EchoService));
        let handler = registry.get(1).unwrap();
        let resp = handler.handle(0, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(&resp[..], b"hello");
    }
}
