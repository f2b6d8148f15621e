use std::net::SocketAddr;
use std::sync::Arc;

use afcdisk_types::{RPCCode, Status};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::codec::{decode_request, encode_response};
use crate::error::NetError;
use crate::message::{read_frame, write_frame};
use crate::service::{ServiceHandler, ServiceRegistry};

/// TCP RPC server hosting the services in its registry.
///
/// Each connection is served by its own task. Requests on one connection are
/// answered in order.
pub struct Server {
    services: Arc<ServiceRegistry>,
    shutdown: Arc<Notify>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new() -> Self {
        Self::with_registry(ServiceRegistry::new())
    }

    pub fn with_registry(registry: ServiceRegistry) -> Self {
        Self {
            services: Arc::new(registry),
            shutdown: Arc::new(Notify::new()),
            local_addr: None,
        }
    }

    pub fn register_service(&self, service: Arc<dyn ServiceHandler>) {
        self.services.register(service);
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Bind `addr` and start accepting in a background task.
    ///
    /// Returns the bound address, which differs from `addr` when port 0 was
    /// requested.
    pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr, NetError> {
        if let Some(addr) = self.local_addr {
            tracing::warn!(%addr, "server already running, ignoring duplicate start");
            return Ok(addr);
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let services = Arc::clone(&self.services);
        let shutdown = Arc::clone(&self.shutdown);
        tracing::info!(%local_addr, "server starting");

        tokio::spawn(async move {
            Self::accept_loop(listener, services, shutdown).await;
            tracing::info!(%local_addr, "server accept loop exited");
        });

        Ok(local_addr)
    }

    pub fn stop(&mut self) {
        if self.local_addr.take().is_some() {
            tracing::info!("server stopping");
            self.shutdown.notify_waiters();
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn accept_loop(
        listener: TcpListener,
        services: Arc<ServiceRegistry>,
        shutdown: Arc<Notify>,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    tracing::info!("server shutdown signal received");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let services = Arc::clone(&services);
                            let shutdown = Arc::clone(&shutdown);
                            tasks.spawn(async move {
                                if let Err(e) = serve_connection(stream, peer, services, shutdown).await {
                                    tracing::debug!(%peer, "connection handler finished: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {}", e);
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }
            }
        }

        tasks.shutdown().await;
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serve requests on one connection until the peer disconnects or the
/// server shuts down.
pub async fn serve_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    services: Arc<ServiceRegistry>,
    shutdown: Arc<Notify>,
) -> Result<(), NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!(%peer, "new connection");

    loop {
        let payload = tokio::select! {
            biased;

            _ = shutdown.notified() => {
                tracing::debug!(%peer, "connection shutdown");
                return Err(NetError::ShuttingDown);
            }

            result = read_frame(&mut stream) => {
                match result {
                    Ok(payload) => payload,
                    Err(NetError::ConnectionClosed) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        };

        let envelope = match decode_request(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%peer, "dropping malformed request: {}", e);
                let status = Status::with_message(RPCCode::REQUEST_IS_EMPTY, e.to_string());
                write_frame(&mut stream, &encode_response(Err(status))).await?;
                continue;
            }
        };

        tracing::trace!(
            %peer,
            service_id = envelope.service_id,
            method_id = envelope.method_id,
            body_len = envelope.body.len(),
            "dispatching request"
        );

        let result = match services.get(envelope.service_id) {
            Some(handler) => handler.handle(envelope.method_id, envelope.body).await,
            None => {
                tracing::warn!(%peer, service_id = envelope.service_id, "service not found");
                Err(Status::with_message(
                    RPCCode::INVALID_SERVICE_ID,
                    NetError::ServiceNotFound(envelope.service_id).to_string(),
                ))
            }
        };

        if let Err(ref status) = result {
            tracing::debug!(
                %peer,
                service_id = envelope.service_id,
                method_id = envelope.method_id,
                status = %status,
                "handler returned error"
            );
        }

        write_frame(&mut stream, &encode_response(result)).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_response, encode_request};
    use async_trait::async_trait;
    use bytes::Bytes;

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

    fn test_peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_serve_connection_echo_then_close() {
        let (mut client, server_side) = tokio::io::duplex(4096);
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(EchoService));
        let task = tokio::spawn(serve_connection(
            server_side,
            test_peer(),
            Arc::new(registry),
            Arc::new(Notify::new()),
        ));

        write_frame(&mut client, &encode_request(1, 0, b"ping")).await.unwrap();
        let rsp = read_frame(&mut client).await.unwrap();
        assert_eq!(&decode_response(rsp).unwrap()[..], b"ping");

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_serve_connection_unknown_service() {
        let (mut client, server_side) = tokio::io::duplex(4096);
        let task = tokio::spawn(serve_connection(
            server_side,
            test_peer(),
            Arc::new(ServiceRegistry::new()),
            Arc::new(Notify::new()),
        ));

        write_frame(&mut client, &encode_request(99, 0, b"x")).await.unwrap();
        let rsp = read_frame(&mut client).await.unwrap();
        match decode_response(rsp) {
            Err(NetError::ServiceError(status)) => {
                assert_eq!(status.code(), RPCCode::INVALID_SERVICE_ID)
            }
            other => panic!("unexpected: {:?}", other),
        }
        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let mut server = Server::new();
        server.register_service(Arc::new(EchoService));
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        server.stop();
        assert!(server.local_addr().is_none());
    }
}
