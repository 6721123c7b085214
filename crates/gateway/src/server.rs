use std::io;
use std::sync::Arc;

use micro_icap::connection::IcapConnection;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::pipeline::Gateway;
use crate::registry::ServiceRegistry;

#[derive(Debug)]
pub struct ServerBuilder {
    address: Option<String>,
    registry: Option<ServiceRegistry>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, registry: None }
    }

    pub fn address<A: Into<String>>(mut self, address: A) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?;
        let registry = self.registry.ok_or(ServerBuildError::MissingRegistry)?;
        Ok(Server { address, gateway: Arc::new(Gateway::new(Arc::new(registry))) })
    }
}

#[derive(Debug)]
pub struct Server {
    address: String,
    gateway: Arc<Gateway>,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,
    #[error("service registry must be set")]
    MissingRegistry,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind {address} error: {source}")]
    Bind { address: String, source: io::Error },
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Binds the configured address and serves until the process ends.
    pub async fn start(self) -> Result<(), ServerError> {
        let tcp_listener = TcpListener::bind(self.address.as_str())
            .await
            .map_err(|source| ServerError::Bind { address: self.address.clone(), source })?;

        self.serve(tcp_listener).await;
        Ok(())
    }

    /// Accepts connections from `tcp_listener`, one task per connection.
    pub async fn serve(self, tcp_listener: TcpListener) {
        match tcp_listener.local_addr() {
            Ok(local_addr) => info!(%local_addr, services = ?self.gateway.registry().names(), "start listening"),
            Err(e) => warn!(cause = %e, "unknown local address"),
        }

        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let gateway = Arc::clone(&self.gateway);

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = IcapConnection::new(reader, writer);
                match connection.process(gateway).await {
                    Ok(()) => {
                        info!(%remote_addr, "finished process, connection shutdown");
                    }
                    Err(e) => {
                        error!(%remote_addr, cause = %e, "service has error, connection shutdown");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_parts() {
        assert!(matches!(Server::builder().registry(ServiceRegistry::new()).build(), Err(ServerBuildError::MissingAddress)));
        assert!(matches!(Server::builder().address("127.0.0.1:1344").build(), Err(ServerBuildError::MissingRegistry)));

        let server = Server::builder().address("127.0.0.1:1344").registry(ServiceRegistry::new()).build().unwrap();
        assert_eq!(server.address(), "127.0.0.1:1344");
    }

    #[tokio::test]
    async fn test_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let server = Server::builder().address(address).registry(ServiceRegistry::new()).build().unwrap();
        assert!(matches!(server.start().await, Err(ServerError::Bind { .. })));
    }
}
