//! Services by name, and the backends they scan with.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderValue, Uri};
use micro_icap::connection::IcapClient;
use micro_icap::protocol::Method;
use tracing::{error, info};

use crate::config::{AppConfig, BackendConfig, ConfigError, ServiceConfig};
use crate::scanner::{EchoScanner, Scanner, SignatureScanner};

/// Where a service sends its bodies.
#[derive(Clone)]
pub enum Backend {
    /// Scanned in process through the [`Scanner`] capability
    Local(Arc<dyn Scanner>),
    /// Forwarded to another ICAP service, which answers with a full ICAP response
    Remote(Arc<IcapClient>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Local(_) => f.write_str("Local"),
            Backend::Remote(client) => f.debug_tuple("Remote").field(client.endpoint()).finish(),
        }
    }
}

impl Backend {
    pub fn from_config(service: &str, config: &BackendConfig) -> Result<Self, ConfigError> {
        let backend = match config {
            BackendConfig::Echo => Backend::Local(Arc::new(EchoScanner::new())),
            BackendConfig::Signature { signatures } => Backend::Local(Arc::new(SignatureScanner::new(signatures.clone()))),
            BackendConfig::RemoteIcap { endpoint, timeout_ms } => {
                let endpoint = endpoint.parse::<Uri>().map_err(|e| ConfigError::invalid_service(service, e))?;
                let client = IcapClient::new(endpoint, Duration::from_millis(*timeout_ms))
                    .map_err(|e| ConfigError::invalid_service(service, e))?;
                Backend::Remote(Arc::new(client))
            }
        };
        Ok(backend)
    }
}

/// A configured service, ready to serve requests.
#[derive(Debug)]
pub struct Service {
    config: ServiceConfig,
    istag: HeaderValue,
    caption: HeaderValue,
    backend: Backend,
    shadow: Option<Backend>,
}

impl Service {
    pub fn new(config: ServiceConfig, backend: Backend, shadow: Option<Backend>) -> Result<Self, ConfigError> {
        let istag = istag_of(&config);
        let caption = HeaderValue::from_str(config.caption()).map_err(|e| ConfigError::invalid_service(&config.name, e))?;
        Ok(Self { config, istag, caption, backend, shadow })
    }

    pub fn from_config(config: ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let backend = Backend::from_config(&config.name, &config.backend)?;
        let shadow = config.shadow.as_ref().map(|shadow| Backend::from_config(&config.name, shadow)).transpose()?;
        Self::new(config, backend, shadow)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[inline]
    pub fn istag(&self) -> &HeaderValue {
        &self.istag
    }

    #[inline]
    pub fn caption(&self) -> &HeaderValue {
        &self.caption
    }

    #[inline]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    #[inline]
    pub fn shadow(&self) -> Option<&Backend> {
        self.shadow.as_ref()
    }

    /// The methods the service answers: OPTIONS always, REQMOD and RESPMOD as configured.
    pub fn methods(&self) -> Vec<Method> {
        let mut methods = Vec::with_capacity(2);
        if self.config.req_mode {
            methods.push(Method::Reqmod);
        }
        if self.config.resp_mode {
            methods.push(Method::Respmod);
        }
        methods
    }

    pub fn allows(&self, method: Method) -> bool {
        match method {
            Method::Options => true,
            Method::Reqmod => self.config.req_mode,
            Method::Respmod => self.config.resp_mode,
        }
    }
}

/// The ISTag changes whenever the service's configuration does.
fn istag_of(config: &ServiceConfig) -> HeaderValue {
    let mut hasher = DefaultHasher::new();
    match serde_json::to_string(config) {
        Ok(json) => json.hash(&mut hasher),
        Err(_) => config.name.hash(&mut hasher),
    }
    HeaderValue::from_str(&format!("\"{:016x}\"", hasher.finish())).unwrap_or_else(|_| HeaderValue::from_static("\"0\""))
}

/// Maps ICAP service paths to services.
pub struct ServiceRegistry {
    router: matchit::Router<Arc<Service>>,
    names: Vec<String>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry").field("services", &self.names).finish()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self { router: matchit::Router::new(), names: Vec::new() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut registry = Self::new();
        for service in &config.services {
            registry.insert(Service::from_config(service.clone())?)?;
        }
        Ok(registry)
    }

    /// Mounts `service` at `/<name>`.
    pub fn insert(&mut self, service: Service) -> Result<(), ConfigError> {
        let name = service.name().to_string();
        self.router.insert(format!("/{name}"), Arc::new(service)).map_err(|e| {
            error!(service = %name, cause = %e, "register service error");
            ConfigError::invalid_service(&name, e)
        })?;
        info!(service = %name, "registered service");
        self.names.push(name);
        Ok(())
    }

    pub fn resolve(&self, path: &str) -> Option<Arc<Service>> {
        self.router.at(path).ok().map(|matched| Arc::clone(matched.value))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> ServiceConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_resolve() {
        let app: AppConfig = serde_json::from_value(json!({
            "services": [
                { "name": "echo", "resp_mode": true },
                { "name": "av.scan", "req_mode": true, "backend": { "type": "signature", "signatures": [] } }
            ]
        }))
        .unwrap();
        let registry = ServiceRegistry::from_config(&app).unwrap();

        assert_eq!(registry.resolve("/echo").unwrap().name(), "echo");
        assert_eq!(registry.resolve("/av.scan").unwrap().name(), "av.scan");
        assert!(registry.resolve("/missing").is_none());
        assert!(registry.resolve("/echo/deeper").is_none());
        assert_eq!(registry.names(), ["echo", "av.scan"]);
    }

    #[test]
    fn test_allows() {
        let service = Service::from_config(config(json!({ "name": "echo", "resp_mode": true }))).unwrap();
        assert!(service.allows(Method::Options));
        assert!(service.allows(Method::Respmod));
        assert!(!service.allows(Method::Reqmod));
        assert_eq!(service.methods(), vec![Method::Respmod]);
    }

    #[test]
    fn test_istag_follows_config() {
        let a = Service::from_config(config(json!({ "name": "echo", "resp_mode": true }))).unwrap();
        let b = Service::from_config(config(json!({ "name": "echo", "resp_mode": true }))).unwrap();
        let c = Service::from_config(config(json!({ "name": "echo", "resp_mode": true, "fail_open": true }))).unwrap();

        assert_eq!(a.istag(), b.istag());
        assert_ne!(a.istag(), c.istag());
        assert_eq!(a.istag().len(), 18);
    }

    #[test]
    fn test_remote_endpoint_must_be_icap() {
        let result = Service::from_config(config(json!({
            "name": "remote",
            "req_mode": true,
            "backend": { "type": "remote_icap", "endpoint": "http://localhost/scan" }
        })));
        assert!(matches!(result, Err(ConfigError::InvalidService { .. })));
    }
}
