use std::path::Path;

use async_trait::async_trait;
use iaml_core::gateway::{GatewayConfig, GatewayError, GatewayFactory, RegistrationGateway};
use iaml_data::SessionLoader;
use tracing::info;

use crate::http::HttpGateway;
use crate::memory::MemoryGateway;

/// [`GatewayFactory`] for the live site.
///
/// Register this with a [`iaml_core::gateway::GatewayRegistry`] to make the
/// `"http"` backend available:
///
/// ```rust,no_run
/// use iaml_core::gateway::GatewayRegistry;
/// use iaml_gateway::HttpGatewayFactory;
///
/// let mut registry = GatewayRegistry::new();
/// registry.register(Box::new(HttpGatewayFactory));
/// ```
pub struct HttpGatewayFactory;

#[async_trait]
impl GatewayFactory for HttpGatewayFactory {
    fn backend_name(&self) -> &'static str {
        "http"
    }

    fn confirms_cards(&self) -> bool {
        true
    }

    /// `config.endpoint` is the site origin serving the `/api/*` routes,
    /// e.g. `https://www.iaml.com`.
    async fn create(
        &self,
        config: &GatewayConfig,
    ) -> Result<Box<dyn RegistrationGateway>, GatewayError> {
        let endpoint = config.endpoint.trim();
        url::Url::parse(endpoint).map_err(|e| {
            GatewayError::Configuration(format!("invalid endpoint '{endpoint}': {e}"))
        })?;

        let key = config.publishable_key()?;

        let gateway = HttpGateway::new(endpoint, Some(key.to_string()))?;
        info!(endpoint, "using HTTP gateway");
        Ok(Box::new(gateway))
    }
}

/// [`GatewayFactory`] for offline runs.
///
/// An empty `config.endpoint` gives an empty gateway; otherwise it is the
/// path of a sessions CSV to serve.
pub struct MemoryGatewayFactory;

#[async_trait]
impl GatewayFactory for MemoryGatewayFactory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        config: &GatewayConfig,
    ) -> Result<Box<dyn RegistrationGateway>, GatewayError> {
        let path = config.endpoint.trim();
        if path.is_empty() {
            return Ok(Box::new(MemoryGateway::new()));
        }

        let sessions = SessionLoader::from_path(Path::new(path))
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        let gateway = MemoryGateway::new().with_sessions(sessions);
        info!(path, sessions = gateway.session_count(), "using in-memory gateway");
        Ok(Box::new(gateway))
    }
}
