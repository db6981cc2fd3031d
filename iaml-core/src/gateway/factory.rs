use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{info, warn};

use super::client::{GatewayError, RegistrationGateway};

/// Backend-agnostic gateway configuration.
///
/// `backend` names a registered factory, compared without case or
/// surrounding whitespace. `endpoint` is passed through to that factory.
///
/// | backend  | endpoint examples                       |
/// |----------|-----------------------------------------|
/// | `http`   | `https://www.iaml.com`, `http://127.0.0.1:8787` |
/// | `memory` | path to a sessions CSV, or empty        |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Identifier of a registered factory (e.g. `"http"`).
    pub backend: String,
    /// Opaque value forwarded to the factory's `create` method.
    pub endpoint: String,
    /// Publishable key used to confirm card payments client side.
    pub stripe_publishable_key: Option<String>,
}

impl GatewayConfig {
    /// The trimmed publishable key.
    ///
    /// # Errors
    /// [`GatewayError::Configuration`] when the key is missing or blank, or
    /// is not a publishable (`pk_`) key. Secret keys must stay on the proxy.
    pub fn publishable_key(&self) -> Result<&str, GatewayError> {
        let key = self
            .stripe_publishable_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "backend '{}' needs a Stripe publishable key",
                    self.backend.trim()
                ))
            })?;
        if !key.starts_with("pk_") {
            return Err(GatewayError::Configuration(
                "Stripe key must be a publishable key (pk_...)".to_string(),
            ));
        }
        Ok(key)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            endpoint: String::new(),
            stripe_publishable_key: None,
        }
    }
}

/// One implementation per gateway backend, registered with a
/// [`GatewayRegistry`] at startup.
#[async_trait]
pub trait GatewayFactory: Send + Sync {
    /// Unique, lowercase identifier for this backend.
    fn backend_name(&self) -> &'static str;

    /// True when gateways from this backend confirm card payments themselves,
    /// so the registry refuses a config without a publishable key.
    fn confirms_cards(&self) -> bool {
        false
    }

    async fn create(
        &self,
        config: &GatewayConfig,
    ) -> Result<Box<dyn RegistrationGateway>, GatewayError>;
}

/// Registry of [`GatewayFactory`] instances, keyed by backend name.
pub struct GatewayRegistry {
    factories: HashMap<&'static str, Box<dyn GatewayFactory>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory, replacing any with the same name.
    pub fn register(
        &mut self,
        factory: Box<dyn GatewayFactory>,
    ) {
        self.factories.insert(factory.backend_name(), factory);
    }

    /// Names of every registered backend, sorted alphabetically.
    pub fn available_backends(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Builds a gateway with the factory named by `config.backend`.
    ///
    /// # Errors
    /// * [`GatewayError::Configuration`] when no factory is registered for
    ///   the backend, or when a card-confirming backend has no usable
    ///   publishable key. Both are reported before the factory runs.
    /// * Any error the chosen factory itself returns.
    pub async fn create(
        &self,
        config: &GatewayConfig,
    ) -> Result<Box<dyn RegistrationGateway>, GatewayError> {
        let backend = config.backend.trim().to_ascii_lowercase();
        let factory = self.factories.get(backend.as_str()).ok_or_else(|| {
            warn!(backend = %config.backend, "no such gateway backend");
            GatewayError::Configuration(format!(
                "unknown backend '{}'; available: {:?}",
                config.backend,
                self.available_backends()
            ))
        })?;

        if factory.confirms_cards() {
            config.publishable_key()?;
        }

        info!(backend = factory.backend_name(), "creating registration gateway");
        factory.create(config).await
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
