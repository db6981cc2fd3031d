//! Gateway backends for the registration wizard.
//!
//! * [`HttpGateway`] talks to the site's `/api/*` proxy and to Stripe.
//! * [`MemoryGateway`] serves fixtures and records what would have been sent.

pub mod airtable;
pub mod factory;
pub mod http;
pub mod memory;

pub use factory::{HttpGatewayFactory, MemoryGatewayFactory};
pub use http::HttpGateway;
pub use memory::{CrmSubmission, MemoryGateway};

use iaml_core::gateway::GatewayRegistry;

/// A registry with every backend in this crate registered.
pub fn default_registry() -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    registry.register(Box::new(HttpGatewayFactory));
    registry.register(Box::new(MemoryGatewayFactory));
    registry
}
