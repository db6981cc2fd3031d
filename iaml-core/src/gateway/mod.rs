pub mod client;
pub mod factory;

pub use client::{
    CouponSource, GatewayError, PaymentConfirmation, PaymentIntent, PaymentIntentRequest,
    PaymentMethodToken, RegistrationGateway, WebhookKind,
};
pub use factory::{GatewayConfig, GatewayFactory, GatewayRegistry};
