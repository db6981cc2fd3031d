use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CouponRecord, SessionRecord};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Record not found")]
    NotFound,

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The payment processor refused the charge. The message is the
    /// processor's own and is shown to the registrant as is.
    #[error("{0}")]
    Declined(String),
}

/// Body of a payment-intent request. `amount_cents` is in US cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    #[serde(rename = "amount")]
    pub amount_cents: i64,
    pub email: String,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// Card payment method reference, e.g. `pm_card_visa`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_intent_id: String,
    pub status: String,
}

/// Which CRM webhook a submission goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    Registration,
    Contact,
}

impl WebhookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Contact => "contact",
        }
    }
}

/// Remote coupon table.
#[async_trait]
pub trait CouponSource: Send + Sync {
    /// Case-insensitive exact lookup by code.
    async fn find_coupon(
        &self,
        code: &str,
    ) -> Result<Option<CouponRecord>, GatewayError>;
}

/// Everything the wizard needs from the outside world.
#[async_trait]
pub trait RegistrationGateway: CouponSource {
    // Sessions
    async fn fetch_session(
        &self,
        id: &str,
    ) -> Result<SessionRecord, GatewayError>;

    // Card payments
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn confirm_payment(
        &self,
        intent: &PaymentIntent,
        method: &PaymentMethodToken,
    ) -> Result<PaymentConfirmation, GatewayError>;

    // CRM
    async fn submit_to_crm(
        &self,
        kind: WebhookKind,
        payload: &serde_json::Value,
    ) -> Result<(), GatewayError>;
}
