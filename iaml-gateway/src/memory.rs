use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use iaml_core::gateway::{
    CouponSource, GatewayError, PaymentConfirmation, PaymentIntent, PaymentIntentRequest,
    PaymentMethodToken, RegistrationGateway, WebhookKind,
};
use iaml_core::{CouponRecord, SessionRecord};
use tracing::info;

/// One webhook call recorded by [`MemoryGateway`].
#[derive(Debug, Clone, PartialEq)]
pub struct CrmSubmission {
    pub kind: WebhookKind,
    pub payload: serde_json::Value,
}

/// Offline gateway for dry runs and tests.
///
/// Sessions and coupons are served from maps. Payment intents and CRM
/// submissions are recorded instead of sent; card tokens registered with
/// [`MemoryGateway::decline`] are refused with the configured message.
#[derive(Default)]
pub struct MemoryGateway {
    sessions: HashMap<String, SessionRecord>,
    coupons: HashMap<String, CouponRecord>,
    declines: HashMap<String, String>,
    intents: Mutex<Vec<PaymentIntentRequest>>,
    submissions: Mutex<Vec<CrmSubmission>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions<I>(
        mut self,
        sessions: I,
    ) -> Self
    where
        I: IntoIterator<Item = SessionRecord>,
    {
        for session in sessions {
            self.sessions.insert(session.id.clone(), session);
        }
        self
    }

    pub fn with_coupon(
        mut self,
        coupon: CouponRecord,
    ) -> Self {
        self.coupons.insert(coupon.code.to_uppercase(), coupon);
        self
    }

    /// Refuse `payment_method` with `message`.
    pub fn decline(
        mut self,
        payment_method: &str,
        message: &str,
    ) -> Self {
        self.declines
            .insert(payment_method.to_string(), message.to_string());
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn payment_intents(&self) -> Vec<PaymentIntentRequest> {
        lock(&self.intents).clone()
    }

    pub fn submissions(&self) -> Vec<CrmSubmission> {
        lock(&self.submissions).clone()
    }
}

#[async_trait]
impl CouponSource for MemoryGateway {
    async fn find_coupon(
        &self,
        code: &str,
    ) -> Result<Option<CouponRecord>, GatewayError> {
        Ok(self.coupons.get(&code.trim().to_uppercase()).cloned())
    }
}

#[async_trait]
impl RegistrationGateway for MemoryGateway {
    async fn fetch_session(
        &self,
        id: &str,
    ) -> Result<SessionRecord, GatewayError> {
        self.sessions
            .get(id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut intents = lock(&self.intents);
        intents.push(request.clone());
        let id = format!("pi_mem_{}", intents.len());
        Ok(PaymentIntent {
            client_secret: format!("{id}_secret"),
            payment_intent_id: id,
        })
    }

    async fn confirm_payment(
        &self,
        intent: &PaymentIntent,
        method: &PaymentMethodToken,
    ) -> Result<PaymentConfirmation, GatewayError> {
        if let Some(message) = self.declines.get(&method.0) {
            return Err(GatewayError::Declined(message.clone()));
        }
        Ok(PaymentConfirmation {
            payment_intent_id: intent.payment_intent_id.clone(),
            status: "succeeded".to_string(),
        })
    }

    async fn submit_to_crm(
        &self,
        kind: WebhookKind,
        payload: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        info!(kind = kind.as_str(), "recording CRM submission");
        lock(&self.submissions).push(CrmSubmission {
            kind,
            payload: payload.clone(),
        });
        Ok(())
    }
}
