use std::time::Duration;

use async_trait::async_trait;
use iaml_core::gateway::{
    CouponSource, GatewayError, PaymentConfirmation, PaymentIntent, PaymentIntentRequest,
    PaymentMethodToken, RegistrationGateway, WebhookKind,
};
use iaml_core::{CouponRecord, SessionRecord};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::airtable::{
    AirtableList, AirtableRecord, coupon_from_record, formula_literal, session_from_record,
};

pub const DEFAULT_STRIPE_URL: &str = "https://api.stripe.com";

// ============================================================================
// Helper
// ============================================================================

fn transport_err(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

fn decode_err(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Decode(e.to_string())
}

// ============================================================================
// Stripe response types
// ============================================================================

#[derive(Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

// ============================================================================
// HttpGateway
// ============================================================================

/// Talks to the site's `/api/*` proxy endpoints and, for card confirmation,
/// directly to Stripe with the publishable key.
pub struct HttpGateway {
    http: reqwest::Client,
    endpoint: String,
    stripe_url: String,
    publishable_key: Option<String>,
    timeout: Option<Duration>,
}

impl HttpGateway {
    pub fn new(
        endpoint: &str,
        publishable_key: Option<String>,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            stripe_url: DEFAULT_STRIPE_URL.to_string(),
            publishable_key,
            timeout: None,
        })
    }

    /// Gives up on any single request after `timeout`. Unset by default, so
    /// requests wait as long as the platform allows.
    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Points card confirmation at another Stripe-compatible host.
    pub fn with_stripe_url(
        mut self,
        url: &str,
    ) -> Self {
        self.stripe_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // --------------------------------------------------------------------
    // Private HTTP helpers
    // --------------------------------------------------------------------

    fn request(
        &self,
        method: reqwest::Method,
        url: String,
    ) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match self.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    fn api(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        self.request(method, format!("{}/api{}", self.endpoint, path))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let resp = req.send().await.map_err(transport_err)?;
        Self::check(resp).await?.json().await.map_err(decode_err)
    }

    async fn send_ok(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<(), GatewayError> {
        let resp = req.send().await.map_err(transport_err)?;
        Self::check(resp).await.map(|_| ())
    }
}

#[async_trait]
impl CouponSource for HttpGateway {
    /// `GET /api/airtable-coupons?table=Coupons&filterByFormula=LOWER({Code})='..'&maxRecords=1`
    async fn find_coupon(
        &self,
        code: &str,
    ) -> Result<Option<CouponRecord>, GatewayError> {
        let formula = format!(
            "LOWER({{Code}})='{}'",
            formula_literal(&code.trim().to_lowercase())
        );
        let req = self
            .api(reqwest::Method::GET, "/airtable-coupons")
            .query(&[
                ("table", "Coupons"),
                ("filterByFormula", formula.as_str()),
                ("maxRecords", "1"),
            ]);

        let list: AirtableList = self.send_json(req).await?;
        debug!(code, matches = list.records.len(), "coupon lookup");
        list.records
            .first()
            .map(coupon_from_record)
            .transpose()
    }
}

#[async_trait]
impl RegistrationGateway for HttpGateway {
    /// `GET /api/airtable-programs?table=Sessions&recordId=..`
    async fn fetch_session(
        &self,
        id: &str,
    ) -> Result<SessionRecord, GatewayError> {
        let req = self
            .api(reqwest::Method::GET, "/airtable-programs")
            .query(&[("table", "Sessions"), ("recordId", id)]);
        let record: AirtableRecord = self.send_json(req).await?;
        session_from_record(&record)
    }

    /// `POST /api/create-payment-intent`
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let req = self
            .api(reqwest::Method::POST, "/create-payment-intent")
            .json(request);
        self.send_json(req).await
    }

    /// `POST {stripe}/v1/payment_intents/{id}/confirm`, authenticated with the
    /// publishable key and the intent's client secret.
    async fn confirm_payment(
        &self,
        intent: &PaymentIntent,
        method: &PaymentMethodToken,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let key = self.publishable_key.as_deref().ok_or_else(|| {
            GatewayError::Configuration("Stripe publishable key is not set".to_string())
        })?;

        let resp = self
            .request(
                reqwest::Method::POST,
                format!(
                    "{}/v1/payment_intents/{}/confirm",
                    self.stripe_url, intent.payment_intent_id
                ),
            )
            .basic_auth(key, None::<&str>)
            .form(&[
                ("client_secret", intent.client_secret.as_str()),
                ("payment_method", method.0.as_str()),
            ])
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message);
            warn!(status = status.as_u16(), "card confirmation refused");
            return Err(match message {
                Some(message) => GatewayError::Declined(message),
                None => GatewayError::Upstream {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let confirmed: StripeIntent = resp.json().await.map_err(decode_err)?;
        Ok(PaymentConfirmation {
            payment_intent_id: confirmed.id,
            status: confirmed.status,
        })
    }

    /// `POST /api/ghl-webhook` with `{type, data}`.
    async fn submit_to_crm(
        &self,
        kind: WebhookKind,
        payload: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "type": kind.as_str(),
            "data": payload,
        });
        let req = self
            .api(reqwest::Method::POST, "/ghl-webhook")
            .json(&body);
        self.send_ok(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let gw = HttpGateway::new("https://www.iaml.com/", None).unwrap();
        assert_eq!(gw.endpoint(), "https://www.iaml.com");
    }

    #[tokio::test]
    async fn confirm_without_publishable_key_is_configuration_error() {
        let gw = HttpGateway::new("http://127.0.0.1:1", None).unwrap();
        let intent = PaymentIntent {
            client_secret: "pi_1_secret_2".to_string(),
            payment_intent_id: "pi_1".to_string(),
        };

        let result = gw
            .confirm_payment(&intent, &PaymentMethodToken("pm_card_visa".to_string()))
            .await;

        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let gw = HttpGateway::new("http://127.0.0.1:1", None).unwrap();

        let result = gw.fetch_session("recX").await;

        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }
}
