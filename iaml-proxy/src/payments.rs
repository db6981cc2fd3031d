use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::require;
use crate::error::ProxyError;
use crate::{AppState, read_success};

/// Body of `POST /api/create-payment-intent`. Kept loose so a bad amount
/// becomes a 400 with a message instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateIntentBody {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentReply {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: String,
}

/// Amount in cents; must be a positive whole number.
pub fn parse_amount(value: Option<&Value>) -> Result<u64, ProxyError> {
    let invalid = || ProxyError::BadRequest("amount must be a positive number of cents".to_string());
    let amount = match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        _ => None,
    };
    amount.filter(|a| *a > 0).ok_or_else(invalid)
}

/// Stripe's bracketed form encoding for the intent.
pub fn intent_form(
    amount: u64,
    body: &CreateIntentBody,
) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), amount.to_string()),
        ("currency".to_string(), "usd".to_string()),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
    ];
    if let Some(email) = body.email.as_deref().filter(|e| !e.trim().is_empty()) {
        form.push(("receipt_email".to_string(), email.to_string()));
    }
    if let Some(description) = body.description.as_deref().filter(|d| !d.is_empty()) {
        form.push(("description".to_string(), description.to_string()));
    }
    for (key, value) in &body.metadata {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => continue,
            other => other.to_string(),
        };
        form.push((format!("metadata[{key}]"), text));
    }
    form
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(body): Json<CreateIntentBody>,
) -> Result<Json<CreateIntentReply>, ProxyError> {
    let amount = parse_amount(body.amount.as_ref())?;
    let secret = require(&state.config.stripe_secret_key, "STRIPE_SECRET_KEY")?;

    let url = format!(
        "{}/v1/payment_intents",
        state.config.stripe_api_url.trim_end_matches('/')
    );
    let response = state
        .http
        .post(url)
        .bearer_auth(secret)
        .form(&intent_form(amount, &body))
        .send()
        .await?;
    let text = read_success(response).await?;
    let intent: StripeIntent = serde_json::from_str(&text)
        .map_err(|e| ProxyError::Transport(format!("unexpected Stripe reply: {e}")))?;

    info!(payment_intent = %intent.id, amount, "created payment intent");
    Ok(Json(CreateIntentReply {
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
    }))
}
