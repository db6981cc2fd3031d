use axum::Json;
use axum::extract::State;
use iaml_core::gateway::WebhookKind;
use serde_json::{Value, json};
use tracing::info;

use crate::config::require;
use crate::error::ProxyError;
use crate::{AppState, read_success};

/// Split `{type, data}` into the webhook it targets and the payload.
pub fn parse_envelope(body: &Value) -> Result<(WebhookKind, &Value), ProxyError> {
    let kind = body
        .get("type")
        .cloned()
        .and_then(|t| serde_json::from_value::<WebhookKind>(t).ok())
        .ok_or_else(|| {
            ProxyError::BadRequest("type must be 'registration' or 'contact'".to_string())
        })?;
    let data = body
        .get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| ProxyError::BadRequest("data is required".to_string()))?;
    Ok((kind, data))
}

pub async fn ghl_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    let (kind, data) = parse_envelope(&body)?;
    let url = match kind {
        WebhookKind::Registration => require(
            &state.config.ghl_registration_webhook,
            "GHL_REGISTRATION_WEBHOOK",
        )?,
        WebhookKind::Contact => {
            require(&state.config.ghl_contact_webhook, "GHL_CONTACT_WEBHOOK")?
        }
    };

    let response = state.http.post(url).json(data).send().await?;
    read_success(response).await?;

    info!(kind = kind.as_str(), "forwarded CRM webhook");
    Ok(Json(json!({ "success": true })))
}
