//! HTTP proxy that keeps Airtable, Stripe and CRM secrets off the browser.

pub mod airtable;
pub mod config;
pub mod error;
pub mod payments;
pub mod webhook;

use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::ProxyConfig;
pub use error::ProxyError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.upstream_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/create-payment-intent", post(payments::create_payment_intent))
        .route("/api/ghl-webhook", post(webhook::ghl_webhook))
        .merge(airtable::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Body of a 2xx upstream reply; anything else becomes [`ProxyError::Upstream`].
pub(crate) async fn read_success(response: reqwest::Response) -> Result<String, ProxyError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(ProxyError::Upstream { status, body })
    }
}

/// Hand an upstream JSON reply back to the caller unchanged.
pub(crate) async fn relay(response: reqwest::Response) -> Result<Response, ProxyError> {
    let body = read_success(response).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}
