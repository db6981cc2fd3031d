//! Pass-through routes for the Airtable REST API.
//!
//! Each `/api/airtable-*` endpoint owns a default table and an API key. The
//! caller may pick another table with `?table=` and address a single record
//! with `?recordId=`. Only Airtable's own list parameters are forwarded.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, header};
use axum::response::Response;
use axum::routing::{MethodRouter, get};
use tracing::debug;
use url::Url;

use crate::config::{ProxyConfig, require};
use crate::error::ProxyError;
use crate::{AppState, relay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirtableEndpoint {
    Programs,
    Quiz,
    Coupons,
    Companies,
    Registrations,
}

impl AirtableEndpoint {
    pub const ALL: [Self; 5] = [
        Self::Programs,
        Self::Quiz,
        Self::Coupons,
        Self::Companies,
        Self::Registrations,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::Programs => "/api/airtable-programs",
            Self::Quiz => "/api/airtable-quiz",
            Self::Coupons => "/api/airtable-coupons",
            Self::Companies => "/api/airtable-companies",
            Self::Registrations => "/api/airtable-registrations",
        }
    }

    pub fn default_table(self) -> &'static str {
        match self {
            Self::Programs => "Programs",
            Self::Quiz => "Quiz",
            Self::Coupons => "Coupons",
            Self::Companies => "Companies",
            Self::Registrations => "Registrations",
        }
    }

    fn api_key(
        self,
        config: &ProxyConfig,
    ) -> Result<&str, ProxyError> {
        match self {
            Self::Programs | Self::Coupons => {
                require(&config.airtable_programs_key, "AIRTABLE_PROGRAMS_API_KEY")
            }
            Self::Companies | Self::Registrations => require(
                &config.airtable_registration_key,
                "AIRTABLE_REGISTRATION_API_KEY",
            ),
            Self::Quiz => require(&config.airtable_quiz_key, "AIRTABLE_QUIZ_API_KEY"),
        }
    }
}

pub fn routes() -> Router<AppState> {
    AirtableEndpoint::ALL
        .into_iter()
        .fold(Router::new(), |router, endpoint| {
            router.route(endpoint.path(), endpoint_route(endpoint))
        })
}

fn endpoint_route(endpoint: AirtableEndpoint) -> MethodRouter<AppState> {
    let handler = move |State(state): State<AppState>,
                        method: Method,
                        Query(params): Query<Vec<(String, String)>>,
                        body: Bytes| async move {
        forward(&state, endpoint, method, params, body).await
    };
    get(handler.clone()).post(handler.clone()).patch(handler)
}

/// Query parameters Airtable understands on list and record calls.
pub fn is_forwarded(name: &str) -> bool {
    match name {
        "filterByFormula" | "maxRecords" | "view" | "pageSize" | "offset" => true,
        _ => is_sort_parameter(name),
    }
}

/// `sort[0][field]`, `sort[12][direction]` and so on.
fn is_sort_parameter(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("sort[") else {
        return false;
    };
    let Some((index, key)) = rest.split_once("][") else {
        return false;
    };
    !index.is_empty()
        && index.chars().all(|c| c.is_ascii_digit())
        && matches!(key, "field]" | "direction]")
}

/// Record URL for a table, with each path segment percent-encoded.
pub fn record_url(
    api_url: &str,
    base_id: &str,
    table: &str,
    record_id: Option<&str>,
) -> Result<Url, ProxyError> {
    let mut url = Url::parse(api_url).map_err(|_| ProxyError::InvalidSetting {
        variable: "AIRTABLE_API_URL",
        value: api_url.to_string(),
    })?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| ProxyError::InvalidSetting {
            variable: "AIRTABLE_API_URL",
            value: api_url.to_string(),
        })?;
        segments.pop_if_empty().extend(["v0", base_id, table]);
        if let Some(id) = record_id {
            segments.push(id);
        }
    }
    Ok(url)
}

async fn forward(
    state: &AppState,
    endpoint: AirtableEndpoint,
    method: Method,
    params: Vec<(String, String)>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let config = &state.config;
    let base_id = require(&config.airtable_base_id, "AIRTABLE_BASE_ID")?;
    let key = endpoint.api_key(config)?;

    let mut table = None;
    let mut record_id = None;
    let mut forwarded = Vec::new();
    for (name, value) in params {
        match name.as_str() {
            "table" => table = Some(value),
            "recordId" => record_id = Some(value),
            other if is_forwarded(other) => forwarded.push((name, value)),
            _ => {}
        }
    }

    if method == Method::PATCH && record_id.is_none() {
        return Err(ProxyError::BadRequest(
            "recordId is required for updates".to_string(),
        ));
    }

    let table = table.as_deref().unwrap_or(endpoint.default_table());
    let url = record_url(&config.airtable_api_url, base_id, table, record_id.as_deref())?;
    debug!(%method, table, record = record_id.as_deref(), "forwarding to Airtable");

    let mut request = state
        .http
        .request(method.clone(), url)
        .bearer_auth(key)
        .query(&forwarded);
    if method != Method::GET {
        request = request
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
    }

    relay(request.send().await?).await
}
