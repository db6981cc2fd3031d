use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ProxyError;

pub const DEFAULT_AIRTABLE_API_URL: &str = "https://api.airtable.com";
pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";
pub const DEFAULT_ADDR: &str = "127.0.0.1:8787";

/// Secrets and upstream locations for the proxy.
///
/// Every secret is optional at startup. A route that needs a missing one
/// answers with a configuration error, so the remaining routes keep working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub airtable_base_id: Option<String>,
    pub airtable_programs_key: Option<String>,
    pub airtable_registration_key: Option<String>,
    pub airtable_quiz_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub ghl_registration_webhook: Option<String>,
    pub ghl_contact_webhook: Option<String>,
    pub airtable_api_url: String,
    pub stripe_api_url: String,
    pub addr: SocketAddr,
    /// Per-request limit on upstream calls. `None` leaves it to the platform.
    pub upstream_timeout: Option<Duration>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            airtable_base_id: None,
            airtable_programs_key: None,
            airtable_registration_key: None,
            airtable_quiz_key: None,
            stripe_secret_key: None,
            ghl_registration_webhook: None,
            ghl_contact_webhook: None,
            airtable_api_url: DEFAULT_AIRTABLE_API_URL.to_string(),
            stripe_api_url: DEFAULT_STRIPE_API_URL.to_string(),
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            upstream_timeout: None,
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ProxyError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProxyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let addr_text = var("PROXY_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_text
            .parse()
            .map_err(|_| ProxyError::InvalidSetting {
                variable: "PROXY_ADDR",
                value: addr_text.clone(),
            })?;

        let upstream_timeout = match var("UPSTREAM_TIMEOUT_SECS") {
            Some(text) => Some(
                text.parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or(ProxyError::InvalidSetting {
                        variable: "UPSTREAM_TIMEOUT_SECS",
                        value: text,
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            airtable_base_id: var("AIRTABLE_BASE_ID"),
            airtable_programs_key: var("AIRTABLE_PROGRAMS_API_KEY"),
            airtable_registration_key: var("AIRTABLE_REGISTRATION_API_KEY"),
            airtable_quiz_key: var("AIRTABLE_QUIZ_API_KEY"),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            ghl_registration_webhook: var("GHL_REGISTRATION_WEBHOOK"),
            ghl_contact_webhook: var("GHL_CONTACT_WEBHOOK"),
            airtable_api_url: var("AIRTABLE_API_URL")
                .unwrap_or_else(|| DEFAULT_AIRTABLE_API_URL.to_string()),
            stripe_api_url: var("STRIPE_API_URL")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_URL.to_string()),
            addr,
            upstream_timeout,
        })
    }
}

/// Unwrap a configured value or fail with the variable's name.
pub(crate) fn require<'a>(
    value: &'a Option<String>,
    variable: &'static str,
) -> Result<&'a str, ProxyError> {
    value
        .as_deref()
        .ok_or(ProxyError::Configuration(variable))
}
