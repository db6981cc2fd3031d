//! Pre-recorded wizard answers for `iaml-register register`.
//!
//! ```toml
//! query = "format=in-person&program=employee-relations-law"
//! blocks = [1, 3]
//! session = "recDEN0325"
//! coupon = "EARLYBIRD"
//! payment_method = "stripe"
//! card = "pm_card_visa"
//!
//! [contact]
//! first_name = "Dana"
//! last_name = "Reyes"
//! email = "dana@example.com"
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use iaml_core::{Billing, Contact};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Answers {
    /// Landing-page query string, applied before any other answer.
    pub query: Option<String>,
    /// Date the registration is made on; defaults to the local date.
    pub today: Option<NaiveDate>,
    pub format: Option<String>,
    pub program: Option<String>,
    /// Block numbers; absent or empty means the full program.
    pub blocks: Option<Vec<u8>>,
    pub session: Option<String>,
    pub coupon: Option<String>,
    pub payment_method: Option<String>,
    /// Stripe payment method token, e.g. `pm_card_visa`.
    pub card: Option<String>,
    pub contact: ContactAnswers,
    pub billing: Option<BillingAnswers>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContactAnswers {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub title: String,
    pub company: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BillingAnswers {
    pub contact_name: String,
    pub email: String,
    pub address: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl From<ContactAnswers> for Contact {
    fn from(a: ContactAnswers) -> Self {
        Contact {
            first_name: a.first_name,
            last_name: a.last_name,
            email: a.email,
            phone: a.phone,
            title: a.title,
            company: a.company,
        }
    }
}

impl From<BillingAnswers> for Billing {
    fn from(a: BillingAnswers) -> Self {
        Billing {
            contact_name: a.contact_name,
            email: a.email,
            address: a.address,
            address2: a.address2,
            city: a.city,
            state: a.state,
            zip: a.zip,
        }
    }
}

impl Answers {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse answers")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read answers file '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid answers file '{}'", path.display()))
    }
}
