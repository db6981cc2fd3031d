//! Field validation for the contact and payment steps.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{Billing, Contact, PaymentMethod};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// A single inline validation message, tied to the form field it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

fn require(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    label: &str,
    value: &str,
) {
    if value.trim().is_empty() {
        errors.push(FieldError {
            field,
            message: format!("{label} is required"),
        });
    }
}

fn require_email(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: &str,
) {
    if value.trim().is_empty() {
        require(errors, field, "Email", value);
    } else if !is_valid_email(value) {
        errors.push(FieldError {
            field,
            message: "Please enter a valid email address".to_string(),
        });
    }
}

/// Checks the contact step. Returns every problem at once.
pub fn validate_contact(contact: &Contact) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "firstName", "First name", &contact.first_name);
    require(&mut errors, "lastName", "Last name", &contact.last_name);
    require_email(&mut errors, "email", &contact.email);
    errors
}

/// Checks the payment step. Billing details are only required for invoices.
pub fn validate_payment(
    method: PaymentMethod,
    billing: Option<&Billing>,
) -> Vec<FieldError> {
    if method != PaymentMethod::Invoice {
        return Vec::new();
    }

    let Some(billing) = billing else {
        return vec![FieldError {
            field: "billing",
            message: "Billing details are required for invoice payment".to_string(),
        }];
    };

    let mut errors = Vec::new();
    require(&mut errors, "billingContactName", "Billing contact", &billing.contact_name);
    require_email(&mut errors, "billingEmail", &billing.email);
    require(&mut errors, "billingAddress", "Billing address", &billing.address);
    require(&mut errors, "billingCity", "City", &billing.city);
    require(&mut errors, "billingState", "State", &billing.state);
    require(&mut errors, "billingZip", "ZIP code", &billing.zip);
    errors
}
