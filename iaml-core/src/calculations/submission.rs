//! Registration code and CRM payload assembly.
//!
//! # Registration code
//!
//! `{Format}-{Program}{Blocks}-{City}-{MMYY}`
//!
//! | Part    | Source |
//! |---------|--------|
//! | Format  | `IP`, `VI` or `OD` |
//! | Program | program letter (first letter of the name when unassigned) |
//! | Blocks  | `F` for full attendance, otherwise the selected block digits |
//! | City    | first three letters of the session city, or `ONL` |
//! | MMYY    | month and year of the derived start date, or of today |
//!
//! ```
//! use chrono::NaiveDate;
//! use iaml_core::calculations::submission::registration_code;
//! use iaml_core::{Attendance, Format, ProgramCatalog};
//!
//! let catalog = ProgramCatalog::standard();
//! let erl = catalog.by_slug("employee-relations-law").unwrap();
//! let start = NaiveDate::from_ymd_opt(2025, 3, 10);
//! let today = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
//!
//! let code = registration_code(Format::InPerson, erl, &Attendance::Full, Some("Denver"), start, today);
//! assert_eq!(code, "IP-AF-DEN-0325");
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::dates::to_iso_date;
use crate::models::{
    Attendance, Billing, Format, PaymentMethod, Program, ProgramCatalog, WizardState,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Please select a format")]
    MissingFormat,

    #[error("Please select a program")]
    MissingProgram,

    #[error("Please select a session")]
    MissingSession,

    #[error("Unknown program '{0}'")]
    UnknownProgram(String),
}

/// Builds a registration code from its parts.
pub fn registration_code(
    format: Format,
    program: &Program,
    attendance: &Attendance,
    city: Option<&str>,
    derived_start: Option<NaiveDate>,
    today: NaiveDate,
) -> String {
    let block_code = if attendance.is_full() {
        "F".to_string()
    } else {
        attendance
            .blocks()
            .iter()
            .map(|b| b.number().to_string())
            .collect::<String>()
    };

    let city_code: String = city
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphabetic())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let city_code = if city_code.is_empty() {
        "ONL".to_string()
    } else {
        city_code
    };

    let month_year = derived_start.unwrap_or(today).format("%m%y");

    format!(
        "{}-{}{}-{}-{}",
        format.code(),
        program.program_code(),
        block_code,
        city_code,
        month_year
    )
}

/// Builds the registration code for the current wizard state.
pub fn build_registration_code(
    state: &WizardState,
    catalog: &ProgramCatalog,
    today: NaiveDate,
) -> Result<String, SubmissionError> {
    let format = state.format.ok_or(SubmissionError::MissingFormat)?;
    let program = resolve_program(state, catalog)?;
    let city = state.session.as_ref().and_then(|s| s.city.as_deref());

    Ok(registration_code(
        format,
        program,
        &state.attendance,
        city,
        state.derived_start,
        today,
    ))
}

fn resolve_program<'a>(
    state: &WizardState,
    catalog: &'a ProgramCatalog,
) -> Result<&'a Program, SubmissionError> {
    let name = state
        .program
        .as_deref()
        .ok_or(SubmissionError::MissingProgram)?;
    catalog
        .by_name(name)
        .ok_or_else(|| SubmissionError::UnknownProgram(name.to_string()))
}

/// Body of the CRM registration webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub title: String,
    pub company: String,

    pub program: String,
    pub format: Format,
    pub session_id: String,
    pub location: String,
    /// `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`
    pub end_date: Option<String>,
    pub attendance_type: String,

    pub coupon_code: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub coupon_discount: Decimal,
    pub registration_code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_due: Decimal,
    pub payment_method: PaymentMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<Billing>,
}

impl RegistrationPayload {
    /// Assembles the payload from the wizard state.
    ///
    /// Billing details are only attached for invoice payments.
    pub fn build(
        state: &WizardState,
        catalog: &ProgramCatalog,
        today: NaiveDate,
    ) -> Result<Self, SubmissionError> {
        let format = state.format.ok_or(SubmissionError::MissingFormat)?;
        let program = resolve_program(state, catalog)?;
        let session = state
            .session
            .as_ref()
            .ok_or(SubmissionError::MissingSession)?;
        let registration_code = build_registration_code(state, catalog, today)?;

        let billing = match state.payment_method {
            PaymentMethod::Invoice => state.billing.clone(),
            PaymentMethod::Stripe => None,
        };

        Ok(Self {
            first_name: state.contact.first_name.trim().to_string(),
            last_name: state.contact.last_name.trim().to_string(),
            email: state.contact.email.trim().to_string(),
            phone: state.contact.phone.trim().to_string(),
            title: state.contact.title.trim().to_string(),
            company: state.contact.company.trim().to_string(),
            program: program.name.clone(),
            format,
            session_id: session.id.clone(),
            location: session.location(),
            start_date: state.derived_start.map(to_iso_date),
            end_date: state.derived_end.map(to_iso_date),
            attendance_type: state.attendance_type(),
            coupon_code: state.coupon.as_ref().map(|c| c.code.clone()),
            coupon_discount: state.coupon_discount,
            registration_code,
            amount_due: state.amount_due,
            payment_method: state.payment_method,
            billing,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{AppliedCoupon, BlockId, Contact, CouponOrigin, Discount, SessionRecord};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 11, 20)
    }

    fn catalog() -> ProgramCatalog {
        ProgramCatalog::standard()
    }

    fn denver_session() -> SessionRecord {
        SessionRecord {
            id: "recDEN0325".to_string(),
            program: Some("Certificate in Employee Relations Law".to_string()),
            format: Some(Format::InPerson),
            start_date: Some(date(2025, 3, 10)),
            end_date: Some(date(2025, 3, 14)),
            city: Some("Denver".to_string()),
            state: Some("CO".to_string()),
            venue: Some("Grand Hyatt".to_string()),
        }
    }

    fn state() -> WizardState {
        WizardState {
            format: Some(Format::InPerson),
            program: Some("Certificate in Employee Relations Law".to_string()),
            attendance: Attendance::Full,
            session_id: Some("recDEN0325".to_string()),
            session: Some(denver_session()),
            base_price: dec!(2375),
            amount_due: dec!(2375),
            derived_start: Some(date(2025, 3, 10)),
            derived_end: Some(date(2025, 3, 14)),
            contact: Contact {
                first_name: " Dana ".to_string(),
                last_name: "Reyes".to_string(),
                email: "dana@example.com".to_string(),
                ..Contact::default()
            },
            ..WizardState::default()
        }
    }

    // =========================================================================
    // registration codes
    // =========================================================================

    #[test]
    fn full_in_person_denver_code() {
        let code = build_registration_code(&state(), &catalog(), today()).unwrap();

        assert_eq!(code, "IP-AF-DEN-0325");
    }

    #[test]
    fn block_digits_are_concatenated_in_order() {
        let mut s = state();
        s.attendance = Attendance::from_blocks([BlockId(3), BlockId(1)]);

        let code = build_registration_code(&s, &catalog(), today()).unwrap();

        assert_eq!(code, "IP-A13-DEN-0325");
    }

    #[test]
    fn virtual_session_without_city_is_online() {
        let mut s = state();
        s.format = Some(Format::Virtual);
        if let Some(session) = s.session.as_mut() {
            session.city = None;
        }

        let code = build_registration_code(&s, &catalog(), today()).unwrap();

        assert_eq!(code, "VI-AF-ONL-0325");
    }

    #[test]
    fn missing_derived_start_uses_today() {
        let mut s = state();
        s.format = Some(Format::OnDemand);
        s.derived_start = None;
        s.session = None;

        let code = build_registration_code(&s, &catalog(), today()).unwrap();

        assert_eq!(code, "OD-AF-ONL-1124");
    }

    #[test]
    fn unlettered_program_uses_first_letter_of_name() {
        let mut s = state();
        s.program = Some("Certificate in HR Management".to_string());

        let code = build_registration_code(&s, &catalog(), today()).unwrap();

        assert_eq!(code, "IP-CF-DEN-0325");
    }

    #[test]
    fn city_code_skips_punctuation() {
        let catalog = catalog();
        let program = catalog.by_slug("employee-benefits-law").unwrap();

        let code = registration_code(
            Format::InPerson,
            program,
            &Attendance::from_blocks([BlockId(2)]),
            Some("St. Louis"),
            Some(date(2025, 10, 6)),
            today(),
        );

        assert_eq!(code, "IP-B2-STL-1025");
    }

    #[test]
    fn code_requires_format_and_program() {
        let mut s = state();
        s.format = None;
        assert_eq!(
            build_registration_code(&s, &catalog(), today()),
            Err(SubmissionError::MissingFormat)
        );

        let mut s = state();
        s.program = None;
        assert_eq!(
            build_registration_code(&s, &catalog(), today()),
            Err(SubmissionError::MissingProgram)
        );
    }

    // =========================================================================
    // payload
    // =========================================================================

    #[test]
    fn payload_carries_derived_dates_and_code() {
        let mut s = state();
        s.attendance = Attendance::from_blocks([BlockId(3)]);
        s.derived_start = Some(date(2025, 3, 14));
        s.derived_end = Some(date(2025, 3, 14));

        let payload = RegistrationPayload::build(&s, &catalog(), today()).unwrap();

        assert_eq!(payload.first_name, "Dana");
        assert_eq!(payload.start_date.as_deref(), Some("2025-03-14"));
        assert_eq!(payload.end_date.as_deref(), Some("2025-03-14"));
        assert_eq!(payload.attendance_type, "Block 3");
        assert_eq!(payload.registration_code, "IP-A3-DEN-0325");
        assert_eq!(payload.location, "Grand Hyatt, Denver, CO");
    }

    #[test]
    fn payload_includes_coupon() {
        let mut s = state();
        s.coupon = Some(AppliedCoupon {
            code: "PP500".to_string(),
            discount: Discount::Flat(dec!(500)),
            amount: dec!(500),
            origin: CouponOrigin::Static,
        });
        s.coupon_discount = dec!(500);
        s.amount_due = dec!(1875);

        let payload = RegistrationPayload::build(&s, &catalog(), today()).unwrap();

        assert_eq!(payload.coupon_code.as_deref(), Some("PP500"));
        assert_eq!(payload.coupon_discount, dec!(500));
        assert_eq!(payload.amount_due, dec!(1875));
    }

    #[test]
    fn billing_is_only_sent_for_invoices() {
        let mut s = state();
        s.billing = Some(Billing {
            contact_name: "AP".to_string(),
            email: "ap@example.com".to_string(),
            address: "1 Main St".to_string(),
            city: "Denver".to_string(),
            state: "CO".to_string(),
            zip: "80202".to_string(),
            ..Billing::default()
        });

        let card = RegistrationPayload::build(&s, &catalog(), today()).unwrap();
        assert_eq!(card.billing, None);

        s.payment_method = PaymentMethod::Invoice;
        let invoice = RegistrationPayload::build(&s, &catalog(), today()).unwrap();
        assert_eq!(invoice.billing.map(|b| b.zip), Some("80202".to_string()));
    }

    #[test]
    fn payload_serializes_camel_case_with_numeric_amounts() {
        let payload = RegistrationPayload::build(&state(), &catalog(), today()).unwrap();

        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["registrationCode"], "IP-AF-DEN-0325");
        assert_eq!(json["amountDue"], serde_json::json!(2375.0));
        assert_eq!(json["paymentMethod"], "stripe");
        assert_eq!(json["format"], "In-Person");
        assert!(json.get("billing").is_none());
    }

    #[test]
    fn payload_requires_session() {
        let mut s = state();
        s.session = None;

        assert_eq!(
            RegistrationPayload::build(&s, &catalog(), today()),
            Err(SubmissionError::MissingSession)
        );
    }
}
