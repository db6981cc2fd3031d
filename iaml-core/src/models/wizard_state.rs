//! Registration wizard state.
//!
//! One value per wizard instance. It is filled in step by step (or pre-filled
//! from URL parameters) and becomes read-only once the registration has been
//! accepted by the CRM.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AppliedCoupon, Attendance, Billing, Contact, Format, PaymentMethod, SessionRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Editing,
    /// Registration submitted; no further edits are accepted.
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub format: Option<Format>,
    /// Canonical program name.
    pub program: Option<String>,
    pub attendance: Attendance,

    pub session_id: Option<String>,
    pub session: Option<SessionRecord>,

    // Derived money values
    pub base_price: Decimal,
    pub coupon: Option<AppliedCoupon>,
    pub coupon_discount: Decimal,
    pub amount_due: Decimal,

    // Derived dates for the selected attendance
    pub derived_start: Option<NaiveDate>,
    pub derived_end: Option<NaiveDate>,

    pub contact: Contact,
    pub billing: Option<Billing>,
    pub payment_method: PaymentMethod,

    pub registration_code: Option<String>,
    pub phase: Phase,
}

impl WizardState {
    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    /// `"Full"` or the comma-joined block names.
    pub fn attendance_type(&self) -> String {
        self.attendance.attendance_type()
    }
}
