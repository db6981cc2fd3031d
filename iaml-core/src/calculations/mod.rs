//! Derivation logic for the registration wizard.
//!
//! Each module is a pure function of its inputs, except coupon validation
//! which may consult a remote coupon table through [`crate::gateway::CouponSource`].

pub mod common;
pub mod coupons;
pub mod dates;
pub mod pricing;
pub mod steps;
pub mod submission;

pub use coupons::{CouponContext, CouponRejection, CouponValidator, normalize_code};
pub use dates::{DateError, DateRange, compute_derived_dates, parse_local_date, to_iso_date};
pub use pricing::{DiscountedPrice, PriceQuote, PricingError, apply_discount, compute_amount_due};
pub use steps::{Prefill, Step, StepDiff, determine_steps};
pub use submission::{
    RegistrationPayload, SubmissionError, build_registration_code, registration_code,
};
