//! Coupon validation.
//!
//! Codes are checked against the static rule table first and only then
//! looked up remotely. Every rejection carries the message shown inline next
//! to the coupon field; none of them are fatal.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::calculations::common::{clamp_discount, round_whole_dollars};
use crate::gateway::CouponSource;
use crate::models::{
    AppliedCoupon, Attendance, CouponOrigin, CouponRecord, CouponRule, Discount, Program,
};

/// Why a coupon code was not applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("Please enter a coupon code")]
    Empty,

    #[error("Select a program before applying a coupon")]
    NoProgram,

    #[error("Invalid coupon code")]
    Invalid,

    #[error("Coupon {code} is not valid for {program}")]
    NotEligibleForProgram { code: String, program: String },

    #[error("Coupon {code} is only valid for full program registrations")]
    FullProgramOnly { code: String },

    #[error("Coupon {code} is only valid for individual block registrations")]
    BlocksOnly { code: String },

    #[error("Coupon {code} is no longer active")]
    Inactive { code: String },

    #[error("Coupon {code} expired on {expired_on}")]
    Expired { code: String, expired_on: NaiveDate },

    #[error("Unable to validate coupon right now: {0}")]
    Lookup(String),
}

/// What a coupon is being applied to.
#[derive(Debug, Clone, Copy)]
pub struct CouponContext<'a> {
    pub program: &'a Program,
    pub attendance: &'a Attendance,
    pub base_price: Decimal,
    pub today: NaiveDate,
}

/// Uppercases and trims a user-entered code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Dollar value of `discount` against `base_price`, clamped to the base price.
///
/// Percentages are rounded to whole dollars.
pub fn discount_amount(
    discount: Discount,
    base_price: Decimal,
) -> Decimal {
    let raw = match discount {
        Discount::Flat(amount) => amount,
        Discount::Percent(pct) => round_whole_dollars(base_price * pct / Decimal::ONE_HUNDRED),
    };
    clamp_discount(raw, base_price)
}

#[derive(Debug, Clone)]
pub struct CouponValidator {
    rules: Vec<CouponRule>,
}

impl CouponValidator {
    pub fn new(rules: Vec<CouponRule>) -> Self {
        Self { rules }
    }

    pub fn standard() -> Self {
        Self::new(CouponRule::standard_rules())
    }

    pub fn rules(&self) -> &[CouponRule] {
        &self.rules
    }

    /// Validates `code` against the static rules, then the remote table.
    pub async fn validate<S>(
        &self,
        code: &str,
        ctx: &CouponContext<'_>,
        source: &S,
    ) -> Result<AppliedCoupon, CouponRejection>
    where
        S: CouponSource + ?Sized,
    {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(CouponRejection::Empty);
        }

        if let Some(result) = self.validate_static(&code, ctx) {
            return result;
        }

        debug!(%code, "no static rule matched, querying coupon table");
        let record = source
            .find_coupon(&code)
            .await
            .map_err(|e| {
                warn!(%code, error = %e, "coupon lookup failed");
                CouponRejection::Lookup(e.to_string())
            })?
            .ok_or(CouponRejection::Invalid)?;

        validate_record(&code, &record, ctx)
    }

    /// Checks the static table only. `None` means no rule has this code.
    pub fn validate_static(
        &self,
        code: &str,
        ctx: &CouponContext<'_>,
    ) -> Option<Result<AppliedCoupon, CouponRejection>> {
        let code = normalize_code(code);
        let rule = self.rules.iter().find(|r| r.code.eq_ignore_ascii_case(&code))?;
        Some(check_rule(rule, ctx))
    }

    /// Re-checks a previously applied coupon after the program or attendance
    /// changed. Returns `None` when the coupon should be dropped.
    pub fn reprice(
        &self,
        applied: &AppliedCoupon,
        ctx: &CouponContext<'_>,
    ) -> Option<AppliedCoupon> {
        if applied.origin == CouponOrigin::Static {
            let rule = self
                .rules
                .iter()
                .find(|r| r.code.eq_ignore_ascii_case(&applied.code))?;
            return check_rule(rule, ctx).ok();
        }

        Some(AppliedCoupon {
            amount: discount_amount(applied.discount, ctx.base_price),
            ..applied.clone()
        })
    }
}

impl Default for CouponValidator {
    fn default() -> Self {
        Self::standard()
    }
}

fn check_rule(
    rule: &CouponRule,
    ctx: &CouponContext<'_>,
) -> Result<AppliedCoupon, CouponRejection> {
    if !rule.allows_program(&ctx.program.name) {
        return Err(CouponRejection::NotEligibleForProgram {
            code: rule.code.clone(),
            program: ctx.program.name.clone(),
        });
    }

    let is_full = ctx.attendance.is_full();
    if !rule.eligibility.accepts(is_full, ctx.attendance.block_count()) {
        return Err(if is_full {
            CouponRejection::BlocksOnly {
                code: rule.code.clone(),
            }
        } else {
            CouponRejection::FullProgramOnly {
                code: rule.code.clone(),
            }
        });
    }

    Ok(AppliedCoupon {
        code: rule.code.clone(),
        discount: rule.discount,
        amount: discount_amount(rule.discount, ctx.base_price),
        origin: CouponOrigin::Static,
    })
}

fn validate_record(
    code: &str,
    record: &CouponRecord,
    ctx: &CouponContext<'_>,
) -> Result<AppliedCoupon, CouponRejection> {
    if !record.active {
        return Err(CouponRejection::Inactive {
            code: code.to_string(),
        });
    }

    // Same-day expiration is still valid.
    if let Some(expires) = record.expiration_date {
        if expires < ctx.today {
            return Err(CouponRejection::Expired {
                code: code.to_string(),
                expired_on: expires,
            });
        }
    }

    let discount = record.discount();
    Ok(AppliedCoupon {
        code: code.to_string(),
        discount,
        amount: discount_amount(discount, ctx.base_price),
        origin: CouponOrigin::Remote,
    })
}
