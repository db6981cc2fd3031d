use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a coupon reduces the base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discount {
    /// Fixed dollar amount.
    Flat(Decimal),
    /// Percentage of the base price, e.g. `10` for ten percent.
    Percent(Decimal),
}

/// Which attendance selections a static coupon rule accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceEligibility {
    Any,
    FullOnly,
    /// Partial purchases with at least one block selected.
    BlocksOnly,
}

impl AttendanceEligibility {
    pub fn accepts(
        &self,
        is_full: bool,
        block_count: usize,
    ) -> bool {
        match self {
            Self::Any => true,
            Self::FullOnly => is_full,
            Self::BlocksOnly => !is_full && block_count > 0,
        }
    }
}

/// A coupon known to the site without a remote lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRule {
    pub code: String,
    pub discount: Discount,
    /// Canonical program names the code applies to. Empty means any program.
    pub programs: Vec<String>,
    pub eligibility: AttendanceEligibility,
}

impl CouponRule {
    pub fn standard_rules() -> Vec<CouponRule> {
        vec![
            CouponRule {
                code: "PP500".to_string(),
                discount: Discount::Flat(Decimal::from(500)),
                programs: Vec::new(),
                eligibility: AttendanceEligibility::FullOnly,
            },
            CouponRule {
                code: "BLOCK100".to_string(),
                discount: Discount::Flat(Decimal::from(100)),
                programs: Vec::new(),
                eligibility: AttendanceEligibility::BlocksOnly,
            },
            CouponRule {
                code: "ALUMNI10".to_string(),
                discount: Discount::Percent(Decimal::from(10)),
                programs: vec![
                    "Certificate in Employee Relations Law".to_string(),
                    "Certificate in Employee Benefits Law".to_string(),
                    "Certificate in Strategic HR Management".to_string(),
                ],
                eligibility: AttendanceEligibility::Any,
            },
        ]
    }

    pub fn allows_program(
        &self,
        program_name: &str,
    ) -> bool {
        self.programs.is_empty()
            || self
                .programs
                .iter()
                .any(|p| p.eq_ignore_ascii_case(program_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountType {
    Percent,
    Flat,
}

/// A coupon row from the remote coupon table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRecord {
    pub code: String,
    pub active: bool,
    pub expiration_date: Option<NaiveDate>,
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
}

impl CouponRecord {
    pub fn discount(&self) -> Discount {
        match self.discount_type {
            DiscountType::Percent => Discount::Percent(self.discount_amount),
            DiscountType::Flat => Discount::Flat(self.discount_amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponOrigin {
    Static,
    Remote,
}

/// A coupon that passed validation and is attached to the wizard state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Discount,
    /// Dollar amount taken off, already clamped to the base price.
    pub amount: Decimal,
    pub origin: CouponOrigin,
}
