//! Pricing for a program and attendance selection.
//!
//! # Rules
//!
//! | Case | Price |
//! |------|-------|
//! | Program has no blocks, full attendance, or nothing selected | full price |
//! | Sum of selected block prices below the full price | block sum |
//! | Sum of selected block prices at or above the full price | full price, attendance becomes Full |
//!
//! Coupons are applied afterwards with [`apply_discount`].
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use iaml_core::calculations::pricing::compute_amount_due;
//! use iaml_core::{Attendance, BlockId, ProgramCatalog};
//!
//! let catalog = ProgramCatalog::standard();
//! let erl = catalog.by_slug("employee-relations-law").unwrap();
//!
//! let quote = compute_amount_due(erl, &Attendance::from_blocks([BlockId(3)])).unwrap();
//! assert_eq!(quote.base_price, dec!(575));
//! assert!(!quote.upgraded);
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::calculations::common::clamp_discount;
use crate::models::{Attendance, BlockId, Program};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("{block} is not part of {program}")]
    UnknownBlock { program: String, block: BlockId },
}

/// Result of pricing an attendance selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base_price: Decimal,
    /// The attendance actually priced. Differs from the requested one when
    /// the selection was upgraded to Full.
    pub attendance: Attendance,
    /// True when the block sum met or exceeded the full price.
    pub upgraded: bool,
}

/// Computes the base price for `attendance` on `program`.
///
/// # Errors
///
/// Returns [`PricingError::UnknownBlock`] if a selected block does not exist
/// on a block-capable program.
pub fn compute_amount_due(
    program: &Program,
    attendance: &Attendance,
) -> Result<PriceQuote, PricingError> {
    let full = PriceQuote {
        base_price: program.full_price,
        attendance: Attendance::Full,
        upgraded: false,
    };

    if !program.has_blocks() || attendance.is_full() {
        return Ok(full);
    }

    let mut sum = Decimal::ZERO;
    for id in attendance.blocks() {
        let block = program.block(id).ok_or_else(|| PricingError::UnknownBlock {
            program: program.name.clone(),
            block: id,
        })?;
        sum += block.price;
    }

    if sum >= program.full_price {
        debug!(
            program = %program.name,
            block_sum = %sum,
            full_price = %program.full_price,
            "block selection costs at least the full program, upgrading to Full"
        );
        return Ok(PriceQuote {
            upgraded: true,
            ..full
        });
    }

    Ok(PriceQuote {
        base_price: sum,
        attendance: attendance.clone(),
        upgraded: false,
    })
}

/// Discount and amount due after a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountedPrice {
    pub discount: Decimal,
    pub amount_due: Decimal,
}

/// Applies `discount` to `base_price`, clamping it into `[0, base_price]`.
pub fn apply_discount(
    base_price: Decimal,
    discount: Decimal,
) -> DiscountedPrice {
    let discount = clamp_discount(discount, base_price);
    DiscountedPrice {
        discount,
        amount_due: base_price - discount,
    }
}
