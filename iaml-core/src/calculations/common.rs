//! Common money helpers shared by the pricing and coupon calculations.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Rounds a decimal value to exactly two decimal places using half-up rounding.
///
/// Values at exactly 0.005 are rounded away from zero.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use iaml_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(123.454)), dec!(123.45));
/// assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds to whole dollars, midpoint away from zero.
///
/// Percentage coupons are always rounded this way.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use iaml_core::calculations::common::round_whole_dollars;
///
/// assert_eq!(round_whole_dollars(dec!(237.50)), dec!(238));
/// assert_eq!(round_whole_dollars(dec!(237.49)), dec!(237));
/// ```
pub fn round_whole_dollars(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Returns the maximum of two decimal values.
pub fn max(
    a: Decimal,
    b: Decimal,
) -> Decimal {
    if a > b { a } else { b }
}

/// Clamps a discount into `[0, base_price]`.
pub fn clamp_discount(
    discount: Decimal,
    base_price: Decimal,
) -> Decimal {
    max(discount.min(base_price), Decimal::ZERO)
}

/// Converts a dollar amount to integer cents for the payment processor.
///
/// Returns `None` if the amount does not fit in an `i64` worth of cents.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    (round_half_up(amount) * Decimal::ONE_HUNDRED).to_i64()
}
