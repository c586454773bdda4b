//! Discounts
//!
//! Automatic cart discounts: rule configuration, subevent grouping and the
//! allocation engine that decides which cart lines a rule prices.

use decimal_percentage::Percentage;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::pricing::TotalPriceError;

pub mod engine;
pub mod grouping;
pub mod rule;

pub use engine::{LinePrice, apply_discounts};

/// Errors raised while pricing a cart.
#[derive(Debug, Error)]
pub enum DiscountError {
    /// Percentage calculation could not be safely converted.
    #[error("percentage conversion overflowed or was not finite")]
    PercentConversion,

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Errors bubbled up from summing line prices.
    #[error(transparent)]
    TotalPrice(#[from] TotalPriceError),
}

/// Express a percentage as its decimal fraction (`0.2` for 20%).
pub fn fraction(percent: &Percentage) -> Decimal {
    (*percent) * Decimal::ONE
}

/// Reduce an amount in minor units by a percentage.
///
/// The reduced amount is rounded half away from zero to whole minor units,
/// i.e. to the precision of the currency.
///
/// # Errors
///
/// Returns [`DiscountError::PercentConversion`] if the calculation overflows.
pub fn reduce_minor(percent: &Percentage, minor: i64) -> Result<i64, DiscountError> {
    let minor = Decimal::from_i64(minor).ok_or(DiscountError::PercentConversion)?;

    Decimal::ONE
        .checked_sub(fraction(percent))
        .and_then(|remaining| remaining.checked_mul(minor))
        .ok_or(DiscountError::PercentConversion)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(DiscountError::PercentConversion)
}

/// Reduce a price by a percentage.
///
/// # Errors
///
/// Returns [`DiscountError::PercentConversion`] if the calculation overflows.
pub fn reduce_by<'a>(
    price: &Money<'a, Currency>,
    percent: &Percentage,
) -> Result<Money<'a, Currency>, DiscountError> {
    let minor = reduce_minor(percent, price.to_minor_units())?;

    Ok(Money::from_minor(minor, price.currency()))
}
