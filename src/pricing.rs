//! Prices

use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::positions::LineItem;

/// Errors that can occur while calculating total price.
#[derive(Debug, Error, PartialEq)]
pub enum TotalPriceError {
    /// No lines were provided, so currency could not be determined.
    #[error("no lines provided; cannot determine currency")]
    NoLines,

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Calculates the total price of a list of lines
///
/// # Errors
///
/// - [`TotalPriceError::NoLines`]: No lines were provided, so currency could not be determined.
/// - [`TotalPriceError::Money`]: Wrapped money arithmetic or currency mismatch error.
pub fn total_price<'a>(lines: &[LineItem<'a>]) -> Result<Money<'a, Currency>, TotalPriceError> {
    let first = lines.first().ok_or(TotalPriceError::NoLines)?;

    sum_in(first.price().currency(), lines.iter().map(LineItem::price))
}

/// Sums money amounts in the given currency.
///
/// An empty iterator sums to zero.
///
/// # Errors
///
/// Returns [`TotalPriceError::Money`] if any amount is in a different currency.
pub fn sum_in<'a, 'b>(
    currency: &'a Currency,
    amounts: impl IntoIterator<Item = &'b Money<'a, Currency>>,
) -> Result<Money<'a, Currency>, TotalPriceError>
where
    'a: 'b,
{
    let total = amounts
        .into_iter()
        .try_fold(Money::from_minor(0, currency), |acc, amount| {
            acc.add(*amount)
        })?;

    Ok(total)
}
