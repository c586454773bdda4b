//! Catalog Fixtures

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use rusty_money::{
    Money,
    iso::{Currency, EUR, GBP, USD},
};
use serde::Deserialize;

use crate::fixtures::FixtureError;

/// Wrapper for the catalog in YAML
#[derive(Debug, Deserialize)]
pub struct CatalogFixture {
    /// Items, in display order
    pub items: Vec<ItemFixture>,

    /// Subevents of a series event
    #[serde(default)]
    pub subevents: Vec<SubeventFixture>,
}

/// Item Fixture
#[derive(Debug, Deserialize)]
pub struct ItemFixture {
    /// Reference used by other fixtures
    pub key: String,

    /// Item name
    pub name: String,

    /// Item price (e.g., "120.00 EUR")
    pub price: String,

    /// Variations
    #[serde(default)]
    pub variations: Vec<VariationFixture>,
}

/// Variation Fixture
#[derive(Debug, Deserialize)]
pub struct VariationFixture {
    /// Reference used by other fixtures; shares the item namespace
    pub key: String,

    /// Variation name
    pub name: String,

    /// Price override (e.g., "90.00 EUR")
    #[serde(default)]
    pub price: Option<String>,
}

/// Subevent Fixture
#[derive(Debug, Deserialize)]
pub struct SubeventFixture {
    /// Reference used by other fixtures
    pub key: String,

    /// Subevent name
    pub name: String,

    /// Start of the subevent
    pub date_from: Timestamp,
}

/// Parse price string (e.g., "2.99 EUR") into minor units and currency
///
/// # Errors
///
/// Returns an error if the string is not in the format "AMOUNT CURRENCY",
/// if the amount cannot be parsed as a decimal, or if the currency code
/// is not recognized.
pub fn parse_price(s: &str) -> Result<(i64, &'static Currency), FixtureError> {
    let parts: Vec<&str> = s.split_whitespace().collect();

    if parts.len() != 2 {
        return Err(FixtureError::InvalidPrice(format!(
            "Expected format 'AMOUNT CURRENCY', got: {s}"
        )));
    }

    let amount = parts
        .first()
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;

    let minor_units = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|value| value.round_dp(0).to_i64())
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?;

    let currency_code = parts
        .get(1)
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?;

    let currency = match *currency_code {
        "EUR" => EUR,
        "GBP" => GBP,
        "USD" => USD,
        other => return Err(FixtureError::UnknownCurrency(other.to_string())),
    };

    Ok((minor_units, currency))
}

/// Parse a price string into [`Money`].
///
/// # Errors
///
/// See [`parse_price`].
pub fn parse_money(s: &str) -> Result<Money<'static, Currency>, FixtureError> {
    let (minor_units, currency) = parse_price(s)?;

    Ok(Money::from_minor(minor_units, currency))
}

/// Parse percentage string (e.g., "15%" or "0.15") into a `Percentage`
///
/// # Errors
///
/// Returns an error if the string cannot be parsed.
pub fn parse_percentage(s: &str) -> Result<Percentage, FixtureError> {
    let trimmed = s.trim();

    let (number, scale) = match trimmed.strip_suffix('%') {
        Some(percent) => (percent.trim(), Decimal::ONE_HUNDRED),
        None => (trimmed, Decimal::ONE),
    };

    let value = number
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPercentage(s.to_string()))?;

    let fraction = value
        .checked_div(scale)
        .ok_or_else(|| FixtureError::InvalidPercentage(s.to_string()))?;

    Ok(Percentage::from(fraction))
}
