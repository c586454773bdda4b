//! Cart Fixtures

use jiff::Timestamp;
use serde::Deserialize;

/// Wrapper for a cart in YAML
#[derive(Debug, Deserialize)]
pub struct CartFixture {
    /// Sales channel the cart is priced on
    #[serde(default = "web")]
    pub channel: String,

    /// Pricing time
    pub now: Timestamp,

    /// Lines, in cart order
    pub lines: Vec<LineFixture>,
}

/// Cart Line Fixture
#[derive(Debug, Deserialize)]
pub struct LineFixture {
    /// Item or variation key
    pub product: String,

    /// Subevent key
    #[serde(default)]
    pub subevent: Option<String>,

    /// Price override; the catalog price when omitted
    #[serde(default)]
    pub price: Option<String>,

    /// Number of identical lines
    #[serde(default = "one")]
    pub count: usize,

    /// Whether the line is an add-on
    #[serde(default)]
    pub addon: bool,

    /// Whether the line is part of a bundle
    #[serde(default)]
    pub bundled: bool,

    /// Amount a voucher took off the line (e.g., "10.00 EUR")
    #[serde(default)]
    pub voucher_discount: Option<String>,
}

/// A resolved cart.
#[derive(Debug, Clone)]
pub struct Cart<'a> {
    /// Sales channel
    pub channel: String,

    /// Pricing time
    pub now: Timestamp,

    /// Lines, in cart order
    pub lines: Vec<crate::positions::LineItem<'a>>,
}

fn web() -> String {
    "web".to_string()
}

fn one() -> usize {
    1
}
