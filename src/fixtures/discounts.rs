//! Discount Fixtures

use jiff::Timestamp;
use serde::Deserialize;

use crate::discounts::rule::SubeventMode;

/// Wrapper for discount rules in YAML
///
/// Rules are a list so that rules sharing a position keep their order.
#[derive(Debug, Deserialize)]
pub struct DiscountsFixture {
    /// Rules
    pub discounts: Vec<DiscountFixture>,
}

/// Discount Rule Fixture
#[derive(Debug, Deserialize)]
pub struct DiscountFixture {
    /// Reference used in reports
    pub key: String,

    /// Rule name
    pub name: String,

    /// Evaluation position
    #[serde(default)]
    pub position: i32,

    /// Whether the rule is enabled
    #[serde(default = "enabled")]
    pub active: bool,

    /// Subevent grouping mode
    #[serde(default)]
    pub subevent_mode: SubeventMode,

    /// Start of availability
    #[serde(default)]
    pub available_from: Option<Timestamp>,

    /// End of availability
    #[serde(default)]
    pub available_until: Option<Timestamp>,

    /// Sales channels; omitted for all channels
    #[serde(default)]
    pub sales_channels: Option<Vec<String>>,

    /// Condition
    pub condition: ConditionFixture,

    /// Benefit
    pub benefit: BenefitFixture,
}

/// Discount Condition Fixture
#[derive(Debug, Deserialize)]
pub struct ConditionFixture {
    /// Item keys; omitted for all products
    #[serde(default)]
    pub products: Option<Vec<String>>,

    /// Minimum number of matching lines
    #[serde(default)]
    pub min_count: Option<usize>,

    /// Minimum value of matching lines (e.g., "200.00 EUR")
    #[serde(default)]
    pub min_value: Option<String>,

    /// Whether add-on lines count
    #[serde(default = "enabled")]
    pub apply_to_addons: bool,

    /// Whether lines discounted by a voucher are left out
    #[serde(default)]
    pub ignore_voucher_discounted: bool,
}

/// Discount Benefit Fixture
#[derive(Debug, Deserialize)]
pub struct BenefitFixture {
    /// Percentage off (e.g., "20%" or "0.2")
    pub percentage: String,

    /// Only discount the cheapest N lines of every complete set
    #[serde(default)]
    pub cheapest: Option<usize>,

    /// Item keys receiving the benefit instead of the matched lines
    #[serde(default)]
    pub products: Option<Vec<String>>,

    /// Whether add-on lines receive the benefit
    #[serde(default = "enabled")]
    pub apply_to_addons: bool,

    /// Whether lines discounted by a voucher are left out
    #[serde(default)]
    pub ignore_voucher_discounted: bool,
}

fn enabled() -> bool {
    true
}
