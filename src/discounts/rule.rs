//! Discount Rules
//!
//! Configuration of a single automatic discount. Rules are validated when
//! they are constructed, so the engine can assume a consistent rule.

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::FxHashSet;
use rusty_money::{Money, iso::Currency};
use serde::Deserialize;
use slotmap::new_key_type;
use thiserror::Error;

use crate::{catalog::ItemKey, discounts::fraction, positions::LineItem};

new_key_type! {
    /// Discount Rule Key
    pub struct DiscountKey;
}

/// Configuration errors, raised when a rule is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscountConfigError {
    /// Neither a minimum count nor a minimum value was configured.
    #[error("a discount needs a minimum number of matching products or a minimum value")]
    NoCondition,

    /// A minimum count of zero was configured.
    #[error("the minimum number of matching products must be at least 1")]
    ZeroMinCount,

    /// The benefit was limited to the cheapest zero matches.
    #[error("the discount must apply to at least one of the cheapest matches")]
    ZeroCheapestN,

    /// "Cheapest N" needs complete sets, which only a minimum count defines.
    #[error("the discount can only be limited to the cheapest matches when matching on a minimum count")]
    CheapestNWithoutMinCount,

    /// Distinct-date mode only counts dates, never values.
    #[error("a minimum value cannot be used together with the distinct dates mode")]
    DistinctWithMinValue,

    /// Distinct-date mode only discounts the lines it grouped.
    #[error("the distinct dates mode cannot discount products other than the matched ones")]
    DistinctWithSeparateBenefit,

    /// Percentage outside of 0% to 100%.
    #[error("discount percentage {0} is outside of 0% to 100%")]
    PercentageOutOfRange(Decimal),
}

/// How lines for different subevents are combined when evaluating a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubeventMode {
    /// All lines are pooled regardless of their date.
    #[default]
    Mixed,

    /// Lines are grouped by date; each group is evaluated on its own.
    Same,

    /// A match needs lines on distinct dates.
    Distinct,
}

/// The set of products a condition or benefit applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProductScope {
    /// Every product
    #[default]
    All,

    /// Only the listed products
    Items(FxHashSet<ItemKey>),
}

impl ProductScope {
    /// Whether the scope includes the item.
    pub fn contains(&self, item: ItemKey) -> bool {
        match self {
            ProductScope::All => true,
            ProductScope::Items(items) => items.contains(&item),
        }
    }
}

impl FromIterator<ItemKey> for ProductScope {
    fn from_iter<I: IntoIterator<Item = ItemKey>>(iter: I) -> Self {
        ProductScope::Items(iter.into_iter().collect())
    }
}

/// Which lines count towards a rule, and how many of them are needed.
#[derive(Debug, Clone)]
pub struct DiscountCondition<'a> {
    /// Products that count towards the condition
    pub products: ProductScope,

    /// Minimum number of matching lines
    pub min_count: Option<usize>,

    /// Minimum total value of matching lines
    pub min_value: Option<Money<'a, Currency>>,

    /// Whether add-on lines count
    pub apply_to_addons: bool,

    /// Whether lines already reduced by a voucher are left out
    pub ignore_voucher_discounted: bool,
}

impl<'a> DiscountCondition<'a> {
    /// Condition on a minimum number of lines of any product.
    pub fn min_count(count: usize) -> Self {
        Self {
            min_count: Some(count),
            ..Self::empty()
        }
    }

    /// Condition on a minimum total value of lines of any product.
    pub fn min_value(value: Money<'a, Currency>) -> Self {
        Self {
            min_value: Some(value),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            products: ProductScope::All,
            min_count: None,
            min_value: None,
            apply_to_addons: true,
            ignore_voucher_discounted: false,
        }
    }

    /// Restrict the condition to the given products.
    #[must_use]
    pub fn with_products(mut self, products: ProductScope) -> Self {
        self.products = products;
        self
    }

    /// Whether a line can count towards this condition.
    pub fn matches(&self, line: &LineItem<'_>) -> bool {
        self.products.contains(line.item())
            && (self.apply_to_addons || !line.is_addon())
            && !(self.ignore_voucher_discounted && line.is_voucher_discounted())
    }
}

/// Which lines a benefit applies to.
#[derive(Debug, Clone, Default)]
pub enum BenefitScope {
    /// The lines matched by the condition
    #[default]
    SameAsCondition,

    /// A separate set of products ("buy two tickets, get the parking discounted")
    Products {
        /// Products receiving the benefit
        products: ProductScope,

        /// Whether add-on lines receive the benefit
        apply_to_addons: bool,

        /// Whether lines already reduced by a voucher are left out
        ignore_voucher_discounted: bool,
    },
}

impl BenefitScope {
    /// Whether a line can receive a separately scoped benefit.
    ///
    /// Always `false` for [`BenefitScope::SameAsCondition`].
    pub fn matches(&self, line: &LineItem<'_>) -> bool {
        match self {
            BenefitScope::SameAsCondition => false,
            BenefitScope::Products {
                products,
                apply_to_addons,
                ignore_voucher_discounted,
            } => {
                products.contains(line.item())
                    && (*apply_to_addons || !line.is_addon())
                    && !(*ignore_voucher_discounted && line.is_voucher_discounted())
            }
        }
    }
}

/// What a matching rule does to the affected lines.
#[derive(Debug, Clone)]
pub struct DiscountBenefit {
    /// Percentage taken off each affected line
    pub percentage: Percentage,

    /// Only discount the cheapest N lines of every complete set
    pub only_apply_to_cheapest_n_matches: Option<usize>,

    /// Lines receiving the benefit
    pub scope: BenefitScope,
}

impl DiscountBenefit {
    /// Percentage off every matched line.
    pub fn percentage(percentage: Percentage) -> Self {
        Self {
            percentage,
            only_apply_to_cheapest_n_matches: None,
            scope: BenefitScope::SameAsCondition,
        }
    }

    /// Percentage off the cheapest `n` lines of every complete set.
    pub fn cheapest(n: usize, percentage: Percentage) -> Self {
        Self {
            percentage,
            only_apply_to_cheapest_n_matches: Some(n),
            scope: BenefitScope::SameAsCondition,
        }
    }

    /// Apply the benefit to a separate product scope.
    #[must_use]
    pub fn with_scope(mut self, scope: BenefitScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Sales channels a rule is offered on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SalesChannels {
    /// Every channel
    #[default]
    All,

    /// Only the listed channels
    Only(FxHashSet<String>),
}

impl SalesChannels {
    /// Whether the channel is included.
    pub fn contains(&self, channel: &str) -> bool {
        match self {
            SalesChannels::All => true,
            SalesChannels::Only(channels) => channels.contains(channel),
        }
    }
}

/// A validated automatic discount rule.
#[derive(Debug, Clone)]
pub struct DiscountRule<'a> {
    key: DiscountKey,
    name: String,
    position: i32,
    active: bool,
    subevent_mode: SubeventMode,
    condition: DiscountCondition<'a>,
    benefit: DiscountBenefit,
    available_from: Option<Timestamp>,
    available_until: Option<Timestamp>,
    sales_channels: SalesChannels,
}

impl<'a> DiscountRule<'a> {
    /// Create a new rule.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscountConfigError`] for combinations of settings the
    /// engine does not support; see [`validate`].
    pub fn new(
        key: DiscountKey,
        subevent_mode: SubeventMode,
        condition: DiscountCondition<'a>,
        benefit: DiscountBenefit,
    ) -> Result<Self, DiscountConfigError> {
        validate(subevent_mode, &condition, &benefit)?;

        Ok(Self {
            key,
            name: String::new(),
            position: 0,
            active: true,
            subevent_mode,
            condition,
            benefit,
            available_from: None,
            available_until: None,
            sales_channels: SalesChannels::All,
        })
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the evaluation position; lower positions are evaluated first.
    #[must_use]
    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    /// Enable or disable the rule.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Limit the rule to a time window; either bound may be open.
    #[must_use]
    pub fn with_availability(
        mut self,
        available_from: Option<Timestamp>,
        available_until: Option<Timestamp>,
    ) -> Self {
        self.available_from = available_from;
        self.available_until = available_until;
        self
    }

    /// Limit the rule to some sales channels.
    #[must_use]
    pub fn with_sales_channels(mut self, sales_channels: SalesChannels) -> Self {
        self.sales_channels = sales_channels;
        self
    }

    /// Rule key
    pub fn key(&self) -> DiscountKey {
        self.key
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluation position
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Whether the rule is enabled
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Subevent grouping mode
    pub fn subevent_mode(&self) -> SubeventMode {
        self.subevent_mode
    }

    /// Condition
    pub fn condition(&self) -> &DiscountCondition<'a> {
        &self.condition
    }

    /// Benefit
    pub fn benefit(&self) -> &DiscountBenefit {
        &self.benefit
    }

    /// Whether the rule can be used on `channel` at `now`.
    pub fn is_available(&self, channel: &str, now: Timestamp) -> bool {
        self.active
            && self.available_from.is_none_or(|from| from <= now)
            && self.available_until.is_none_or(|until| until >= now)
            && self.sales_channels.contains(channel)
    }
}

/// Rules that can be used on `channel` at `now`, in their original order.
pub fn available_rules<'r, 'a>(
    rules: &'r [DiscountRule<'a>],
    channel: &'r str,
    now: Timestamp,
) -> impl Iterator<Item = &'r DiscountRule<'a>> {
    rules
        .iter()
        .filter(move |rule| rule.is_available(channel, now))
}

/// Check a combination of rule settings.
///
/// Minimum count and minimum value may be combined, in which case both must
/// hold. Some combinations have no well-defined allocation and are rejected.
///
/// # Errors
///
/// Returns the first [`DiscountConfigError`] found.
pub fn validate(
    subevent_mode: SubeventMode,
    condition: &DiscountCondition<'_>,
    benefit: &DiscountBenefit,
) -> Result<(), DiscountConfigError> {
    match (condition.min_count, condition.min_value) {
        (None, None) => return Err(DiscountConfigError::NoCondition),
        (Some(0), _) => return Err(DiscountConfigError::ZeroMinCount),
        _ => {}
    }

    match benefit.only_apply_to_cheapest_n_matches {
        Some(0) => return Err(DiscountConfigError::ZeroCheapestN),
        Some(_) if condition.min_count.is_none() => {
            return Err(DiscountConfigError::CheapestNWithoutMinCount);
        }
        _ => {}
    }

    if subevent_mode == SubeventMode::Distinct {
        if condition.min_value.is_some() {
            return Err(DiscountConfigError::DistinctWithMinValue);
        }

        if matches!(benefit.scope, BenefitScope::Products { .. }) {
            return Err(DiscountConfigError::DistinctWithSeparateBenefit);
        }
    }

    let percentage = fraction(&benefit.percentage);

    if percentage < Decimal::ZERO || percentage > Decimal::ONE {
        return Err(DiscountConfigError::PercentageOutOfRange(
            percentage * Decimal::ONE_HUNDRED,
        ));
    }

    Ok(())
}
