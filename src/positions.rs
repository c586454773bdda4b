//! Positions
//!
//! Cart and order positions as seen by the pricing engine.

use rusty_money::{Money, iso::Currency};

use crate::catalog::{ItemKey, ItemRef, SubeventKey, VariationKey};

/// A single line of a cart or order, immutable for one pricing pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineItem<'a> {
    target: ItemRef,
    subevent: Option<SubeventKey>,
    price: Money<'a, Currency>,
    is_addon: bool,
    is_bundled: bool,
    voucher_discount: Option<Money<'a, Currency>>,
}

impl<'a> LineItem<'a> {
    /// Creates a new line for an item (or variation) on an optional subevent.
    #[must_use]
    pub fn new(
        target: ItemRef,
        subevent: Option<SubeventKey>,
        price: Money<'a, Currency>,
    ) -> Self {
        Self {
            target,
            subevent,
            price,
            is_addon: false,
            is_bundled: false,
            voucher_discount: None,
        }
    }

    /// Marks this line as an add-on to another line.
    #[must_use]
    pub fn as_addon(mut self) -> Self {
        self.is_addon = true;
        self
    }

    /// Marks this line as part of a bundle. Bundled lines are never discounted.
    #[must_use]
    pub fn as_bundled(mut self) -> Self {
        self.is_bundled = true;
        self
    }

    /// Records the amount a voucher already took off this line.
    #[must_use]
    pub fn with_voucher_discount(mut self, discount: Money<'a, Currency>) -> Self {
        self.voucher_discount = Some(discount);
        self
    }

    /// Item or variation sold on this line
    pub fn target(&self) -> ItemRef {
        self.target
    }

    /// Item sold on this line
    pub fn item(&self) -> ItemKey {
        self.target.item
    }

    /// Variation sold on this line
    pub fn variation(&self) -> Option<VariationKey> {
        self.target.variation
    }

    /// Subevent this line is for
    pub fn subevent(&self) -> Option<SubeventKey> {
        self.subevent
    }

    /// Line price before automatic discounts
    pub fn price(&self) -> &Money<'a, Currency> {
        &self.price
    }

    /// Whether this line is an add-on
    pub fn is_addon(&self) -> bool {
        self.is_addon
    }

    /// Whether this line is bundled into another product
    pub fn is_bundled(&self) -> bool {
        self.is_bundled
    }

    /// Voucher discount already applied to this line
    pub fn voucher_discount(&self) -> Option<&Money<'a, Currency>> {
        self.voucher_discount.as_ref()
    }

    /// Whether a voucher took a non-zero amount off this line.
    pub fn is_voucher_discounted(&self) -> bool {
        self.voucher_discount
            .is_some_and(|discount| discount.to_minor_units() != 0)
    }
}
