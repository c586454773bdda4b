//! Catalog
//!
//! Products, their variations and the event dates (subevents) they can be
//! sold for.

use jiff::Timestamp;
use rusty_money::{Money, iso::Currency};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;

new_key_type! {
    /// Item Key
    pub struct ItemKey;
}

new_key_type! {
    /// Variation Key
    pub struct VariationKey;
}

new_key_type! {
    /// Subevent Key
    pub struct SubeventKey;
}

/// Errors raised while building a catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The referenced item does not exist.
    #[error("item {0:?} not found")]
    ItemNotFound(ItemKey),

    /// The referenced variation does not exist.
    #[error("variation {0:?} not found")]
    VariationNotFound(VariationKey),

    /// The variation belongs to a different item.
    #[error("variation {variation:?} does not belong to item {item:?}")]
    ForeignVariation {
        /// Item the caller asked for
        item: ItemKey,
        /// Variation that belongs elsewhere
        variation: VariationKey,
    },
}

/// A sellable reference: an item, optionally narrowed to one of its variations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemRef {
    /// Item
    pub item: ItemKey,

    /// Variation, for items that have variations
    pub variation: Option<VariationKey>,
}

impl ItemRef {
    /// Reference an item without variations.
    pub const fn item(item: ItemKey) -> Self {
        Self {
            item,
            variation: None,
        }
    }

    /// Reference a single variation of an item.
    pub const fn variation(item: ItemKey, variation: VariationKey) -> Self {
        Self {
            item,
            variation: Some(variation),
        }
    }
}

/// Item (admission ticket, add-on, merchandise)
#[derive(Debug, Clone)]
pub struct Item<'a> {
    /// Item name
    pub name: String,

    /// Default price
    pub price: Money<'a, Currency>,

    /// Variations of this item
    pub variations: SmallVec<[VariationKey; 4]>,
}

/// Item variation
#[derive(Debug, Clone)]
pub struct Variation<'a> {
    /// Parent item
    pub item: ItemKey,

    /// Variation name
    pub name: String,

    /// Price override, falls back to the item price
    pub price: Option<Money<'a, Currency>>,
}

/// A single date of an event series.
#[derive(Debug, Clone)]
pub struct Subevent {
    /// Display name
    pub name: String,

    /// Start of the date
    pub date_from: Timestamp,
}

/// Catalog
#[derive(Debug, Default)]
pub struct Catalog<'a> {
    items: SlotMap<ItemKey, Item<'a>>,
    variations: SlotMap<VariationKey, Variation<'a>>,
    subevents: SlotMap<SubeventKey, Subevent>,
}

impl<'a> Catalog<'a> {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item without variations.
    pub fn add_item(&mut self, name: impl Into<String>, price: Money<'a, Currency>) -> ItemKey {
        self.items.insert(Item {
            name: name.into(),
            price,
            variations: SmallVec::new(),
        })
    }

    /// Add a variation to an existing item.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ItemNotFound`] if the item does not exist.
    pub fn add_variation(
        &mut self,
        item: ItemKey,
        name: impl Into<String>,
        price: Option<Money<'a, Currency>>,
    ) -> Result<VariationKey, CatalogError> {
        let parent = self
            .items
            .get_mut(item)
            .ok_or(CatalogError::ItemNotFound(item))?;

        let key = self.variations.insert(Variation {
            item,
            name: name.into(),
            price,
        });

        parent.variations.push(key);

        Ok(key)
    }

    /// Add a subevent.
    pub fn add_subevent(&mut self, name: impl Into<String>, date_from: Timestamp) -> SubeventKey {
        self.subevents.insert(Subevent {
            name: name.into(),
            date_from,
        })
    }

    /// Look up an item.
    pub fn item(&self, key: ItemKey) -> Option<&Item<'a>> {
        self.items.get(key)
    }

    /// Look up a variation.
    pub fn variation(&self, key: VariationKey) -> Option<&Variation<'a>> {
        self.variations.get(key)
    }

    /// Look up a subevent.
    pub fn subevent(&self, key: SubeventKey) -> Option<&Subevent> {
        self.subevents.get(key)
    }

    /// Iterate over all items.
    pub fn items(&self) -> impl Iterator<Item = (ItemKey, &Item<'a>)> {
        self.items.iter()
    }

    /// Iterate over all subevents.
    pub fn subevents(&self) -> impl Iterator<Item = (SubeventKey, &Subevent)> {
        self.subevents.iter()
    }

    /// Resolve the list price of an item or one of its variations.
    ///
    /// # Errors
    ///
    /// Returns an error if the item or variation is unknown, or if the
    /// variation belongs to another item.
    pub fn price_of(&self, target: ItemRef) -> Result<Money<'a, Currency>, CatalogError> {
        let item = self
            .items
            .get(target.item)
            .ok_or(CatalogError::ItemNotFound(target.item))?;

        let Some(variation_key) = target.variation else {
            return Ok(item.price);
        };

        let variation = self
            .variations
            .get(variation_key)
            .ok_or(CatalogError::VariationNotFound(variation_key))?;

        if variation.item != target.item {
            return Err(CatalogError::ForeignVariation {
                item: target.item,
                variation: variation_key,
            });
        }

        Ok(variation.price.unwrap_or(item.price))
    }

    /// Human readable label for an item or variation.
    pub fn label(&self, target: ItemRef) -> Option<String> {
        let item = self.items.get(target.item)?;

        match target.variation {
            None => Some(item.name.clone()),
            Some(key) => {
                let variation = self.variations.get(key)?;

                Some(format!("{} – {}", item.name, variation.name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::EUR;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn price_of_falls_back_to_item_price() -> TestResult {
        let mut catalog = Catalog::new();
        let ticket = catalog.add_item("Day ticket", Money::from_minor(12_000, EUR));
        let regular = catalog.add_variation(ticket, "Regular", None)?;
        let vip = catalog.add_variation(ticket, "VIP", Some(Money::from_minor(18_000, EUR)))?;

        assert_eq!(
            catalog.price_of(ItemRef::item(ticket))?,
            Money::from_minor(12_000, EUR)
        );
        assert_eq!(
            catalog.price_of(ItemRef::variation(ticket, regular))?,
            Money::from_minor(12_000, EUR)
        );
        assert_eq!(
            catalog.price_of(ItemRef::variation(ticket, vip))?,
            Money::from_minor(18_000, EUR)
        );

        Ok(())
    }

    #[test]
    fn price_of_rejects_variation_of_other_item() -> TestResult {
        let mut catalog = Catalog::new();
        let ticket = catalog.add_item("Day ticket", Money::from_minor(12_000, EUR));
        let shirt = catalog.add_item("Shirt", Money::from_minor(2_500, EUR));
        let size_m = catalog.add_variation(shirt, "M", None)?;

        assert_eq!(
            catalog.price_of(ItemRef::variation(ticket, size_m)),
            Err(CatalogError::ForeignVariation {
                item: ticket,
                variation: size_m,
            })
        );

        Ok(())
    }

    #[test]
    fn add_variation_requires_existing_item() {
        let mut catalog = Catalog::new();

        let result = catalog.add_variation(ItemKey::default(), "Regular", None);

        assert_eq!(result, Err(CatalogError::ItemNotFound(ItemKey::default())));
    }

    #[test]
    fn label_includes_variation_name() -> TestResult {
        let mut catalog = Catalog::new();
        let ticket = catalog.add_item("Day ticket", Money::from_minor(12_000, EUR));
        let vip = catalog.add_variation(ticket, "VIP", None)?;

        assert_eq!(
            catalog.label(ItemRef::variation(ticket, vip)).as_deref(),
            Some("Day ticket – VIP")
        );

        Ok(())
    }
}
