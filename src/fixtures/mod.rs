//! Fixtures
//!
//! YAML fixture sets describing an event: `fixtures/<kind>/<set>.yml` for
//! the kinds `catalog`, `quotas`, `sales`, `discounts` and `cart`. Fixtures
//! refer to each other by string keys, which are resolved to slotmap keys
//! while loading, so the catalog has to be loaded first.

use std::{fs, path::PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use rusty_money::{Money, iso::Currency};
use slotmap::SlotMap;
use thiserror::Error;
use tracing::debug;

use crate::{
    catalog::{Catalog, CatalogError, ItemKey, ItemRef, SubeventKey},
    discounts::rule::{
        BenefitScope, DiscountBenefit, DiscountCondition, DiscountConfigError, DiscountKey,
        DiscountRule, ProductScope, SalesChannels,
    },
    fixtures::{
        cart::{Cart, CartFixture},
        catalog::{CatalogFixture, parse_money, parse_percentage},
        discounts::{DiscountFixture, DiscountsFixture},
        quotas::QuotasFixture,
        sales::SalesFixture,
    },
    positions::LineItem,
    quotas::{
        Quota, QuotaKey, QuotaSet,
        sales::{
            CartPosition, Order, OrderPosition, SalesSnapshot, Voucher, VoucherBinding,
            VoucherKey, WaitingListEntry,
        },
    },
};

pub mod cart;
pub mod catalog;
pub mod discounts;
pub mod quotas;
pub mod sales;

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Invalid percentage format
    #[error("Invalid percentage format: {0}")]
    InvalidPercentage(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Currency mismatch between prices
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// No prices loaded yet
    #[error("No catalog loaded yet; currency unknown")]
    NoCurrency,

    /// Key used twice within a fixture kind
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Product not found
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product is a variation where an item is required
    #[error("Expected an item, found variation: {0}")]
    NotAnItem(String),

    /// Subevent not found
    #[error("Subevent not found: {0}")]
    SubeventNotFound(String),

    /// Quota not found
    #[error("Quota not found: {0}")]
    QuotaNotFound(String),

    /// Voucher not found
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    /// Voucher bound to neither or both of a quota and a product
    #[error("Voucher {0} must be bound to exactly one of a quota or a product")]
    InvalidVoucher(String),

    /// Discount rule not found
    #[error("Discount not found: {0}")]
    DiscountNotFound(String),

    /// Discount rule rejected by validation
    #[error("Invalid discount {key}: {source}")]
    InvalidDiscount {
        /// Rule key
        key: String,

        /// Validation error
        #[source]
        source: DiscountConfigError,
    },

    /// No cart loaded
    #[error("No cart loaded")]
    NoCart,

    /// Catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Fixture
#[derive(Debug)]
pub struct Fixture {
    /// Base path for fixture files
    base_path: PathBuf,

    catalog: Catalog<'static>,
    quotas: QuotaSet,
    sales: SalesSnapshot,
    discounts: Vec<DiscountRule<'static>>,
    cart: Option<Cart<'static>>,

    /// String key -> `SlotMap` key mappings for lookups
    product_keys: FxHashMap<String, ItemRef>,
    subevent_keys: FxHashMap<String, SubeventKey>,
    quota_keys: FxHashMap<String, QuotaKey>,
    voucher_keys: FxHashMap<String, VoucherKey>,
    discount_keys: FxHashMap<String, DiscountKey>,

    /// Discount key -> fixture key, for reports
    discount_names: SlotMap<DiscountKey, String>,

    /// Currency for the fixture set
    currency: Option<&'static Currency>,
}

impl Fixture {
    /// Create a new empty fixture with default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a new empty fixture with custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            catalog: Catalog::new(),
            quotas: QuotaSet::new(),
            sales: SalesSnapshot::new(),
            discounts: Vec::new(),
            cart: None,
            product_keys: FxHashMap::default(),
            subevent_keys: FxHashMap::default(),
            quota_keys: FxHashMap::default(),
            voucher_keys: FxHashMap::default(),
            discount_keys: FxHashMap::default(),
            discount_names: SlotMap::with_key(),
            currency: None,
        }
    }

    /// Load a complete fixture set (every kind with the same name)
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set(name: &str) -> Result<Self, FixtureError> {
        Self::with_base_path("./fixtures").load_set(name)
    }

    /// Load every kind of a fixture set from this fixture's base path
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn load_set(mut self, name: &str) -> Result<Self, FixtureError> {
        self.load_catalog(name)?
            .load_quotas(name)?
            .load_sales(name)?
            .load_discounts(name)?
            .load_cart(name)?;

        Ok(self)
    }

    fn read<T: serde::de::DeserializeOwned>(
        &self,
        kind: &str,
        name: &str,
    ) -> Result<T, FixtureError> {
        let file_path = self.base_path.join(kind).join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;

        debug!(path = %file_path.display(), "loading fixture");

        Ok(serde_norway::from_str(&contents)?)
    }

    /// Load items, variations and subevents from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or if there are
    /// currency mismatches or duplicate keys.
    pub fn load_catalog(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: CatalogFixture = self.read("catalog", name)?;

        for item_fixture in fixture.items {
            let price = self.money(&item_fixture.price)?;
            let item = self.catalog.add_item(item_fixture.name, price);

            insert_unique(&mut self.product_keys, item_fixture.key, ItemRef::item(item))?;

            for variation_fixture in item_fixture.variations {
                let price = variation_fixture
                    .price
                    .as_deref()
                    .map(|price| self.money(price))
                    .transpose()?;

                let variation = self
                    .catalog
                    .add_variation(item, variation_fixture.name, price)?;

                insert_unique(
                    &mut self.product_keys,
                    variation_fixture.key,
                    ItemRef::variation(item, variation),
                )?;
            }
        }

        for subevent_fixture in fixture.subevents {
            let subevent = self
                .catalog
                .add_subevent(subevent_fixture.name, subevent_fixture.date_from);

            insert_unique(&mut self.subevent_keys, subevent_fixture.key, subevent)?;
        }

        Ok(self)
    }

    /// Load quotas from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or if referenced
    /// products or subevents don't exist.
    pub fn load_quotas(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: QuotasFixture = self.read("quotas", name)?;

        for quota_fixture in fixture.quotas {
            let mut quota = Quota::new(quota_fixture.name, quota_fixture.size);

            for product in &quota_fixture.products {
                quota = quota.with_product(self.product_key(product)?);
            }

            quota.subevent = self.optional_subevent(quota_fixture.subevent.as_deref())?;
            quota.closed = quota_fixture.closed;
            quota.close_when_sold_out = quota_fixture.close_when_sold_out;

            let key = self.quotas.insert(quota);

            insert_unique(&mut self.quota_keys, quota_fixture.key, key)?;
        }

        Ok(self)
    }

    /// Load a sales snapshot from a YAML fixture file
    ///
    /// Vouchers are loaded before carts so carts can refer to them.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or if referenced
    /// products, subevents, quotas or vouchers don't exist.
    pub fn load_sales(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: SalesFixture = self.read("sales", name)?;

        for voucher_fixture in fixture.vouchers {
            let binding = match (&voucher_fixture.quota, &voucher_fixture.product) {
                (Some(quota), None) => VoucherBinding::Quota(self.quota_key(quota)?),
                (None, Some(product)) => VoucherBinding::Product(self.product_key(product)?),
                _ => return Err(FixtureError::InvalidVoucher(voucher_fixture.key)),
            };

            let key = self.sales.vouchers.insert(Voucher {
                binding,
                subevent: self.optional_subevent(voucher_fixture.subevent.as_deref())?,
                block_quota: voucher_fixture.block_quota,
                valid_until: voucher_fixture.valid_until,
                max_usages: voucher_fixture.max_usages,
                redeemed: voucher_fixture.redeemed,
            });

            insert_unique(&mut self.voucher_keys, voucher_fixture.key, key)?;
        }

        for order_fixture in fixture.orders {
            let mut positions = Vec::new();

            for position_fixture in order_fixture.positions {
                let position = OrderPosition {
                    canceled: position_fixture.canceled,
                    ..OrderPosition::new(
                        self.product_key(&position_fixture.product)?,
                        self.optional_subevent(position_fixture.subevent.as_deref())?,
                    )
                };

                positions.extend((0..position_fixture.count).map(|_| position));
            }

            self.sales.orders.push(Order {
                status: order_fixture.status,
                expires: order_fixture.expires,
                positions,
            });
        }

        for cart_fixture in fixture.carts {
            let voucher = cart_fixture
                .voucher
                .as_deref()
                .map(|voucher| self.voucher_key(voucher))
                .transpose()?;

            self.sales.carts.push(CartPosition {
                target: self.product_key(&cart_fixture.product)?,
                subevent: self.optional_subevent(cart_fixture.subevent.as_deref())?,
                expires: cart_fixture.expires,
                voucher,
            });
        }

        for entry_fixture in fixture.waiting_list {
            self.sales.waiting_list.push(WaitingListEntry {
                target: self.product_key(&entry_fixture.product)?,
                subevent: self.optional_subevent(entry_fixture.subevent.as_deref())?,
                voucher_sent: entry_fixture.voucher_sent,
            });
        }

        Ok(self)
    }

    /// Load discount rules from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, if referenced
    /// items don't exist or if a rule fails validation.
    pub fn load_discounts(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: DiscountsFixture = self.read("discounts", name)?;

        for discount_fixture in fixture.discounts {
            let rule = self.discount_rule(discount_fixture)?;

            self.discounts.push(rule);
        }

        Ok(self)
    }

    fn discount_rule(
        &mut self,
        fixture: DiscountFixture,
    ) -> Result<DiscountRule<'static>, FixtureError> {
        let DiscountFixture {
            key,
            name,
            position,
            active,
            subevent_mode,
            available_from,
            available_until,
            sales_channels,
            condition,
            benefit,
        } = fixture;

        let condition = DiscountCondition {
            products: self.product_scope(condition.products.as_deref())?,
            min_count: condition.min_count,
            min_value: condition
                .min_value
                .as_deref()
                .map(|value| self.money(value))
                .transpose()?,
            apply_to_addons: condition.apply_to_addons,
            ignore_voucher_discounted: condition.ignore_voucher_discounted,
        };

        let scope = match benefit.products.as_deref() {
            None => BenefitScope::SameAsCondition,
            Some(products) => BenefitScope::Products {
                products: self.product_scope(Some(products))?,
                apply_to_addons: benefit.apply_to_addons,
                ignore_voucher_discounted: benefit.ignore_voucher_discounted,
            },
        };

        let benefit = DiscountBenefit {
            percentage: parse_percentage(&benefit.percentage)?,
            only_apply_to_cheapest_n_matches: benefit.cheapest,
            scope,
        };

        let sales_channels = match sales_channels {
            None => SalesChannels::All,
            Some(channels) => SalesChannels::Only(channels.into_iter().collect()),
        };

        if self.discount_keys.contains_key(&key) {
            return Err(FixtureError::DuplicateKey(key));
        }

        let discount_key = self.discount_names.insert(key.clone());

        let rule = DiscountRule::new(discount_key, subevent_mode, condition, benefit)
            .map_err(|source| FixtureError::InvalidDiscount {
                key: key.clone(),
                source,
            })?
            .with_name(name)
            .with_position(position)
            .with_active(active)
            .with_availability(available_from, available_until)
            .with_sales_channels(sales_channels);

        self.discount_keys.insert(key, discount_key);

        Ok(rule)
    }

    /// Load the cart from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or if referenced
    /// products or subevents don't exist.
    pub fn load_cart(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: CartFixture = self.read("cart", name)?;

        let mut lines = Vec::new();

        for line_fixture in fixture.lines {
            let target = self.product_key(&line_fixture.product)?;

            let price = match line_fixture.price.as_deref() {
                Some(price) => self.money(price)?,
                None => self.catalog.price_of(target)?,
            };

            let mut line = LineItem::new(
                target,
                self.optional_subevent(line_fixture.subevent.as_deref())?,
                price,
            );

            if line_fixture.addon {
                line = line.as_addon();
            }

            if line_fixture.bundled {
                line = line.as_bundled();
            }

            if let Some(discount) = line_fixture.voucher_discount.as_deref() {
                line = line.with_voucher_discount(self.money(discount)?);
            }

            lines.extend((0..line_fixture.count).map(|_| line));
        }

        self.cart = Some(Cart {
            channel: fixture.channel,
            now: fixture.now,
            lines,
        });

        Ok(self)
    }

    /// Parse a price and check it against the currency of the fixture set.
    fn money(&mut self, price: &str) -> Result<Money<'static, Currency>, FixtureError> {
        let money = parse_money(price)?;
        let currency = money.currency();

        match self.currency {
            Some(existing) if existing != currency => Err(FixtureError::CurrencyMismatch(
                existing.iso_alpha_code.to_string(),
                currency.iso_alpha_code.to_string(),
            )),
            Some(_) => Ok(money),
            None => {
                self.currency = Some(currency);
                Ok(money)
            }
        }
    }

    fn product_scope(&self, products: Option<&[String]>) -> Result<ProductScope, FixtureError> {
        let Some(products) = products else {
            return Ok(ProductScope::All);
        };

        let items = products
            .iter()
            .map(|product| self.item_key(product))
            .collect::<Result<FxHashSet<ItemKey>, _>>()?;

        Ok(ProductScope::Items(items))
    }

    fn optional_subevent(&self, key: Option<&str>) -> Result<Option<SubeventKey>, FixtureError> {
        key.map(|key| self.subevent_key(key)).transpose()
    }

    /// Get an item or variation by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found.
    pub fn product_key(&self, key: &str) -> Result<ItemRef, FixtureError> {
        self.product_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::ProductNotFound(key.to_string()))
    }

    /// Get an item without variation by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or names a variation.
    pub fn item_key(&self, key: &str) -> Result<ItemKey, FixtureError> {
        let target = self.product_key(key)?;

        match target.variation {
            None => Ok(target.item),
            Some(_) => Err(FixtureError::NotAnItem(key.to_string())),
        }
    }

    /// Get a subevent by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the subevent is not found.
    pub fn subevent_key(&self, key: &str) -> Result<SubeventKey, FixtureError> {
        self.subevent_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::SubeventNotFound(key.to_string()))
    }

    /// Get a quota by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the quota is not found.
    pub fn quota_key(&self, key: &str) -> Result<QuotaKey, FixtureError> {
        self.quota_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::QuotaNotFound(key.to_string()))
    }

    /// Get a voucher by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the voucher is not found.
    pub fn voucher_key(&self, key: &str) -> Result<VoucherKey, FixtureError> {
        self.voucher_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::VoucherNotFound(key.to_string()))
    }

    /// Get a discount rule by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the rule is not found.
    pub fn discount(&self, key: &str) -> Result<&DiscountRule<'static>, FixtureError> {
        let discount_key = self
            .discount_keys
            .get(key)
            .ok_or_else(|| FixtureError::DiscountNotFound(key.to_string()))?;

        self.discounts
            .iter()
            .find(|rule| rule.key() == *discount_key)
            .ok_or_else(|| FixtureError::DiscountNotFound(key.to_string()))
    }

    /// Fixture key of a discount rule
    pub fn discount_name(&self, key: DiscountKey) -> Option<&str> {
        self.discount_names.get(key).map(String::as_str)
    }

    /// Get the catalog
    pub fn catalog(&self) -> &Catalog<'static> {
        &self.catalog
    }

    /// Get the quotas
    pub fn quotas(&self) -> &QuotaSet {
        &self.quotas
    }

    /// Fixture key of a quota
    pub fn quota_name(&self, key: QuotaKey) -> Option<&str> {
        self.quota_keys
            .iter()
            .find(|(_, quota)| **quota == key)
            .map(|(name, _)| name.as_str())
    }

    /// Get the sales snapshot
    pub fn sales(&self) -> &SalesSnapshot {
        &self.sales
    }

    /// Get all discount rules, in fixture order
    pub fn discounts(&self) -> &[DiscountRule<'static>] {
        &self.discounts
    }

    /// Get the cart
    ///
    /// # Errors
    ///
    /// Returns an error if no cart has been loaded.
    pub fn cart(&self) -> Result<&Cart<'static>, FixtureError> {
        self.cart.as_ref().ok_or(FixtureError::NoCart)
    }

    /// Get the currency
    ///
    /// # Errors
    ///
    /// Returns an error if no prices have been loaded yet.
    pub fn currency(&self) -> Result<&'static Currency, FixtureError> {
        self.currency.ok_or(FixtureError::NoCurrency)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_unique<V>(
    keys: &mut FxHashMap<String, V>,
    key: String,
    value: V,
) -> Result<(), FixtureError> {
    if keys.contains_key(&key) {
        return Err(FixtureError::DuplicateKey(key));
    }

    keys.insert(key, value);

    Ok(())
}
