//! Boxoffice prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    catalog::{Catalog, CatalogError, ItemKey, ItemRef, SubeventKey, VariationKey},
    discounts::{
        DiscountError, LinePrice, apply_discounts,
        rule::{
            BenefitScope, DiscountBenefit, DiscountCondition, DiscountConfigError, DiscountKey,
            DiscountRule, ProductScope, SalesChannels, SubeventMode, available_rules,
        },
    },
    fixtures::{Fixture, FixtureError},
    positions::LineItem,
    pricing::{TotalPriceError, total_price},
    quotas::{
        Availability, Quota, QuotaAvailability, QuotaCache, QuotaCounts, QuotaError, QuotaKey,
        QuotaLedger, QuotaSet, QuotaStatus, check_quotas,
        sales::{
            CartPosition, Order, OrderPosition, OrderStatus, SalesSnapshot, Voucher,
            VoucherBinding, VoucherKey, WaitingListEntry,
        },
    },
    report::{CartReport, ReportError, write_quota_table},
};
