//! Quotas
//!
//! Capacity limits shared by products and variations, and the calculation of
//! how much of that capacity is still available for sale.

use std::fmt;

use rustc_hash::FxHashSet;
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

use crate::catalog::{ItemKey, ItemRef, SubeventKey, VariationKey};

pub mod availability;
pub mod check;
pub mod ledger;
pub mod sales;

pub use availability::{QuotaAvailability, QuotaCounts};
pub use check::{QuotaCache, check_quotas};
pub use ledger::QuotaLedger;

new_key_type! {
    /// Quota Key
    pub struct QuotaKey;
}

/// Quota errors, surfaced to the caller and never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuotaError {
    /// The product is not covered by any quota, so it cannot be sold.
    #[error("no quota covers the requested product")]
    NoQuotas,

    /// A quota has less capacity left than requested.
    #[error("quota {quota:?} has {available} left, {requested} requested")]
    Exceeded {
        /// Quota lacking capacity
        quota: QuotaKey,

        /// Units requested
        requested: u32,

        /// Units still available
        available: u32,
    },

    /// The quota key is not part of the quota set.
    #[error("unknown quota {0:?}")]
    UnknownQuota(QuotaKey),
}

/// How far a quota is from being sold out, from worst to best.
///
/// `Gone < Ordered < Reserved < Ok`, so the worst of several states is their
/// minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuotaStatus {
    /// Sold out by paid orders
    Gone,

    /// Sold out once pending orders and blocking vouchers are counted
    Ordered,

    /// Sold out once carts (and optionally the waiting list) are counted
    Reserved,

    /// Still available
    Ok,
}

impl fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuotaStatus::Gone => "gone",
            QuotaStatus::Ordered => "ordered",
            QuotaStatus::Reserved => "reserved",
            QuotaStatus::Ok => "ok",
        };

        f.write_str(label)
    }
}

/// Availability of a quota or product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    /// Status
    pub status: QuotaStatus,

    /// Units left; `None` when unlimited
    pub remaining: Option<u32>,
}

impl Availability {
    /// Available without limit.
    pub const fn unlimited() -> Self {
        Self {
            status: QuotaStatus::Ok,
            remaining: None,
        }
    }

    /// Sold out.
    pub const fn gone() -> Self {
        Self {
            status: QuotaStatus::Gone,
            remaining: Some(0),
        }
    }

    /// Combine with the availability of another quota covering the same
    /// product: the worse status and the smaller remaining count.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let remaining = match (self.remaining, other.remaining) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };

        Self {
            status: self.status.min(other.status),
            remaining,
        }
    }

    /// Whether anything can still be sold.
    pub fn is_available(&self) -> bool {
        self.status == QuotaStatus::Ok
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remaining {
            Some(remaining) => write!(f, "{} ({remaining} left)", self.status),
            None => write!(f, "{} (unlimited)", self.status),
        }
    }
}

/// A capacity limit.
#[derive(Debug, Clone, Default)]
pub struct Quota {
    /// Display name
    pub name: String,

    /// Total capacity; `None` when unlimited
    pub size: Option<u32>,

    /// Items without variations covered by this quota
    pub items: FxHashSet<ItemKey>,

    /// Variations covered by this quota
    pub variations: FxHashSet<VariationKey>,

    /// Subevent the quota is bound to
    pub subevent: Option<SubeventKey>,

    /// Closed quotas sell nothing
    pub closed: bool,

    /// Close the quota once paid and pending orders fill it
    pub close_when_sold_out: bool,
}

impl Quota {
    /// A quota with a name and size and nothing assigned yet.
    pub fn new(name: impl Into<String>, size: Option<u32>) -> Self {
        Self {
            name: name.into(),
            size,
            ..Self::default()
        }
    }

    /// Cover an item or a variation.
    #[must_use]
    pub fn with_product(mut self, target: ItemRef) -> Self {
        match target.variation {
            Some(variation) => self.variations.insert(variation),
            None => self.items.insert(target.item),
        };

        self
    }

    /// Bind to a subevent.
    #[must_use]
    pub fn for_subevent(mut self, subevent: SubeventKey) -> Self {
        self.subevent = Some(subevent);
        self
    }

    /// Whether sales of `target` on `subevent` count against this quota.
    ///
    /// A variation is only covered through its variation key, an item
    /// without variation only through its item key.
    pub fn covers(&self, target: ItemRef, subevent: Option<SubeventKey>) -> bool {
        let product = match target.variation {
            Some(variation) => self.variations.contains(&variation),
            None => self.items.contains(&target.item),
        };

        product && self.subevent == subevent
    }
}

/// The quotas of an event.
#[derive(Debug, Default)]
pub struct QuotaSet {
    quotas: SlotMap<QuotaKey, Quota>,
}

impl QuotaSet {
    /// Empty quota set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a quota.
    pub fn insert(&mut self, quota: Quota) -> QuotaKey {
        self.quotas.insert(quota)
    }

    /// Look up a quota.
    pub fn get(&self, key: QuotaKey) -> Option<&Quota> {
        self.quotas.get(key)
    }

    /// Look up a quota, failing for unknown keys.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::UnknownQuota`] for a key not in this set.
    pub fn try_get(&self, key: QuotaKey) -> Result<&Quota, QuotaError> {
        self.quotas.get(key).ok_or(QuotaError::UnknownQuota(key))
    }

    /// All quotas.
    pub fn iter(&self) -> impl Iterator<Item = (QuotaKey, &Quota)> {
        self.quotas.iter()
    }

    /// Keys of all quotas.
    pub fn keys(&self) -> impl Iterator<Item = QuotaKey> + '_ {
        self.quotas.keys()
    }

    /// Quotas covering `target` on `subevent`.
    pub fn covering(
        &self,
        target: ItemRef,
        subevent: Option<SubeventKey>,
    ) -> impl Iterator<Item = (QuotaKey, &Quota)> {
        self.quotas
            .iter()
            .filter(move |(_, quota)| quota.covers(target, subevent))
    }

    /// Number of quotas.
    pub fn len(&self) -> usize {
        self.quotas.len()
    }

    /// Whether there are no quotas.
    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }
}
