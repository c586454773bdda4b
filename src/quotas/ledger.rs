//! Quota Ledger
//!
//! Reserves capacity position by position while an order is placed, on top
//! of availability computed beforehand.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    catalog::{ItemRef, SubeventKey},
    quotas::{QuotaAvailability, QuotaError, QuotaKey, QuotaSet},
};

/// Remaining capacity per quota, decremented by reservations.
#[derive(Debug)]
pub struct QuotaLedger<'q> {
    quotas: &'q QuotaSet,
    remaining: FxHashMap<QuotaKey, Option<u32>>,
}

impl<'q> QuotaLedger<'q> {
    /// Start from computed availability.
    ///
    /// Only quotas computed by `availability` can be reserved against.
    pub fn from_availability(quotas: &'q QuotaSet, availability: &QuotaAvailability<'_>) -> Self {
        let remaining = availability
            .results()
            .iter()
            .map(|(key, result)| (*key, result.remaining))
            .collect();

        Self { quotas, remaining }
    }

    /// Units left in a quota; `None` when unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::UnknownQuota`] if the quota was not computed.
    pub fn available(&self, key: QuotaKey) -> Result<Option<u32>, QuotaError> {
        self.remaining
            .get(&key)
            .copied()
            .ok_or(QuotaError::UnknownQuota(key))
    }

    /// Reserve `count` units of a product on a subevent.
    ///
    /// Every covering quota is decremented, or none is.
    ///
    /// # Errors
    ///
    /// - [`QuotaError::NoQuotas`]: no quota covers the product.
    /// - [`QuotaError::UnknownQuota`]: a covering quota was not computed.
    /// - [`QuotaError::Exceeded`]: a covering quota has less than `count` left.
    pub fn reserve(
        &mut self,
        target: ItemRef,
        subevent: Option<SubeventKey>,
        count: u32,
    ) -> Result<(), QuotaError> {
        let covering: SmallVec<[QuotaKey; 4]> = self
            .quotas
            .covering(target, subevent)
            .map(|(key, _)| key)
            .collect();

        if covering.is_empty() {
            return Err(QuotaError::NoQuotas);
        }

        for key in &covering {
            let Some(available) = self.available(*key)? else {
                continue;
            };

            if available < count {
                debug!(quota = ?key, available, requested = count, "quota exceeded");

                return Err(QuotaError::Exceeded {
                    quota: *key,
                    requested: count,
                    available,
                });
            }
        }

        for key in &covering {
            if let Some(Some(available)) = self.remaining.get_mut(key) {
                *available -= count;
            }
        }

        Ok(())
    }
}
